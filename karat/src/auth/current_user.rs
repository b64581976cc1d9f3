use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    config::Config,
    errors::{Error, Result},
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use tracing::{debug, instrument, trace};

/// Extract user from the JWT session cookie if present and valid
/// Returns:
/// - None: No session cookie present
/// - Some(Ok(user)): Valid JWT found and verified
/// - Some(Err(error)): Cookie present but invalid, malformed or expired
#[instrument(skip(parts, config))]
fn try_session_cookie_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.session.cookie_name;

    let mut last_error = None;
    for cookie in cookie_str.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=')
            && name == cookie_name
        {
            match session::verify_session_token(value, config) {
                Ok(user) => return Some(Ok(user)),
                Err(e) => last_error = Some(e),
            }
        }
    }
    last_error.map(Err)
}

/// Extract user from an `Authorization: Bearer <jwt>` header, for non-browser clients.
#[instrument(skip(parts, config))]
fn try_bearer_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    let token = auth_str.strip_prefix("Bearer ")?;
    Some(session::verify_session_token(token.trim(), config))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Cookie first, then bearer token. A valid credential wins even if the other is bad.
        let mut auth_errors = Vec::new();

        match try_session_cookie_auth(parts, &state.config) {
            Some(Ok(user)) => {
                debug!("Found session cookie authenticated user: {}", user.id);
                return Ok(user);
            }
            Some(Err(e)) => auth_errors.push(("session cookie", e)),
            None => trace!("No session cookie present"),
        }

        match try_bearer_auth(parts, &state.config) {
            Some(Ok(user)) => {
                debug!("Found bearer token authenticated user: {}", user.id);
                return Ok(user);
            }
            Some(Err(e)) => auth_errors.push(("bearer token", e)),
            None => trace!("No bearer token present"),
        }

        if !auth_errors.is_empty() {
            trace!("All authentication attempts failed ({}): {:?}", auth_errors.len(), auth_errors);
        }
        Err(Error::Unauthenticated { message: None })
    }
}

/// `Option<CurrentUser>` for routes that are public but show more to signed-in admins. Bad or
/// missing credentials are treated as anonymous.
impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        match <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await {
            Ok(user) => Ok(Some(user)),
            Err(Error::Unauthenticated { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::users::{CurrentUser, Role},
        auth::session,
        test_utils::{create_test_config, create_test_state},
    };
    use axum::{extract::FromRequestParts as _, http::request::Parts};
    use sqlx::PgPool;
    use uuid::Uuid;

    fn parts_with_header(header_name: &str, header_value: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header(header_name, header_value)
            .body(())
            .unwrap();

        let (parts, _body) = request.into_parts();
        parts
    }

    fn user() -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            username: "shopper".to_string(),
            email: "shopper@example.com".to_string(),
            role: Role::Customer,
            display_name: None,
        }
    }

    #[sqlx::test]
    async fn test_session_cookie_is_accepted(pool: PgPool) {
        let state = create_test_state(pool);
        let user = user();
        let token = session::create_session_token(&user, &state.config).unwrap();

        let mut parts = parts_with_header("cookie", &format!("theme=dark; karat_session={token}"));
        let extracted = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(extracted.id, user.id);
        assert_eq!(extracted.role, Role::Customer);
    }

    #[sqlx::test]
    async fn test_bearer_token_is_accepted(pool: PgPool) {
        let state = create_test_state(pool);
        let user = user();
        let token = session::create_session_token(&user, &state.config).unwrap();

        let mut parts = parts_with_header("authorization", &format!("Bearer {token}"));
        let extracted = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(extracted.email, "shopper@example.com");
    }

    #[sqlx::test]
    async fn test_bad_cookie_falls_back_to_bearer(pool: PgPool) {
        let state = create_test_state(pool);
        let user = user();
        let token = session::create_session_token(&user, &state.config).unwrap();

        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header("cookie", "karat_session=garbage")
            .header("authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let extracted = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(extracted.id, user.id);
    }

    #[sqlx::test]
    async fn test_missing_credentials_returns_unauthorized(pool: PgPool) {
        let state = create_test_state(pool);
        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (mut parts, _body) = request.into_parts();

        let error = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(error.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn test_optional_extraction_treats_missing_as_anonymous(pool: PgPool) {
        use axum::extract::OptionalFromRequestParts;

        let state = create_test_state(pool);
        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (mut parts, _body) = request.into_parts();

        let extracted = <CurrentUser as OptionalFromRequestParts<_>>::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(extracted.is_none());
    }

    #[sqlx::test]
    async fn test_token_signed_with_other_secret_is_rejected(pool: PgPool) {
        let state = create_test_state(pool);
        let mut other = create_test_config();
        other.secret_key = Some("someone-else".to_string());
        let token = session::create_session_token(&user(), &other).unwrap();

        let mut parts = parts_with_header("cookie", &format!("karat_session={token}"));
        let error = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(error.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
