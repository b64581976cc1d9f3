use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::{
        auth::{AuthResponse, AuthSuccessResponse, LoginRequest, LoginResponse, LogoutResponse, RegisterRequest, RegisterResponse},
        users::{CurrentUser, Role, UserResponse},
    },
    auth::{
        password::{self, Argon2Params},
        session,
    },
    db::{
        handlers::{Repository, Users},
        models::users::UserCreateDBRequest,
    },
    errors::Error,
};

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

/// Register a new customer account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    tag = "auth",
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input or registration disabled"),
        (status = 409, description = "Email or username already taken"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<RegisterResponse, Error> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let username = request.username.trim().to_string();
    let email = request.email.trim().to_string();
    if username.is_empty() {
        return Err(Error::BadRequest {
            message: "Username must not be empty".to_string(),
        });
    }
    if !email.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }

    let password_config = &state.config.auth.password;
    if request.password.len() < password_config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", password_config.min_length),
        });
    }
    if request.password.len() > password_config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", password_config.max_length),
        });
    }

    let password_hash = password::hash_blocking(request.password, Argon2Params::from(password_config)).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let created_user = Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            username,
            email,
            display_name: request.display_name,
            phone: request.phone,
            role: Role::Customer,
            password_hash: Some(password_hash),
        })
        .await?;

    let user_response = UserResponse::from(created_user);
    let current_user: CurrentUser = user_response.clone().into();
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = session::session_cookie(&token, &state.config);

    let auth_response = AuthResponse {
        user: user_response,
        message: "Registration successful".to_string(),
    };

    Ok(RegisterResponse { auth_response, cookie })
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_user_by_email(request.email.trim())
        .await?
        .ok_or_else(invalid_credentials)?;

    // Accounts without a password (e.g. a bootstrap admin with none configured) cannot log in
    let hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;
    if !password::verify_blocking(request.password, hash).await? {
        return Err(invalid_credentials());
    }

    let user_response = UserResponse::from(user);
    let current_user: CurrentUser = user_response.clone().into();
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = session::session_cookie(&token, &state.config);

    let auth_response = AuthResponse {
        user: user_response,
        message: "Login successful".to_string(),
    };

    Ok(LoginResponse { auth_response, cookie })
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    let cookie = session::expired_session_cookie(&state.config);

    let auth_response = AuthSuccessResponse {
        message: "Logout successful".to_string(),
    };

    Ok(LogoutResponse { auth_response, cookie })
}

/// The signed-in user, read fresh from the database
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not signed in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn me(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_by_id(current_user.id)
        .await?
        .ok_or(Error::Unauthenticated { message: None })?;

    Ok(Json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{auth_header, create_test_app, create_test_config, create_test_state, create_test_user};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::PgPool;

    fn auth_router(state: AppState) -> TestServer {
        let app = axum::Router::new()
            .route("/auth/register", axum::routing::post(register))
            .route("/auth/login", axum::routing::post(login))
            .route("/auth/logout", axum::routing::post(logout))
            .with_state(state);

        TestServer::new(app).unwrap()
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            username: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            password: "password123".to_string(),
            display_name: Some("Meera".to_string()),
            phone: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_success(pool: PgPool) {
        let server = auth_router(create_test_state(pool));

        let response = server.post("/auth/register").json(&register_request("meera@example.com")).await;

        response.assert_status(StatusCode::CREATED);
        let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
        assert!(cookie.starts_with("karat_session="));
        assert!(cookie.contains("HttpOnly"));

        let body: AuthResponse = response.json();
        assert_eq!(body.user.email, "meera@example.com");
        assert_eq!(body.user.role, Role::Customer);
        assert_eq!(body.message, "Registration successful");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_disabled(pool: PgPool) {
        let mut config = create_test_config();
        config.auth.allow_registration = false;
        let state = AppState {
            config,
            ..create_test_state(pool)
        };
        let server = auth_router(state);

        let response = server.post("/auth/register").json(&register_request("meera@example.com")).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_rejects_short_password(pool: PgPool) {
        let server = auth_router(create_test_state(pool));

        let mut request = register_request("meera@example.com");
        request.password = "short".to_string();

        let response = server.post("/auth/register").json(&request).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_duplicate_email_conflicts(pool: PgPool) {
        let server = auth_router(create_test_state(pool));

        server
            .post("/auth/register")
            .json(&register_request("meera@example.com"))
            .await
            .assert_status(StatusCode::CREATED);

        let mut again = register_request("meera@example.com");
        again.username = "meera2".to_string();
        let response = server.post("/auth/register").json(&again).await;
        response.assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_login_roundtrip(pool: PgPool) {
        let server = auth_router(create_test_state(pool));
        server
            .post("/auth/register")
            .json(&register_request("arjun@example.com"))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .post("/auth/login")
            .json(&json!({"email": "arjun@example.com", "password": "password123"}))
            .await;
        response.assert_status_ok();
        assert!(response.headers().get("set-cookie").is_some());
        let body: AuthResponse = response.json();
        assert_eq!(body.message, "Login successful");

        let response = server
            .post("/auth/login")
            .json(&json!({"email": "arjun@example.com", "password": "wrong-password"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let response = server
            .post("/auth/login")
            .json(&json!({"email": "nobody@example.com", "password": "password123"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_logout_clears_cookie(pool: PgPool) {
        let server = auth_router(create_test_state(pool));

        let response = server.post("/auth/logout").await;
        response.assert_status_ok();
        let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_me_requires_session(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Wholesaler).await;

        app.get("/api/auth/me").await.assert_status(StatusCode::UNAUTHORIZED);

        let (name, value) = auth_header(&user);
        let response = app.get("/api/auth/me").add_header(name, value).await;
        response.assert_status_ok();
        let me: UserResponse = response.json();
        assert_eq!(me.id, user.id);
        assert_eq!(me.role, Role::Wholesaler);
    }
}
