//! Role-based access control.
//!
//! Each [`Role`] grants a fixed set of `(Resource, Operation)` pairs. Handlers either declare the
//! requirement in their signature with [`RequiresPermission`], or check ownership themselves with
//! [`has_permission`] when the answer depends on which entity is being touched.

use std::marker::PhantomData;
use std::ops::Deref;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::trace;

use crate::{
    AppState,
    api::models::users::{CurrentUser, Role},
    errors::Error,
    types::{Operation, Permission, Resource, UserId},
};

/// Whether `role` is granted `operation` on `resource`.
pub fn role_has_permission(role: Role, resource: Resource, operation: Operation) -> bool {
    use Operation::*;
    use Resource::*;

    match role {
        Role::Admin => true,
        Role::Customer | Role::Wholesaler => matches!(
            (resource, operation),
            (Categories, ReadAll)
                | (Products, ReadAll)
                | (MarketRates, ReadAll)
                | (Users, ReadOwn | UpdateOwn)
                | (Cart, CreateOwn | ReadOwn | UpdateOwn | DeleteOwn)
                | (Orders, CreateOwn | ReadOwn)
                | (Gullak, CreateOwn | ReadOwn | UpdateOwn)
        ),
    }
}

pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    role_has_permission(user.role, resource, operation)
}

pub fn can_read_all_resources(user: &CurrentUser, resource: Resource) -> bool {
    has_permission(user, resource, Operation::ReadAll)
}

/// Read access to an entity owned by `owner`: either read-all, or read-own on one's own entity.
pub fn can_read_own_resource(user: &CurrentUser, resource: Resource, owner: UserId) -> bool {
    can_read_all_resources(user, resource) || (user.id == owner && has_permission(user, resource, Operation::ReadOwn))
}

/// Fail with 403 unless the user may read `owner`'s entity. Used where hiding existence is not
/// required.
pub fn ensure_can_read(user: &CurrentUser, resource: Resource, owner: UserId) -> Result<(), Error> {
    if can_read_own_resource(user, resource, owner) {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            required: Permission::Any(vec![
                Permission::Allow(resource, Operation::ReadAll),
                Permission::Allow(resource, Operation::ReadOwn),
            ]),
            action: Operation::ReadOwn,
            resource: resource.to_string(),
        })
    }
}

/// Type-level resource markers for [`RequiresPermission`].
pub mod resource {
    use crate::types::Resource;

    pub trait ResourceMarker: Send + Sync + 'static {
        const RESOURCE: Resource;
    }

    macro_rules! markers {
        ($($name:ident),* $(,)?) => {
            $(
                pub struct $name;
                impl ResourceMarker for $name {
                    const RESOURCE: Resource = Resource::$name;
                }
            )*
        };
    }

    markers!(Users, Categories, Products, Cart, Orders, MarketRates, Gullak, Dashboard);
}

/// Type-level operation markers for [`RequiresPermission`].
pub mod operation {
    use crate::types::Operation;

    pub trait OperationMarker: Send + Sync + 'static {
        const OPERATION: Operation;
    }

    macro_rules! markers {
        ($($name:ident),* $(,)?) => {
            $(
                pub struct $name;
                impl OperationMarker for $name {
                    const OPERATION: Operation = Operation::$name;
                }
            )*
        };
    }

    markers!(
        CreateAll,
        CreateOwn,
        ReadAll,
        ReadOwn,
        UpdateAll,
        UpdateOwn,
        DeleteAll,
        DeleteOwn,
        SystemAccess
    );
}

/// Extractor that authenticates the caller and checks a static permission.
///
/// ```ignore
/// async fn delete_product(_: RequiresPermission<resource::Products, operation::DeleteAll>) { .. }
/// ```
pub struct RequiresPermission<R, O> {
    user: CurrentUser,
    _marker: PhantomData<(R, O)>,
}

impl<R, O> RequiresPermission<R, O> {
    pub fn into_inner(self) -> CurrentUser {
        self.user
    }
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &CurrentUser {
        &self.user
    }
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: resource::ResourceMarker,
    O: operation::OperationMarker,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if !has_permission(&user, R::RESOURCE, O::OPERATION) {
            trace!(user_id = %user.id, role = ?user.role, "Permission denied");
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(R::RESOURCE, O::OPERATION),
                action: O::OPERATION,
                resource: R::RESOURCE.to_string(),
            });
        }

        Ok(Self {
            user,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(role: Role) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            username: "u".to_string(),
            email: "u@example.com".to_string(),
            role,
            display_name: None,
        }
    }

    #[test]
    fn test_admin_has_everything() {
        for resource in [Resource::Users, Resource::Orders, Resource::Dashboard, Resource::MarketRates] {
            for operation in [Operation::ReadAll, Operation::UpdateAll, Operation::DeleteAll, Operation::SystemAccess] {
                assert!(role_has_permission(Role::Admin, resource, operation));
            }
        }
    }

    #[test]
    fn test_shoppers_are_limited_to_own_data() {
        for role in [Role::Customer, Role::Wholesaler] {
            assert!(role_has_permission(role, Resource::Products, Operation::ReadAll));
            assert!(role_has_permission(role, Resource::Cart, Operation::DeleteOwn));
            assert!(role_has_permission(role, Resource::Orders, Operation::CreateOwn));
            assert!(role_has_permission(role, Resource::Gullak, Operation::UpdateOwn));

            assert!(!role_has_permission(role, Resource::Products, Operation::CreateAll));
            assert!(!role_has_permission(role, Resource::Orders, Operation::ReadAll));
            assert!(!role_has_permission(role, Resource::Orders, Operation::UpdateAll));
            assert!(!role_has_permission(role, Resource::Users, Operation::ReadAll));
            assert!(!role_has_permission(role, Resource::Dashboard, Operation::ReadAll));
            assert!(!role_has_permission(role, Resource::Gullak, Operation::SystemAccess));
        }
    }

    #[test]
    fn test_ownership_checks() {
        let customer = user(Role::Customer);
        let other = Uuid::new_v4();

        assert!(can_read_own_resource(&customer, Resource::Orders, customer.id));
        assert!(!can_read_own_resource(&customer, Resource::Orders, other));
        assert!(ensure_can_read(&customer, Resource::Gullak, other).is_err());

        let admin = user(Role::Admin);
        assert!(can_read_own_resource(&admin, Resource::Orders, other));
        assert!(ensure_can_read(&admin, Resource::Gullak, other).is_ok());
    }
}
