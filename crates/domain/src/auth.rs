//! Authorization capability.
//!
//! Every state transition asks an [`Authorizer`] whether the caller holds a
//! role and owns the resource involved. Identity itself is established
//! upstream.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use common::{StallId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::Order;

/// Marketplace roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Vendor,
    Courier,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Vendor => "vendor",
            Role::Courier => "courier",
            Role::Admin => "admin",
        }
    }

    /// Parses a role name, case-insensitively.
    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_ascii_lowercase().as_str() {
            "client" => Some(Role::Client),
            "vendor" => Some(Role::Vendor),
            "courier" => Some(Role::Courier),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a user may own.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// Owned by the client who placed it.
    Order(&'a Order),
    /// Owned by its vendor.
    Stall { stall_id: StallId, vendor_id: UserId },
}

/// Role and ownership checks.
pub trait Authorizer: Send + Sync {
    fn has_role(&self, user: UserId, role: Role) -> bool;

    fn is_owner(&self, user: UserId, resource: Resource<'_>) -> bool;
}

/// Raised when a check fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("Caller lacks the {0} role")]
    MissingRole(Role),

    #[error("Caller does not own this resource")]
    NotOwner,
}

/// Fails unless `user` holds `role`.
pub fn require_role(authz: &dyn Authorizer, user: UserId, role: Role) -> Result<(), AccessDenied> {
    if authz.has_role(user, role) {
        Ok(())
    } else {
        Err(AccessDenied::MissingRole(role))
    }
}

/// Ownership as recorded on the resource itself, with admins owning everything.
pub fn owns(has_admin: bool, user: UserId, resource: Resource<'_>) -> bool {
    if has_admin {
        return true;
    }
    match resource {
        Resource::Order(order) => order.client_id() == user,
        Resource::Stall { vendor_id, .. } => vendor_id == user,
    }
}

/// In-process role map.
#[derive(Debug, Default)]
pub struct RoleDirectory {
    roles: RwLock<HashMap<UserId, HashSet<Role>>>,
}

impl RoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants a role to a user.
    pub fn grant(&self, user: UserId, role: Role) {
        self.roles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user)
            .or_default()
            .insert(role);
    }

    /// Creates a new user id holding the given role.
    pub fn user_with(&self, role: Role) -> UserId {
        let user = UserId::new();
        self.grant(user, role);
        user
    }
}

impl Authorizer for RoleDirectory {
    fn has_role(&self, user: UserId, role: Role) -> bool {
        self.roles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .is_some_and(|roles| roles.contains(&role))
    }

    fn is_owner(&self, user: UserId, resource: Resource<'_>) -> bool {
        owns(self.has_role(user, Role::Admin), user, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granted_roles_are_reported() {
        let directory = RoleDirectory::new();
        let user = directory.user_with(Role::Courier);
        assert!(directory.has_role(user, Role::Courier));
        assert!(!directory.has_role(user, Role::Client));
        assert_eq!(
            require_role(&directory, user, Role::Vendor),
            Err(AccessDenied::MissingRole(Role::Vendor))
        );
    }

    #[test]
    fn client_owns_own_order_only() {
        let directory = RoleDirectory::new();
        let client = directory.user_with(Role::Client);
        let stranger = directory.user_with(Role::Client);
        let order = Order::new(client, "");

        assert!(directory.is_owner(client, Resource::Order(&order)));
        assert!(!directory.is_owner(stranger, Resource::Order(&order)));
    }

    #[test]
    fn admin_owns_everything() {
        let directory = RoleDirectory::new();
        let admin = directory.user_with(Role::Admin);
        let order = Order::new(UserId::new(), "");
        let stall = Resource::Stall {
            stall_id: StallId::new(),
            vendor_id: UserId::new(),
        };

        assert!(directory.is_owner(admin, Resource::Order(&order)));
        assert!(directory.is_owner(admin, stall));
    }

    #[test]
    fn role_names_parse() {
        assert_eq!(Role::parse(" Vendor "), Some(Role::Vendor));
        assert_eq!(Role::parse("feriante"), None);
    }
}
