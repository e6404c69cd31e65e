//! Caller identity forwarded by the upstream gateway.
//!
//! Authentication happens before requests reach this service. The gateway
//! passes the verified user id in `x-user-id` and a comma-separated role
//! list in `x-user-roles`.

use std::collections::HashSet;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::UserId;
use domain::{Authorizer, Resource, Role, auth::owns};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: UserId,
    roles: HashSet<Role>,
}

impl Caller {
    pub fn new(id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id,
            roles: roles.into_iter().collect(),
        }
    }

    /// Reads the forwarded claims. Unknown role names are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let raw_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing caller identity".to_string()))?;
        let id = UserId::parse(raw_id.trim())
            .map_err(|_| ApiError::Unauthorized("Invalid caller identity".to_string()))?;

        let roles = headers
            .get(USER_ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|list| list.split(',').filter_map(Role::parse).collect())
            .unwrap_or_default();

        Ok(Self { id, roles })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers)
    }
}

/// A caller can only vouch for itself.
impl Authorizer for Caller {
    fn has_role(&self, user: UserId, role: Role) -> bool {
        user == self.id && self.roles.contains(&role)
    }

    fn is_owner(&self, user: UserId, resource: Resource<'_>) -> bool {
        owns(self.has_role(user, Role::Admin), user, resource)
    }
}
