use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
    SuperAdmin,
}

/// Roles allowed to run back-office operations.
pub const ADMIN_ROLES: &[Role] = &[Role::Admin, Role::SuperAdmin];

/// The authenticated caller of an operation.
///
/// Authentication itself happens outside this crate; the engine trusts the
/// id and roles it is handed and only checks them against the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn customer(id: UserId) -> Self {
        Self {
            id,
            roles: vec![Role::Customer],
        }
    }

    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            roles: vec![Role::Admin],
        }
    }

    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        self.roles.iter().any(|role| allowed.contains(role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_any_role(ADMIN_ROLES)
    }
}
