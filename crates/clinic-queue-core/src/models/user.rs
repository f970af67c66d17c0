//! User models (patients and doctors).

use serde::{Deserialize, Serialize};

/// Role of a registered user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Receives tokens and waits in a queue
    Patient,
    /// Serves a queue
    Doctor,
}

impl Role {
    /// Storage/wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
        }
    }
}

/// A registered clinic user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Local UUID
    pub user_id: String,
    pub role: Role,
    /// Display name
    pub name: String,
    /// Login email, unique across users
    pub email: String,
    /// Creation timestamp
    pub created_at: String,
}

impl User {
    /// Create a new user with a fresh identity.
    pub fn new(name: String, email: String, role: Role) -> Self {
        Self {
            user_id: uuid::Uuid::new_v4().to_string(),
            role,
            name,
            email,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn patient(name: String, email: String) -> Self {
        Self::new(name, email, Role::Patient)
    }

    pub fn doctor(name: String, email: String) -> Self {
        Self::new(name, email, Role::Doctor)
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }
}
