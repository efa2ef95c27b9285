use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Authenticated caller, as handed to the engine by the auth gate.
///
/// The engine does not authenticate; it only refuses to act without an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
}

impl Actor {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    /// An identity with a blank username is treated as no identity at all.
    pub fn is_valid(&self) -> bool {
        !self.username.trim().is_empty()
    }
}
