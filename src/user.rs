use serde::{Deserialize, Serialize};

pub type UserId = u64;

/// An authenticated player as handed to us by the account layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        User { id, name: name.into() }
    }
}
