use serde::{Deserialize, Serialize};

pub type SourceTypeId = i32;

/// External label under which payments arrive (`game`, `server`, `payment`).
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct SourceType {
    pub id: SourceTypeId,
    pub value: String,
}

impl SourceType {
    pub fn new(id: SourceTypeId, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

/// Labels seeded into a fresh store.
pub const DEFAULT_SOURCE_TYPES: [&str; 3] = ["game", "server", "payment"];
