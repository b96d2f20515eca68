use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::tokens;

/// Operator token database row (Queryable). `token_hash` is SHA-256 hex.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = tokens)]
pub struct Token {
    pub id: String,
    pub label: String,
    pub token_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tokens)]
pub struct NewToken {
    pub id: String,
    pub label: String,
    pub token_hash: String,
    pub created_at: String,
}

impl NewToken {
    pub fn new(id: impl Into<String>, label: impl Into<String>, token_hash: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            token_hash: token_hash.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
