use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::secrets;

/// Secret database row (Queryable). `value_ciphertext` never leaves as plaintext.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = secrets)]
pub struct Secret {
    pub project_name: String,
    pub key: String,
    pub value_ciphertext: String,
    pub created_at: String,
    pub updated_at: String,
}

/// New secret for insertion/upsert (Insertable)
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = secrets)]
pub struct NewSecret {
    pub project_name: String,
    pub key: String,
    pub value_ciphertext: String,
    pub created_at: String,
    pub updated_at: String,
}

impl NewSecret {
    pub fn new(
        project_name: impl Into<String>,
        key: impl Into<String>,
        value_ciphertext: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            project_name: project_name.into(),
            key: key.into(),
            value_ciphertext: value_ciphertext.into(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Secret key must match `^[A-Z_][A-Z0-9_]*$`, at most 128 chars.
pub fn is_valid_secret_key(key: &str) -> bool {
    if key.is_empty() || key.len() > 128 {
        return false;
    }
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_uppercase() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_secret_keys() {
        assert!(is_valid_secret_key("API_KEY"));
        assert!(is_valid_secret_key("_PRIVATE"));
        assert!(is_valid_secret_key("KEY_123"));
    }

    #[test]
    fn invalid_secret_keys() {
        assert!(!is_valid_secret_key(""));
        assert!(!is_valid_secret_key("lowercase"));
        assert!(!is_valid_secret_key("1LEADING_DIGIT"));
        assert!(!is_valid_secret_key("HAS-DASH"));
        assert!(!is_valid_secret_key(&"A".repeat(129)));
    }
}
