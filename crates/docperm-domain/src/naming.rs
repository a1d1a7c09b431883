//! Secret-name and permission-id derivation.
//!
//! Secret names must satisfy the secret store: 1-127 characters drawn from
//! `0-9`, `a-z`, `A-Z` and `-`. User ids coming from identity providers look
//! like `google|sid:uir7d29343a3gufe414098b063199430`, so the separator
//! characters are folded into hyphens. Distinct triples may collide after
//! folding; the store constraint leaves no better option.

use std::fmt;

use crate::error::{DomainError, DomainResult};
use crate::model::PermissionMode;

/// Maximum secret name length accepted by the secret store.
pub const MAX_SECRET_NAME_LEN: usize = 127;

const FOLDED_SEPARATORS: [char; 3] = ['|', ':', '_'];

/// Replaces the user-id separators (`|`, `:`, `_`) with `-`.
pub fn normalize_user_id(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if FOLDED_SEPARATORS.contains(&c) { '-' } else { c })
        .collect()
}

/// Derives the secret name for a (database, collection, user) triple:
/// `{databaseId}[-{collectionId}]-{normalizedUserId}`.
pub fn secret_name(database_id: &str, collection_id: Option<&str>, user_id: &str) -> String {
    let collection_segment = match collection_id {
        Some(collection_id) if !collection_id.is_empty() => format!("-{collection_id}"),
        _ => String::new(),
    };

    format!(
        "{database_id}{collection_segment}-{}",
        normalize_user_id(user_id)
    )
}

/// Checks a secret name against the store's charset and length rules.
pub fn validate_secret_name(name: &str) -> DomainResult<()> {
    if name.is_empty() || name.len() > MAX_SECRET_NAME_LEN {
        return Err(DomainError::InvalidSecretName {
            name: name.to_string(),
            reason: format!("length must be 1-{MAX_SECRET_NAME_LEN}, got {}", name.len()),
        });
    }

    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
        return Err(DomainError::InvalidSecretName {
            name: name.to_string(),
            reason: format!("character '{bad}' is not alphanumeric or '-'"),
        });
    }

    Ok(())
}

/// Identifier of a permission resource in the store.
///
/// Rendered as `{databaseId}[-{collectionId}]-{userId}-{MODE}`. Keeping the
/// components lets the broker address the other-mode permission of the same
/// identity with [`PermissionId::with_mode`] instead of editing the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionId {
    database_id: String,
    collection_id: Option<String>,
    user_id: String,
    mode: PermissionMode,
}

impl PermissionId {
    pub fn new(
        database_id: impl Into<String>,
        collection_id: Option<&str>,
        user_id: impl Into<String>,
        mode: PermissionMode,
    ) -> Self {
        Self {
            database_id: database_id.into(),
            collection_id: collection_id.filter(|c| !c.is_empty()).map(str::to_string),
            user_id: user_id.into(),
            mode,
        }
    }

    pub fn mode(&self) -> PermissionMode {
        self.mode
    }

    /// Same identity, different mode.
    pub fn with_mode(&self, mode: PermissionMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    /// Same identity, opposite mode.
    pub fn opposite(&self) -> Self {
        self.with_mode(self.mode.opposite())
    }
}

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.database_id)?;
        if let Some(collection_id) = &self.collection_id {
            write!(f, "{collection_id}-")?;
        }
        write!(f, "{}-{}", self.user_id, self.mode.as_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_name_folds_user_id_separators() {
        let name = secret_name(
            "db1",
            Some("items"),
            "google|sid:uir7d29343a3gufe414098b063199430",
        );
        assert_eq!(name, "db1-items-google-sid-uir7d29343a3gufe414098b063199430");
        assert!(validate_secret_name(&name).is_ok());

        let name = secret_name("db1", None, "aad|user_42");
        assert_eq!(name, "db1-aad-user-42");
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_secret_name_is_deterministic() {
        let a = secret_name("db1", Some("items"), "twitter|1234_5:6");
        let b = secret_name("db1", Some("items"), "twitter|1234_5:6");
        assert_eq!(a, b);
    }

    #[test]
    fn test_secret_name_skips_empty_collection() {
        assert_eq!(secret_name("db1", Some(""), "anonymous-user"), "db1-anonymous-user");
    }

    #[test]
    fn test_validate_secret_name_rejects_bad_input() {
        assert!(matches!(
            validate_secret_name(""),
            Err(DomainError::InvalidSecretName { .. })
        ));
        assert!(validate_secret_name(&"a".repeat(MAX_SECRET_NAME_LEN)).is_ok());
        assert!(validate_secret_name(&"a".repeat(MAX_SECRET_NAME_LEN + 1)).is_err());
        assert!(validate_secret_name("db.1-user").is_err());
        assert!(validate_secret_name("db1-user@home").is_err());
    }

    #[test]
    fn test_permission_id_format() {
        let id = PermissionId::new("db1", Some("items"), "aad|u1", PermissionMode::Read);
        assert_eq!(id.to_string(), "db1-items-aad|u1-READ");

        let id = PermissionId::new("db1", None, "u1", PermissionMode::All);
        assert_eq!(id.to_string(), "db1-u1-ALL");
    }

    #[test]
    fn test_opposite_permission_id_is_derived_structurally() {
        // A user id that itself contains a mode token must not confuse the swap.
        let id = PermissionId::new("db1", Some("items"), "READ-ALL", PermissionMode::All);
        let old = id.opposite();

        assert_eq!(old.mode(), PermissionMode::Read);
        assert_eq!(old.to_string(), "db1-items-READ-ALL-READ");
        assert_eq!(old.opposite(), id);
    }
}
