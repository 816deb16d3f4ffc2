//! # Runtime Configuration
//!
//! The session table that maps opaque bearer tokens to identities.
//!
//! ## Sessions File
//!
//! ```toml
//! [[session]]
//! token = "s3cr3t-admin"
//! user_id = "root"
//! role = "admin"
//!
//! [[session]]
//! token = "s3cr3t-alice"
//! user_id = "alice"
//! role = "member"
//! ```
//!
//! The path comes from `--sessions` or the `DEALPIPE_SESSIONS` environment
//! variable.

use crate::AppError;
use dealpipe_core::{Identity, Role};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Maximum sessions file size (1 MB).
const MAX_SESSIONS_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SESSION TABLE
// =============================================================================

/// One token → identity binding.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionEntry {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

impl SessionEntry {
    /// The identity this token resolves to.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id.clone(), self.role)
    }
}

#[derive(Debug, Deserialize)]
struct SessionsFile {
    #[serde(default)]
    session: Vec<SessionEntry>,
}

/// Parse a sessions document.
///
/// Tokens and user ids must be non-empty after trimming, and no token may
/// appear twice.
pub fn parse_sessions(text: &str) -> Result<Vec<SessionEntry>, AppError> {
    let file: SessionsFile =
        toml::from_str(text).map_err(|e| AppError::Config(format!("Invalid sessions file: {}", e)))?;

    let mut seen = BTreeSet::new();
    for (position, entry) in file.session.iter().enumerate() {
        if entry.token.trim().is_empty() {
            return Err(AppError::Config(format!(
                "Session #{} has an empty token",
                position + 1
            )));
        }
        if entry.user_id.trim().is_empty() {
            return Err(AppError::Config(format!(
                "Session #{} has an empty user_id",
                position + 1
            )));
        }
        if !seen.insert(entry.token.as_str()) {
            return Err(AppError::Config(format!(
                "Session #{} reuses a token already bound to another session",
                position + 1
            )));
        }
    }
    Ok(file.session)
}

/// Load and parse a sessions file from disk.
pub fn load_sessions(path: &Path) -> Result<Vec<SessionEntry>, AppError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        AppError::Io(format!(
            "Cannot read sessions file '{}': {}",
            path.display(),
            e
        ))
    })?;
    if metadata.len() > MAX_SESSIONS_FILE_SIZE {
        return Err(AppError::Config(format!(
            "Sessions file size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_SESSIONS_FILE_SIZE
        )));
    }

    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::Io(format!(
            "Cannot read sessions file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_sessions(&text)
}

/// Sessions file path from `DEALPIPE_SESSIONS`, if set and non-empty.
pub fn sessions_path_from_env() -> Option<PathBuf> {
    std::env::var("DEALPIPE_SESSIONS")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_admin_and_member() {
        let text = r#"
            [[session]]
            token = "t-root"
            user_id = "root"
            role = "admin"

            [[session]]
            token = "t-alice"
            user_id = "alice"
            role = "member"
        "#;
        let sessions = parse_sessions(text).expect("parse");
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].identity().is_admin());
        assert_eq!(sessions[1].identity(), Identity::member("alice"));
    }

    #[test]
    fn empty_document_has_no_sessions() {
        assert!(parse_sessions("").expect("parse").is_empty());
    }

    #[test]
    fn unknown_role_rejected() {
        let text = r#"
            [[session]]
            token = "t"
            user_id = "u"
            role = "owner"
        "#;
        assert!(matches!(parse_sessions(text), Err(AppError::Config(_))));
    }

    #[test]
    fn duplicate_token_rejected() {
        let text = r#"
            [[session]]
            token = "same"
            user_id = "a"
            role = "member"

            [[session]]
            token = "same"
            user_id = "b"
            role = "admin"
        "#;
        assert!(parse_sessions(text).is_err());
    }

    #[test]
    fn blank_token_rejected() {
        let text = r#"
            [[session]]
            token = "  "
            user_id = "a"
            role = "member"
        "#;
        assert!(parse_sessions(text).is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sessions.toml");
        std::fs::write(
            &path,
            "[[session]]\ntoken = \"abc\"\nuser_id = \"bob\"\nrole = \"member\"\n",
        )
        .expect("write");
        let sessions = load_sessions(&path).expect("load");
        assert_eq!(sessions[0].user_id, "bob");
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load_sessions(Path::new("/nonexistent/sessions.toml"));
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
