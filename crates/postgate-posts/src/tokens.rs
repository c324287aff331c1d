//! In-memory approval tokens.
//!
//! A token binds an inline button to a folder without putting the path into
//! the callback payload. Tokens live for the process lifetime only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Length of a token in hex characters.
pub const TOKEN_LEN: usize = 12;

/// Generate a fresh random token.
pub fn new_token() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(TOKEN_LEN);
    token
}

/// Whether `s` has the shape of a token (12 lower-case hex characters).
pub fn is_token(s: &str) -> bool {
    s.len() == TOKEN_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Token → folder path table shared by every handler.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: RwLock<HashMap<String, PathBuf>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: &str, folder: &Path) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.to_string(), folder.to_path_buf());
    }

    /// Generate and register a token for `folder`.
    pub fn issue(&self, folder: &Path) -> String {
        let token = new_token();
        self.register(&token, folder);
        token
    }

    pub fn lookup(&self, token: &str) -> Option<PathBuf> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }

    pub fn remove(&self, token: &str) -> Option<PathBuf> {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
    }

    /// Any token currently bound to `folder`.
    pub fn token_for(&self, folder: &Path) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, path)| path.as_path() == folder)
            .map(|(token, _)| token.clone())
    }

    pub fn len(&self) -> usize {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
