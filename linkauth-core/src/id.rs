//! Identifier derivation and the token format.
//!
//! A token is `{app_id}-{subject_id}-{nonce}`. Application and subject ids are
//! fixed-width lowercase hex, so `"{app_id}-"` and `"{app_id}-{subject_id}-"` are
//! unambiguous key prefixes for every token of an application and of a subject.
//! Storage backends rely on this to count and delete tokens without an index.

use std::fmt;

use crate::crypto::{random_hex, sha256};
use crate::error::ValidationError;

/// Bytes kept from the digest of an admin email to form an application id.
pub const APP_ID_SIZE: usize = 4;
/// Bytes kept from the digest of a user email to form a subject id. Must equal
/// [`APP_ID_SIZE`] so the admin's own subject id matches the application id.
pub const USER_ID_SIZE: usize = APP_ID_SIZE;
/// Random bytes in an admin secret, and bytes kept from its digest when stored.
pub const SECRET_SIZE: usize = 16;
/// Random bytes in a token nonce.
pub const NONCE_SIZE: usize = 8;

pub const TOKEN_SEPARATOR: char = '-';

/// Hash `input` with SHA-256, keep the first `width` bytes and hex-encode them.
///
/// A `width` of 0, or one larger than the digest, keeps the whole digest. Empty
/// input is rejected rather than hashed so an unset field can never collide with a
/// real identifier.
pub fn derive_id(input: &str, width: usize) -> Result<String, ValidationError> {
    if input.is_empty() {
        return Err(ValidationError::MissingField(
            "cannot derive an identifier from empty input".to_string(),
        ));
    }

    let digest = sha256(input.as_bytes());
    let width = if width == 0 || width > digest.len() {
        digest.len()
    } else {
        width
    };
    Ok(hex::encode(&digest[..width]))
}

/// `width` random bytes, hex-encoded.
pub fn random_secret(width: usize) -> String {
    random_hex(width)
}

/// The stored form of an admin secret.
pub fn hash_secret(secret: &str) -> Result<String, ValidationError> {
    derive_id(secret, SECRET_SIZE)
}

/// Application id for an admin email.
pub fn app_id_for(admin_email: &str) -> Result<String, ValidationError> {
    derive_id(admin_email, APP_ID_SIZE)
}

/// Subject id for a user email.
pub fn subject_id_for(email: &str) -> Result<String, ValidationError> {
    derive_id(email, USER_ID_SIZE)
}

/// Key prefix shared by every token of an application.
pub fn app_prefix(app_id: &str) -> String {
    format!("{app_id}{TOKEN_SEPARATOR}")
}

/// Key prefix shared by every token of one subject within an application.
pub fn subject_prefix(app_id: &str, subject_id: &str) -> String {
    format!("{app_id}{TOKEN_SEPARATOR}{subject_id}{TOKEN_SEPARATOR}")
}

/// A parsed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKey {
    pub app_id: String,
    pub subject_id: String,
    pub nonce: String,
}

impl TokenKey {
    /// Mint a fresh token for `email` within `app_id`.
    pub fn generate(app_id: &str, email: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            app_id: app_id.to_string(),
            subject_id: subject_id_for(email)?,
            nonce: random_secret(NONCE_SIZE),
        })
    }

    /// Split a token into its three parts. Returns `None` unless there are exactly
    /// three non-empty parts.
    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.split(TOKEN_SEPARATOR);
        let (app_id, subject_id, nonce) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || app_id.is_empty() || subject_id.is_empty() || nonce.is_empty()
        {
            return None;
        }

        Some(Self {
            app_id: app_id.to_string(),
            subject_id: subject_id.to_string(),
            nonce: nonce.to_string(),
        })
    }

    /// Admin session tokens carry the application id as their subject.
    pub fn is_admin(&self) -> bool {
        self.subject_id == self.app_id
    }

    pub fn app_prefix(&self) -> String {
        app_prefix(&self.app_id)
    }

    pub fn subject_prefix(&self) -> String {
        subject_prefix(&self.app_id, &self.subject_id)
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{TOKEN_SEPARATOR}{}{TOKEN_SEPARATOR}{}",
            self.app_id, self.subject_id, self.nonce
        )
    }
}
