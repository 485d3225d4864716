//! Account entities returned by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use serde::{Deserialize, Serialize};

/// One set of authenticated credentials for the remote API.
///
/// `quota_reset_at` is epoch seconds; 0 means no known restriction. `active`
/// marks backup-pool eligibility and flips to false exactly once when the
/// account is claimed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub email: String,
    pub email_password: String,
    pub auth_token: String,
    pub mfa_code_url: Option<String>,
    pub cookies: Option<String>,
    pub quota_reset_at: i64,
    pub active: bool,
}

/// One parsed line of a bulk credential import file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialLine {
    pub username: String,
    pub password: String,
    pub email: String,
    pub email_password: String,
    pub auth_token: String,
    pub mfa_code_url: String,
}
