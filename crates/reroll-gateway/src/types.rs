//! Apex Connect wire types.

use serde::{Deserialize, Serialize};

use reroll_core::Account;

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub account: Account,
}

#[derive(Debug, Serialize)]
pub struct ChangeNickNameRequest<'a> {
    pub nick_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChangeNickNameResponse {
    #[serde(default)]
    pub nick_name: Option<String>,
}

/// Any Apex response may carry `{"error": "..."}` instead of its payload.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}
