//! Request/response types for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::{InvitationCode, Stats, UserId};

#[derive(ToSchema, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub invitation_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupResponse {
    pub user_id: UserId,
}

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct GenerateCodeRequest {
    /// Days until the code expires (default 30).
    pub valid_days: Option<i64>,
    #[serde(default)]
    pub never_expires: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DashboardResponse {
    pub user_id: UserId,
    pub stats: Stats,
    pub invitations: Vec<InvitationCode>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CleanUsersResponse {
    pub deleted: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
