//! Account DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{User, UserId};

/// Request body for `POST /users/register`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Unique login name.
    pub username: String,
    /// Plain-text password, at least 6 characters.
    pub password: String,
    /// Grant the moderator role.
    #[serde(default)]
    pub is_moderator: bool,
}

/// Request body for `POST /users/login`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Login name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

/// Request body for `PUT /users/me`. The role flag is not accepted.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    /// New login name.
    #[serde(default)]
    pub username: Option<String>,
    /// New password.
    #[serde(default)]
    pub password: Option<String>,
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserDto {
    /// Account id.
    pub id: UserId,
    /// Login name.
    pub username: String,
    /// Moderator role flag.
    pub is_moderator: bool,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_moderator: user.is_moderator,
        }
    }
}

/// Response body for `POST /users/login`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Session token, also set as the `session_id` cookie.
    pub token: String,
    /// The authenticated account.
    pub user: UserDto,
}
