//! Account registration, login and profile management.

use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use super::SessionService;
use crate::domain::{Principal, User, UserId, UserPatch, UserStore};
use crate::error::ServiceError;

/// Shortest accepted password.
const MIN_PASSWORD_LEN: usize = 6;
/// Longest accepted username.
const MAX_USERNAME_LEN: usize = 64;

/// A freshly started session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSession {
    /// Opaque session token.
    pub token: String,
    /// The authenticated account.
    pub user: User,
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

fn validate_username(username: &str) -> Result<(), ServiceError> {
    let trimmed = username.trim();
    if trimmed.is_empty() || trimmed.len() != username.len() {
        return Err(ServiceError::Validation(
            "username must be non-empty without surrounding whitespace".to_string(),
        ));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(ServiceError::Validation(format!(
            "username longer than {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Account operations on top of the [`UserStore`] and [`SessionService`].
#[derive(Debug, Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    sessions: SessionService,
}

impl UserService {
    /// Creates a new `UserService`.
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, sessions: SessionService) -> Self {
        Self { users, sessions }
    }

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for a bad or taken username or
    /// a short password.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        is_moderator: bool,
    ) -> Result<User, ServiceError> {
        validate_username(username)?;
        validate_password(password)?;
        let hash = hash_password(password)?;
        let user = self.users.create_user(username, &hash, is_moderator).await?;
        tracing::info!(user_id = %user.id, is_moderator, "user registered");
        Ok(user)
    }

    /// Checks credentials and starts a session.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthenticated`] for an unknown user or a
    /// wrong password; both look the same to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginSession, ServiceError> {
        let user = self
            .users
            .find_user_by_username(username)
            .await?
            .filter(|u| verify_password(password, &u.password_hash))
            .ok_or_else(|| ServiceError::Unauthenticated("invalid credentials".to_string()))?;

        let token = self
            .sessions
            .create_session(user.id, self.sessions.session_ttl())
            .await?;
        self.sessions.cache_user(&user).await;
        Ok(LoginSession { token, user })
    }

    /// Confirms that the account credited with completing computed requests
    /// exists and is a moderator.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] if the account is missing or lacks
    /// the moderator role.
    pub async fn ensure_system_moderator(&self, id: UserId) -> Result<User, ServiceError> {
        let user = self
            .users
            .find_user(id)
            .await?
            .ok_or_else(|| ServiceError::Internal(format!("system moderator {id} does not exist")))?;
        if !user.is_moderator {
            return Err(ServiceError::Internal(format!(
                "system moderator {id} ({}) is not a moderator",
                user.username
            )));
        }
        tracing::info!(user_id = %id, username = %user.username, "system moderator verified");
        Ok(user)
    }

    /// Ends the session behind `token`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] if the session cache fails.
    pub async fn logout(&self, token: &str) -> Result<(), ServiceError> {
        self.sessions.invalidate_session(token).await
    }

    /// Returns the caller's account.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the account vanished.
    pub async fn profile(&self, caller: Principal) -> Result<User, ServiceError> {
        self.sessions.get_user(caller.user_id).await
    }

    /// Changes the caller's username and/or password. The role flag is not
    /// part of the patch.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for an empty patch, a bad
    /// value, or a taken username.
    pub async fn update_profile(
        &self,
        caller: Principal,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<User, ServiceError> {
        if username.is_none() && password.is_none() {
            return Err(ServiceError::Validation("no fields to update".to_string()));
        }
        if let Some(name) = username {
            validate_username(name)?;
        }
        let password_hash = match password {
            Some(pw) => {
                validate_password(pw)?;
                Some(hash_password(pw)?)
            }
            None => None,
        };

        let patch = UserPatch {
            username: username.map(str::to_string),
            password_hash,
        };
        let user = self
            .users
            .update_user(caller.user_id, &patch)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", caller.user_id)))?;
        self.sessions.invalidate_user(user.id).await;
        tracing::info!(user_id = %user.id, "profile updated");
        Ok(user)
    }
}
