//! Account handlers: register, login, logout, profile.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::{AuthUser, SessionToken, clear_session_cookie, session_cookie};
use crate::api::extract::ApiJson;
use crate::api::dto::{LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest, UserDto};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, ServiceError};

/// `POST /users/register`: Create an account.
///
/// # Errors
///
/// Returns [`ServiceError::Validation`] for a taken username or a weak
/// password.
#[utoipa::path(
    post,
    path = "/api/v1/users/register",
    tag = "Users",
    summary = "Register an account",
    description = "Creates a user account. Passwords are stored as Argon2 hashes.",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserDto),
        (status = 400, description = "Invalid or duplicate username, weak password", body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state
        .users
        .register(&req.username, &req.password, req.is_moderator)
        .await?;
    Ok((StatusCode::CREATED, Json(UserDto::from(&user))))
}

/// `POST /users/login`: Start a session.
///
/// # Errors
///
/// Returns [`ServiceError::Unauthenticated`] on bad credentials.
#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    tag = "Users",
    summary = "Log in",
    description = "Checks credentials, starts a session and sets the `session_id` cookie. The token is also returned for use as a bearer token.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.users.login(&req.username, &req.password).await?;
    let cookie = session_cookie(&session.token, state.sessions.session_ttl().as_secs())
        .ok_or_else(|| ServiceError::Internal("session token is not a valid cookie".to_string()))?;

    let body = LoginResponse {
        token: session.token,
        user: UserDto::from(&session.user),
    };
    Ok(([(SET_COOKIE, cookie)], Json(body)))
}

/// `POST /users/logout`: End the current session.
///
/// Succeeds without a session too.
///
/// # Errors
///
/// Returns [`ServiceError::Internal`] if the session store fails.
#[utoipa::path(
    post,
    path = "/api/v1/users/logout",
    tag = "Users",
    summary = "Log out",
    description = "Invalidates the session behind the presented token and clears the cookie. Idempotent.",
    responses(
        (status = 204, description = "Session ended"),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(token) = token {
        state.users.logout(&token).await?;
    }
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, clear_session_cookie())]))
}

/// `GET /users/me`: Current account.
///
/// # Errors
///
/// Returns [`ServiceError::Unauthenticated`] without a valid session.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "Users",
    summary = "Current account",
    responses(
        (status = 200, description = "The caller's account", body = UserDto),
        (status = 401, description = "No valid session", body = ErrorResponse),
    )
)]
pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.users.profile(auth.principal).await?;
    Ok(Json(UserDto::from(&user)))
}

/// `PUT /users/me`: Change username or password.
///
/// # Errors
///
/// Returns [`ServiceError::Validation`] for an empty patch, a taken
/// username or a weak password.
#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    tag = "Users",
    summary = "Update account",
    description = "Changes the caller's username and/or password. The moderator flag cannot be changed here.",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated account", body = UserDto),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
    )
)]
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state
        .users
        .update_profile(
            auth.principal,
            req.username.as_deref(),
            req.password.as_deref(),
        )
        .await?;
    Ok(Json(UserDto::from(&user)))
}

/// Account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/me", get(me).put(update_me))
}
