//! Ports to the durable store collaborators.
//!
//! The service layer talks to storage only through these traits. The
//! PostgreSQL adapter lives in [`crate::persistence::postgres`]; the
//! in-memory adapter in [`crate::persistence::memory`] backs tests and
//! storage-less development runs.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    AppliedResults, LinkPatch, NewStar, ObservationRequest, RequestFilter, RequestId, RequestPatch,
    RequestStarLink, RequestStatus, RequestSummary, Star, StarId, StarPatch, StarResult,
    Transition, User, UserId, UserPatch,
};

/// Errors raised by storage adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {0}")]
    Duplicate(String),
    /// A status precondition checked at the store boundary failed.
    #[error("{0}")]
    Conflict(String),
    /// Connection or query failure.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Durable CRUD for observation requests and their star associations.
#[async_trait]
pub trait RequestStore: Send + Sync + fmt::Debug {
    /// Returns the creator's draft, creating it atomically when absent.
    ///
    /// Concurrent calls for the same creator must observe the same row.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn get_or_create_draft(
        &self,
        creator_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ObservationRequest, StoreError>;

    /// Loads a request by id, including logically deleted ones.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn find_request(&self, id: RequestId)
    -> Result<Option<ObservationRequest>, StoreError>;

    /// Lists requests matching `filter`, newest first, with link counts.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn list_requests(&self, filter: &RequestFilter)
    -> Result<Vec<RequestSummary>, StoreError>;

    /// Patches editable request fields while the request has `expected`
    /// status. Returns `None` when the status no longer matches.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn update_request_fields(
        &self,
        id: RequestId,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<ObservationRequest>, StoreError>;

    /// Applies a status change only if the current status equals
    /// `transition.from`. Returns `None` when the precondition failed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn transition(
        &self,
        id: RequestId,
        transition: &Transition,
    ) -> Result<Option<ObservationRequest>, StoreError>;

    /// Adds a star to a draft: inserts a link with quantity 1 and the next
    /// order number, or increments the quantity of the existing link.
    ///
    /// The read-modify-write is atomic per pair.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the request is not a draft and
    /// [`StoreError::NotFound`] when it does not exist.
    async fn add_star_to_draft(
        &self,
        request_id: RequestId,
        star_id: StarId,
    ) -> Result<RequestStarLink, StoreError>;

    /// Returns all links of a request ordered by order number.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn links(&self, request_id: RequestId) -> Result<Vec<RequestStarLink>, StoreError>;

    /// Patches an existing link. Returns `None` when the pair is unknown.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn update_link(
        &self,
        request_id: RequestId,
        star_id: StarId,
        patch: &LinkPatch,
    ) -> Result<Option<RequestStarLink>, StoreError>;

    /// Deletes a link while the request is draft or formed. Deleting an
    /// unknown pair succeeds.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the request has left draft/formed,
    /// [`StoreError::NotFound`] when the request does not exist.
    async fn remove_link(&self, request_id: RequestId, star_id: StarId)
    -> Result<(), StoreError>;

    /// Writes computation results and completes the request as one atomic
    /// step.
    ///
    /// The request must currently have status `completion.from`; it is held
    /// for the duration of the step. Results for stars not linked to the
    /// request are skipped. If at least one result is written, `completion`
    /// is applied; otherwise nothing changes. Returns `None` when the request
    /// is unknown or its status does not match.
    ///
    /// # Errors
    ///
    /// Any failure, including the completion update itself, leaves every
    /// result unwritten. [`StoreError::NotFound`] when the completion names
    /// an unknown moderator, [`StoreError::Backend`] otherwise.
    async fn complete_with_results(
        &self,
        id: RequestId,
        results: &[StarResult],
        completion: &Transition,
    ) -> Result<Option<AppliedResults>, StoreError>;

    /// Sum of link quantities for a request.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn cart_count(&self, request_id: RequestId) -> Result<i64, StoreError>;
}

/// Durable store for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync + fmt::Debug {
    /// Inserts a new account.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] when the username is taken.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        is_moderator: bool,
    ) -> Result<User, StoreError>;

    /// Loads an account by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Loads an account by login name.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Applies an allow-listed patch. Returns `None` for an unknown id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn update_user(&self, id: UserId, patch: &UserPatch)
    -> Result<Option<User>, StoreError>;
}

/// The star catalog.
#[async_trait]
pub trait StarCatalog: Send + Sync + fmt::Debug {
    /// Loads an active star by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn find_star(&self, id: StarId) -> Result<Option<Star>, StoreError>;

    /// Lists active stars whose name contains `name_filter`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn list_stars(&self, name_filter: Option<&str>) -> Result<Vec<Star>, StoreError>;

    /// Loads stars by id regardless of the active flag.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn stars_by_ids(&self, ids: &[StarId]) -> Result<Vec<Star>, StoreError>;

    /// Inserts an active star.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn create_star(&self, star: &NewStar) -> Result<Star, StoreError>;

    /// Patches an active star. Returns `None` for an unknown or inactive id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn update_star(&self, id: StarId, patch: &StarPatch)
    -> Result<Option<Star>, StoreError>;

    /// Hides a star from the catalog. Links already pointing at it keep
    /// working. Returns `false` for an unknown or already inactive id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on connection or query failure.
    async fn deactivate_star(&self, id: StarId) -> Result<bool, StoreError>;
}
