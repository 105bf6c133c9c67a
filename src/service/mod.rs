//! Service layer: business logic orchestration.
//!
//! Each service receives the ports it needs at construction time and holds
//! them as `Arc<dyn …>`:
//!
//! - [`SessionService`] resolves tokens to principals and fronts the user
//!   cache.
//! - [`LifecycleEngine`] owns the request state machine and hands completed
//!   requests to a [`ComputeDispatcher`]; [`CallbackReceiver`] brings the
//!   results back.
//! - [`RequestService`] covers the draft cart and the star associations.
//! - [`UserService`] covers accounts.
//! - [`CatalogService`] reads the star catalog and lets moderators edit it.

pub mod callback;
pub mod catalog_service;
pub mod dispatcher;
pub mod lifecycle;
pub mod request_service;
pub mod session_service;
pub mod user_service;

pub use callback::CallbackReceiver;
pub use catalog_service::CatalogService;
pub use dispatcher::{ComputeDispatcher, ComputeJob, HttpComputeDispatcher};
pub use lifecycle::{CallbackOutcome, LifecycleEngine, ResolveOutcome};
pub use request_service::{CartInfo, LinkedStar, RequestDetail, RequestService};
pub use session_service::{SessionService, generate_token};
pub use user_service::{LoginSession, UserService};
