//! Domain layer: identifiers, the request aggregate, the lifecycle status
//! machine, and the storage ports.
//!
//! Nothing in here performs I/O. Adapters implementing the ports live in
//! [`crate::persistence`].

pub mod ids;
pub mod ports;
pub mod request;
pub mod status;
pub mod user;

pub use ids::{RequestId, StarId, UserId};
pub use ports::{RequestStore, StarCatalog, StoreError, UserStore};
pub use request::{
    AppliedResults, LinkPatch, ObservationRequest, RequestFilter, RequestPatch, RequestStarLink,
    RequestSummary, StarResult, Transition,
};
pub use status::{RequestStatus, ResolveAction};
pub use user::{NewStar, Principal, Star, StarPatch, User, UserPatch};
