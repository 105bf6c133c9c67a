//! Data Transfer Objects for REST request/response serialization.
//!
//! Domain types that already have the right wire shape
//! ([`crate::domain::Star`], [`crate::domain::RequestStarLink`],
//! [`crate::domain::ObservationRequest`]) are returned as they are.

pub mod request_dto;
pub mod star_dto;
pub mod user_dto;

pub use request_dto::*;
pub use star_dto::*;
pub use user_dto::*;
