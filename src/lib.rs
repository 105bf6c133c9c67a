//! # skywatch-gateway
//!
//! REST gateway for telescope observation requests.
//!
//! Users collect catalog stars into a draft request, submit it for
//! moderation, and a moderator either rejects it or hands it to an external
//! accuracy-computation service. The service posts per-star results back,
//! which completes the request. Moderators also maintain the star catalog.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)                 Computation service
//!     │                               ▲        │
//!     ├── REST Handlers (api/)        │        │ callback
//!     │                               │        ▼
//!     ├── SessionService ─── RequestService ─ LifecycleEngine ─ CallbackReceiver
//!     │        │                 │                 │
//!     │   SessionCache      RequestStore / UserStore / StarCatalog
//!     │   (Redis | memory)  (PostgreSQL | memory)
//! ```
//!
//! ## Request lifecycle
//!
//! `draft → formed → {completed, rejected}` and `draft → deleted`. A formed
//! request cannot be deleted; every status change is a compare-and-set at
//! the store boundary.

pub mod api;
pub mod app_state;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
