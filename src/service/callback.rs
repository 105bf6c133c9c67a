//! Inbound half of the computation cycle.
//!
//! The computation service is not a logged-in user; the shared secret it
//! echoes back is the whole trust boundary of this path.

use constant_time_eq::constant_time_eq;

use super::{CallbackOutcome, LifecycleEngine};
use crate::domain::{RequestId, StarResult};
use crate::error::ServiceError;

/// Authenticates computation callbacks and hands them to the
/// [`LifecycleEngine`].
#[derive(Debug, Clone)]
pub struct CallbackReceiver {
    engine: LifecycleEngine,
    shared_secret: String,
}

impl CallbackReceiver {
    /// Creates a receiver accepting callbacks signed with `shared_secret`.
    #[must_use]
    pub fn new(engine: LifecycleEngine, shared_secret: impl Into<String>) -> Self {
        Self {
            engine,
            shared_secret: shared_secret.into(),
        }
    }

    /// Validates `secret` and applies `results`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthenticated`] on a secret mismatch, in
    /// which case nothing is written. Otherwise propagates the errors of
    /// [`LifecycleEngine::apply_computation_result`].
    pub async fn receive_callback(
        &self,
        request_id: RequestId,
        secret: &str,
        results: &[StarResult],
    ) -> Result<CallbackOutcome, ServiceError> {
        if !constant_time_eq(secret.as_bytes(), self.shared_secret.as_bytes()) {
            tracing::warn!(%request_id, "callback rejected: bad shared secret");
            return Err(ServiceError::Unauthenticated(
                "invalid callback secret".to_string(),
            ));
        }

        let outcome = self
            .engine
            .apply_computation_result(request_id, results)
            .await?;
        tracing::info!(
            %request_id,
            stars_updated = outcome.stars_updated,
            total_stars = outcome.total_stars,
            status = %outcome.status,
            "callback applied"
        );
        Ok(outcome)
    }
}
