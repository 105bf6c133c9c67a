//! Star catalog reads for everyone and writes for moderators.

use std::sync::Arc;

use crate::domain::{NewStar, Principal, Star, StarCatalog, StarId, StarPatch};
use crate::error::ServiceError;

fn require_moderator(caller: Principal) -> Result<(), ServiceError> {
    if caller.is_moderator {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "only moderators may edit the catalog".to_string(),
        ))
    }
}

/// Catalog operations on top of the [`StarCatalog`] port.
#[derive(Debug, Clone)]
pub struct CatalogService {
    catalog: Arc<dyn StarCatalog>,
}

impl CatalogService {
    /// Creates a new `CatalogService`.
    #[must_use]
    pub fn new(catalog: Arc<dyn StarCatalog>) -> Self {
        Self { catalog }
    }

    /// Active stars, optionally filtered by a name substring.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::StorageFailure`] if the catalog is unavailable.
    pub async fn list(&self, name: Option<&str>) -> Result<Vec<Star>, ServiceError> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        Ok(self.catalog.list_stars(name).await?)
    }

    /// One active star.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown or inactive star.
    pub async fn get(&self, id: StarId) -> Result<Star, ServiceError> {
        self.catalog
            .find_star(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("star {id}")))
    }

    /// Adds a star to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Forbidden`] for non-moderators and
    /// [`ServiceError::Validation`] for a blank name or out-of-range
    /// coordinates.
    pub async fn create(&self, caller: Principal, star: &NewStar) -> Result<Star, ServiceError> {
        require_moderator(caller)?;
        star.validate().map_err(ServiceError::Validation)?;
        let star = self.catalog.create_star(star).await?;
        tracing::info!(star_id = %star.id, moderator_id = %caller.user_id, "star created");
        Ok(star)
    }

    /// Changes name, description, image or coordinates of an active star.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Forbidden`] for non-moderators,
    /// [`ServiceError::Validation`] for an empty or invalid patch and
    /// [`ServiceError::NotFound`] for an unknown or inactive star.
    pub async fn update(
        &self,
        caller: Principal,
        id: StarId,
        patch: &StarPatch,
    ) -> Result<Star, ServiceError> {
        require_moderator(caller)?;
        patch.validate().map_err(ServiceError::Validation)?;
        let star = self
            .catalog
            .update_star(id, patch)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("star {id}")))?;
        tracing::info!(star_id = %id, moderator_id = %caller.user_id, "star updated");
        Ok(star)
    }

    /// Hides a star from the catalog. Existing associations keep it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Forbidden`] for non-moderators and
    /// [`ServiceError::NotFound`] for an unknown or already inactive star.
    pub async fn deactivate(&self, caller: Principal, id: StarId) -> Result<(), ServiceError> {
        require_moderator(caller)?;
        if !self.catalog.deactivate_star(id).await? {
            return Err(ServiceError::NotFound(format!("star {id}")));
        }
        tracing::info!(star_id = %id, moderator_id = %caller.user_id, "star deactivated");
        Ok(())
    }
}
