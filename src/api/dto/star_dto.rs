//! Catalog DTOs.

use serde::Deserialize;
use utoipa::IntoParams;

/// Query parameters for `GET /stars`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StarListParams {
    /// Case-insensitive substring of the star name.
    #[serde(default)]
    pub name: Option<String>,
}
