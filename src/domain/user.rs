//! Users, authenticated principals and catalog stars.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{StarId, UserId};

/// A user account as stored durably and mirrored in the user cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Account identifier.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Moderator role flag.
    pub is_moderator: bool,
}

/// Identity and role of the caller, resolved server-side from a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    /// Authenticated user.
    pub user_id: UserId,
    /// Role flag read from the user record, never from client input.
    pub is_moderator: bool,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            is_moderator: user.is_moderator,
        }
    }
}

/// Allow-listed account patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    /// New login name.
    pub username: Option<String>,
    /// New password hash.
    pub password_hash: Option<String>,
}

/// Catalog entry of an observable star.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Star {
    /// Star identifier.
    pub id: StarId,
    /// Display name.
    pub name: String,
    /// One-line summary.
    pub short_description: String,
    /// Public image location.
    pub image_url: String,
    /// Inactive stars are hidden from the catalog.
    pub is_active: bool,
    /// Right ascension in degrees.
    pub ra: f64,
    /// Declination in degrees.
    pub dec: f64,
}

/// Catalog entry to insert.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct NewStar {
    /// Display name.
    pub name: String,
    /// One-line summary.
    #[serde(default)]
    pub short_description: String,
    /// Public image location.
    #[serde(default)]
    pub image_url: String,
    /// Right ascension in degrees, within `[0, 360)`.
    pub ra: f64,
    /// Declination in degrees, within `[-90, 90]`.
    pub dec: f64,
}

/// Allow-listed catalog patch. Activation is changed only through
/// deactivation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
pub struct StarPatch {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New summary.
    #[serde(default)]
    pub short_description: Option<String>,
    /// New image location.
    #[serde(default)]
    pub image_url: Option<String>,
    /// New right ascension.
    #[serde(default)]
    pub ra: Option<f64>,
    /// New declination.
    #[serde(default)]
    pub dec: Option<f64>,
}

fn check_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    Ok(())
}

fn check_ra(ra: f64) -> Result<(), String> {
    if !(0.0..360.0).contains(&ra) {
        return Err(format!("ra out of range: {ra}"));
    }
    Ok(())
}

fn check_dec(dec: f64) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&dec) {
        return Err(format!("dec out of range: {dec}"));
    }
    Ok(())
}

impl NewStar {
    /// Checks the name and coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        check_name(&self.name)?;
        check_ra(self.ra)?;
        check_dec(self.dec)
    }
}

impl StarPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.short_description.is_none()
            && self.image_url.is_none()
            && self.ra.is_none()
            && self.dec.is_none()
    }

    /// Checks the fields that are present.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("no fields to update".to_string());
        }
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(ra) = self.ra {
            check_ra(ra)?;
        }
        if let Some(dec) = self.dec {
            check_dec(dec)?;
        }
        Ok(())
    }

    /// Applies the patch to an in-memory star.
    pub fn apply_to(&self, star: &mut Star) {
        if let Some(name) = &self.name {
            star.name.clone_from(name);
        }
        if let Some(text) = &self.short_description {
            star.short_description.clone_from(text);
        }
        if let Some(url) = &self.image_url {
            star.image_url.clone_from(url);
        }
        if let Some(ra) = self.ra {
            star.ra = ra;
        }
        if let Some(dec) = self.dec {
            star.dec = dec;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star(ra: f64, dec: f64) -> NewStar {
        NewStar {
            name: "Vega".to_string(),
            short_description: String::new(),
            image_url: String::new(),
            ra,
            dec,
        }
    }

    #[test]
    fn new_star_coordinates_are_checked() {
        assert!(star(279.2, 38.8).validate().is_ok());
        assert!(star(360.0, 0.0).validate().is_err());
        assert!(star(10.0, -91.0).validate().is_err());
    }

    #[test]
    fn blank_names_are_rejected() {
        let mut s = star(1.0, 1.0);
        s.name = "  ".to_string();
        assert!(s.validate().is_err());
        let patch = StarPatch {
            name: Some(String::new()),
            ..StarPatch::default()
        };
        assert!(patch.validate().is_err());
        assert!(StarPatch::default().validate().is_err());
    }
}
