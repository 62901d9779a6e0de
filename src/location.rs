// src/location.rs
//
// Location feed plumbing: raw fixes and reverse-geocoded placemarks are
// turned into the `Location` the dispatch service understands, and every
// location is checked before it can reach a session.

use crate::types::{Coordinates, Location, PostalAddress};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("coordinates are not finite numbers")]
    NonFinite,

    #[error("coordinates out of range: lat={lat}, lng={lng}")]
    OutOfRange { lat: f64, lng: f64 },

    #[error("address has no populated fields")]
    EmptyAddress,

    #[error("location fix has unusable horizontal accuracy ({0})")]
    InvalidFix(f64),
}

impl Location {
    pub fn validate(&self) -> Result<(), LocationError> {
        match self {
            Location::Coordinates(c) => c.validate(),
            Location::Address(a) => {
                let fields = [&a.line1, &a.line2, &a.city, &a.state, &a.zip];
                if fields.iter().all(|f| f.trim().is_empty()) {
                    Err(LocationError::EmptyAddress)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl Coordinates {
    pub fn validate(&self) -> Result<(), LocationError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(LocationError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lng) {
            return Err(LocationError::OutOfRange {
                lat: self.lat,
                lng: self.lng,
            });
        }
        Ok(())
    }
}

/// One reading from the platform location service.
///
/// Accuracies are radii in meters; a negative horizontal accuracy means the
/// fix is invalid, a negative vertical accuracy only means altitude is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LocationFix {
    pub lat: f64,
    pub lng: f64,
    pub horizontal_accuracy: f64,
    #[serde(default)]
    pub vertical_accuracy: f64,
}

impl LocationFix {
    /// Combined accuracy is the length of the (horizontal, vertical) error
    /// vector, truncated to whole meters.
    pub fn to_coordinates(&self) -> Result<Coordinates, LocationError> {
        if !self.horizontal_accuracy.is_finite() || self.horizontal_accuracy < 0.0 {
            return Err(LocationError::InvalidFix(self.horizontal_accuracy));
        }
        let vertical = if self.vertical_accuracy.is_finite() && self.vertical_accuracy > 0.0 {
            self.vertical_accuracy
        } else {
            0.0
        };
        let combined = self.horizontal_accuracy.hypot(vertical);

        let coordinates = Coordinates {
            lat: self.lat,
            lng: self.lng,
            accuracy: combined as u32,
        };
        coordinates.validate()?;
        Ok(coordinates)
    }
}

/// Reverse-geocoding result; any part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Placemark {
    pub thoroughfare: Option<String>,
    pub sub_thoroughfare: Option<String>,
    pub locality: Option<String>,
    pub administrative_area: Option<String>,
    pub postal_code: Option<String>,
}

impl Placemark {
    /// `None` when the geocoder knew nothing about the place. Blank parts
    /// count as missing.
    pub fn to_address(&self) -> Option<PostalAddress> {
        let take = |p: &Option<String>| {
            p.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_default()
        };
        let parts = [
            &self.thoroughfare,
            &self.sub_thoroughfare,
            &self.locality,
            &self.administrative_area,
            &self.postal_code,
        ];
        if parts.iter().all(|p| take(*p).is_empty()) {
            return None;
        }
        Some(PostalAddress {
            line1: take(&self.thoroughfare),
            line2: take(&self.sub_thoroughfare),
            city: take(&self.locality),
            state: take(&self.administrative_area),
            zip: take(&self.postal_code),
        })
    }
}
