//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Label used when a device fix cannot be named by any reverse geocoder.
pub const CURRENT_LOCATION_LABEL: &str = "Current Location";

/// A validated WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, LocationError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(LocationError::InvalidCoordinates { lat, lng });
        }
        Ok(Self { lat, lng })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lat: {:.6}, Lng: {:.6}", self.lat, self.lng)
    }
}

/// Formatted coordinate string used whenever no provider yields a name.
pub fn format_coords(coordinates: &Coordinates) -> String {
    coordinates.to_string()
}

/// ISO 3166-1 alpha-2 country code used to bias forward searches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Lowercase form, as geocoding services expect on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CountryCode {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(LocationError::InvalidCountryCode(s.to_string()))
        }
    }
}

impl TryFrom<String> for CountryCode {
    type Error = LocationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_ascii_uppercase())
    }
}

/// Where the user's location signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationSource {
    UserText,
    DeviceLocation,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserText => write!(f, "Search"),
            Self::DeviceLocation => write!(f, "Device"),
        }
    }
}

/// A canonical location: coordinates plus a non-empty display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub coordinates: Coordinates,
    pub display_name: String,
    pub source: LocationSource,
}

impl ResolvedLocation {
    /// Build a location, substituting the formatted coordinates for a blank name.
    pub fn new(coordinates: Coordinates, display_name: impl Into<String>, source: LocationSource) -> Self {
        let display_name = display_name.into();
        let display_name = if display_name.trim().is_empty() {
            format_coords(&coordinates)
        } else {
            display_name.trim().to_string()
        };
        Self {
            coordinates,
            display_name,
            source,
        }
    }

    pub fn display_line(&self) -> String {
        format!(
            "\u{1F4CD} {}\n  \u{1F4D0} {}",
            self.display_name,
            format_coords(&self.coordinates)
        )
    }
}

/// Positioning failures reported by a coordinate source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("positioning is not supported on this platform")]
    UnsupportedCapability,
    #[error("permission to read the position was denied: {0}")]
    PermissionDenied(String),
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("timed out after {0} ms waiting for a position")]
    Timeout(u64),
}

/// Flat error kind handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    EmptyInput,
    InvalidInput,
    UnsupportedCapability,
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    LocationNotFound,
    Superseded,
    /// Server-side misconfiguration; never produced by a resolution.
    Internal,
}

/// Location resolution errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("no location specified")]
    EmptyInput,
    #[error("invalid coordinates ({lat}, {lng}); lat must be in -90..90 and lng in -180..180")]
    InvalidCoordinates { lat: f64, lng: f64 },
    #[error("invalid country code '{0}'; expected an ISO 3166-1 alpha-2 code")]
    InvalidCountryCode(String),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error("location not found: '{0}'")]
    LocationNotFound(String),
    /// A newer resolution was started before this one finished.
    #[error("resolution superseded by a newer request")]
    Superseded,
}

impl LocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::InvalidCoordinates { .. } | Self::InvalidCountryCode(_) => ErrorKind::InvalidInput,
            Self::Position(PositionError::UnsupportedCapability) => ErrorKind::UnsupportedCapability,
            Self::Position(PositionError::PermissionDenied(_)) => ErrorKind::PermissionDenied,
            Self::Position(PositionError::PositionUnavailable(_)) => ErrorKind::PositionUnavailable,
            Self::Position(PositionError::Timeout(_)) => ErrorKind::Timeout,
            Self::LocationNotFound(_) => ErrorKind::LocationNotFound,
            Self::Superseded => ErrorKind::Superseded,
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput => "Please enter a city, region, or location.".into(),
            Self::InvalidCoordinates { .. } => {
                "Invalid coordinates. Lat: -90..90, Lng: -180..180".into()
            }
            Self::InvalidCountryCode(code) => {
                format!("Unknown country '{}'. Use a two-letter code such as IN.", code)
            }
            Self::Position(PositionError::UnsupportedCapability) => {
                "Your device does not support geolocation services.".into()
            }
            Self::Position(PositionError::PermissionDenied(_)) => {
                "Location access was denied. Please enable location permissions.".into()
            }
            Self::Position(PositionError::PositionUnavailable(_)) => {
                "Location information is unavailable.".into()
            }
            Self::Position(PositionError::Timeout(_)) => {
                "The request to get your location timed out.".into()
            }
            Self::LocationNotFound(query) => {
                format!("No results for '{}'. Try a different place name.", query)
            }
            Self::Superseded => "A newer search replaced this one.".into(),
        }
    }
}
