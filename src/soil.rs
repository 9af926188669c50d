//! Soil profile synthesis.
//!
//! Every value is derived from a single seed computed from the coordinates,
//! so the same place always yields the same profile. The numbers are a
//! stand-in for survey data, not a measurement.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::location::Coordinates;

/// Indexing order is part of the seed-to-profile mapping.
pub const SOIL_TYPES: [SoilType; 7] = [
    SoilType::Clay,
    SoilType::Sandy,
    SoilType::Silt,
    SoilType::Loam,
    SoilType::ClayLoam,
    SoilType::SandyLoam,
    SoilType::Peat,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoilType {
    Clay,
    Sandy,
    Silt,
    Loam,
    #[serde(rename = "Clay Loam")]
    ClayLoam,
    #[serde(rename = "Sandy Loam")]
    SandyLoam,
    Peat,
}

impl fmt::Display for SoilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clay => write!(f, "Clay"),
            Self::Sandy => write!(f, "Sandy"),
            Self::Silt => write!(f, "Silt"),
            Self::Loam => write!(f, "Loam"),
            Self::ClayLoam => write!(f, "Clay Loam"),
            Self::SandyLoam => write!(f, "Sandy Loam"),
            Self::Peat => write!(f, "Peat"),
        }
    }
}

/// Sand / silt / clay percentages.
///
/// The three components are generated independently and are not rescaled,
/// so they need not add up to 100. Use [`Texture::is_normalized`] to check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Texture {
    pub sand: f64,
    pub silt: f64,
    pub clay: f64,
}

impl Texture {
    pub fn total(&self) -> f64 {
        self.sand + self.silt + self.clay
    }

    pub fn is_normalized(&self) -> bool {
        (self.total() - 100.0).abs() < f64::EPSILON
    }
}

/// Plant-available nutrients, ppm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nutrients {
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub calcium: f64,
    pub magnesium: f64,
    pub sulfur: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhClass {
    Acidic,
    Neutral,
    Alkaline,
}

impl PhClass {
    pub fn from_ph(ph: f64) -> Self {
        if ph < 6.5 {
            Self::Acidic
        } else if ph > 7.5 {
            Self::Alkaline
        } else {
            Self::Neutral
        }
    }
}

impl fmt::Display for PhClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acidic => write!(f, "Acidic"),
            Self::Neutral => write!(f, "Neutral"),
            Self::Alkaline => write!(f, "Alkaline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilProfile {
    pub location: String,
    pub soil_type: SoilType,
    pub ph: f64,
    pub texture: Texture,
    /// Percent by weight.
    pub organic_matter: f64,
    pub nutrients: Nutrients,
    /// Cation exchange capacity, meq/100g.
    pub cec: f64,
}

impl SoilProfile {
    pub fn ph_class(&self) -> PhClass {
        PhClass::from_ph(self.ph)
    }
}

/// Seed in `[0, 10]`. The trigonometry takes the raw degree values as radians.
pub fn seed(coordinates: &Coordinates) -> f64 {
    let lat_seed = coordinates.lat.sin().abs() * 10.0;
    let lng_seed = coordinates.lng.cos().abs() * 10.0;
    (lat_seed + lng_seed) / 2.0
}

pub fn soil_type_for_seed(seed: f64) -> SoilType {
    SOIL_TYPES[(seed.floor() as usize) % SOIL_TYPES.len()]
}

/// Derive the profile for `coordinates`, labelled with `display_name`.
pub fn synthesize(coordinates: &Coordinates, display_name: &str) -> SoilProfile {
    let s = seed(coordinates);

    SoilProfile {
        location: display_name.to_string(),
        soil_type: soil_type_for_seed(s),
        ph: 6.0 + s % 2.0,
        texture: Texture {
            sand: 30.0 + (s * 2.0).floor() % 20.0,
            silt: 30.0 + (s * 3.0).floor() % 20.0,
            clay: 20.0 + (s * 4.0).floor() % 10.0,
        },
        organic_matter: 2.5 + s % 2.0,
        nutrients: Nutrients {
            nitrogen: 25.0 + (s * 20.0).floor(),
            phosphorus: 30.0 + (s * 25.0).floor(),
            potassium: 20.0 + (s * 15.0).floor(),
            calcium: 900.0 + (s * 500.0).floor(),
            magnesium: 180.0 + (s * 100.0).floor(),
            sulfur: 10.0 + (s * 10.0).floor(),
        },
        cec: 10.0 + s % 5.0,
    }
}
