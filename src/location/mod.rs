//! Location subsystem for Terroir.
//!
//! Turns a text query, an autocomplete selection, or a device fix into a
//! [`ResolvedLocation`] by walking ordered geocoder chains.

pub mod geocoder;
pub mod position;
pub mod providers;
pub mod resolver;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use geocoder::{ForwardGeocoder, GeocodeError, GeocodeFuture, GeocoderChain, ReverseGeocoder};
pub use position::{CoordinateSource, FixedPosition, IpPosition, PositionOptions};
pub use providers::{
    builtin_place_list, BigDataCloudGeocoder, BuiltinGeocoder, NominatimGeocoder, PlaceInfo,
};
pub use resolver::{ConfigError, LocationResolver, ResolveOptions, ResolverState};
pub use types::{
    format_coords, Coordinates, CountryCode, ErrorKind, LocationError, LocationSource,
    PositionError, ResolvedLocation,
};
