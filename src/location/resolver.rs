//! Location resolver — orchestrates the fallback chains.
//!
//! Text flow:    blank check → forward chain (in order) → LocationNotFound
//! Device flow:  coordinate source → reverse chain → "Current Location"
//!
//! Every call takes a ticket. Only the most recently issued ticket may publish
//! its outcome; older calls finishing late get `Superseded`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use super::geocoder::GeocoderChain;
use super::position::{CoordinateSource, PositionOptions};
use super::types::{
    Coordinates, CountryCode, LocationError, LocationSource, PositionError, ResolvedLocation,
    CURRENT_LOCATION_LABEL,
};

/// Resolver misconfiguration, detected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one forward geocoder must be configured")]
    NoForwardGeocoder,
    #[error("at least one reverse geocoder must be configured")]
    NoReverseGeocoder,
}

/// Options applied to every resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Restrict forward searches to one country.
    pub region_bias: Option<CountryCode>,
    pub position: PositionOptions,
}

/// Observable resolver state.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolverState {
    Idle,
    Resolving { ticket: u64, source: LocationSource },
    Resolved(ResolvedLocation),
    Failed(LocationError),
}

/// The location resolver with its fallback pipeline.
pub struct LocationResolver {
    chain: GeocoderChain,
    coordinates: Option<Arc<dyn CoordinateSource>>,
    options: ResolveOptions,
    latest: AtomicU64,
    state: Mutex<ResolverState>,
}

impl LocationResolver {
    pub fn new(chain: GeocoderChain, options: ResolveOptions) -> Result<Self, ConfigError> {
        if chain.forward().is_empty() {
            return Err(ConfigError::NoForwardGeocoder);
        }
        if chain.reverse().is_empty() {
            return Err(ConfigError::NoReverseGeocoder);
        }
        Ok(Self {
            chain,
            coordinates: None,
            options,
            latest: AtomicU64::new(0),
            state: Mutex::new(ResolverState::Idle),
        })
    }

    /// Attach the positioning capability used by [`resolve_from_device`].
    ///
    /// [`resolve_from_device`]: Self::resolve_from_device
    pub fn with_coordinate_source(mut self, source: Arc<dyn CoordinateSource>) -> Self {
        self.coordinates = Some(source);
        self
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    pub fn state(&self) -> ResolverState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ResolverState> {
        // State is replaced wholesale, so a poisoned value is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, source: LocationSource) -> u64 {
        let mut state = self.lock_state();
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        *state = ResolverState::Resolving { ticket, source };
        ticket
    }

    /// Publish an outcome if `ticket` is still the latest resolution.
    fn finish(
        &self,
        ticket: u64,
        outcome: Result<ResolvedLocation, LocationError>,
    ) -> Result<ResolvedLocation, LocationError> {
        let mut state = self.lock_state();
        if self.latest.load(Ordering::SeqCst) != ticket {
            tracing::debug!(ticket, "dropping superseded resolution");
            return Err(LocationError::Superseded);
        }
        *state = match &outcome {
            Ok(loc) => ResolverState::Resolved(loc.clone()),
            Err(e) => ResolverState::Failed(e.clone()),
        };
        outcome
    }

    /// Resolve free text through the forward chain.
    pub async fn resolve_from_text(&self, query: &str) -> Result<ResolvedLocation, LocationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(LocationError::EmptyInput);
        }

        let ticket = self.begin(LocationSource::UserText);
        let outcome = self.search_chain(query).await;
        self.finish(ticket, outcome)
    }

    async fn search_chain(&self, query: &str) -> Result<ResolvedLocation, LocationError> {
        let bias = self.options.region_bias.as_ref();
        for provider in self.chain.forward() {
            tracing::debug!(provider = provider.name(), query, "forward geocoding");
            match provider.search(query, bias).await {
                Ok(found) => {
                    tracing::info!(
                        provider = provider.name(),
                        query,
                        name = %found.display_name,
                        "location resolved"
                    );
                    return Ok(ResolvedLocation::new(
                        found.coordinates,
                        found.display_name,
                        LocationSource::UserText,
                    ));
                }
                Err(e) if e.is_transport() => {
                    tracing::warn!(provider = provider.name(), error = %e, "forward geocoder failed, trying next");
                }
                Err(_) => {
                    tracing::debug!(provider = provider.name(), query, "no match, trying next");
                }
            }
        }
        Err(LocationError::LocationNotFound(query.to_string()))
    }

    /// Locate the device and name the fix through the reverse chain.
    pub async fn resolve_from_device(&self) -> Result<ResolvedLocation, LocationError> {
        let ticket = self.begin(LocationSource::DeviceLocation);
        let outcome = self.locate_device().await;
        self.finish(ticket, outcome)
    }

    async fn locate_device(&self) -> Result<ResolvedLocation, LocationError> {
        let source = self
            .coordinates
            .as_ref()
            .ok_or(PositionError::UnsupportedCapability)?;
        let coordinates = source.current_coordinates(&self.options.position).await?;

        let display_name = self
            .name_coordinates(coordinates)
            .await
            .unwrap_or_else(|| CURRENT_LOCATION_LABEL.to_string());
        tracing::info!(lat = coordinates.lat, lng = coordinates.lng, name = %display_name, "device located");

        Ok(ResolvedLocation::new(coordinates, display_name, LocationSource::DeviceLocation))
    }

    /// Walk the reverse chain. Failures only cost us the name.
    async fn name_coordinates(&self, coordinates: Coordinates) -> Option<String> {
        for provider in self.chain.reverse() {
            match provider.resolve(coordinates).await {
                Ok(name) if !name.trim().is_empty() => return Some(name),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "reverse geocoding failed");
                }
            }
        }
        None
    }

    /// Accept an autocomplete selection that already carries coordinates.
    pub fn resolve_from_selection(
        &self,
        name: &str,
        coordinates: Coordinates,
    ) -> Result<ResolvedLocation, LocationError> {
        let ticket = self.begin(LocationSource::UserText);
        let outcome = Ok(ResolvedLocation::new(coordinates, name, LocationSource::UserText));
        self.finish(ticket, outcome)
    }
}
