//! In-memory providers and coordinate sources for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use super::geocoder::{ForwardGeocoder, GeocodeError, GeocodeFuture, ReverseGeocoder};
use super::position::{CoordinateSource, PositionFuture, PositionOptions};
use super::types::{Coordinates, CountryCode, PositionError, ResolvedLocation};

type Seen = Arc<Mutex<Vec<(String, Option<String>)>>>;

/// Forward geocoder returning a fixed outcome, optionally held behind a gate.
pub struct ScriptedForward {
    outcome: Result<ResolvedLocation, GeocodeError>,
    calls: Arc<AtomicUsize>,
    seen: Seen,
    gate: Option<Arc<Notify>>,
}

impl ScriptedForward {
    pub fn always(outcome: Result<ResolvedLocation, GeocodeError>) -> Self {
        Self {
            outcome,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
            gate: None,
        }
    }

    /// Hold every search until the returned gate is notified.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn seen(&self) -> Seen {
        self.seen.clone()
    }
}

impl ForwardGeocoder for ScriptedForward {
    fn name(&self) -> &str {
        "scripted"
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        region_bias: Option<&'a CountryCode>,
    ) -> GeocodeFuture<'a, ResolvedLocation> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((query.to_string(), region_bias.map(|c| c.as_str().to_string())));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.outcome.clone()
        })
    }
}

/// Reverse geocoder returning a fixed outcome.
pub struct ScriptedReverse {
    outcome: Result<String, GeocodeError>,
}

impl ScriptedReverse {
    pub fn always(outcome: Result<String, GeocodeError>) -> Self {
        Self { outcome }
    }
}

impl ReverseGeocoder for ScriptedReverse {
    fn name(&self) -> &str {
        "scripted"
    }

    fn resolve(&self, _coordinates: Coordinates) -> GeocodeFuture<'_, String> {
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome })
    }
}

/// Coordinate source that waits for its gate before answering.
pub struct GatedPosition {
    outcome: Result<Coordinates, PositionError>,
    gate: Option<Arc<Notify>>,
}

impl GatedPosition {
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            outcome: Ok(coordinates),
            gate: Some(Arc::new(Notify::new())),
        }
    }

    /// Fails immediately with `error`.
    pub fn failing(error: PositionError) -> Self {
        Self {
            outcome: Err(error),
            gate: None,
        }
    }

    pub fn gate(&self) -> Arc<Notify> {
        self.gate.clone().unwrap_or_else(|| Arc::new(Notify::new()))
    }
}

impl CoordinateSource for GatedPosition {
    fn current_coordinates<'a>(&'a self, _options: &'a PositionOptions) -> PositionFuture<'a> {
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.outcome.clone()
        })
    }
}
