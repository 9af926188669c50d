//! Geocoding capabilities and the ordered provider chains the resolver walks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use super::types::{Coordinates, CountryCode, ResolvedLocation};

/// Boxed future returned by geocoding capabilities.
pub type GeocodeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GeocodeError>> + Send + 'a>>;

/// Failure of a single provider call.
///
/// `NotFound` ends that provider's attempt; the other variants are transport
/// failures. Both move the chain on to the next provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("no match")]
    NotFound,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GeocodeError {
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

/// Text to coordinates.
pub trait ForwardGeocoder: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    fn search<'a>(
        &'a self,
        query: &'a str,
        region_bias: Option<&'a CountryCode>,
    ) -> GeocodeFuture<'a, ResolvedLocation>;
}

/// Coordinates to a human-readable `"{region}, {country}"` name.
pub trait ReverseGeocoder: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, coordinates: Coordinates) -> GeocodeFuture<'_, String>;
}

/// Ordered forward and reverse providers, tried first to last.
#[derive(Clone, Default)]
pub struct GeocoderChain {
    forward: Vec<Arc<dyn ForwardGeocoder>>,
    reverse: Vec<Arc<dyn ReverseGeocoder>>,
}

impl GeocoderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forward(mut self, provider: impl ForwardGeocoder + 'static) -> Self {
        self.forward.push(Arc::new(provider));
        self
    }

    pub fn with_reverse(mut self, provider: impl ReverseGeocoder + 'static) -> Self {
        self.reverse.push(Arc::new(provider));
        self
    }

    pub fn push_forward(&mut self, provider: Arc<dyn ForwardGeocoder>) {
        self.forward.push(provider);
    }

    pub fn push_reverse(&mut self, provider: Arc<dyn ReverseGeocoder>) {
        self.reverse.push(provider);
    }

    pub fn forward(&self) -> &[Arc<dyn ForwardGeocoder>] {
        &self.forward
    }

    pub fn reverse(&self) -> &[Arc<dyn ReverseGeocoder>] {
        &self.reverse
    }

    pub fn forward_names(&self) -> Vec<&str> {
        self.forward.iter().map(|p| p.name()).collect()
    }

    pub fn reverse_names(&self) -> Vec<&str> {
        self.reverse.iter().map(|p| p.name()).collect()
    }
}

impl std::fmt::Debug for GeocoderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocoderChain")
            .field("forward", &self.forward_names())
            .field("reverse", &self.reverse_names())
            .finish()
    }
}
