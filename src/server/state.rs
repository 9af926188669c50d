use crate::config::ResolverConfig;
use crate::location::{ConfigError, GeocoderChain, LocationResolver, ResolveOptions};

/// Shared across requests. Each request gets its own resolver and session
/// over the shared provider chain.
pub struct AppState {
    pub config: ResolverConfig,
    pub chain: GeocoderChain,
}

impl AppState {
    pub fn new(config: ResolverConfig) -> Self {
        let chain = config.build_chain();
        Self { config, chain }
    }

    pub fn resolver(&self, options: ResolveOptions) -> Result<LocationResolver, ConfigError> {
        LocationResolver::new(self.chain.clone(), options)
    }
}
