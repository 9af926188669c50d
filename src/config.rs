//! Resolver configuration.
//!
//! Loaded from an optional JSON file, then overridden by command-line flags.
//! Every field has a default, so `{}` is a valid file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::providers::NOMINATIM_URL;
use crate::location::{
    BigDataCloudGeocoder, BuiltinGeocoder, ConfigError, CoordinateSource, CountryCode,
    GeocoderChain, IpPosition, LocationResolver, NominatimGeocoder, PositionOptions,
    ResolveOptions,
};

/// Environment variable the binary reads the maps.co key from.
pub const MAPSCO_KEY_ENV: &str = "TERROIR_MAPSCO_API_KEY";

const DEFAULT_USER_AGENT: &str = concat!("terroir/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Restrict forward searches to one country.
    pub region_bias: Option<CountryCode>,
    /// Built-in dataset only; no network.
    pub offline: bool,
    pub nominatim_url: String,
    /// Enables geocode.maps.co as a second forward provider.
    pub mapsco_api_key: Option<String>,
    pub user_agent: String,
    pub http_timeout_ms: u64,
    pub position: PositionOptions,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            region_bias: None,
            offline: false,
            nominatim_url: NOMINATIM_URL.to_string(),
            mapsco_api_key: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_ms: 5_000,
            position: PositionOptions::default(),
        }
    }
}

impl ResolverConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigLoadError::Parse { path: display, source })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Provider chains in fallback order. The built-in dataset always comes
    /// last so both chains are non-empty.
    pub fn build_chain(&self) -> GeocoderChain {
        let mut chain = GeocoderChain::new();
        if !self.offline {
            let timeout = self.http_timeout();
            let nominatim = Arc::new(NominatimGeocoder::new(
                self.nominatim_url.clone(),
                self.user_agent.clone(),
                timeout,
            ));
            chain.push_forward(nominatim.clone());
            if let Some(key) = &self.mapsco_api_key {
                chain.push_forward(Arc::new(NominatimGeocoder::mapsco(
                    key.clone(),
                    self.user_agent.clone(),
                    timeout,
                )));
            }
            chain.push_reverse(nominatim);
            chain.push_reverse(Arc::new(BigDataCloudGeocoder::new(self.user_agent.clone(), timeout)));
        }
        chain.push_forward(Arc::new(BuiltinGeocoder));
        chain.push_reverse(Arc::new(BuiltinGeocoder));
        chain
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            region_bias: self.region_bias.clone(),
            position: self.position,
        }
    }

    /// Positioning from the network address, unavailable offline.
    pub fn ip_position(&self) -> Option<Arc<dyn CoordinateSource>> {
        if self.offline {
            None
        } else {
            Some(Arc::new(IpPosition::new(self.user_agent.clone())))
        }
    }

    pub fn build_resolver(&self) -> Result<LocationResolver, ConfigError> {
        LocationResolver::new(self.build_chain(), self.resolve_options())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert!(!config.offline);
        assert_eq!(config.nominatim_url, NOMINATIM_URL);
        assert!(config.user_agent.starts_with("terroir/"));
        assert_eq!(config.position.timeout_ms, 10_000);
        assert!(config.position.high_accuracy);
    }

    #[test]
    fn test_online_chain_order() {
        let config = ResolverConfig::default();
        let chain = config.build_chain();
        assert_eq!(chain.forward_names(), vec!["nominatim", "builtin"]);
        assert_eq!(chain.reverse_names(), vec!["nominatim", "bigdatacloud", "builtin"]);
    }

    #[test]
    fn test_mapsco_joins_forward_chain_when_keyed() {
        let config = ResolverConfig {
            mapsco_api_key: Some("k".into()),
            ..ResolverConfig::default()
        };
        assert_eq!(config.build_chain().forward_names(), vec!["nominatim", "maps.co", "builtin"]);
    }

    #[test]
    fn test_offline_chain_is_builtin_only() {
        let config = ResolverConfig {
            offline: true,
            ..ResolverConfig::default()
        };
        let chain = config.build_chain();
        assert_eq!(chain.forward_names(), vec!["builtin"]);
        assert_eq!(chain.reverse_names(), vec!["builtin"]);
        assert!(config.ip_position().is_none());
        assert!(config.build_resolver().is_ok());
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"region_bias": "IN", "offline": true, "position": {{"timeout_ms": 2500}}}}"#
        )
        .unwrap();

        let config = ResolverConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.region_bias.as_ref().map(|c| c.as_str()), Some("in"));
        assert!(config.offline);
        assert_eq!(config.position.timeout_ms, 2500);
        assert!(config.position.high_accuracy);
        assert_eq!(config.http_timeout_ms, 5_000);
        assert_eq!(config.resolve_options().region_bias, config.region_bias);
    }

    #[test]
    fn test_from_json_file_rejects_bad_region() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"region_bias": "India"}}"#).unwrap();
        let err = ResolverConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ResolverConfig::from_json_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Io { .. }));
        assert!(err.to_string().contains("nope.json"));
    }
}
