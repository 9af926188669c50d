//! Coordinate sources: where "use my current location" gets its fix.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::types::{Coordinates, PositionError};

pub type PositionFuture<'a> = Pin<Box<dyn Future<Output = Result<Coordinates, PositionError>> + Send + 'a>>;

/// Positioning request options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    /// Maximum age of a cached fix that may be reused. 0 never reuses one.
    pub max_cached_age_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            max_cached_age_ms: 0,
        }
    }
}

impl PositionOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_cached_age(&self) -> Duration {
        Duration::from_millis(self.max_cached_age_ms)
    }
}

/// A single-shot positioning capability. Implementations make one attempt
/// per call.
pub trait CoordinateSource: Send + Sync {
    fn current_coordinates<'a>(&'a self, options: &'a PositionOptions) -> PositionFuture<'a>;
}

/// Coordinates handed over directly, e.g. a browser fix posted to the API.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Coordinates);

impl CoordinateSource for FixedPosition {
    fn current_coordinates<'a>(&'a self, _options: &'a PositionOptions) -> PositionFuture<'a> {
        let coordinates = self.0;
        Box::pin(async move { Ok(coordinates) })
    }
}

// ─── IP geolocation ─────────────────────────────────────────────

const IP_API_URL: &str = "https://ipapi.co/json/";

#[derive(Deserialize)]
struct IpApiResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    error: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
}

/// Approximate position from the caller's public IP address.
pub struct IpPosition {
    url: String,
    user_agent: String,
    last_fix: Mutex<Option<(Instant, Coordinates)>>,
}

impl IpPosition {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self::with_url(IP_API_URL, user_agent)
    }

    pub fn with_url(url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: user_agent.into(),
            last_fix: Mutex::new(None),
        }
    }

    fn cached(&self, max_age: Duration) -> Option<Coordinates> {
        if max_age.is_zero() {
            return None;
        }
        let guard = self.last_fix.lock().ok()?;
        let (taken_at, coordinates) = (*guard)?;
        (taken_at.elapsed() <= max_age).then_some(coordinates)
    }

    fn remember(&self, coordinates: Coordinates) {
        if let Ok(mut guard) = self.last_fix.lock() {
            *guard = Some((Instant::now(), coordinates));
        }
    }

    async fn locate(&self, options: &PositionOptions) -> Result<Coordinates, PositionError> {
        if let Some(coordinates) = self.cached(options.max_cached_age()) {
            tracing::debug!(?coordinates, "reusing cached IP fix");
            return Ok(coordinates);
        }
        if options.high_accuracy {
            tracing::debug!("high accuracy requested; IP geolocation is city-level at best");
        }

        let url = self.url.clone();
        let user_agent = self.user_agent.clone();
        let timeout = options.timeout();
        let request = tokio::task::spawn_blocking(move || fetch_ip_fix(&url, &user_agent, timeout));

        let coordinates = match tokio::time::timeout(timeout, request).await {
            Err(_) => return Err(PositionError::Timeout(options.timeout_ms)),
            Ok(Err(join)) => return Err(PositionError::PositionUnavailable(join.to_string())),
            Ok(Ok(result)) => result?,
        };
        self.remember(coordinates);
        Ok(coordinates)
    }
}

impl CoordinateSource for IpPosition {
    fn current_coordinates<'a>(&'a self, options: &'a PositionOptions) -> PositionFuture<'a> {
        Box::pin(self.locate(options))
    }
}

fn fetch_ip_fix(url: &str, user_agent: &str, timeout: Duration) -> Result<Coordinates, PositionError> {
    let response = ureq::get(url)
        .set("User-Agent", user_agent)
        .timeout(timeout)
        .call()
        .map_err(|e| map_ip_error(e, timeout))?;
    let body = response
        .into_string()
        .map_err(|e| PositionError::PositionUnavailable(e.to_string()))?;
    parse_ip_fix(&body)
}

fn map_ip_error(err: ureq::Error, timeout: Duration) -> PositionError {
    match err {
        ureq::Error::Status(code @ (401 | 403), _) => {
            PositionError::PermissionDenied(format!("IP geolocation returned HTTP {}", code))
        }
        ureq::Error::Status(code, _) => {
            PositionError::PositionUnavailable(format!("IP geolocation returned HTTP {}", code))
        }
        ureq::Error::Transport(t) if is_timeout(&t) => PositionError::Timeout(timeout.as_millis() as u64),
        ureq::Error::Transport(t) => PositionError::PositionUnavailable(t.to_string()),
    }
}

/// Socket read/connect deadline hit inside ureq.
fn is_timeout(transport: &ureq::Transport) -> bool {
    transport.kind() == ureq::ErrorKind::Io
        && std::error::Error::source(transport)
            .and_then(|e| e.downcast_ref::<std::io::Error>())
            .map_or(false, |e| {
                matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
            })
}

fn parse_ip_fix(body: &str) -> Result<Coordinates, PositionError> {
    let r: IpApiResult = serde_json::from_str(body)
        .map_err(|e| PositionError::PositionUnavailable(format!("malformed response: {}", e)))?;
    if r.error.unwrap_or(false) {
        let reason = r.reason.unwrap_or_else(|| "unknown".into());
        return Err(PositionError::PositionUnavailable(reason));
    }
    match (r.latitude, r.longitude) {
        (Some(lat), Some(lng)) => Coordinates::new(lat, lng)
            .map_err(|e| PositionError::PositionUnavailable(e.to_string())),
        _ => Err(PositionError::PositionUnavailable("no coordinates in response".into())),
    }
}
