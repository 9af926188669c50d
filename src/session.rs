//! Resolution sessions: one user request from intent to soil profile.
//!
//! `Idle → Resolving → Synthesizing → Ready`, or `Resolving → Failed`.
//! Each transition is broadcast to subscribers as a [`SessionSnapshot`].
//! A new request supersedes whatever is in flight; late results from the
//! older request are dropped without a transition.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::location::{Coordinates, LocationError, LocationResolver, LocationSource, ResolvedLocation};
use crate::soil::{self, PhClass, SoilProfile};

const EVENT_CAPACITY: usize = 32;

/// Identity of one user-initiated request within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Resolving(LocationSource),
    Synthesizing,
    Ready,
    Failed,
}

impl SessionStatus {
    /// Progress text for a busy indicator, if the session is busy.
    pub fn progress_label(&self) -> Option<&'static str> {
        match self {
            Self::Resolving(LocationSource::UserText) => Some("Searching..."),
            Self::Resolving(LocationSource::DeviceLocation) => Some("Getting Location..."),
            Self::Synthesizing => Some("Analyzing soil..."),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.progress_label().is_some()
    }
}

/// Everything the presentation layer needs to render the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub request: RequestId,
    pub status: SessionStatus,
    pub resolved: Option<ResolvedLocation>,
    pub profile: Option<SoilProfile>,
    pub error: Option<LocationError>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            request: RequestId(0),
            status: SessionStatus::Idle,
            resolved: None,
            profile: None,
            error: None,
        }
    }
}

/// How a request ended from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The request was the latest one; its terminal snapshot.
    Applied(SessionSnapshot),
    /// A newer request started first; nothing was applied.
    Superseded(RequestId),
}

impl Completion {
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        match self {
            Self::Applied(snapshot) => Some(snapshot),
            Self::Superseded(_) => None,
        }
    }

    /// The finished request as a report, or the error that ended it.
    pub fn into_report(self) -> Result<SoilReport, LocationError> {
        let snapshot = match self {
            Self::Applied(snapshot) => snapshot,
            Self::Superseded(_) => return Err(LocationError::Superseded),
        };
        if let Some(error) = snapshot.error {
            return Err(error);
        }
        match (snapshot.resolved, snapshot.profile) {
            (Some(location), Some(profile)) => Ok(SoilReport {
                ph_class: profile.ph_class(),
                location,
                profile,
                generated_at: Utc::now(),
            }),
            // Applied snapshots are always Ready or Failed.
            _ => Err(LocationError::Superseded),
        }
    }
}

/// Final output of a successful request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilReport {
    pub location: ResolvedLocation,
    pub profile: SoilProfile,
    pub ph_class: PhClass,
    pub generated_at: DateTime<Utc>,
}

pub struct ResolutionSession {
    resolver: LocationResolver,
    current: Mutex<SessionSnapshot>,
    events: broadcast::Sender<SessionSnapshot>,
}

impl ResolutionSession {
    pub fn new(resolver: LocationResolver) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            resolver,
            current: Mutex::new(SessionSnapshot::default()),
            events,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().clone()
    }

    /// Receive a snapshot on every transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, SessionSnapshot> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, snapshot: &SessionSnapshot) {
        // No subscribers is fine.
        let _ = self.events.send(snapshot.clone());
    }

    fn begin(&self, source: LocationSource) -> RequestId {
        let mut current = self.lock();
        let request = RequestId(current.request.0 + 1);
        *current = SessionSnapshot {
            request,
            status: SessionStatus::Resolving(source),
            ..SessionSnapshot::default()
        };
        self.publish(&current);
        request
    }

    /// Apply `update` only if `request` is still the latest request.
    fn apply(&self, request: RequestId, update: impl FnOnce(&mut SessionSnapshot)) -> Option<SessionSnapshot> {
        let mut current = self.lock();
        if current.request != request {
            tracing::debug!(request = request.0, latest = current.request.0, "dropping stale result");
            return None;
        }
        update(&mut current);
        self.publish(&current);
        Some(current.clone())
    }

    /// Search for a place by name.
    ///
    /// Blank input is rejected with [`LocationError::EmptyInput`] before any
    /// request starts; the session is left untouched.
    pub async fn search(&self, query: &str) -> Result<Completion, LocationError> {
        if query.trim().is_empty() {
            return Err(LocationError::EmptyInput);
        }
        let request = self.begin(LocationSource::UserText);
        let outcome = self.resolver.resolve_from_text(query).await;
        Ok(self.complete(request, outcome))
    }

    /// Use the device's current position.
    pub async fn locate(&self) -> Completion {
        let request = self.begin(LocationSource::DeviceLocation);
        let outcome = self.resolver.resolve_from_device().await;
        self.complete(request, outcome)
    }

    /// Use an autocomplete selection that already carries coordinates.
    pub fn select(&self, name: &str, coordinates: Coordinates) -> Completion {
        let request = self.begin(LocationSource::UserText);
        let outcome = self.resolver.resolve_from_selection(name, coordinates);
        self.complete(request, outcome)
    }

    fn complete(&self, request: RequestId, outcome: Result<ResolvedLocation, LocationError>) -> Completion {
        let applied = match outcome {
            Err(LocationError::Superseded) => None,
            Err(error) => {
                tracing::info!(request = request.0, kind = ?error.kind(), "resolution failed");
                self.apply(request, |s| {
                    s.status = SessionStatus::Failed;
                    s.error = Some(error);
                })
            }
            Ok(resolved) => self
                .apply(request, |s| {
                    s.status = SessionStatus::Synthesizing;
                    s.resolved = Some(resolved.clone());
                })
                .and_then(|_| {
                    let profile = soil::synthesize(&resolved.coordinates, &resolved.display_name);
                    self.apply(request, |s| {
                        s.status = SessionStatus::Ready;
                        s.profile = Some(profile);
                    })
                }),
        };

        match applied {
            Some(snapshot) => Completion::Applied(snapshot),
            None => Completion::Superseded(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::testing::{GatedPosition, ScriptedForward, ScriptedReverse};
    use crate::location::{ErrorKind, GeocodeError, GeocoderChain, PositionError, ResolveOptions};
    use std::sync::Arc;

    fn place(name: &str, lat: f64, lng: f64) -> ResolvedLocation {
        ResolvedLocation::new(Coordinates::new(lat, lng).unwrap(), name, LocationSource::UserText)
    }

    fn session_with(forward: ScriptedForward, reverse: ScriptedReverse, device: Option<GatedPosition>) -> ResolutionSession {
        let mut chain = GeocoderChain::new();
        chain.push_forward(Arc::new(forward));
        chain.push_reverse(Arc::new(reverse));
        let mut resolver = LocationResolver::new(chain, ResolveOptions::default()).unwrap();
        if let Some(device) = device {
            resolver = resolver.with_coordinate_source(Arc::new(device));
        }
        ResolutionSession::new(resolver)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionSnapshot>) -> Vec<SessionStatus> {
        let mut out = Vec::new();
        while let Ok(s) = rx.try_recv() {
            out.push(s.status);
        }
        out
    }

    #[test]
    fn test_progress_labels() {
        assert_eq!(
            SessionStatus::Resolving(LocationSource::UserText).progress_label(),
            Some("Searching...")
        );
        assert_eq!(
            SessionStatus::Resolving(LocationSource::DeviceLocation).progress_label(),
            Some("Getting Location...")
        );
        assert!(!SessionStatus::Ready.is_busy());
        assert!(!SessionStatus::Idle.is_busy());
    }

    #[tokio::test]
    async fn test_search_transitions_to_ready() {
        let session = session_with(
            ScriptedForward::always(Ok(place("Pune, Maharashtra, India", 18.5204, 73.8567))),
            ScriptedReverse::always(Err(GeocodeError::NotFound)),
            None,
        );
        let mut rx = session.subscribe();
        assert_eq!(session.snapshot().status, SessionStatus::Idle);

        let done = session.search("Pune").await.unwrap();
        let snapshot = done.snapshot().unwrap().clone();
        assert_eq!(snapshot.status, SessionStatus::Ready);
        let profile = snapshot.profile.unwrap();
        assert_eq!(profile.location, "Pune, Maharashtra, India");
        assert_eq!(
            profile,
            soil::synthesize(&Coordinates::new(18.5204, 73.8567).unwrap(), "Pune, Maharashtra, India")
        );

        assert_eq!(
            drain(&mut rx),
            vec![
                SessionStatus::Resolving(LocationSource::UserText),
                SessionStatus::Synthesizing,
                SessionStatus::Ready,
            ]
        );
    }

    #[tokio::test]
    async fn test_search_failure_is_terminal_state() {
        let session = session_with(
            ScriptedForward::always(Err(GeocodeError::NotFound)),
            ScriptedReverse::always(Err(GeocodeError::NotFound)),
            None,
        );
        let mut rx = session.subscribe();
        let done = session.search("Atlantis").await.unwrap();
        let snapshot = done.snapshot().unwrap();
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert_eq!(snapshot.error.as_ref().unwrap().kind(), ErrorKind::LocationNotFound);
        assert!(snapshot.profile.is_none());
        assert_eq!(
            drain(&mut rx),
            vec![SessionStatus::Resolving(LocationSource::UserText), SessionStatus::Failed]
        );
    }

    #[tokio::test]
    async fn test_empty_query_leaves_session_untouched() {
        let forward = ScriptedForward::always(Ok(place("x", 1.0, 1.0)));
        let calls = forward.calls();
        let session = session_with(forward, ScriptedReverse::always(Err(GeocodeError::NotFound)), None);
        let mut rx = session.subscribe();

        assert_eq!(session.search("   ").await, Err(LocationError::EmptyInput));
        assert_eq!(session.snapshot(), SessionSnapshot::default());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_locate_with_reverse_not_found() {
        let c = Coordinates::new(21.1458, 79.0882).unwrap();
        let device = GatedPosition::new(c);
        let gate = device.gate();
        gate.notify_one();
        let session = session_with(
            ScriptedForward::always(Err(GeocodeError::NotFound)),
            ScriptedReverse::always(Err(GeocodeError::NotFound)),
            Some(device),
        );

        let done = session.locate().await;
        let snapshot = done.snapshot().unwrap();
        let resolved = snapshot.resolved.as_ref().unwrap();
        assert_eq!(resolved.display_name, "Current Location");
        assert_eq!(resolved.source, LocationSource::DeviceLocation);
        assert_eq!(snapshot.profile.as_ref().unwrap().location, "Current Location");
    }

    #[tokio::test]
    async fn test_locate_position_error() {
        let session = session_with(
            ScriptedForward::always(Err(GeocodeError::NotFound)),
            ScriptedReverse::always(Ok("Maharashtra, India".into())),
            Some(GatedPosition::failing(PositionError::Timeout(10_000))),
        );
        let done = session.locate().await;
        let snapshot = done.snapshot().unwrap();
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert_eq!(snapshot.error.as_ref().unwrap().kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_text_supersedes_pending_device() {
        let device = GatedPosition::new(Coordinates::new(18.52, 73.85).unwrap());
        let gate = device.gate();
        let session = session_with(
            ScriptedForward::always(Ok(place("Paris, Île-de-France, France", 48.8566, 2.3522))),
            ScriptedReverse::always(Ok("Maharashtra, India".into())),
            Some(device),
        );

        let located = session.locate();
        let searched = async {
            let out = session.search("Paris").await;
            gate.notify_one();
            out
        };
        let (located, searched) = tokio::join!(located, searched);

        assert_eq!(located, Completion::Superseded(RequestId(1)));
        assert!(matches!(searched, Ok(Completion::Applied(_))));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.request, RequestId(2));
        assert_eq!(snapshot.status, SessionStatus::Ready);
        let resolved = snapshot.resolved.unwrap();
        assert_eq!(resolved.display_name, "Paris, Île-de-France, France");
        assert_eq!(resolved.source, LocationSource::UserText);
    }

    #[tokio::test]
    async fn test_text_supersedes_device_that_finishes_first() {
        let device = GatedPosition::new(Coordinates::new(18.52, 73.85).unwrap());
        let device_gate = device.gate();
        let (forward, search_gate) =
            ScriptedForward::always(Ok(place("Paris, Île-de-France, France", 48.8566, 2.3522))).gated();
        let session = session_with(
            forward,
            ScriptedReverse::always(Ok("Maharashtra, India".into())),
            Some(device),
        );
        let mut rx = session.subscribe();

        let located = session.locate();
        let searched = session.search("Paris");
        let driver = async {
            tokio::task::yield_now().await;
            device_gate.notify_one();
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            search_gate.notify_one();
        };
        let (located, searched, ()) = tokio::join!(located, searched, driver);

        assert_eq!(located, Completion::Superseded(RequestId(1)));
        let snapshot = searched.unwrap().snapshot().cloned().unwrap();
        assert_eq!(snapshot.resolved.unwrap().display_name, "Paris, Île-de-France, France");
        let paris = Coordinates::new(48.8566, 2.3522).unwrap();
        assert_eq!(
            session.snapshot().profile.unwrap().soil_type,
            soil::soil_type_for_seed(soil::seed(&paris))
        );

        // The device result never produced a transition of its own.
        let statuses = drain(&mut rx);
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Resolving(LocationSource::DeviceLocation),
                SessionStatus::Resolving(LocationSource::UserText),
                SessionStatus::Synthesizing,
                SessionStatus::Ready,
            ]
        );
    }

    #[test]
    fn test_select_uses_given_coordinates() {
        let session = session_with(
            ScriptedForward::always(Err(GeocodeError::NotFound)),
            ScriptedReverse::always(Err(GeocodeError::NotFound)),
            None,
        );
        let c = Coordinates::new(26.9124, 75.7873).unwrap();
        let done = session.select("Jaipur, Rajasthan, India", c);
        let snapshot = done.snapshot().unwrap();
        assert_eq!(snapshot.status, SessionStatus::Ready);
        assert_eq!(snapshot.profile.as_ref().unwrap().location, "Jaipur, Rajasthan, India");
        assert_eq!(snapshot.resolved.as_ref().unwrap().coordinates, c);

        let report = done.into_report().unwrap();
        assert_eq!(report.ph_class, report.profile.ph_class());
        assert_eq!(report.location.display_name, "Jaipur, Rajasthan, India");
    }

    #[tokio::test]
    async fn test_failed_completion_reports_error() {
        let session = session_with(
            ScriptedForward::always(Err(GeocodeError::NotFound)),
            ScriptedReverse::always(Err(GeocodeError::NotFound)),
            None,
        );
        let err = session.locate().await.into_report().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedCapability);
        assert_eq!(
            Completion::Superseded(RequestId(3)).into_report().unwrap_err(),
            LocationError::Superseded
        );
    }
}
