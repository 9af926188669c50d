use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::location::{
    builtin_place_list, format_coords, ConfigError, Coordinates, CountryCode, ErrorKind,
    FixedPosition, LocationError, PlaceInfo, ResolveOptions, ResolvedLocation,
};
use crate::session::{ResolutionSession, SoilReport};
use crate::soil::SOIL_TYPES;

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    kind: ErrorKind,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::EmptyInput | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::LocationNotFound => StatusCode::NOT_FOUND,
        ErrorKind::UnsupportedCapability => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::PositionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Superseded => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<LocationError> for ApiError {
    fn from(e: LocationError) -> Self {
        let kind = e.kind();
        Self {
            status: status_for(kind),
            kind,
            message: e.user_message(),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        tracing::error!(error = %e, "resolver misconfigured");
        Self {
            status: status_for(ErrorKind::Internal),
            kind: ErrorKind::Internal,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.message,
            kind: self.kind,
            code: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Request options with an optional per-request country override.
fn options_for(state: &AppState, country: Option<&str>) -> Result<ResolveOptions, ApiError> {
    let mut options = state.config.resolve_options();
    if let Some(country) = country.filter(|c| !c.trim().is_empty()) {
        options.region_bias = Some(country.parse::<CountryCode>()?);
    }
    Ok(options)
}

// ─── GET /api/resolve ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ResolveQuery {
    pub query: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    #[serde(flatten)]
    pub location: ResolvedLocation,
    pub formatted_coords: String,
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let start = Instant::now();
    let query = params.query.as_deref().unwrap_or("");

    let resolver = state.resolver(options_for(&state, params.country.as_deref())?)?;
    let location = resolver.resolve_from_text(query).await?;

    tracing::info!(
        query,
        name = %location.display_name,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/resolve"
    );

    Ok(Json(ResolveResponse {
        formatted_coords: format_coords(&location.coordinates),
        location,
    }))
}

// ─── GET /api/soil ───────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SoilQuery {
    pub query: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

pub async fn soil(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SoilQuery>,
) -> Result<Json<SoilReport>, ApiError> {
    let start = Instant::now();
    let resolver = state.resolver(options_for(&state, params.country.as_deref())?)?;

    // A text query wins over coordinates; coordinates stand in for the
    // caller's own position fix.
    let completion = match (params.query.as_deref(), params.lat, params.lng) {
        (Some(query), _, _) if !query.trim().is_empty() => {
            ResolutionSession::new(resolver).search(query).await?
        }
        (_, Some(lat), Some(lng)) => {
            let fix = Coordinates::new(lat, lng)?;
            let resolver = resolver.with_coordinate_source(Arc::new(FixedPosition(fix)));
            ResolutionSession::new(resolver).locate().await
        }
        _ => return Err(LocationError::EmptyInput.into()),
    };
    let report = completion.into_report()?;

    tracing::info!(
        name = %report.location.display_name,
        soil = %report.profile.soil_type,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/soil"
    );

    Ok(Json(report))
}

// ─── GET /api/soil-types, /api/places ────────────────────────────

pub async fn soil_types() -> Json<Vec<String>> {
    Json(SOIL_TYPES.iter().map(ToString::to_string).collect())
}

pub async fn place_list() -> Json<Vec<PlaceInfo>> {
    Json(builtin_place_list())
}
