//! Geocoding providers: Nominatim, BigDataCloud, and the built-in dataset.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::geocoder::{ForwardGeocoder, GeocodeError, GeocodeFuture, ReverseGeocoder};
use super::types::{Coordinates, CountryCode, LocationSource, ResolvedLocation};

// ─── Built-in dataset ───────────────────────────────────────────

struct BuiltinPlace {
    names: &'static [&'static str], // canonical + aliases
    lat: f64,
    lng: f64,
    region: &'static str,
    country: &'static str,
    country_code: &'static str,
}

const BUILTIN_PLACES: &[BuiltinPlace] = &[
    BuiltinPlace {
        names: &["pune", "poona"],
        lat: 18.5204, lng: 73.8567,
        region: "Maharashtra", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["nashik", "nasik"],
        lat: 19.9975, lng: 73.7898,
        region: "Maharashtra", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["nagpur"],
        lat: 21.1458, lng: 79.0882,
        region: "Maharashtra", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["mumbai", "bombay"],
        lat: 19.0760, lng: 72.8777,
        region: "Maharashtra", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["ludhiana"],
        lat: 30.9010, lng: 75.8573,
        region: "Punjab", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["amritsar"],
        lat: 31.6340, lng: 74.8723,
        region: "Punjab", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["karnal"],
        lat: 29.6857, lng: 76.9905,
        region: "Haryana", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["lucknow"],
        lat: 26.8467, lng: 80.9462,
        region: "Uttar Pradesh", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["varanasi", "benares", "kashi"],
        lat: 25.3176, lng: 82.9739,
        region: "Uttar Pradesh", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["patna"],
        lat: 25.5941, lng: 85.1376,
        region: "Bihar", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["kolkata", "calcutta"],
        lat: 22.5726, lng: 88.3639,
        region: "West Bengal", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["guwahati"],
        lat: 26.1445, lng: 91.7362,
        region: "Assam", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["bhubaneswar"],
        lat: 20.2961, lng: 85.8245,
        region: "Odisha", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["raipur"],
        lat: 21.2514, lng: 81.6296,
        region: "Chhattisgarh", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["bhopal"],
        lat: 23.2599, lng: 77.4126,
        region: "Madhya Pradesh", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["indore"],
        lat: 22.7196, lng: 75.8577,
        region: "Madhya Pradesh", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["jaipur"],
        lat: 26.9124, lng: 75.7873,
        region: "Rajasthan", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["jodhpur"],
        lat: 26.2389, lng: 73.0243,
        region: "Rajasthan", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["ahmedabad", "amdavad"],
        lat: 23.0225, lng: 72.5714,
        region: "Gujarat", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["rajkot"],
        lat: 22.3039, lng: 70.8022,
        region: "Gujarat", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["hyderabad"],
        lat: 17.3850, lng: 78.4867,
        region: "Telangana", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["guntur"],
        lat: 16.3067, lng: 80.4365,
        region: "Andhra Pradesh", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["bengaluru", "bangalore"],
        lat: 12.9716, lng: 77.5946,
        region: "Karnataka", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["mysuru", "mysore"],
        lat: 12.2958, lng: 76.6394,
        region: "Karnataka", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["chennai", "madras"],
        lat: 13.0827, lng: 80.2707,
        region: "Tamil Nadu", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["coimbatore"],
        lat: 11.0168, lng: 76.9558,
        region: "Tamil Nadu", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["thanjavur", "tanjore"],
        lat: 10.7870, lng: 79.1378,
        region: "Tamil Nadu", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["kochi", "cochin"],
        lat: 9.9312, lng: 76.2673,
        region: "Kerala", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["shimla", "simla"],
        lat: 31.1048, lng: 77.1734,
        region: "Himachal Pradesh", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["srinagar"],
        lat: 34.0837, lng: 74.7973,
        region: "Jammu and Kashmir", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["delhi", "new delhi"],
        lat: 28.6139, lng: 77.2090,
        region: "Delhi", country: "India", country_code: "IN",
    },
    BuiltinPlace {
        names: &["paris"],
        lat: 48.8566, lng: 2.3522,
        region: "Île-de-France", country: "France", country_code: "FR",
    },
    BuiltinPlace {
        names: &["des moines"],
        lat: 41.5868, lng: -93.6250,
        region: "Iowa", country: "United States", country_code: "US",
    },
    BuiltinPlace {
        names: &["fresno"],
        lat: 36.7378, lng: -119.7871,
        region: "California", country: "United States", country_code: "US",
    },
    BuiltinPlace {
        names: &["dhaka", "dacca"],
        lat: 23.8103, lng: 90.4125,
        region: "Dhaka Division", country: "Bangladesh", country_code: "BD",
    },
    BuiltinPlace {
        names: &["faisalabad", "lyallpur"],
        lat: 31.4504, lng: 73.1350,
        region: "Punjab", country: "Pakistan", country_code: "PK",
    },
    BuiltinPlace {
        names: &["nairobi"],
        lat: -1.2921, lng: 36.8219,
        region: "Nairobi County", country: "Kenya", country_code: "KE",
    },
];

/// Reverse lookups only name a place this close to a dataset entry.
const BUILTIN_REVERSE_RADIUS_KM: f64 = 75.0;

/// Compute edit distance between two strings (Levenshtein).
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Great-circle distance in kilometres.
fn haversine_km(a: &Coordinates, b: &Coordinates) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

impl BuiltinPlace {
    fn coordinates(&self) -> Coordinates {
        Coordinates { lat: self.lat, lng: self.lng }
    }

    fn label(&self) -> String {
        format!("{}, {}", self.region, self.country)
    }

    fn to_resolved(&self) -> ResolvedLocation {
        let name = title_case(self.names[0]);
        ResolvedLocation::new(
            self.coordinates(),
            format!("{}, {}, {}", name, self.region, self.country),
            LocationSource::UserText,
        )
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Search the built-in dataset with fuzzy matching and optional country filter.
pub fn builtin_lookup(query: &str, region_bias: Option<&CountryCode>) -> Option<ResolvedLocation> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return None;
    }

    let candidates: Vec<&BuiltinPlace> = match region_bias {
        Some(cc) => BUILTIN_PLACES
            .iter()
            .filter(|p| p.country_code.eq_ignore_ascii_case(cc.as_str()))
            .collect(),
        None => BUILTIN_PLACES.iter().collect(),
    };

    // Exact match first
    for place in &candidates {
        if place.names.iter().any(|name| *name == q) {
            return Some(place.to_resolved());
        }
    }

    // Leading component of "Pune, Maharashtra"-style queries
    let head = q.split(',').next().unwrap_or(&q).trim();
    for place in &candidates {
        if place.names.iter().any(|name| *name == head) {
            return Some(place.to_resolved());
        }
    }

    // Substring match (short names would match too eagerly)
    for place in &candidates {
        if head.len() > 3 && place.names.iter().any(|name| name.contains(head)) {
            return Some(place.to_resolved());
        }
    }

    // Fuzzy match (edit distance <= 2)
    let mut best: Option<(&BuiltinPlace, usize)> = None;
    for place in &candidates {
        for name in place.names {
            let dist = edit_distance(head, name);
            if dist <= 2 && best.map_or(true, |(_, d)| dist < d) {
                best = Some((place, dist));
            }
        }
    }

    best.map(|(place, _)| place.to_resolved())
}

/// Name the nearest dataset entry within [`BUILTIN_REVERSE_RADIUS_KM`].
pub fn builtin_nearest(coordinates: &Coordinates) -> Option<String> {
    BUILTIN_PLACES
        .iter()
        .map(|p| (p, haversine_km(coordinates, &p.coordinates())))
        .filter(|(_, d)| *d <= BUILTIN_REVERSE_RADIUS_KM)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(p, _)| p.label())
}

/// A dataset entry for the public place list API.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceInfo {
    pub name: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lng: f64,
}

/// Return the full built-in place list (for autocomplete / API).
pub fn builtin_place_list() -> Vec<PlaceInfo> {
    BUILTIN_PLACES
        .iter()
        .map(|p| PlaceInfo {
            name: title_case(p.names[0]),
            region: p.region.to_string(),
            country: p.country.to_string(),
            lat: p.lat,
            lng: p.lng,
        })
        .collect()
}

/// Offline provider backed by the built-in dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinGeocoder;

impl ForwardGeocoder for BuiltinGeocoder {
    fn name(&self) -> &str {
        "builtin"
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        region_bias: Option<&'a CountryCode>,
    ) -> GeocodeFuture<'a, ResolvedLocation> {
        Box::pin(async move { builtin_lookup(query, region_bias).ok_or(GeocodeError::NotFound) })
    }
}

impl ReverseGeocoder for BuiltinGeocoder {
    fn name(&self) -> &str {
        "builtin"
    }

    fn resolve(&self, coordinates: Coordinates) -> GeocodeFuture<'_, String> {
        Box::pin(async move { builtin_nearest(&coordinates).ok_or(GeocodeError::NotFound) })
    }
}

// ─── HTTP plumbing ──────────────────────────────────────────────

/// Blocking GET returning the response body.
fn http_get(url: &str, user_agent: &str, timeout: Duration) -> Result<String, GeocodeError> {
    let response = ureq::get(url)
        .set("User-Agent", user_agent)
        .timeout(timeout)
        .call()
        .map_err(|e| match e {
            ureq::Error::Status(code, _) => GeocodeError::Transport(format!("HTTP {}", code)),
            ureq::Error::Transport(t) => GeocodeError::Transport(t.to_string()),
        })?;
    response
        .into_string()
        .map_err(|e| GeocodeError::Transport(e.to_string()))
}

/// Run a blocking request off the async executor.
async fn fetch(url: String, user_agent: String, timeout: Duration) -> Result<String, GeocodeError> {
    tokio::task::spawn_blocking(move || http_get(&url, &user_agent, timeout))
        .await
        .map_err(|e| GeocodeError::Transport(e.to_string()))?
}

// ─── Nominatim provider ─────────────────────────────────────────

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const MAPSCO_URL: &str = "https://geocode.maps.co";

#[derive(Deserialize, Debug, Clone)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize, Debug, Default)]
struct NominatimReverse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

/// Address components; Nominatim names the first-level division differently
/// per country.
#[derive(Deserialize, Debug, Default)]
struct NominatimAddress {
    state: Option<String>,
    province: Option<String>,
    region: Option<String>,
    state_district: Option<String>,
    country: Option<String>,
}

impl NominatimAddress {
    fn region(&self) -> Option<&str> {
        [&self.state, &self.province, &self.region, &self.state_district]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

/// Forward and reverse geocoding against a Nominatim-compatible service
/// (OpenStreetMap Nominatim or geocode.maps.co).
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    name: String,
    base_url: String,
    api_key: Option<String>,
    user_agent: String,
    timeout: Duration,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: "nominatim".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            user_agent: user_agent.into(),
            timeout,
        }
    }

    /// geocode.maps.co speaks the Nominatim protocol behind an API key.
    pub fn mapsco(api_key: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: "maps.co".into(),
            api_key: Some(api_key.into()),
            ..Self::new(MAPSCO_URL, user_agent, timeout)
        }
    }

    fn key_param(&self) -> String {
        match &self.api_key {
            Some(key) => format!("&api_key={}", urlencode(key)),
            None => String::new(),
        }
    }

    fn search_url(&self, query: &str, region_bias: Option<&CountryCode>) -> String {
        let country_param = match region_bias {
            Some(cc) => format!("&countrycodes={}", urlencode(cc.as_str())),
            None => String::new(),
        };
        format!(
            "{}/search?q={}&format=json&limit=1&addressdetails=0{}{}",
            self.base_url,
            urlencode(query),
            country_param,
            self.key_param(),
        )
    }

    fn reverse_url(&self, coordinates: &Coordinates) -> String {
        format!(
            "{}/reverse?lat={}&lon={}&format=json&addressdetails=1{}",
            self.base_url,
            coordinates.lat,
            coordinates.lng,
            self.key_param(),
        )
    }

    async fn forward(&self, query: &str, region_bias: Option<&CountryCode>) -> Result<ResolvedLocation, GeocodeError> {
        let body = fetch(self.search_url(query, region_bias), self.user_agent.clone(), self.timeout).await?;
        parse_search_response(&body)
    }

    async fn reverse(&self, coordinates: Coordinates) -> Result<String, GeocodeError> {
        let body = fetch(self.reverse_url(&coordinates), self.user_agent.clone(), self.timeout).await?;
        parse_reverse_response(&body)
    }
}

impl ForwardGeocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        region_bias: Option<&'a CountryCode>,
    ) -> GeocodeFuture<'a, ResolvedLocation> {
        Box::pin(self.forward(query, region_bias))
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, coordinates: Coordinates) -> GeocodeFuture<'_, String> {
        Box::pin(self.reverse(coordinates))
    }
}

fn parse_search_response(body: &str) -> Result<ResolvedLocation, GeocodeError> {
    let results: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;
    let top = results.into_iter().next().ok_or(GeocodeError::NotFound)?;

    let lat: f64 = top
        .lat
        .parse()
        .map_err(|_| GeocodeError::InvalidResponse(format!("invalid lat '{}'", top.lat)))?;
    let lng: f64 = top
        .lon
        .parse()
        .map_err(|_| GeocodeError::InvalidResponse(format!("invalid lon '{}'", top.lon)))?;
    let coordinates =
        Coordinates::new(lat, lng).map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;

    Ok(ResolvedLocation::new(coordinates, top.display_name, LocationSource::UserText))
}

fn parse_reverse_response(body: &str) -> Result<String, GeocodeError> {
    let result: NominatimReverse =
        serde_json::from_str(body).map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;
    if result.error.is_some() {
        return Err(GeocodeError::NotFound);
    }
    let address = result.address.unwrap_or_default();
    let country = address.country.as_deref().map(str::trim).filter(|s| !s.is_empty());
    match (address.region(), country) {
        (Some(region), Some(country)) => Ok(format!("{}, {}", region, country)),
        _ => Err(GeocodeError::NotFound),
    }
}

// ─── BigDataCloud reverse provider ──────────────────────────────

pub const BIGDATACLOUD_URL: &str = "https://api.bigdatacloud.net/data/reverse-geocode-client";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BigDataCloudReverse {
    #[serde(default)]
    principal_subdivision: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
}

/// Keyless reverse geocoder; a second opinion when Nominatim is unavailable.
#[derive(Debug, Clone)]
pub struct BigDataCloudGeocoder {
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl BigDataCloudGeocoder {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: BIGDATACLOUD_URL.into(),
            user_agent: user_agent.into(),
            timeout,
        }
    }

    async fn reverse(&self, coordinates: Coordinates) -> Result<String, GeocodeError> {
        let url = format!(
            "{}?latitude={}&longitude={}&localityLanguage=en",
            self.base_url, coordinates.lat, coordinates.lng
        );
        let body = fetch(url, self.user_agent.clone(), self.timeout).await?;
        parse_bigdatacloud_response(&body)
    }
}

impl ReverseGeocoder for BigDataCloudGeocoder {
    fn name(&self) -> &str {
        "bigdatacloud"
    }

    fn resolve(&self, coordinates: Coordinates) -> GeocodeFuture<'_, String> {
        Box::pin(self.reverse(coordinates))
    }
}

fn parse_bigdatacloud_response(body: &str) -> Result<String, GeocodeError> {
    let r: BigDataCloudReverse =
        serde_json::from_str(body).map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;
    let region = r.principal_subdivision.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let country = r.country_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    match (region, country) {
        (Some(region), Some(country)) => Ok(format!("{}, {}", region, country)),
        _ => Err(GeocodeError::NotFound),
    }
}

// ─── URL encoding ───────────────────────────────────────────────

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_exact() {
        let loc = builtin_lookup("Pune", None).unwrap();
        assert_eq!(loc.display_name, "Pune, Maharashtra, India");
        assert!((loc.coordinates.lat - 18.5204).abs() < 0.01);
        assert_eq!(loc.source, LocationSource::UserText);
    }

    #[test]
    fn test_builtin_alias() {
        let loc = builtin_lookup("bangalore", None).unwrap();
        assert_eq!(loc.display_name, "Bengaluru, Karnataka, India");
    }

    #[test]
    fn test_builtin_multi_word_and_comma() {
        let loc = builtin_lookup("New Delhi", None).unwrap();
        assert_eq!(loc.display_name, "Delhi, Delhi, India");
        let loc = builtin_lookup("Nashik, Maharashtra", None).unwrap();
        assert!(loc.display_name.starts_with("Nashik"));
    }

    #[test]
    fn test_builtin_fuzzy() {
        // "ludhiyana" → "ludhiana" (edit distance 1)
        let loc = builtin_lookup("ludhiyana", None).unwrap();
        assert!(loc.display_name.starts_with("Ludhiana"));
    }

    #[test]
    fn test_builtin_region_bias() {
        assert!(builtin_lookup("paris", Some(&"IN".parse().unwrap())).is_none());
        let loc = builtin_lookup("paris", Some(&"fr".parse().unwrap())).unwrap();
        assert_eq!(loc.display_name, "Paris, Île-de-France, France");
    }

    #[test]
    fn test_builtin_not_found() {
        assert!(builtin_lookup("xyznonexistent", None).is_none());
        assert!(builtin_lookup("   ", None).is_none());
    }

    #[test]
    fn test_builtin_nearest() {
        let near_pune = Coordinates::new(18.60, 73.90).unwrap();
        assert_eq!(builtin_nearest(&near_pune).as_deref(), Some("Maharashtra, India"));
        let mid_ocean = Coordinates::new(-30.0, -140.0).unwrap();
        assert_eq!(builtin_nearest(&mid_ocean), None);
    }

    #[test]
    fn test_builtin_place_list() {
        let list = builtin_place_list();
        assert_eq!(list.len(), BUILTIN_PLACES.len());
        assert!(list.iter().any(|p| p.name == "Des Moines" && p.region == "Iowa"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("nashik", "nasik"), 1);
        assert_eq!(edit_distance("abc", "abc"), 0);
    }

    #[test]
    fn test_haversine() {
        let pune = Coordinates::new(18.5204, 73.8567).unwrap();
        let mumbai = Coordinates::new(19.0760, 72.8777).unwrap();
        let d = haversine_km(&pune, &mumbai);
        assert!((110.0..130.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("São Paulo, BR"), "S%C3%A3o%20Paulo%2C%20BR");
        assert_eq!(urlencode("a&b=c"), "a%26b%3Dc");
        assert_eq!(urlencode("plain-text_1.0~"), "plain-text_1.0~");
    }

    #[test]
    fn test_search_url_with_bias_and_key() {
        let g = NominatimGeocoder::mapsco("k3y", "test", Duration::from_secs(5));
        let url = g.search_url("Navi Mumbai", Some(&"IN".parse().unwrap()));
        assert_eq!(
            url,
            "https://geocode.maps.co/search?q=Navi%20Mumbai&format=json&limit=1&addressdetails=0&countrycodes=in&api_key=k3y"
        );
        let plain = NominatimGeocoder::new("http://localhost:8080/", "test", Duration::from_secs(5));
        assert_eq!(
            plain.search_url("Pune", None),
            "http://localhost:8080/search?q=Pune&format=json&limit=1&addressdetails=0"
        );
    }

    #[test]
    fn test_parse_search_response() {
        let body = r#"[{"lat": "18.5213738", "lon": "73.8545071", "display_name": "Pune, Maharashtra, India", "importance": 0.7}]"#;
        let loc = parse_search_response(body).unwrap();
        assert_eq!(loc.display_name, "Pune, Maharashtra, India");
        assert!((loc.coordinates.lng - 73.8545).abs() < 0.001);
    }

    #[test]
    fn test_parse_search_empty_is_not_found() {
        assert_eq!(parse_search_response("[]"), Err(GeocodeError::NotFound));
    }

    #[test]
    fn test_parse_search_malformed_is_transport() {
        let err = parse_search_response("<html>rate limited</html>").unwrap_err();
        assert!(err.is_transport());
        let err = parse_search_response(r#"[{"lat": "north", "lon": "1"}]"#).unwrap_err();
        assert!(matches!(err, GeocodeError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_reverse_state_and_country() {
        let body = r#"{"display_name": "x", "address": {"state": "Maharashtra", "country": "India", "country_code": "in"}}"#;
        assert_eq!(parse_reverse_response(body).unwrap(), "Maharashtra, India");
    }

    #[test]
    fn test_parse_reverse_province_naming() {
        let body = r#"{"address": {"province": "Ontario", "country": "Canada"}}"#;
        assert_eq!(parse_reverse_response(body).unwrap(), "Ontario, Canada");
    }

    #[test]
    fn test_parse_reverse_missing_region() {
        let body = r#"{"address": {"country": "Monaco"}}"#;
        assert_eq!(parse_reverse_response(body), Err(GeocodeError::NotFound));
        assert_eq!(
            parse_reverse_response(r#"{"error": "Unable to geocode"}"#),
            Err(GeocodeError::NotFound)
        );
    }

    #[test]
    fn test_parse_bigdatacloud() {
        let body = r#"{"principalSubdivision": "Punjab", "countryName": "India", "city": "Ludhiana"}"#;
        assert_eq!(parse_bigdatacloud_response(body).unwrap(), "Punjab, India");
        let empty = r#"{"principalSubdivision": "", "countryName": "India"}"#;
        assert_eq!(parse_bigdatacloud_response(empty), Err(GeocodeError::NotFound));
    }

    #[tokio::test]
    async fn test_builtin_geocoder_capabilities() {
        let g = BuiltinGeocoder;
        let loc = ForwardGeocoder::search(&g, "jaipur", None).await.unwrap();
        assert!(loc.display_name.contains("Rajasthan"));
        let name = ReverseGeocoder::resolve(&g, loc.coordinates).await.unwrap();
        assert_eq!(name, "Rajasthan, India");
        assert_eq!(
            ForwardGeocoder::search(&g, "atlantis", None).await,
            Err(GeocodeError::NotFound)
        );
    }
}
