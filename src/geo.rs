//! Best-effort IP geolocation used to preselect the viewer's country

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::{Error, Result};

const GEO_LOOKUP_URL: &str = "https://ipapi.co/json/";

/// Subset of the ipapi.co response the player cares about
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct GeoInfo {
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

/// Query the IP lookup service.
///
/// Responses without a `country_name` are returned as-is; callers ignore
/// them.
pub fn lookup_country(config: &AppConfig) -> Result<GeoInfo> {
    let mut response = config
        .http_agent()
        .get(GEO_LOOKUP_URL)
        .header("User-Agent", config.user_agent.as_str())
        .call()?;

    if response.status() != 200 {
        return Err(Error::Status(response.status().as_u16()));
    }

    let body = response.body_mut().read_to_string()?;
    let info = parse_geo_response(&body)?;
    debug!("Geolocation response: {:?}", info);
    Ok(info)
}

pub fn parse_geo_response(body: &str) -> Result<GeoInfo> {
    Ok(serde_json::from_str(body)?)
}

/// Pick the country filter value for a geolocation result.
///
/// The display name wins when the playlist has it; otherwise the region
/// code is mapped through the playlist's code table (`US` -> whatever name
/// the playlist derived for it).
pub fn resolve_country(
    geo: &GeoInfo,
    countries: &BTreeSet<String>,
    country_codes: &BTreeMap<String, String>,
) -> Option<String> {
    let name = geo.country_name.as_deref().filter(|n| !n.is_empty())?;

    if countries.contains(name) {
        return Some(name.to_string());
    }

    geo.country_code
        .as_deref()
        .and_then(|code| country_codes.get(&code.to_uppercase()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist_sets() -> (BTreeSet<String>, BTreeMap<String, String>) {
        let countries = ["Germany", "International", "United States", "Türkiye"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let codes = [("DE", "Germany"), ("US", "United States"), ("TR", "Türkiye")]
            .iter()
            .map(|(c, n)| (c.to_string(), n.to_string()))
            .collect();
        (countries, codes)
    }

    #[test]
    fn test_parse_ipapi_response() {
        let body = r#"{"ip":"203.0.113.7","city":"Berlin","country_name":"Germany","country_code":"DE","currency":"EUR"}"#;
        let info = parse_geo_response(body).unwrap();
        assert_eq!(info.country_name.as_deref(), Some("Germany"));
        assert_eq!(info.country_code.as_deref(), Some("DE"));
    }

    #[test]
    fn test_parse_error_response() {
        let info = parse_geo_response(r#"{"error": true, "reason": "RateLimited"}"#).unwrap();
        assert_eq!(info, GeoInfo::default());
        assert!(parse_geo_response("<html>").is_err());
    }

    #[test]
    fn test_resolve_by_name() {
        let (countries, codes) = playlist_sets();
        let geo = GeoInfo {
            country_name: Some("Germany".to_string()),
            country_code: Some("DE".to_string()),
        };
        assert_eq!(resolve_country(&geo, &countries, &codes).as_deref(), Some("Germany"));
    }

    #[test]
    fn test_resolve_by_code_when_name_differs() {
        let (countries, codes) = playlist_sets();
        let geo = GeoInfo {
            country_name: Some("Turkey".to_string()),
            country_code: Some("tr".to_string()),
        };
        assert_eq!(resolve_country(&geo, &countries, &codes).as_deref(), Some("Türkiye"));
    }

    #[test]
    fn test_resolve_unknown_country() {
        let (countries, codes) = playlist_sets();
        let geo = GeoInfo {
            country_name: Some("France".to_string()),
            country_code: Some("FR".to_string()),
        };
        assert_eq!(resolve_country(&geo, &countries, &codes), None);

        // Without a country name nothing is selected, even with a known code
        let geo = GeoInfo {
            country_name: None,
            country_code: Some("DE".to_string()),
        };
        assert_eq!(resolve_country(&geo, &countries, &codes), None);
    }
}
