//! Regions served by the charging-point API.
//!
//! The set is fixed at startup. A region is looked up by its display name
//! ("台北市") or its city code ("Taipei"); both resolve to the same entry and
//! the same cache key.

use serde::{Deserialize, Serialize};

/// A city with one dedicated data endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub endpoint: String,
}

impl Region {
    /// Key under which this region's records are cached.
    pub fn cache_key(&self) -> &str {
        &self.code
    }

    pub fn matches(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        self.name == identifier || self.code.eq_ignore_ascii_case(identifier)
    }
}

/// Build the default endpoint for a city code.
pub fn city_endpoint(api_base_url: &str, code: &str, page_size: u32) -> String {
    format!(
        "{}/City/{}?$top={}&$format=JSON",
        api_base_url.trim_end_matches('/'),
        code,
        page_size
    )
}

/// The six cities of the reference deployment as (name, code, lat, lon).
const DEFAULT_CITIES: [(&str, &str, f64, f64); 6] = [
    ("台北市", "Taipei", 25.0330, 121.5654),
    ("新北市", "NewTaipei", 25.0169, 121.4628),
    ("桃園市", "Taoyuan", 24.9937, 121.2969),
    ("台中市", "Taichung", 24.1477, 120.6736),
    ("台南市", "Tainan", 22.9999, 120.2270),
    ("高雄市", "Kaohsiung", 22.6273, 120.3014),
];

/// Default regions with endpoints rooted at `api_base_url`.
pub fn default_regions(api_base_url: &str, page_size: u32) -> Vec<Region> {
    DEFAULT_CITIES
        .iter()
        .map(|&(name, code, latitude, longitude)| Region {
            name: name.to_string(),
            code: code.to_string(),
            latitude,
            longitude,
            endpoint: city_endpoint(api_base_url, code, page_size),
        })
        .collect()
}

/// Immutable, ordered collection of known regions.
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
}

impl RegionSet {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    /// Find a region by display name or city code.
    pub fn resolve(&self, identifier: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.matches(identifier))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
