use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Search parameters for building scan targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Site root every relative link is resolved against
    pub base_url: String,
    /// City the areas belong to
    pub city: String,
    /// Configured area names, in priority order
    pub areas: Vec<String>,
    /// Known area centres, keyed by the exact configured area string
    pub area_coords: BTreeMap<String, (f64, f64)>,
    /// Sort order passed through to the site
    pub order_by: String,
    /// Allowed bedroom counts
    pub bhk_in: Vec<u32>,
    /// Allowed furnishing labels ("Semi-Furnished", ...)
    pub furnishing_in: Vec<String>,
    /// Minimum carpet area; 0 disables the filter
    pub carpet_min_sqft: u32,
    /// Allowed floor tokens ("Ground", "4+", ...)
    pub floors_allowed_in: Vec<String>,
    /// Search radius around the area centre
    pub proximity_km: Option<f64>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            base_url: "https://www.nobroker.in".to_string(),
            city: "Bangalore".to_string(),
            areas: Vec::new(),
            area_coords: BTreeMap::new(),
            order_by: "lastUpdatedDate desc".to_string(),
            bhk_in: Vec::new(),
            furnishing_in: Vec::new(),
            carpet_min_sqft: 0,
            floors_allowed_in: Vec::new(),
            proximity_km: None,
        }
    }
}

/// What a target returns when fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    HtmlPage,
    ApiQuery,
}

/// One fetchable URL derived from a configured area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTarget {
    pub kind: TargetKind,
    pub url: String,
    pub area_name: String,
    /// base64 searchParam, present on coordinate-based targets
    pub encoded_param: Option<String>,
}
