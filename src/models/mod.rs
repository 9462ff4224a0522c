use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Location information for a listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub area_display: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Location {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Secondary-preference outcomes recorded by the soft scorer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftMatches {
    pub amenities_matched: Vec<String>,
    pub proximity_km: Option<f64>,
    pub carpet_ok: Option<bool>,
    pub move_in_ok: Option<bool>,
}

/// Canonical rental listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub listing_id: String,
    pub url: String,
    pub title: String,
    pub location: Location,
    pub posted_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
    pub price_monthly: i64,
    pub deposit: Option<i64>,
    pub bhk: Option<u32>,
    pub furnishing: Option<String>,
    pub property_type: Option<String>,
    pub floor_info: Option<String>,
    pub carpet_sqft: Option<i64>,
    pub amenities: Vec<String>,
    pub pets_allowed: Option<bool>,
    pub images_count: Option<u32>,
    pub description: Option<String>,

    // Evaluation outputs
    pub match_score: u8,
    pub hard_filters_passed: bool,
    pub soft_matches: SoftMatches,
}

impl Listing {
    pub const DEFAULT_TITLE: &'static str = "Rental home";

    /// A listing with only identity set; every other field at its default.
    pub fn new(listing_id: impl Into<String>, scraped_at: DateTime<Utc>) -> Self {
        Self {
            listing_id: listing_id.into(),
            url: String::new(),
            title: Self::DEFAULT_TITLE.to_string(),
            location: Location::default(),
            posted_at: None,
            scraped_at,
            price_monthly: 0,
            deposit: None,
            bhk: None,
            furnishing: None,
            property_type: None,
            floor_info: None,
            carpet_sqft: None,
            amenities: Vec::new(),
            pets_allowed: None,
            images_count: None,
            description: None,
            match_score: 0,
            hard_filters_passed: false,
            soft_matches: SoftMatches::default(),
        }
    }
}
