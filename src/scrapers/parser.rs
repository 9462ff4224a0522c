use crate::models::{Listing, Location};
use crate::scrapers::normalize;
use crate::scrapers::traits::{ExtractContext, ExtractStrategy, Payload};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

/// Ordered source keys accepted for each canonical field.
mod aliases {
    pub const ID: &[&str] = &["propertyId", "id"];
    pub const TITLE: &[&str] = &["title", "society", "buildingName"];
    pub const SOCIETY: &[&str] = &["society", "projectName"];
    pub const URL: &[&str] = &["seoUrl", "url"];
    pub const POSTED_AT: &[&str] = &["lastUpdateDate", "creationDate"];
    pub const RENT: &[&str] = &["rent", "rentMonthly", "rentMonthlyPrice"];
    pub const DEPOSIT: &[&str] = &["deposit", "securityDeposit"];
    pub const BHK: &[&str] = &["bhk", "bedrooms"];
    pub const FURNISHING: &[&str] = &["furnishing", "furnishingDesc"];
    pub const PROPERTY_TYPE: &[&str] = &["propertyType", "type"];
    pub const AREA: &[&str] = &["locality", "location", "microMarket"];
    pub const CITY: &[&str] = &["city", "cityName"];
    pub const LATITUDE: &[&str] = &["latitude", "lat"];
    pub const LONGITUDE: &[&str] = &["longitude", "lon"];
    pub const CARPET: &[&str] = &["carpetArea", "carpetSqft", "builtupArea"];
    pub const FLOOR: &[&str] = &["floor", "floorInfo"];
    pub const AMENITIES: &[&str] = &["amenities", "amenitiesMap"];
    pub const PETS: &[&str] = &["petsAllowed"];
    pub const PHOTO_COUNT: &[&str] = &["photoCount"];
    pub const PHOTOS: &[&str] = &["photos"];
    pub const DESCRIPTION: &[&str] = &["description", "propertyDescription"];
}

/// Object paths inside the embedded app state that may hold the result list
const EMBEDDED_CANDIDATES: &[&str] = &[
    "/listPage/listPageProperties",
    "/resultScreenReducer/propertyList",
    "/resultScreenReducer/propertySearchData",
];

/// Marker in hrefs that point at a listing page
const PROPERTY_LINK_MARKER: &str = "/property";

static APP_STATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)window\.nb\s*=\s*window\.nb\s*\|\|\s*\{\}\s*;\s*nb\.pageName\s*=\s*"listPage"\s*;.*?nb\.appState\s*=\s*"#,
    )
    .expect("app state regex")
});

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| obj.get(*k)).find(|v| is_present(v))
}

/// Resolve a site-relative path against `base_url`.
pub fn absolutize(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Map one raw property object onto the canonical listing.
/// Returns `None` only when no listing id can be derived.
pub fn property_to_listing(obj: &Map<String, Value>, ctx: &ExtractContext) -> Option<Listing> {
    let listing_id = first(obj, aliases::ID).and_then(normalize::text)?;

    let mut title = first(obj, aliases::TITLE)
        .and_then(normalize::text)
        .unwrap_or_else(|| Listing::DEFAULT_TITLE.to_string());
    if let Some(society) = first(obj, aliases::SOCIETY).and_then(normalize::text) {
        if title != Listing::DEFAULT_TITLE && !title.contains(&society) {
            title = format!("{} • {}", title, society);
        }
    }

    let url_path = first(obj, aliases::URL)
        .and_then(normalize::text)
        .unwrap_or_else(|| format!("/property/{}", listing_id));

    let description = first(obj, aliases::DESCRIPTION).and_then(normalize::text);

    let carpet_sqft = first(obj, aliases::CARPET)
        .and_then(normalize::leading_int)
        .or_else(|| description.as_deref().and_then(normalize::carpet_from_text))
        .or_else(|| normalize::carpet_from_text(&title));

    let images_count = first(obj, aliases::PHOTO_COUNT)
        .and_then(normalize::leading_int)
        .and_then(|n| u32::try_from(n).ok())
        .or_else(|| {
            first(obj, aliases::PHOTOS)
                .and_then(Value::as_array)
                .map(|photos| photos.len() as u32)
        });

    let mut listing = Listing::new(listing_id, ctx.now);
    listing.url = absolutize(&ctx.base_url, &url_path);
    listing.title = title;
    listing.location = Location {
        city: first(obj, aliases::CITY).and_then(normalize::text).unwrap_or_default(),
        area_display: first(obj, aliases::AREA).and_then(normalize::text).unwrap_or_default(),
        latitude: first(obj, aliases::LATITUDE).and_then(normalize::coordinate),
        longitude: first(obj, aliases::LONGITUDE).and_then(normalize::coordinate),
    };
    listing.posted_at = first(obj, aliases::POSTED_AT).and_then(|v| normalize::timestamp(v, ctx.now));
    listing.price_monthly = first(obj, aliases::RENT).and_then(normalize::money).unwrap_or(0);
    listing.deposit = first(obj, aliases::DEPOSIT).and_then(normalize::money);
    listing.bhk = first(obj, aliases::BHK).and_then(normalize::bhk);
    listing.furnishing = first(obj, aliases::FURNISHING).and_then(normalize::label);
    listing.property_type = first(obj, aliases::PROPERTY_TYPE).and_then(normalize::label);
    listing.floor_info = first(obj, aliases::FLOOR).and_then(normalize::text);
    listing.carpet_sqft = carpet_sqft;
    listing.amenities = first(obj, aliases::AMENITIES)
        .map(normalize::amenities)
        .unwrap_or_default();
    listing.pets_allowed = first(obj, aliases::PETS).and_then(normalize::flag);
    listing.images_count = images_count;
    listing.description = description;

    Some(listing)
}

fn map_properties<'a>(
    objects: impl Iterator<Item = &'a Value>,
    ctx: &ExtractContext,
) -> Vec<Listing> {
    objects
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let listing = property_to_listing(obj, ctx);
            if listing.is_none() {
                debug!("dropping property without id");
            }
            listing
        })
        .collect()
}

/// Server-rendered app state assigned in an inline script
pub struct EmbeddedJsonStrategy;

impl EmbeddedJsonStrategy {
    pub const NAME: &'static str = "embedded_json";

    fn app_state(html: &str) -> Option<Value> {
        let marker = APP_STATE.find(html)?;
        // Only the first JSON value after the assignment is wanted; trailing script is ignored.
        serde_json::Deserializer::from_str(&html[marker.end()..])
            .into_iter::<Value>()
            .next()?
            .ok()
    }
}

impl ExtractStrategy for EmbeddedJsonStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn extract(&self, payload: Payload<'_>, ctx: &ExtractContext) -> Vec<Listing> {
        let Payload::Html(html) = payload else {
            return Vec::new();
        };
        let Some(state) = Self::app_state(html) else {
            return Vec::new();
        };

        EMBEDDED_CANDIDATES
            .iter()
            .filter_map(|path| state.pointer(path).and_then(Value::as_array))
            .find(|props| !props.is_empty())
            .map(|props| map_properties(props.iter(), ctx))
            .unwrap_or_default()
    }
}

/// Public search API: `{"data": {"nbRankedResults": [...]}}` or `{"data": {"data": [...]}}`
pub struct ApiJsonStrategy;

impl ExtractStrategy for ApiJsonStrategy {
    fn name(&self) -> &'static str {
        "api_json"
    }

    fn extract(&self, payload: Payload<'_>, ctx: &ExtractContext) -> Vec<Listing> {
        let Payload::Json(json) = payload else {
            return Vec::new();
        };
        let Some(data) = json.get("data").and_then(Value::as_object) else {
            return Vec::new();
        };
        // An empty or null list means "look at the next key".
        let results = ["nbRankedResults", "data"]
            .iter()
            .filter_map(|k| data.get(*k))
            .find(|v| match v {
                Value::Null => false,
                Value::Array(items) => !items.is_empty(),
                _ => true,
            });
        let Some(Value::Array(results)) = results else {
            return Vec::new();
        };

        let unwrapped = results.iter().map(|item| match item.get("property") {
            Some(inner) if inner.is_object() => inner,
            _ => item,
        });
        map_properties(unwrapped, ctx)
    }
}

/// Last resort for skeleton pages: every anchor pointing at a property page
pub struct AnchorFallbackStrategy;

impl AnchorFallbackStrategy {
    fn listing_id(url: &str) -> Option<String> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        path.trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

impl ExtractStrategy for AnchorFallbackStrategy {
    fn name(&self) -> &'static str {
        "anchor_fallback"
    }

    fn extract(&self, payload: Payload<'_>, ctx: &ExtractContext) -> Vec<Listing> {
        let Payload::Html(html) = payload else {
            return Vec::new();
        };
        let Ok(anchor_selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let document = Html::parse_document(html);
        let mut listings = Vec::new();

        for anchor in document.select(&anchor_selector) {
            let href = anchor.value().attr("href").unwrap_or("");
            if !href.contains(PROPERTY_LINK_MARKER) {
                continue;
            }

            let url = absolutize(&ctx.base_url, href);
            let Some(listing_id) = Self::listing_id(&url) else {
                continue;
            };

            let text = anchor.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

            let mut listing = Listing::new(listing_id, ctx.now);
            listing.url = url;
            if !text.is_empty() {
                listing.title = text;
            }
            listings.push(listing);
        }

        listings
    }
}

/// Result of running the strategy chain
#[derive(Debug, Default)]
pub struct Extraction {
    /// Strategy that produced the listings, if any did
    pub strategy: Option<&'static str>,
    pub listings: Vec<Listing>,
}

/// Ordered strategy chain; the first non-empty result wins.
pub struct ListingExtractor {
    strategies: Vec<Box<dyn ExtractStrategy>>,
}

impl ListingExtractor {
    pub fn new(strategies: Vec<Box<dyn ExtractStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, payload: Payload<'_>, ctx: &ExtractContext) -> Extraction {
        for strategy in &self.strategies {
            let listings = strategy.extract(payload, ctx);
            debug!(strategy = strategy.name(), count = listings.len(), "extract_attempt");
            if !listings.is_empty() {
                return Extraction {
                    strategy: Some(strategy.name()),
                    listings,
                };
            }
        }
        Extraction::default()
    }
}

impl Default for ListingExtractor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(EmbeddedJsonStrategy),
            Box::new(ApiJsonStrategy),
            Box::new(AnchorFallbackStrategy),
        ])
    }
}
