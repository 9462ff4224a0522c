use crate::config::{FilterSettings, SearchSettings};
use crate::matcher::geo::haversine_km;
use crate::models::{Listing, SoftMatches};
use chrono::{DateTime, Duration, Utc};

// Soft-score weights (sum to 100)
pub const W_AMENITIES: u32 = 40;
pub const W_CARPET: u32 = 20;
pub const W_FLOOR: u32 = 15;
pub const W_PETS: u32 = 10;
pub const W_MOVE_IN: u32 = 15;

/// Days of slack between posting and the wanted move-in date
const MOVE_IN_BUFFER_DAYS: i64 = 45;

const PETS_ALLOWED_PHRASES: &[&str] = &["pets allowed", "pet friendly"];
const PETS_DENIED_PHRASES: &[&str] = &["no pets", "pets not allowed"];

fn area_text_matches(area_display: &str, areas: &[String]) -> bool {
    let area_txt = area_display.to_lowercase();
    areas.iter().any(|a| {
        let a = a.trim().to_lowercase();
        !a.is_empty() && (area_txt.contains(&a) || a.contains(&area_txt))
    })
}

fn nearest_area_km(listing: &Listing, search: &SearchSettings) -> Option<f64> {
    let point = listing.location.coordinates()?;
    search
        .area_coords
        .values()
        .map(|&centre| haversine_km(point, centre))
        .min_by(|a, b| a.total_cmp(b))
}

fn contains_excluded(listing: &Listing, excluded: &[String]) -> bool {
    let body = [
        Some(listing.title.as_str()),
        listing.description.as_deref(),
        Some(listing.location.area_display.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join(" ");

    excluded
        .iter()
        .map(|kw| kw.trim().to_lowercase())
        .any(|kw| !kw.is_empty() && body.contains(&kw))
}

fn allowed(value: Option<&str>, allow_list: &[String]) -> bool {
    if allow_list.is_empty() {
        return true;
    }
    let value = value.unwrap_or("").trim();
    allow_list.iter().any(|a| a == value)
}

/// Mandatory filters. Returns whether every condition holds and, when the
/// radius fallback was evaluated, the distance to the nearest configured area.
pub fn hard_pass(
    listing: &Listing,
    search: &SearchSettings,
    filters: &FilterSettings,
    now: DateTime<Utc>,
) -> (bool, Option<f64>) {
    let mut area_ok = area_text_matches(&listing.location.area_display, &search.areas);
    let mut proximity_km = None;

    if !area_ok {
        if let Some(radius) = search.proximity_km.filter(|r| *r > 0.0) {
            proximity_km = nearest_area_km(listing, search);
            area_ok = proximity_km.is_some_and(|d| d <= radius);
        }
    }

    let budget_ok = (filters.budget_min..=filters.budget_max).contains(&listing.price_monthly);

    // Unknown bedroom count is never penalised here.
    let bhk_ok = match listing.bhk {
        None => true,
        Some(bhk) => filters.bhk_in.is_empty() || filters.bhk_in.contains(&bhk),
    };

    let furnishing_ok = allowed(listing.furnishing.as_deref(), &filters.furnishing_in);
    let type_ok = allowed(listing.property_type.as_deref(), &filters.property_types_in);

    let age_ok = match listing.posted_at {
        None => true,
        Some(posted) => {
            let age_hours = (now - posted).num_seconds() as f64 / 3600.0;
            age_hours <= filters.listing_age_max_hours as f64
        }
    };

    let keywords_ok = !contains_excluded(listing, &filters.exclude_keywords);

    let passed = [area_ok, budget_ok, bhk_ok, furnishing_ok, type_ok, age_ok, keywords_ok]
        .iter()
        .all(|ok| *ok);
    (passed, proximity_km)
}

/// Required terms (lower-cased, de-duplicated) matched by any amenity, in either direction.
fn amenities_matched(amenities: &[String], required: &[String]) -> (Vec<String>, usize) {
    let mut wanted: Vec<String> = required
        .iter()
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect();
    wanted.sort();
    wanted.dedup();

    let have: Vec<String> = amenities.iter().map(|a| a.trim().to_lowercase()).collect();
    let matched = wanted
        .iter()
        .filter(|r| have.iter().any(|a| !a.is_empty() && (a.contains(*r) || r.contains(a))))
        .cloned()
        .collect();
    (matched, wanted.len())
}

fn leading_number(s: &str) -> Option<i64> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Floor text against allowed tokens: `"4+"` means that floor or higher,
/// anything else is a case-insensitive substring.
pub fn floor_ok(floor_info: Option<&str>, allowed: &[String]) -> bool {
    let floor = match floor_info.map(str::trim) {
        Some(f) if !f.is_empty() => f.to_lowercase(),
        _ => return true,
    };
    if allowed.iter().all(|t| t.trim().is_empty()) {
        return true;
    }

    allowed.iter().any(|token| {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return false;
        }
        if let Some(min) = token.strip_suffix('+').and_then(leading_number) {
            if leading_number(&floor).is_some_and(|n| n >= min) {
                return true;
            }
        }
        floor.contains(&token)
    })
}

/// Pet policy from free text; `None` when the text says nothing either way.
pub fn infer_pets(description: Option<&str>) -> Option<bool> {
    let text = description?.to_lowercase();
    if PETS_DENIED_PHRASES.iter().any(|p| text.contains(p)) {
        return Some(false);
    }
    if PETS_ALLOWED_PHRASES.iter().any(|p| text.contains(p)) {
        return Some(true);
    }
    None
}

/// Weighted 0-100 score over secondary preferences.
/// `proximity_km` is carried over from the listing's existing soft matches.
pub fn soft_score(listing: &Listing, filters: &FilterSettings) -> (u8, SoftMatches) {
    let mut score = 0u32;

    let (matched, required) = amenities_matched(&listing.amenities, &filters.required_amenities_any);
    score += if required == 0 {
        W_AMENITIES
    } else {
        W_AMENITIES * matched.len() as u32 / required as u32
    };

    let carpet_ok = listing.carpet_sqft.map(|sqft| {
        filters.carpet_min_sqft == 0 || sqft >= i64::from(filters.carpet_min_sqft)
    });
    if carpet_ok == Some(true) {
        score += W_CARPET;
    }

    if floor_ok(listing.floor_info.as_deref(), &filters.floors_allowed_in) {
        score += W_FLOOR;
    }

    let pets_ok = match filters.pets_allowed {
        None => true,
        Some(wanted) => listing
            .pets_allowed
            .or_else(|| infer_pets(listing.description.as_deref()))
            .map_or(true, |known| known == wanted),
    };
    if pets_ok {
        score += W_PETS;
    }

    let move_in_ok = match (filters.move_in_by, listing.posted_at) {
        (Some(want), Some(posted)) => {
            Some(posted.date_naive() <= want + Duration::days(MOVE_IN_BUFFER_DAYS))
        }
        _ => None,
    };
    if move_in_ok == Some(true) {
        score += W_MOVE_IN;
    }

    let matches = SoftMatches {
        amenities_matched: matched,
        proximity_km: listing.soft_matches.proximity_km,
        carpet_ok,
        move_in_ok,
    };
    (score.min(100) as u8, matches)
}

/// Run both stages and attach the results to the listing.
/// Returns whether the listing passed the hard filters.
pub fn evaluate(
    listing: &mut Listing,
    search: &SearchSettings,
    filters: &FilterSettings,
    now: DateTime<Utc>,
) -> bool {
    let (passed, proximity_km) = hard_pass(listing, search, filters, now);
    listing.hard_filters_passed = passed;
    listing.soft_matches.proximity_km = proximity_km;

    if passed {
        let (score, matches) = soft_score(listing, filters);
        listing.match_score = score;
        listing.soft_matches = matches;
    }
    passed
}
