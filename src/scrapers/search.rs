use crate::scrapers::types::{SearchParams, SearchTarget, TargetKind};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};
use url::form_urlencoded;

/// Upper bound the site expects on a carpet-area range
const CARPET_RANGE_MAX: u32 = 10_000;

/// Lower-case, collapse every non-alphanumeric run into one hyphen, trim hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeoPlace<'a> {
    place_name: &'a str,
    place_id: &'a str,
    lat: String,
    lon: String,
}

/// base64(JSON array) geo parameter, e.g.
/// `[{"placeName":"Kadubeesanahalli, Bangalore","placeId":"","lat":"12.935400","lon":"77.697400"}]`
pub fn encode_search_param(place_name: &str, lat: f64, lon: f64) -> String {
    let payload = [GeoPlace {
        place_name,
        place_id: "",
        lat: format!("{:.6}", lat),
        lon: format!("{:.6}", lon),
    }];
    // Serializing a fixed struct of strings cannot fail.
    let raw = serde_json::to_vec(&payload).unwrap_or_default();
    STANDARD.encode(raw)
}

/// Map a furnishing label onto the site's filter vocabulary.
pub fn furnishing_token(label: &str) -> String {
    let trimmed = label.trim();
    match trimmed.to_lowercase().as_str() {
        "fully furnished" => "FULLY_FURNISHED".to_string(),
        "semi-furnished" => "SEMI_FURNISHED".to_string(),
        "unfurnished" => "NOT_FURNISHED".to_string(),
        _ => trimmed.to_uppercase().replace(' ', "_"),
    }
}

fn query_escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Plain decimal, keeping one fractional digit on whole values (`2.0`, `0.0000001`).
fn format_km(km: f64) -> String {
    if km.fract() == 0.0 {
        format!("{:.1}", km)
    } else {
        format!("{}", km)
    }
}

/// Optional filter parameters shared by every target, each with a leading `&`.
fn filter_query(params: &SearchParams) -> String {
    let mut query = String::new();

    if !params.bhk_in.is_empty() {
        let types: Vec<String> = params.bhk_in.iter().map(|b| format!("BHK{}", b)).collect();
        query.push_str(&format!("&type={}", types.join(",")));
    }

    let furnishing: Vec<String> = params
        .furnishing_in
        .iter()
        .filter(|f| !f.trim().is_empty())
        .map(|f| query_escape(&furnishing_token(f)))
        .collect();
    if !furnishing.is_empty() {
        query.push_str(&format!("&furnishing={}", furnishing.join(",")));
    }

    if params.carpet_min_sqft > 0 {
        query.push_str(&format!("&farea={},{}", params.carpet_min_sqft, CARPET_RANGE_MAX));
    }

    let floors: Vec<String> = params
        .floors_allowed_in
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(query_escape)
        .collect();
    if !floors.is_empty() {
        query.push_str(&format!("&floor={}", floors.join(",")));
    }

    if let Some(radius) = params.proximity_km {
        query.push_str(&format!("&radius={}", format_km(radius)));
    }

    query
}

/// Build the ordered, de-duplicated target list for one scan.
///
/// Per area: the locality path page, the free-text query page and, when the
/// area has known coordinates, a coordinate query page followed by the
/// public API query. Blank areas are skipped.
pub fn build_search_targets(params: &SearchParams) -> Vec<SearchTarget> {
    let base = params.base_url.trim_end_matches('/');
    let city_slug = slugify(&params.city);
    let order_by = params.order_by.replace(' ', "%20");
    let filters = filter_query(params);

    let mut targets = Vec::new();

    for area in &params.areas {
        let area = area.trim();
        if area.is_empty() {
            continue;
        }

        let area_slug = slugify(area);
        if !area_slug.is_empty() {
            let path_slug = if area_slug.ends_with(&format!("-{}", city_slug)) {
                area_slug.clone()
            } else {
                format!("{}-{}", area_slug, city_slug)
            };
            targets.push(SearchTarget {
                kind: TargetKind::HtmlPage,
                url: format!(
                    "{}/property/rent/{}/{}?orderBy={}{}",
                    base, city_slug, path_slug, order_by, filters
                ),
                area_name: area.to_string(),
                encoded_param: None,
            });
        }

        targets.push(SearchTarget {
            kind: TargetKind::HtmlPage,
            url: format!(
                "{}/property/rent/{}?searchParam={}&sharedAccomodation=0&orderBy={}{}",
                base,
                city_slug,
                query_escape(area),
                order_by,
                filters
            ),
            area_name: area.to_string(),
            encoded_param: None,
        });

        if let Some(&(lat, lon)) = params.area_coords.get(area) {
            let encoded = encode_search_param(area, lat, lon);
            let escaped = query_escape(&encoded);

            targets.push(SearchTarget {
                kind: TargetKind::HtmlPage,
                url: format!(
                    "{}/property/rent/{}/multiple?searchParam={}&sharedAccomodation=0&orderBy={}{}",
                    base, city_slug, escaped, order_by, filters
                ),
                area_name: area.to_string(),
                encoded_param: Some(encoded.clone()),
            });
            targets.push(SearchTarget {
                kind: TargetKind::ApiQuery,
                url: format!(
                    "{}/api/v3/multi/property/filter?searchParam={}&sharedAccomodation=0&orderBy={}&page=0&limit=30{}",
                    base, escaped, order_by, filters
                ),
                area_name: area.to_string(),
                encoded_param: Some(encoded),
            });
        } else {
            debug!(area, "no coordinates for area, skipping geo targets");
        }
    }

    let mut seen = HashSet::new();
    targets.retain(|t| seen.insert((t.kind, t.url.clone())));

    info!(count = targets.len(), "search_urls_built");
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(areas: &[&str]) -> SearchParams {
        SearchParams {
            city: "Bangalore".to_string(),
            areas: areas.iter().map(|a| a.to_string()).collect(),
            ..SearchParams::default()
        }
    }

    #[test]
    fn slugify_collapses_punctuation_runs() {
        assert_eq!(slugify("  Kadubeesanahalli, Bangalore "), "kadubeesanahalli-bangalore");
        assert_eq!(slugify("HSR Layout -- Sector 2!"), "hsr-layout-sector-2");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn locality_path_does_not_repeat_city() {
        let targets = build_search_targets(&params(&["Kadubeesanahalli, Bangalore"]));
        assert_eq!(
            targets[0].url,
            "https://www.nobroker.in/property/rent/bangalore/kadubeesanahalli-bangalore?orderBy=lastUpdatedDate%20desc"
        );

        let targets = build_search_targets(&params(&["Whitefield"]));
        assert!(targets[0].url.contains("/property/rent/bangalore/whitefield-bangalore?"));
    }

    #[test]
    fn blank_areas_are_skipped() {
        let targets = build_search_targets(&params(&["", "   ", "Whitefield"]));
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.area_name == "Whitefield"));
    }

    #[test]
    fn geo_targets_only_with_coordinates() {
        let mut p = params(&["Whitefield", "Bellandur"]);
        p.area_coords.insert("Bellandur".to_string(), (12.9304, 77.6784));

        let targets = build_search_targets(&p);
        let api: Vec<_> = targets.iter().filter(|t| t.kind == TargetKind::ApiQuery).collect();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].area_name, "Bellandur");
        assert!(api[0].encoded_param.is_some());
        assert_eq!(targets.iter().filter(|t| t.area_name == "Whitefield").count(), 2);
        assert_eq!(targets.iter().filter(|t| t.area_name == "Bellandur").count(), 4);
        // API is the last resort for its area.
        assert_eq!(targets.last().map(|t| t.kind), Some(TargetKind::ApiQuery));
    }

    #[test]
    fn duplicate_areas_collapse_in_first_seen_order() {
        let targets = build_search_targets(&params(&["Whitefield", "Bellandur", "Whitefield"]));
        let mut pairs = HashSet::new();
        for t in &targets {
            assert!(pairs.insert((t.kind, t.url.clone())));
        }
        assert_eq!(targets.len(), 4);
        assert_eq!(targets[0].area_name, "Whitefield");
        assert_eq!(targets[2].area_name, "Bellandur");
    }

    #[test]
    fn encoded_param_is_base64_json() {
        let encoded = encode_search_param("Kadubeesanahalli, Bangalore", 12.9354, 77.6974);
        let raw = STANDARD.decode(encoded).unwrap();
        assert_eq!(
            String::from_utf8(raw).unwrap(),
            r#"[{"placeName":"Kadubeesanahalli, Bangalore","placeId":"","lat":"12.935400","lon":"77.697400"}]"#
        );
    }

    #[test]
    fn filters_are_attached() {
        let mut p = params(&["Kadubeesanahalli, Bangalore"]);
        p.area_coords
            .insert("Kadubeesanahalli, Bangalore".to_string(), (12.9354, 77.6974));
        p.bhk_in = vec![1, 2, 3];
        p.furnishing_in = vec!["Semi-Furnished".to_string(), "Fully Furnished".to_string()];
        p.carpet_min_sqft = 500;
        p.floors_allowed_in = vec!["4+".to_string()];
        p.proximity_km = Some(2.0);

        let targets = build_search_targets(&p);
        let text = targets
            .iter()
            .find(|t| t.kind == TargetKind::HtmlPage && t.url.contains("searchParam=Kadu"))
            .unwrap();
        assert!(text.url.contains("radius=2.0"));
        assert!(text.url.contains("type=BHK1,BHK2,BHK3"));
        assert!(text.url.contains("furnishing=SEMI_FURNISHED,FULLY_FURNISHED"));
        assert!(text.url.contains("farea=500,10000"));
        assert!(text.url.contains("floor=4%2B"));

        let api = targets.iter().find(|t| t.kind == TargetKind::ApiQuery).unwrap();
        assert!(api.url.contains("&page=0&limit=30&type=BHK1"));
    }

    #[test]
    fn filter_tokens_survive_query_decoding() {
        let mut p = params(&["Whitefield"]);
        p.floors_allowed_in = vec!["Ground".to_string(), "4+".to_string(), "a&b=c".to_string()];
        p.furnishing_in = vec!["Semi-Furnished".to_string(), "Bare & basic".to_string()];

        let targets = build_search_targets(&p);
        let url = url::Url::parse(&targets[0].url).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let value = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(value("floor").as_deref(), Some("Ground,4+,a&b=c"));
        assert_eq!(
            value("furnishing").as_deref(),
            Some("SEMI_FURNISHED,BARE_&_BASIC")
        );
        assert!(value("b").is_none());
    }

    #[test]
    fn radius_is_plain_decimal() {
        assert_eq!(format_km(2.0), "2.0");
        assert_eq!(format_km(1.5), "1.5");
        assert_eq!(format_km(0.0000001), "0.0000001");

        let mut p = params(&["Whitefield"]);
        p.proximity_km = Some(0.0000001);
        let targets = build_search_targets(&p);
        assert!(targets[0].url.ends_with("&radius=0.0000001"));
    }

    #[test]
    fn furnishing_vocabulary() {
        assert_eq!(furnishing_token("Unfurnished"), "NOT_FURNISHED");
        assert_eq!(furnishing_token("semi-furnished"), "SEMI_FURNISHED");
        assert_eq!(furnishing_token("Gated community"), "GATED_COMMUNITY");
    }
}
