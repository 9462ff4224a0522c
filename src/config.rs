use crate::scrapers::{FetchPolicy, SearchParams};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

// ── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub city: String,
    pub areas: Vec<String>,
    pub base_url: String,
    pub order_by: String,
    /// `"Area" = [lat, lon]`, keyed by the configured area string
    pub area_coords: BTreeMap<String, (f64, f64)>,
    pub proximity_km: Option<f64>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let params = SearchParams::default();
        Self {
            city: params.city,
            areas: Vec::new(),
            base_url: params.base_url,
            order_by: params.order_by,
            area_coords: BTreeMap::new(),
            proximity_km: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub budget_min: i64,
    pub budget_max: i64,
    pub bhk_in: Vec<u32>,
    pub furnishing_in: Vec<String>,
    pub property_types_in: Vec<String>,
    pub move_in_by: Option<NaiveDate>,
    pub exclude_keywords: Vec<String>,
    pub required_amenities_any: Vec<String>,
    pub carpet_min_sqft: u32,
    pub floors_allowed_in: Vec<String>,
    pub pets_allowed: Option<bool>,
    pub listing_age_max_hours: u32,
    pub soft_match_threshold: u8,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            budget_min: 0,
            budget_max: 1_000_000,
            bhk_in: Vec::new(),
            furnishing_in: Vec::new(),
            property_types_in: Vec::new(),
            move_in_by: None,
            exclude_keywords: Vec::new(),
            required_amenities_any: Vec::new(),
            carpet_min_sqft: 0,
            floors_allowed_in: Vec::new(),
            pets_allowed: None,
            listing_age_max_hours: 48,
            soft_match_threshold: 70,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Channel names in priority order (`WHATSAPP`, `SMS`)
    pub channels: Vec<String>,
    pub phone_e164: String,
    pub wa_phone_number_id: Option<String>,
    pub wa_access_token: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub min_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            min_delay_seconds: 1.2,
            max_delay_seconds: 2.4,
            timeout_seconds: 20,
            max_retries: 3,
        }
    }
}

impl HttpSettings {
    pub fn fetch_policy(&self) -> FetchPolicy {
        let secs = |s: f64| Duration::try_from_secs_f64(s).unwrap_or_default();
        FetchPolicy {
            timeout: Duration::from_secs(self.timeout_seconds),
            min_delay: secs(self.min_delay_seconds),
            max_delay: secs(self.max_delay_seconds),
            max_retries: self.max_retries,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub scan_interval_minutes: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub health_port: Option<u16>,
    pub state_db_path: PathBuf,
    /// Where pages without embedded data are dumped for inspection
    pub debug_dir: Option<PathBuf>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            scan_interval_minutes: 10,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            health_port: None,
            state_db_path: PathBuf::from("rent_scout.db"),
            debug_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub filters: FilterSettings,
    pub notify: NotifySettings,
    pub http: HttpSettings,
    pub runtime: RuntimeSettings,
}

// ── Loading ─────────────────────────────────────────────────────────────────

impl Settings {
    /// TOML file (defaults when missing) with the process environment on top.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut settings = Self::from_toml_file(path)?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Overlay environment variables. Unset or blank variables leave the
    /// current value alone; malformed list entries are dropped.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let search = &mut self.search;
        if let Some(v) = get("CITY") {
            search.city = v;
        }
        if let Some(v) = get("AREAS") {
            search.areas = split_list(&v.replace('|', ";"), ';');
        }
        if let Some(v) = get("AREA_COORDS") {
            search.area_coords = parse_area_coords(&v);
        }
        if let Some(v) = get("PROXIMITY_KM") {
            search.proximity_km = Some(parse_var("PROXIMITY_KM", &v)?);
        }

        let filters = &mut self.filters;
        if let Some(v) = get("BUDGET_MIN") {
            filters.budget_min = parse_var("BUDGET_MIN", &v)?;
        }
        if let Some(v) = get("BUDGET_MAX") {
            filters.budget_max = parse_var("BUDGET_MAX", &v)?;
        }
        if let Some(v) = get("BHK_IN") {
            filters.bhk_in = split_list(&v, ',').iter().filter_map(|x| x.parse().ok()).collect();
        }
        if let Some(v) = get("FURNISHING_IN") {
            filters.furnishing_in = split_list(&v, ',');
        }
        if let Some(v) = get("PROPERTY_TYPES_IN") {
            filters.property_types_in = split_list(&v, ',');
        }
        if let Some(v) = get("MOVE_IN_BY") {
            let date = NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .with_context(|| format!("MOVE_IN_BY must be YYYY-MM-DD, got {v:?}"))?;
            filters.move_in_by = Some(date);
        }
        if let Some(v) = get("EXCLUDE_KEYWORDS") {
            filters.exclude_keywords = split_list(&v, ',');
        }
        if let Some(v) = get("REQUIRED_AMENITIES_ANY") {
            filters.required_amenities_any = split_list(&v, ',');
        }
        if let Some(v) = get("CARPET_MIN_SQFT") {
            filters.carpet_min_sqft = parse_var("CARPET_MIN_SQFT", &v)?;
        }
        if let Some(v) = get("FLOORS_ALLOWED_IN") {
            filters.floors_allowed_in = split_list(&v, ',');
        }
        if let Some(v) = get("PETS_ALLOWED") {
            filters.pets_allowed = Some(parse_bool("PETS_ALLOWED", &v)?);
        }
        if let Some(v) = get("LISTING_AGE_MAX_HOURS") {
            filters.listing_age_max_hours = parse_var("LISTING_AGE_MAX_HOURS", &v)?;
        }
        if let Some(v) = get("SOFT_MATCH_THRESHOLD") {
            filters.soft_match_threshold = parse_var("SOFT_MATCH_THRESHOLD", &v)?;
        }

        let notify = &mut self.notify;
        if let Some(v) = get("NOTIFY_CHANNELS") {
            notify.channels = split_list(&v, ',');
        }
        if let Some(v) = get("NOTIFY_PHONE_E164") {
            notify.phone_e164 = v;
        }
        for (key, slot) in [
            ("WA_PHONE_NUMBER_ID", &mut notify.wa_phone_number_id),
            ("WA_ACCESS_TOKEN", &mut notify.wa_access_token),
            ("TWILIO_ACCOUNT_SID", &mut notify.twilio_account_sid),
            ("TWILIO_AUTH_TOKEN", &mut notify.twilio_auth_token),
            ("TWILIO_FROM_NUMBER", &mut notify.twilio_from_number),
        ] {
            if let Some(v) = get(key) {
                *slot = Some(v);
            }
        }

        let http = &mut self.http;
        if let Some(v) = get("HTTP_MIN_DELAY_SECONDS") {
            http.min_delay_seconds = parse_var("HTTP_MIN_DELAY_SECONDS", &v)?;
        }
        if let Some(v) = get("HTTP_MAX_DELAY_SECONDS") {
            http.max_delay_seconds = parse_var("HTTP_MAX_DELAY_SECONDS", &v)?;
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECONDS") {
            http.timeout_seconds = parse_var("HTTP_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            http.max_retries = parse_var("MAX_RETRIES", &v)?;
        }

        let runtime = &mut self.runtime;
        if let Some(v) = get("SCAN_INTERVAL_MINUTES") {
            runtime.scan_interval_minutes = parse_var("SCAN_INTERVAL_MINUTES", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            runtime.log_level = v.to_lowercase();
        }
        if let Some(v) = get("HEALTH_PORT") {
            runtime.health_port = Some(parse_var("HEALTH_PORT", &v)?);
        }
        if let Some(v) = get("STATE_DB_PATH") {
            runtime.state_db_path = PathBuf::from(v);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.city.trim().is_empty() {
            bail!("search.city must not be empty");
        }
        let f = &self.filters;
        if f.budget_min > f.budget_max {
            bail!("budget_min ({}) exceeds budget_max ({})", f.budget_min, f.budget_max);
        }
        if f.soft_match_threshold > 100 {
            bail!("soft_match_threshold must be within 0..=100, got {}", f.soft_match_threshold);
        }
        let h = &self.http;
        if !(h.min_delay_seconds >= 0.0 && h.max_delay_seconds.is_finite()) {
            bail!("http delays must be finite and non-negative");
        }
        if h.min_delay_seconds > h.max_delay_seconds {
            bail!(
                "http.min_delay_seconds ({}) exceeds http.max_delay_seconds ({})",
                h.min_delay_seconds,
                h.max_delay_seconds
            );
        }
        if !self.notify.channels.is_empty() && self.notify.phone_e164.trim().is_empty() {
            bail!("notify.channels is set but notify.phone_e164 is empty");
        }
        Ok(())
    }

    /// Inputs for the search target builder
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            base_url: self.search.base_url.clone(),
            city: self.search.city.clone(),
            areas: self.search.areas.clone(),
            area_coords: self.search.area_coords.clone(),
            order_by: self.search.order_by.clone(),
            bhk_in: self.filters.bhk_in.clone(),
            furnishing_in: self.filters.furnishing_in.clone(),
            carpet_min_sqft: self.filters.carpet_min_sqft,
            floors_allowed_in: self.filters.floors_allowed_in.clone(),
            proximity_km: self.search.proximity_km,
        }
    }

    /// Daemon cycle length; never shorter than a minute.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.runtime.scan_interval_minutes.saturating_mul(60).max(60))
    }
}

// ── Env value parsing ───────────────────────────────────────────────────────

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("{key} has an invalid value {raw:?}"))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => bail!("{key} has an invalid boolean {raw:?}"),
    }
}

/// `Name|lat|lon;Name|lat|lon`; entries that do not parse are skipped.
fn parse_area_coords(raw: &str) -> BTreeMap<String, (f64, f64)> {
    split_list(raw, ';')
        .iter()
        .filter_map(|part| {
            let bits: Vec<&str> = part.split('|').map(str::trim).collect();
            let [name, lat, lon] = bits.as_slice() else {
                return None;
            };
            Some((name.to_string(), (lat.parse().ok()?, lon.parse().ok()?)))
        })
        .collect()
}
