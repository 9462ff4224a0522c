use crate::config::Settings;
use crate::health::{RunStatus, StatusHandle};
use crate::matcher::evaluate;
use crate::models::Listing;
use crate::notifier::{format_alert, Notifier};
use crate::scrapers::{
    build_search_targets, EmbeddedJsonStrategy, ExtractContext, Fetcher, ListingExtractor,
    Payload, SearchTarget, TargetKind,
};
use crate::store::NotificationStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEBUG_DUMP_FILE: &str = "last_empty.html";

/// Stable content hash; a change means the listing is worth re-sending.
pub fn fingerprint(listing: &Listing) -> String {
    let price = listing.price_monthly.to_string();
    let deposit = listing.deposit.map(|d| d.to_string()).unwrap_or_default();
    let parts: [&str; 4] = [&listing.listing_id, &price, &deposit, &listing.title];

    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Scan counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub scan_runs: u64,
    pub cards_seen: u64,
    pub new_listings: u64,
    pub alerts_sent: u64,
    pub errors: u64,
}

impl RunCounters {
    fn absorb(&mut self, other: &RunCounters) {
        self.scan_runs += other.scan_runs;
        self.cards_seen += other.cards_seen;
        self.new_listings += other.new_listings;
        self.alerts_sent += other.alerts_sent;
        self.errors += other.errors;
    }
}

/// Outcome of one scan cycle
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// This cycle only
    pub cycle: RunCounters,
    /// Process lifetime, including this cycle
    pub totals: RunCounters,
    pub targets_attempted: u64,
    pub targets_failed: u64,
    /// Every listing seen this cycle, with evaluation results attached
    pub listings: Vec<Listing>,
}

impl ScanSummary {
    /// Every target that was tried errored out.
    pub fn failed(&self) -> bool {
        self.targets_attempted > 0 && self.targets_failed == self.targets_attempted
    }
}

/// Scan → extract → evaluate → dedupe → notify
pub struct Pipeline {
    settings: Settings,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn NotificationStore>,
    notifier: Arc<dyn Notifier>,
    extractor: ListingExtractor,
    status: StatusHandle,
    totals: RunCounters,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn NotificationStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            store,
            notifier,
            extractor: ListingExtractor::default(),
            status: StatusHandle::new(),
            totals: RunCounters::default(),
        }
    }

    pub fn with_status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn totals(&self) -> RunCounters {
        self.totals
    }

    pub async fn run_once(&mut self) -> ScanSummary {
        self.run_once_at(Utc::now()).await
    }

    /// One full cycle. Target failures are counted, never propagated.
    pub async fn run_once_at(&mut self, now: DateTime<Utc>) -> ScanSummary {
        let targets = build_search_targets(&self.settings.search_params());
        let ctx = ExtractContext {
            base_url: self.settings.search.base_url.clone(),
            now,
        };

        let mut cycle = RunCounters {
            scan_runs: 1,
            ..RunCounters::default()
        };
        let mut targets_attempted = 0;
        let mut targets_failed = 0;
        let mut done_areas: HashSet<String> = HashSet::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut evaluated = Vec::new();

        for target in &targets {
            if done_areas.contains(&target.area_name) {
                continue;
            }
            targets_attempted += 1;

            let listings = match self.fetch_and_extract(target, &ctx).await {
                Ok(listings) => listings,
                Err(e) => {
                    warn!(url = %target.url, error = %e, "target_failed");
                    cycle.errors += 1;
                    targets_failed += 1;
                    continue;
                }
            };
            debug!(url = %target.url, raw_count = listings.len(), "page_parse_result");
            if listings.is_empty() {
                continue;
            }
            done_areas.insert(target.area_name.clone());

            for mut listing in listings {
                if !seen_ids.insert(listing.listing_id.clone()) {
                    continue;
                }
                cycle.cards_seen += 1;
                self.process(&mut listing, now, &mut cycle).await;
                evaluated.push(listing);
            }
        }

        self.totals.absorb(&cycle);
        let summary = ScanSummary {
            cycle,
            totals: self.totals,
            targets_attempted,
            targets_failed,
            listings: evaluated,
        };

        let status = if summary.failed() {
            RunStatus::Error
        } else {
            RunStatus::Ok
        };
        self.status.set(status, Utc::now());

        info!(
            scan_runs_total = self.totals.scan_runs,
            cards_seen = cycle.cards_seen,
            new_listings = cycle.new_listings,
            alerts_sent = cycle.alerts_sent,
            errors = cycle.errors,
            errors_total = self.totals.errors,
            "scan_summary"
        );
        summary
    }

    async fn fetch_and_extract(
        &self,
        target: &SearchTarget,
        ctx: &ExtractContext,
    ) -> anyhow::Result<Vec<Listing>> {
        match target.kind {
            TargetKind::HtmlPage => {
                let Some(html) = self.fetcher.fetch_text(&target.url).await? else {
                    debug!(url = %target.url, "target_empty");
                    return Ok(Vec::new());
                };
                let extraction = self.extractor.extract(Payload::Html(&html), ctx);
                if extraction.strategy != Some(EmbeddedJsonStrategy::NAME) {
                    self.dump_page(&html).await;
                }
                Ok(extraction.listings)
            }
            TargetKind::ApiQuery => {
                let Some(json) = self.fetcher.fetch_json(&target.url).await? else {
                    debug!(url = %target.url, "target_empty");
                    return Ok(Vec::new());
                };
                Ok(self.extractor.extract(Payload::Json(&json), ctx).listings)
            }
        }
    }

    /// Keep the last page without embedded data around for selector debugging.
    async fn dump_page(&self, html: &str) {
        let Some(dir) = &self.settings.runtime.debug_dir else {
            return;
        };
        let path = dir.join(DEBUG_DUMP_FILE);
        let result: std::io::Result<()> = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, html).await
        }
        .await;
        match result {
            Ok(()) => debug!(path = %path.display(), "debug_page_dumped"),
            Err(e) => warn!(path = %path.display(), error = %e, "debug_dump_failed"),
        }
    }

    async fn process(&self, listing: &mut Listing, now: DateTime<Utc>, cycle: &mut RunCounters) {
        let filters = &self.settings.filters;
        if !evaluate(listing, &self.settings.search, filters, now) {
            return;
        }
        if listing.match_score < filters.soft_match_threshold {
            debug!(id = %listing.listing_id, score = listing.match_score, "below_threshold");
            return;
        }

        let fp = fingerprint(listing);
        match self.store.already_notified(&listing.listing_id, &fp) {
            Ok(true) => {
                debug!(id = %listing.listing_id, "already_notified");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(id = %listing.listing_id, error = %e, "store_lookup_failed");
                cycle.errors += 1;
                return;
            }
        }
        cycle.new_listings += 1;

        let body = format_alert(listing, now);
        let to = &self.settings.notify.phone_e164;
        if !self.notifier.send(&body, to).await {
            warn!(id = %listing.listing_id, "alert_not_delivered");
            return;
        }
        cycle.alerts_sent += 1;

        if let Err(e) = self.store.upsert_notification(&listing.listing_id, &fp) {
            warn!(id = %listing.listing_id, error = %e, "store_upsert_failed");
            cycle.errors += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Listing {
        let mut l = Listing::new("L1", Utc::now());
        l.price_monthly = 30000;
        l.deposit = Some(100000);
        l.title = "2 BHK in Bellandur".to_string();
        l
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = fingerprint(&listing());
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        // fields outside the identity tuple don't matter
        let mut b = listing();
        b.amenities = vec!["gym".into()];
        b.match_score = 99;
        assert_eq!(fingerprint(&b), a);
    }

    #[test]
    fn fingerprint_tracks_price_deposit_title() {
        let base = fingerprint(&listing());

        let mut l = listing();
        l.price_monthly = 31000;
        assert_ne!(fingerprint(&l), base);

        let mut l = listing();
        l.deposit = None;
        assert_ne!(fingerprint(&l), base);

        let mut l = listing();
        l.title.push('!');
        assert_ne!(fingerprint(&l), base);
    }

    #[test]
    fn fingerprint_separates_fields() {
        let mut a = Listing::new("1", Utc::now());
        a.price_monthly = 23;
        let mut b = Listing::new("12", Utc::now());
        b.price_monthly = 3;
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn counters_accumulate() {
        let mut totals = RunCounters::default();
        let cycle = RunCounters {
            scan_runs: 1,
            cards_seen: 4,
            new_listings: 2,
            alerts_sent: 1,
            errors: 1,
        };
        totals.absorb(&cycle);
        totals.absorb(&cycle);
        assert_eq!(totals.scan_runs, 2);
        assert_eq!(totals.cards_seen, 8);
        assert_eq!(totals.errors, 2);
    }
}
