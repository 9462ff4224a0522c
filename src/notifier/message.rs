use crate::models::Listing;
use chrono::{DateTime, Utc};

const TOP_AMENITIES: usize = 3;

/// Rupee amount with Indian digit grouping: 1234567 -> "12,34,567".
pub fn format_inr(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let split = digits.len().saturating_sub(3);
    let (mut head, tail) = digits.split_at(split);

    let mut groups = Vec::new();
    while head.len() > 2 {
        let (rest, group) = head.split_at(head.len() - 2);
        groups.push(group);
        head = rest;
    }
    if !head.is_empty() {
        groups.push(head);
    }
    groups.reverse();
    groups.push(tail);

    let grouped = groups.join(",");
    if amount < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn relative_time(posted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(posted) = posted_at else {
        return "unknown".to_string();
    };
    let minutes = (now - posted).num_minutes();
    match minutes {
        m if m < 1 => "just now".to_string(),
        m if m < 60 => format!("{m}m ago"),
        m if m < 60 * 24 => format!("{}h ago", m / 60),
        m => format!("{}d ago", m / (60 * 24)),
    }
}

fn headline(listing: &Listing) -> String {
    let parts: Vec<String> = [
        listing.bhk.map(|n| format!("{n} BHK")),
        listing.furnishing.clone(),
        listing.property_type.clone(),
    ]
    .into_iter()
    .flatten()
    .filter(|p| !p.trim().is_empty())
    .collect();

    if parts.is_empty() {
        listing.title.clone()
    } else {
        parts.join(" · ")
    }
}

/// Alert text for one matched listing
pub fn format_alert(listing: &Listing, now: DateTime<Utc>) -> String {
    let mut lines = vec![format!("🏠 {}", headline(listing))];

    if !listing.location.area_display.is_empty() {
        lines.push(format!("📍 {}", listing.location.area_display));
    }

    let mut price = format!("💰 ₹{}/month", format_inr(listing.price_monthly));
    if let Some(deposit) = listing.deposit {
        price.push_str(&format!(" · Deposit ₹{}", format_inr(deposit)));
    }
    lines.push(price);

    if let Some(sqft) = listing.carpet_sqft {
        lines.push(format!("📐 {sqft} sqft"));
    }
    lines.push(format!("⭐ Score {}/100", listing.match_score));

    let amenities = &listing.soft_matches.amenities_matched;
    if !amenities.is_empty() {
        let top: Vec<&str> = amenities.iter().take(TOP_AMENITIES).map(String::as_str).collect();
        lines.push(format!("✅ {}", top.join(", ")));
    }

    lines.push(format!("🕒 Posted {}", relative_time(listing.posted_at, now)));
    if !listing.url.is_empty() {
        lines.push(listing.url.clone());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn indian_grouping() {
        assert_eq!(format_inr(0), "0");
        assert_eq!(format_inr(950), "950");
        assert_eq!(format_inr(1000), "1,000");
        assert_eq!(format_inr(35000), "35,000");
        assert_eq!(format_inr(250000), "2,50,000");
        assert_eq!(format_inr(1234567), "12,34,567");
        assert_eq!(format_inr(120000000), "12,00,00,000");
        assert_eq!(format_inr(-45000), "-45,000");
    }

    #[test]
    fn relative_times() {
        let at = |d: Duration| Some(now() - d);
        assert_eq!(relative_time(None, now()), "unknown");
        assert_eq!(relative_time(at(Duration::seconds(20)), now()), "just now");
        assert_eq!(relative_time(at(-Duration::minutes(5)), now()), "just now");
        assert_eq!(relative_time(at(Duration::minutes(42)), now()), "42m ago");
        assert_eq!(relative_time(at(Duration::hours(5)), now()), "5h ago");
        assert_eq!(relative_time(at(Duration::days(3)), now()), "3d ago");
    }

    #[test]
    fn full_alert() {
        let mut l = Listing::new("8a9f", now());
        l.url = "https://www.nobroker.in/property/8a9f/detail".to_string();
        l.location.area_display = "Kadubeesanahalli".to_string();
        l.price_monthly = 35000;
        l.deposit = Some(200000);
        l.bhk = Some(2);
        l.furnishing = Some("Semi-Furnished".to_string());
        l.property_type = Some("Apartment".to_string());
        l.carpet_sqft = Some(1100);
        l.match_score = 85;
        l.posted_at = Some(now() - Duration::hours(2));
        l.soft_matches.amenities_matched =
            vec!["gym".into(), "lift".into(), "parking".into(), "security".into()];

        let text = format_alert(&l, now());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "🏠 2 BHK · Semi-Furnished · Apartment");
        assert_eq!(lines[1], "📍 Kadubeesanahalli");
        assert_eq!(lines[2], "💰 ₹35,000/month · Deposit ₹2,00,000");
        assert_eq!(lines[3], "📐 1100 sqft");
        assert_eq!(lines[4], "⭐ Score 85/100");
        assert_eq!(lines[5], "✅ gym, lift, parking");
        assert_eq!(lines[6], "🕒 Posted 2h ago");
        assert_eq!(lines[7], l.url);
    }

    #[test]
    fn sparse_alert_falls_back_to_title() {
        let mut l = Listing::new("x", now());
        l.price_monthly = 18000;
        let text = format_alert(&l, now());
        assert!(text.starts_with("🏠 Rental home\n💰 ₹18,000/month\n"));
        assert!(text.contains("Posted unknown"));
        assert!(!text.contains("Deposit"));
        assert!(!text.contains("sqft"));
    }
}
