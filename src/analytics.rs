//! Page-view recording and the helpers behind the analytics dashboard.

use std::str::FromStr;

use axum::http::HeaderMap;
use chrono::{DateTime, Days, Local, Months, NaiveDate, NaiveTime, TimeZone};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    options::UpdateOptions,
};
use once_cell::sync::Lazy;
use woothee::parser::Parser;

use crate::{
    db::{models::PageView, Db},
    error::is_duplicate_key,
};

pub const UNKNOWN: &str = "Unknown";

static UA_PARSER: Lazy<Parser> = Lazy::new(Parser::new);

/// Browser, operating system and device class derived from a user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub browser: String,
    pub os: String,
    pub device: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            browser: UNKNOWN.to_string(),
            os: UNKNOWN.to_string(),
            device: "desktop".to_string(),
        }
    }
}

fn known(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn parse_user_agent(user_agent: &str) -> ClientInfo {
    let mut info = ClientInfo::default();
    if user_agent.trim().is_empty() {
        return info;
    }

    if let Some(result) = UA_PARSER.parse(user_agent) {
        if let Some(browser) = known(result.name) {
            info.browser = browser;
        }
        if let Some(os) = known(result.os) {
            info.os = os;
        }
        info.device = match result.category {
            "smartphone" | "mobilephone" if result.os == "iPad" => "tablet",
            "smartphone" | "mobilephone" => "mobile",
            "appliance" => "console",
            _ => "desktop",
        }
        .to_string();
    }

    info
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// First hop of `x-forwarded-for`, then `x-real-ip`.
pub fn client_ip(headers: &HeaderMap) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').map(str::trim).find(|s| !s.is_empty()))
        .or_else(|| header_str(headers, "x-real-ip"))
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Country code set by the CDN edge.
pub fn client_country(headers: &HeaderMap) -> String {
    header_str(headers, "cf-ipcountry")
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Make a label safe to use as a field name inside a frequency map.
/// `.` would split the path, a leading `$` reads as an operator and NUL
/// cannot appear in a BSON key at all.
pub fn encode_key(label: &str) -> String {
    let label = label.trim();
    if label.is_empty() {
        return UNKNOWN.to_string();
    }
    let encoded = label.replace('.', "\u{FF0E}").replace('\0', "\u{FFFD}");
    match encoded.strip_prefix('$') {
        Some(rest) => format!("\u{FF04}{}", rest),
        None => encoded,
    }
}

fn local_at(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&date.and_time(time)).earliest()
}

/// Local midnight of the day containing `now`.
pub fn day_start(now: DateTime<Local>) -> DateTime<Local> {
    local_at(now.date_naive(), NaiveTime::MIN).unwrap_or(now)
}

/// 23:59:59.999 local on the day containing `now`.
pub fn day_end(now: DateTime<Local>) -> DateTime<Local> {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        .and_then(|t| local_at(now.date_naive(), t))
        .unwrap_or(now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Day,
    #[default]
    Week,
    Month,
    Year,
    All,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::All => "all",
        }
    }

    /// Inclusive `[start, end]` window ending tonight.
    pub fn window(&self, now: DateTime<Local>) -> (DateTime<Local>, DateTime<Local>) {
        let end = day_end(now);
        let today = day_start(now);
        let start = match self {
            Period::Day => Some(today),
            Period::Week => today.checked_sub_days(Days::new(7)),
            Period::Month => today.checked_sub_months(Months::new(1)),
            Period::Year => today.checked_sub_months(Months::new(12)),
            Period::All => NaiveDate::from_ymd_opt(2020, 1, 1)
                .and_then(|d| local_at(d, NaiveTime::MIN)),
        };
        (start.map(day_start).unwrap_or(today), end)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            "all" => Ok(Period::All),
            other => Err(format!(
                "Invalid period '{}'. Use one of: day, week, month, year, all",
                other
            )),
        }
    }
}

/// The `$inc` upsert applied to a day's stats document for one page view.
pub fn daily_stats_update(view: &PageView, unique_visitor: bool) -> Document {
    let mut inc = doc! { "totalVisits": 1_i64 };
    let mut on_insert = Document::new();

    if unique_visitor {
        inc.insert("uniqueVisitors", 1_i64);
    } else {
        on_insert.insert("uniqueVisitors", 0_i64);
    }

    inc.insert(format!("pageViews.{}", encode_key(&view.path)), 1_i64);
    if view.referrer.trim().is_empty() {
        on_insert.insert("referrers", Document::new());
    } else {
        inc.insert(format!("referrers.{}", encode_key(&view.referrer)), 1_i64);
    }
    inc.insert(format!("countries.{}", encode_key(&view.country)), 1_i64);
    inc.insert(format!("devices.{}", encode_key(&view.device)), 1_i64);
    inc.insert(format!("browsers.{}", encode_key(&view.browser)), 1_i64);
    inc.insert(format!("operatingSystems.{}", encode_key(&view.os)), 1_i64);

    let mut update = doc! { "$inc": inc };
    if !on_insert.is_empty() {
        update.insert("$setOnInsert", on_insert);
    }
    update
}

/// Store a page view and fold it into today's stats document.
pub async fn record_page_view(db: &Db, view: PageView) -> Result<(), mongodb::error::Error> {
    let today = BsonDateTime::from_chrono(day_start(view.timestamp.to_chrono().with_timezone(&Local)));

    // Checked before the insert: two simultaneous first views from one ip
    // can both count as unique. The dashboard overview counts distinct ips
    // from the raw views and is exact.
    let unique_visitor = if view.ip == UNKNOWN {
        false
    } else {
        let seen = db
            .page_views()
            .count_documents(doc! { "ip": &view.ip, "timestamp": { "$gte": today } }, None)
            .await?;
        seen == 0
    };

    // Encode the update up front so a label BSON rejects fails the request
    // before the raw view is stored.
    let update = daily_stats_update(&view, unique_visitor);
    mongodb::bson::to_vec(&update)?;
    db.page_views().insert_one(&view, None).await?;

    let filter = doc! { "date": today };
    let options = UpdateOptions::builder().upsert(true).build();
    let stats = db.daily_stats();

    // Two first-of-the-day views can both attempt the insert; the unique
    // index rejects one, and the second attempt then matches the winner.
    match stats
        .update_one(filter.clone(), update.clone(), options.clone())
        .await
    {
        Err(e) if is_duplicate_key(&e) => {
            tracing::debug!("daily stats insert raced, retrying as update");
            stats.update_one(filter, update, options).await?;
        }
        other => {
            other?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Timelike;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    fn view(path: &str, referrer: &str) -> PageView {
        PageView {
            id: None,
            path: path.into(),
            referrer: referrer.into(),
            user_agent: String::new(),
            ip: "203.0.113.9".into(),
            country: UNKNOWN.into(),
            device: "desktop".into(),
            browser: "Firefox".into(),
            os: "Linux".into(),
            timestamp: BsonDateTime::now(),
        }
    }

    #[test]
    fn test_parse_user_agent_desktop_and_mobile() {
        let desktop = parse_user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        );
        assert_eq!(desktop.browser, "Chrome");
        assert_eq!(desktop.device, "desktop");

        let mobile = parse_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
        );
        assert_eq!(mobile.device, "mobile");
    }

    #[test]
    fn test_parse_empty_user_agent_defaults() {
        assert_eq!(parse_user_agent(""), ClientInfo::default());
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), UNKNOWN);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), "10.0.0.2");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), "198.51.100.7");
    }

    #[test]
    fn test_client_country() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_country(&headers), UNKNOWN);
        headers.insert("cf-ipcountry", HeaderValue::from_static("DE"));
        assert_eq!(client_country(&headers), "DE");
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("/blog/hello"), "/blog/hello");
        assert_eq!(encode_key("example.com"), "example\u{FF0E}com");
        assert_eq!(encode_key("$where"), "\u{FF04}where");
        assert_eq!(encode_key("  "), UNKNOWN);
        assert_eq!(encode_key("/a\0b"), "/a\u{FFFD}b");
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("all".parse::<Period>().unwrap(), Period::All);
        assert!("fortnight".parse::<Period>().is_err());
        assert_eq!(Period::default(), Period::Week);
    }

    #[test]
    fn test_period_windows() {
        let now = at(2024, 3, 15, 14, 30);

        let (start, end) = Period::Day.window(now);
        assert_eq!(start, at(2024, 3, 15, 0, 0));
        assert_eq!(end.date_naive(), now.date_naive());
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));

        let (start, _) = Period::Week.window(now);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());

        let (start, _) = Period::Month.window(now);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());

        let (start, _) = Period::Year.window(now);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2023, 3, 15).unwrap());

        let (start, _) = Period::All.window(now);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
    }

    #[test]
    fn test_daily_update_increments_every_map() {
        let update = daily_stats_update(&view("/blog/a.b", "https://news.ycombinator.com"), true);
        let inc = update.get_document("$inc").unwrap();
        assert_eq!(inc.get_i64("totalVisits").unwrap(), 1);
        assert_eq!(inc.get_i64("uniqueVisitors").unwrap(), 1);
        assert!(inc.contains_key("pageViews./blog/a\u{FF0E}b"));
        assert!(inc.contains_key("referrers.https://news\u{FF0E}ycombinator\u{FF0E}com"));
        assert!(inc.contains_key("countries.Unknown"));
        assert!(inc.contains_key("operatingSystems.Linux"));
        assert!(update.get("$setOnInsert").is_none());
    }

    #[test]
    fn test_daily_update_skips_empty_referrer() {
        let update = daily_stats_update(&view("/", ""), false);
        let inc = update.get_document("$inc").unwrap();
        assert!(!inc.keys().any(|k| k.starts_with("referrers.")));
        assert!(!inc.contains_key("uniqueVisitors"));

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert_eq!(on_insert.get_i64("uniqueVisitors").unwrap(), 0);
        assert!(on_insert.get_document("referrers").unwrap().is_empty());
    }

    #[test]
    fn test_daily_update_with_nul_label_encodes() {
        let update = daily_stats_update(&view("/a\0b", "ref\0erer"), true);
        assert!(mongodb::bson::to_vec(&update).is_ok());

        let inc = update.get_document("$inc").unwrap();
        assert!(inc.contains_key("pageViews./a\u{FFFD}b"));
    }
}
