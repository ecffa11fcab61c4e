/**
 * Analytics Routes
 * Page-view collection and the admin dashboard summary
 */
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Local, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document},
    options::FindOptions,
};
use serde::{Deserialize, Serialize};

use crate::{
    analytics::{self, client_country, client_ip, parse_user_agent, Period, UNKNOWN},
    db::models::{DailyStats, PageView, PageViewInput},
    error::{ApiError, ApiResult},
    routes::{Ack, ApiQuery, DataResponse},
    session::{require_role, Role},
    AppState,
};

const FETCH_FAILED: &str = "Failed to fetch analytics data";

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_page_views: u64,
    pub unique_visitors: usize,
    pub bounce_rate: u32,
    pub avg_time_on_page: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub date: String,
    pub visits: i64,
    pub unique_visitors: i64,
}

#[derive(Debug, Serialize)]
pub struct PageCount {
    pub path: String,
    pub views: i64,
}

#[derive(Debug, Serialize)]
pub struct ReferrerCount {
    pub source: String,
    pub visits: i64,
}

#[derive(Debug, Serialize)]
pub struct DeviceCount {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct BrowserCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct CountryCount {
    pub code: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub overview: Overview,
    pub daily_data: Vec<DailyPoint>,
    pub top_pages: Vec<PageCount>,
    pub top_referrers: Vec<ReferrerCount>,
    pub device_breakdown: Vec<DeviceCount>,
    pub browser_breakdown: Vec<BrowserCount>,
    pub country_breakdown: Vec<CountryCount>,
    pub period: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Group page views in the window by `field`, most frequent first.
/// Entries come back as `(label, count)`; a missing label reads as "unknown".
async fn top_values(
    state: &AppState,
    window: &Document,
    field: &str,
    exclude: Option<&str>,
    limit: Option<i64>,
) -> ApiResult<Vec<(String, i64)>> {
    let mut matcher = doc! { "timestamp": window.clone() };
    if let Some(excluded) = exclude {
        matcher.insert(field, doc! { "$ne": excluded });
    }

    let mut pipeline = vec![
        doc! { "$match": matcher },
        doc! { "$group": { "_id": format!("${}", field), "count": { "$sum": 1 } } },
        doc! { "$sort": { "count": -1, "_id": 1 } },
    ];
    if let Some(limit) = limit {
        pipeline.push(doc! { "$limit": limit });
    }

    let groups: Vec<Document> = state
        .db
        .page_views()
        .aggregate(pipeline, None)
        .await
        .map_err(|e| ApiError::database(FETCH_FAILED, e))?
        .try_collect()
        .await
        .map_err(|e| ApiError::database(FETCH_FAILED, e))?;

    Ok(groups.iter().map(group_entry).collect())
}

fn group_entry(group: &Document) -> (String, i64) {
    let label = match group.get("_id") {
        Some(Bson::String(s)) if !s.is_empty() => s.clone(),
        _ => "unknown".to_string(),
    };
    let count = match group.get("count") {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    };
    (label, count)
}

fn daily_point(stats: DailyStats) -> DailyPoint {
    DailyPoint {
        date: stats
            .date
            .to_chrono()
            .with_timezone(&Local)
            .format("%Y-%m-%d")
            .to_string(),
        visits: stats.total_visits,
        unique_visitors: stats.unique_visitors,
    }
}

/// GET /api/analytics?period=day|week|month|year|all
pub async fn get_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Admin)?;

    let period = match query.period.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => raw.parse::<Period>().map_err(ApiError::BadRequest)?,
        None => Period::default(),
    };

    let (start, end) = period.window(Local::now());
    let start = start.with_timezone(&Utc);
    let end = end.with_timezone(&Utc);
    let window = doc! {
        "$gte": BsonDateTime::from_chrono(start),
        "$lte": BsonDateTime::from_chrono(end),
    };

    let total_page_views = state
        .db
        .page_views()
        .count_documents(doc! { "timestamp": window.clone() }, None)
        .await
        .map_err(|e| ApiError::database(FETCH_FAILED, e))?;

    let unique_visitors = state
        .db
        .page_views()
        .distinct("ip", doc! { "timestamp": window.clone() }, None)
        .await
        .map_err(|e| ApiError::database(FETCH_FAILED, e))?
        .iter()
        .filter(|ip| ip.as_str().is_some_and(|ip| ip != UNKNOWN))
        .count();

    let options = FindOptions::builder().sort(doc! { "date": 1 }).build();
    let daily_data: Vec<DailyPoint> = state
        .db
        .daily_stats()
        .find(doc! { "date": window.clone() }, options)
        .await
        .map_err(|e| ApiError::database(FETCH_FAILED, e))?
        .try_collect::<Vec<DailyStats>>()
        .await
        .map_err(|e| ApiError::database(FETCH_FAILED, e))?
        .into_iter()
        .map(daily_point)
        .collect();

    let top_pages = top_values(&state, &window, "path", None, Some(10))
        .await?
        .into_iter()
        .map(|(path, views)| PageCount { path, views })
        .collect();
    let top_referrers = top_values(&state, &window, "referrer", Some(""), Some(10))
        .await?
        .into_iter()
        .map(|(source, visits)| ReferrerCount { source, visits })
        .collect();
    let device_breakdown = top_values(&state, &window, "device", None, None)
        .await?
        .into_iter()
        .map(|(kind, count)| DeviceCount { kind, count })
        .collect();
    let browser_breakdown = top_values(&state, &window, "browser", None, Some(8))
        .await?
        .into_iter()
        .map(|(name, count)| BrowserCount { name, count })
        .collect();
    let country_breakdown = top_values(&state, &window, "country", Some(UNKNOWN), Some(10))
        .await?
        .into_iter()
        .map(|(code, count)| CountryCount { code, count })
        .collect();

    Ok(Json(DataResponse::new(AnalyticsSummary {
        overview: Overview {
            total_page_views,
            unique_visitors,
            bounce_rate: 0,
            avg_time_on_page: 0,
        },
        daily_data,
        top_pages,
        top_referrers,
        device_breakdown,
        browser_breakdown,
        country_breakdown,
        period: period.as_str().to_string(),
        start_date: start,
        end_date: end,
    })))
}

/// POST /api/analytics/pageview - public. A missing or unreadable body
/// records a view of `/`.
pub async fn record_pageview(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let input: PageViewInput = serde_json::from_slice(&body).unwrap_or_default();

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let client = parse_user_agent(&user_agent);

    let view = PageView {
        id: None,
        path: input
            .path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string()),
        referrer: input.referrer.unwrap_or_default().trim().to_string(),
        user_agent,
        ip: client_ip(&headers),
        country: client_country(&headers),
        device: client.device,
        browser: client.browser,
        os: client.os,
        timestamp: BsonDateTime::now(),
    };

    analytics::record_page_view(&state.db, view)
        .await
        .map_err(|e| ApiError::database("Failed to record page view", e))?;

    Ok(Ack::new("Page view recorded"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app, send, token};
    use axum::http::StatusCode;

    #[test]
    fn test_group_entry_handles_missing_labels_and_int_widths() {
        let (label, count) = group_entry(&doc! { "_id": Bson::Null, "count": 3_i32 });
        assert_eq!((label.as_str(), count), ("unknown", 3));

        let (label, count) = group_entry(&doc! { "_id": "/blog", "count": 7_i64 });
        assert_eq!((label.as_str(), count), ("/blog", 7));
    }

    #[test]
    fn test_summary_field_names() {
        let summary = AnalyticsSummary {
            overview: Overview {
                total_page_views: 2,
                unique_visitors: 1,
                bounce_rate: 0,
                avg_time_on_page: 0,
            },
            daily_data: vec![],
            top_pages: vec![],
            top_referrers: vec![],
            device_breakdown: vec![DeviceCount {
                kind: "mobile".into(),
                count: 2,
            }],
            browser_breakdown: vec![],
            country_breakdown: vec![],
            period: "week".into(),
            start_date: Utc::now(),
            end_date: Utc::now(),
        };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["overview"]["totalPageViews"], 2);
        assert_eq!(json["overview"]["avgTimeOnPage"], 0);
        assert_eq!(json["deviceBreakdown"][0]["type"], "mobile");
        assert!(json.get("startDate").is_some());
    }

    #[tokio::test]
    async fn test_dashboard_is_admin_only() {
        let (status, _) = send(app().await, "GET", "/api/analytics", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let editor = token(Role::Editor);
        let (status, _) = send(app().await, "GET", "/api/analytics", Some(&editor), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_period_is_rejected() {
        let admin = token(Role::Admin);
        let (status, body) = send(
            app().await,
            "GET",
            "/api/analytics?period=fortnight",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("fortnight"));
    }
}
