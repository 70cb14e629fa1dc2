//! Query runner tests against a mocked reporting endpoint

use std::sync::Arc;

use gatable::{AnalyticsService, Cell, OutputMode, QueryOutput, QueryPayload, Settings, StaticToken, ViewId};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HEADERS: [(&str, &str, &str); 4] = [
    ("ga:date", "DIMENSION", "STRING"),
    ("ga:sessions", "METRIC", "INTEGER"),
    ("ga:pageviews", "METRIC", "INTEGER"),
    ("ga:bounces", "METRIC", "INTEGER"),
];

/// A page of `count` daily rows starting at 1-based `start`.
fn page(start: u64, count: u64, total: u64, per_page: u64) -> Value {
    let rows: Vec<Value> = (start..start + count)
        .map(|i| json!([format!("202006{:02}", i), (i * 10).to_string(), (i * 30).to_string(), i.to_string()]))
        .collect();

    json!({
        "kind": "analytics#gaData",
        "itemsPerPage": per_page,
        "totalResults": total,
        "profileInfo": {"profileId": "12345"},
        "containsSampledData": false,
        "columnHeaders": HEADERS
            .iter()
            .map(|(name, column_type, data_type)| json!({
                "name": name,
                "columnType": column_type,
                "dataType": data_type
            }))
            .collect::<Vec<_>>(),
        "totalsForAllResults": {"ga:sessions": "4650"},
        "rows": rows
    })
}

fn service(server: &MockServer) -> AnalyticsService {
    let settings = Settings {
        api_base_url: Some(server.uri()),
        ..Default::default()
    };
    AnalyticsService::with_settings(Arc::new(StaticToken::new("test-token")), &settings).unwrap()
}

fn thirty_days(max_results: Option<u32>) -> QueryPayload {
    let mut builder = QueryPayload::builder("2020-06-01", "2020-06-30")
        .metrics(["ga:sessions", "ga:pageviews", "ga:bounces"])
        .dimension("ga:date");
    if let Some(max) = max_results {
        builder = builder.max_results(max);
    }
    builder.build().unwrap()
}

async fn mount_page(server: &MockServer, start: u64, count: u64, total: u64, per_page: u64) {
    Mock::given(method("GET"))
        .and(query_param("start-index", start.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(start, count, total, per_page)))
        .expect(1)
        .mount(server)
        .await;
}

async fn forbid_other_requests(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_thirty_days_in_pages_of_ten() {
    let server = MockServer::start().await;
    mount_page(&server, 1, 10, 30, 10).await;
    mount_page(&server, 11, 10, 30, 10).await;
    mount_page(&server, 21, 10, 30, 10).await;
    forbid_other_requests(&server).await;

    let view = ViewId::parse("12345").unwrap();
    let table = service(&server).run_query(&view, &thirty_days(Some(10))).await.unwrap();

    assert_eq!(table.len(), 30);
    assert_eq!(table.column_names(), vec!["date", "sessions", "pageviews", "bounces"]);

    let first = table.row(0).unwrap();
    assert_eq!(first.get("date"), Some(&Cell::Str("20200601".into())));
    assert_eq!(first.get("sessions"), Some(&Cell::Int(10)));

    let last = table.row(29).unwrap();
    assert_eq!(last.get("date"), Some(&Cell::Str("20200630".into())));
    assert_eq!(last.get("bounces"), Some(&Cell::Int(30)));
}

#[tokio::test]
async fn test_uneven_total_fetches_ceil_pages() {
    let server = MockServer::start().await;
    mount_page(&server, 1, 10, 25, 10).await;
    mount_page(&server, 11, 10, 25, 10).await;
    mount_page(&server, 21, 5, 25, 10).await;
    forbid_other_requests(&server).await;

    let view = ViewId::parse("12345").unwrap();
    let raw = service(&server).run_query_raw(&view, &thirty_days(Some(10))).await.unwrap();

    assert_eq!(raw.rows().len(), 25);
    assert_eq!(raw.pages_fetched, 3);
    assert_eq!(raw.total_pages(), 3);
}

#[tokio::test]
async fn test_single_page_issues_no_follow_up() {
    let server = MockServer::start().await;
    mount_page(&server, 1, 30, 30, 1000).await;
    forbid_other_requests(&server).await;

    let view = ViewId::parse("12345").unwrap();
    let table = service(&server).run_query(&view, &thirty_days(None)).await.unwrap();

    assert_eq!(table.len(), 30);
}

#[tokio::test]
async fn test_raw_mode_matches_table_mode() {
    let server = MockServer::start().await;
    for start in [1, 11, 21] {
        Mock::given(method("GET"))
            .and(query_param("start-index", start.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(start, 10, 30, 10)))
            .mount(&server)
            .await;
    }

    let svc = service(&server);
    let view = ViewId::parse("ga:12345").unwrap();
    let payload = thirty_days(Some(10));

    let raw = match svc.run_query_as(&view, &payload, OutputMode::Raw).await.unwrap() {
        QueryOutput::Raw(raw) => raw,
        QueryOutput::Table(_) => panic!("expected raw output"),
    };
    assert_eq!(raw.rows().len() as u64, raw.total_results());
    assert_eq!(raw.column_headers()[0].name, "ga:date");
    assert_eq!(raw.rows()[0][1], "10");
    assert_eq!(raw.profile_info().unwrap()["profileId"], "12345");

    let table = match svc.run_query_as(&view, &payload, OutputMode::default()).await.unwrap() {
        QueryOutput::Table(table) => table,
        QueryOutput::Raw(_) => panic!("expected table output"),
    };
    assert_eq!(table.len(), raw.rows().len());
}

#[tokio::test]
async fn test_request_carries_payload_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("ids", "ga:12345"))
        .and(query_param("start-date", "2020-06-01"))
        .and(query_param("end-date", "2020-06-30"))
        .and(query_param("metrics", "ga:sessions,ga:pageviews,ga:bounces"))
        .and(query_param("dimensions", "ga:date"))
        .and(query_param("sort", "-ga:date"))
        .and(query_param("filters", "ga:sessions>0"))
        .and(query_param("start-index", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1, 3, 3, 1000)))
        .expect(1)
        .mount(&server)
        .await;

    let payload = QueryPayload::builder("2020-06-01", "2020-06-30")
        .metric("ga:sessions, ga:pageviews, ga:bounces")
        .dimension("ga:date")
        .sort("-ga:date")
        .filters("ga:sessions>0")
        .build()
        .unwrap();

    let table = service(&server)
        .run_query(&ViewId::from(12345u64), &payload)
        .await
        .unwrap();
    assert_eq!(table.len(), 3);
}

#[tokio::test]
async fn test_payload_start_index_is_first_request() {
    let server = MockServer::start().await;
    mount_page(&server, 21, 10, 30, 10).await;
    forbid_other_requests(&server).await;

    let payload = QueryPayload::builder("2020-06-01", "2020-06-30")
        .metrics(["ga:sessions", "ga:pageviews", "ga:bounces"])
        .dimension("ga:date")
        .max_results(10)
        .start_index(21)
        .build()
        .unwrap();

    let table = service(&server)
        .run_query(&ViewId::from(12345u64), &payload)
        .await
        .unwrap();
    assert_eq!(table.len(), 10);
    assert_eq!(table.row(0).unwrap().get("date"), Some(&Cell::Str("20200621".into())));
}

#[tokio::test]
async fn test_vendor_rejection_is_query_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "Unknown metric(s): ga:sesions",
                "errors": [{"domain": "global", "reason": "badRequest"}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = service(&server)
        .run_query(&ViewId::from(12345u64), &thirty_days(None))
        .await
        .unwrap_err();

    assert!(err.is_query());
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("Unknown metric(s): ga:sesions"));
}

#[tokio::test]
async fn test_quota_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota Error: profileId 12345 has exceeded the daily request limit."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = service(&server)
        .run_query(&ViewId::from(12345u64), &thirty_days(None))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(429));
}

#[tokio::test]
async fn test_failure_mid_sequence_discards_pages() {
    let server = MockServer::start().await;
    mount_page(&server, 1, 10, 30, 10).await;
    Mock::given(method("GET"))
        .and(query_param("start-index", "11"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "User does not have sufficient permissions for this profile."}
        })))
        .expect(1)
        .mount(&server)
        .await;
    forbid_other_requests(&server).await;

    let result = service(&server)
        .run_query(&ViewId::from(12345u64), &thirty_days(Some(10)))
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_uncoercible_cells_keep_their_string() {
    let server = MockServer::start().await;
    let body = json!({
        "totalResults": 2,
        "itemsPerPage": 1000,
        "columnHeaders": [
            {"name": "ga:source", "columnType": "DIMENSION", "dataType": "STRING"},
            {"name": "ga:sessions", "columnType": "METRIC", "dataType": "INTEGER"},
            {"name": "ga:revenue", "columnType": "METRIC", "dataType": "CURRENCY"}
        ],
        "rows": [["google", "42", "10.5"], ["(other)", "n/a", "-"]]
    });
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let payload = QueryPayload::builder("7daysAgo", "today")
        .metrics(["ga:sessions", "ga:revenue"])
        .dimension("ga:source")
        .build()
        .unwrap();
    let table = service(&server)
        .run_query(&ViewId::from(12345u64), &payload)
        .await
        .unwrap();

    let first = table.row(0).unwrap();
    assert_eq!(first.get("sessions"), Some(&Cell::Int(42)));
    assert_eq!(first.get("revenue"), Some(&Cell::Float(10.5)));

    let second = table.row(1).unwrap();
    assert_eq!(second.get("sessions"), Some(&Cell::Str("n/a".into())));
    assert_eq!(second.get("revenue"), Some(&Cell::Str("-".into())));
}

#[tokio::test]
async fn test_empty_result_has_headers_and_no_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalResults": 0,
            "itemsPerPage": 1000,
            "columnHeaders": [
                {"name": "ga:date", "columnType": "DIMENSION", "dataType": "STRING"},
                {"name": "ga:sessions", "columnType": "METRIC", "dataType": "INTEGER"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = QueryPayload::builder("yesterday", "today")
        .metric("ga:sessions")
        .dimension("ga:date")
        .build()
        .unwrap();
    let table = service(&server)
        .run_query(&ViewId::from(12345u64), &payload)
        .await
        .unwrap();

    assert!(table.is_empty());
    assert_eq!(table.column_names(), vec!["date", "sessions"]);
    assert_eq!(serde_json::to_string(&table).unwrap(), "[]");
}

#[tokio::test]
async fn test_non_json_body_is_query_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = service(&server)
        .run_query(&ViewId::from(12345u64), &thirty_days(None))
        .await
        .unwrap_err();
    assert!(err.is_query());
    assert_eq!(err.status(), None);
}
