//! Listing property tests.
//!
//! Untrusted filter input either lists through the allow-list or is rejected
//! as an invalid filter, both through the service and over HTTP.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use docstore_api::{create_router, ApiConfig, AppState, StaticUsersGateway};
use docstore_test_utils::{
    assertions, fixtures, generators, AccessorKind, DocError, DocumentDraft, DocumentService, Filter,
    InMemoryContentStore,
};
use proptest::prelude::*;
use tokio::runtime::Runtime;
use tower::ServiceExt; // for `oneshot`

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

async fn seeded_service() -> Result<DocumentService<InMemoryContentStore>, TestCaseError> {
    let docs = fixtures::in_memory_service();
    fixtures::save_json(
        &docs,
        "alice",
        DocumentDraft::json("settings").with_grant(["bob"]),
        &serde_json::json!({ "theme": "dark" }),
    )
    .await
    .map_err(|e| TestCaseError::fail(format!("Failed to seed: {}", e)))?;
    Ok(docs)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The service accepts exactly the filters the allow-list parses.
    #[test]
    fn prop_service_rejects_filters_outside_allow_list(
        (key, value) in generators::arb_filter_input(),
        kind in generators::arb_accessor_kind(),
        identity in generators::arb_identity(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let docs = seeded_service().await?;
            let result = docs.list_documents(kind, &identity, &key, &value, 10).await;

            if Filter::parse(&key, &value).is_ok() {
                prop_assert!(result.is_ok(), "{}={} rejected: {:?}", key, value, result);
            } else {
                assertions::assert_invalid_filter(&result);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Over HTTP a rejected filter is a 400 that names the allowed keys.
    #[test]
    fn prop_http_reports_allowed_filter_keys(
        (key, value) in generators::arb_filter_input(),
        kind in generators::arb_accessor_kind(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let docs = seeded_service().await?;
            let users = StaticUsersGateway::new().with_token("t-bob", "bob");
            let state = Arc::new(AppState::new(docs, Arc::new(users), ApiConfig::default()));
            let app = create_router(state);

            let mut uri = format!(
                "/api/v1/docs?key={}&value={}&limit=10",
                urlencoding::encode(&key),
                urlencoding::encode(&value)
            );
            if kind == AccessorKind::Grantee {
                uri.push_str("&login=bob");
            }
            let request = Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, "Bearer t-bob")
                .body(Body::empty())
                .map_err(|e| TestCaseError::fail(format!("Failed to build request: {}", e)))?;

            let response = app
                .oneshot(request)
                .await
                .map_err(|e| TestCaseError::fail(format!("Request failed: {:?}", e)))?;
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .map_err(|e| TestCaseError::fail(format!("Failed to read body: {:?}", e)))?;
            let json: serde_json::Value = serde_json::from_slice(&body)
                .map_err(|e| TestCaseError::fail(format!("Failed to parse response: {}", e)))?;

            match Filter::parse(&key, &value) {
                Ok(_) => {
                    prop_assert_eq!(status, StatusCode::OK);
                    prop_assert!(json["docs"].is_array());
                }
                Err(DocError::InvalidFilter { key: rejected, .. }) => {
                    prop_assert_eq!(status, StatusCode::BAD_REQUEST);
                    prop_assert_eq!(&json["code"], "INVALID_FILTER");
                    prop_assert_eq!(&json["details"]["key"], rejected.as_str());
                    prop_assert_eq!(json["details"]["allowed"].as_array().map(Vec::len), Some(5));
                }
                Err(other) => {
                    return Err(TestCaseError::fail(format!("Unexpected parse error: {}", other)));
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
