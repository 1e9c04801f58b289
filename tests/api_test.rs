use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use rideboard::api::app_router;
use rideboard::auth::AuthService;
use rideboard::models::{User, UserRole};
use rideboard::store::{InjectedFailure, MemoryStore};

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    auth: AuthService,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let auth = AuthService::new("test-secret");
    let router = app_router(store.clone(), store.clone(), store.clone(), auth.clone());
    TestApp {
        router,
        store,
        auth,
    }
}

/// Mints a token for a caller that does not need to exist in the store;
/// authorization is decided from the token's role claim alone.
fn token_with_role(auth: &AuthService, role: UserRole) -> String {
    let caller = User {
        id: 900,
        role,
        first_name: "Olive".to_string(),
        last_name: "Operator".to_string(),
        email: "ops@example.com".to_string(),
        phone_number: "+1-555-0100".to_string(),
    };
    auth.issue_access_token(&caller).unwrap()
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn create_user(app: &TestApp, token: &str, role: &str, name: &str, email: &str) -> i64 {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/users",
            Some(token),
            Some(json!({
                "role": role,
                "first_name": name,
                "last_name": "Reyes",
                "email": email,
                "phone_number": "+63-917-555-0101",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

async fn create_ride(
    app: &TestApp,
    token: &str,
    rider_id: i64,
    driver_id: i64,
    pickup: (f64, f64),
    pickup_time: &str,
) -> i64 {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/rides",
            Some(token),
            Some(json!({
                "status": "en-route",
                "rider_id": rider_id,
                "driver_id": driver_id,
                "pickup_latitude": pickup.0,
                "pickup_longitude": pickup.1,
                "dropoff_latitude": 14.5176,
                "dropoff_longitude": 121.0509,
                "pickup_time": pickup_time,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

async fn create_event(app: &TestApp, token: &str, ride_id: i64, description: &str) -> Value {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/ride-events",
            Some(token),
            Some(json!({
                "ride_id": ride_id,
                "description": description,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

/// Rider, driver and one ride between them, pickup far enough in the
/// future that it sorts newest under the default ordering.
async fn seed_one_ride(app: &TestApp, token: &str) -> (i64, i64, i64) {
    let rider = create_user(app, token, "rider", "Alice", "alice@example.com").await;
    let driver = create_user(app, token, "driver", "Dave", "dave@example.com").await;
    let ride = create_ride(
        app,
        token,
        rider,
        driver,
        (14.5995, 120.9842),
        "2030-05-01T08:00:00Z",
    )
    .await;
    (rider, driver, ride)
}

#[tokio::test]
async fn test_health_check_needs_no_token() {
    let app = test_app();

    let (status, body) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "rideboard");
}

#[tokio::test]
async fn test_listing_without_a_token_is_unauthorized() {
    let app = test_app();

    let (status, body) = send(&app, request("GET", "/api/rides", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("error").is_some());
}

#[tokio::test]
async fn test_non_admin_roles_are_forbidden() {
    let app = test_app();

    for role in [UserRole::Rider, UserRole::Driver] {
        let token = token_with_role(&app.auth, role);
        let (status, _) = send(&app, request("GET", "/api/rides", Some(&token), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn test_garbled_tokens_are_unauthorized() {
    let app = test_app();

    let (status, _) = send(&app, request("GET", "/api/rides", Some("not-a-jwt"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong_scheme = Request::builder()
        .method("GET")
        .uri("/api/rides")
        .header(header::AUTHORIZATION, "Token abc123")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong_scheme).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let other_signer = AuthService::new("different-secret");
    let foreign = token_with_role(&other_signer, UserRole::Admin);
    let (status, _) = send(&app, request("GET", "/api/rides", Some(&foreign), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_pagination_is_a_client_error() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);

    let (status, body) = send(&app, request("GET", "/api/rides?page=0", Some(&token), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid pagination");

    let (status, _) = send(
        &app,
        request("GET", "/api/rides?page_size=-5", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A non-numeric page never reaches the handler; the extractor rejects it.
    let (status, _) = send(
        &app,
        request("GET", "/api/rides?page=abc", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_listing_embeds_parties_and_window_but_no_history() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    let (_, _, ride) = seed_one_ride(&app, &token).await;
    create_event(&app, &token, ride, "Driver assigned").await;

    let (status, body) = send(&app, request("GET", "/api/rides", Some(&token), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["page"], 1);
    assert_eq!(body["page_size"], 10);

    let item = &body["results"][0];
    assert_eq!(item["id"].as_i64().unwrap(), ride);
    assert_eq!(item["rider"]["email"], "alice@example.com");
    assert_eq!(item["driver"]["role"], "driver");
    assert_eq!(item["todays_ride_events"].as_array().unwrap().len(), 1);
    assert_eq!(
        item["todays_ride_events"][0]["description"],
        "Driver assigned"
    );
    assert!(item.get("ride_events").is_none());
}

#[tokio::test]
async fn test_detail_carries_both_history_and_window() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    let (_, _, ride) = seed_one_ride(&app, &token).await;
    create_event(&app, &token, ride, "Ride requested").await;
    create_event(&app, &token, ride, "Driver assigned").await;

    let uri = format!("/api/rides/{ride}");
    let (status, body) = send(&app, request("GET", &uri, Some(&token), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_i64().unwrap(), ride);
    assert_eq!(body["ride_events"].as_array().unwrap().len(), 2);
    assert_eq!(body["todays_ride_events"].as_array().unwrap().len(), 2);
    // Full history is chronological.
    assert_eq!(body["ride_events"][0]["description"], "Ride requested");

    let (status, body) = send(&app, request("GET", "/api/rides/424242", Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn test_unknown_status_filter_yields_an_empty_page() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    seed_one_ride(&app, &token).await;

    let (status, body) = send(
        &app,
        request("GET", "/api/rides?status=teleporting", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
    assert!(body["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_geo_ordering_and_its_fallback_over_http() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    let rider = create_user(&app, &token, "rider", "Alice", "alice@example.com").await;
    let driver = create_user(&app, &token, "driver", "Dave", "dave@example.com").await;
    let manila = create_ride(
        &app,
        &token,
        rider,
        driver,
        (14.5995, 120.9842),
        "2030-05-01T08:00:00Z",
    )
    .await;
    let cebu = create_ride(
        &app,
        &token,
        rider,
        driver,
        (10.3157, 123.8854),
        "2030-05-01T07:00:00Z",
    )
    .await;

    // Proximity to the Cebu pickup beats the newer Manila pickup.
    let (status, body) = send(
        &app,
        request(
            "GET",
            "/api/rides?latitude=10.3157&longitude=123.8854",
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["id"].as_i64().unwrap(), cebu);

    // A malformed pair quietly falls back to newest pickup first.
    let (status, body) = send(
        &app,
        request(
            "GET",
            "/api/rides?latitude=abc&longitude=123.8854",
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["id"].as_i64().unwrap(), manila);
}

#[tokio::test]
async fn test_ride_crud_roundtrip() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    let (_, _, ride) = seed_one_ride(&app, &token).await;
    let uri = format!("/api/rides/{ride}");

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &uri,
            Some(&token),
            Some(json!({"status": "dropoff"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "dropoff");

    let (status, _) = send(&app, request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request("GET", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_email_is_a_conflict() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    create_user(&app, &token, "rider", "Alice", "alice@example.com").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/users",
            Some(&token),
            Some(json!({
                "role": "driver",
                "first_name": "Impostor",
                "last_name": "Reyes",
                "email": "alice@example.com",
                "phone_number": "+63-917-555-0102",
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Email already in use");
}

#[tokio::test]
async fn test_ride_with_unknown_parties_is_a_client_error() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/rides",
            Some(&token),
            Some(json!({
                "status": "pickup",
                "rider_id": 8888,
                "driver_id": 9999,
                "pickup_latitude": 14.5995,
                "pickup_longitude": 120.9842,
                "dropoff_latitude": 14.5176,
                "dropoff_longitude": 121.0509,
                "pickup_time": "2030-05-01T08:00:00Z",
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid reference");
}

#[tokio::test]
async fn test_deleting_a_user_cascades_over_http() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    let (rider, _, ride) = seed_one_ride(&app, &token).await;
    create_event(&app, &token, ride, "Ride requested").await;

    let uri = format!("/api/users/{rider}");
    let (status, _) = send(&app, request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, request("GET", "/api/rides", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let uri = format!("/api/ride-events?ride_id={ride}");
    let (status, body) = send(&app, request("GET", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_ride_event_lifecycle_over_http() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    let (_, _, ride) = seed_one_ride(&app, &token).await;

    let event = create_event(&app, &token, ride, "Ride requested").await;
    let event_id = event["id"].as_i64().unwrap();
    assert!(event["created_at"].as_str().is_some());

    let uri = format!("/api/ride-events/{event_id}");
    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &uri,
            Some(&token),
            Some(json!({"description": "Driver en route"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "Driver en route");

    let (status, _) = send(&app, request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Orphan events are refused up front.
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/ride-events",
            Some(&token),
            Some(json!({"ride_id": 7777, "description": "Ghost ride"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid reference");
}

#[tokio::test]
async fn test_user_search_narrows_the_listing() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    create_user(&app, &token, "rider", "Alice", "alice@example.com").await;
    create_user(&app, &token, "driver", "Dave", "dave@example.com").await;

    let (status, body) = send(
        &app,
        request("GET", "/api/users?search=alice", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_store_outage_maps_to_service_unavailable() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    seed_one_ride(&app, &token).await;

    app.store.set_failure(InjectedFailure::Unavailable);
    let (status, body) = send(&app, request("GET", "/api/rides", Some(&token), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Data store unavailable");

    app.store.clear_failure();
    let (status, _) = send(&app, request("GET", "/api/rides", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_broken_queries_map_to_internal_error() {
    let app = test_app();
    let token = token_with_role(&app.auth, UserRole::Admin);
    seed_one_ride(&app, &token).await;

    app.store.set_failure(InjectedFailure::Query);
    let (status, body) = send(&app, request("GET", "/api/rides", Some(&token), None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Query failed");
}
