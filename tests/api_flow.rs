//! End-to-end tests through the axum router with in-memory adapters.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceExt;

use skywatch_gateway::api;
use skywatch_gateway::app_state::{AppState, Backends};
use skywatch_gateway::cache::InMemoryCache;
use skywatch_gateway::config::ServiceConfig;
use skywatch_gateway::domain::{RequestId, RequestStore, StarCatalog, StarId, UserId, UserStore};
use skywatch_gateway::persistence::InMemoryStore;
use skywatch_gateway::service::ComputeDispatcher;

const SECRET: &str = "test-callback-secret";
const SYSTEM_MODERATOR: i64 = 99;

#[derive(Debug)]
struct FakeDispatcher {
    accept: bool,
    calls: Mutex<Vec<(RequestId, String)>>,
}

#[async_trait]
impl ComputeDispatcher for FakeDispatcher {
    async fn dispatch(&self, request_id: RequestId, auth_token: &str) -> bool {
        self.calls
            .lock()
            .await
            .push((request_id, auth_token.to_string()));
        self.accept
    }
}

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
    dispatcher: Arc<FakeDispatcher>,
}

async fn app(accept_dispatch: bool) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    store
        .seed_user(UserId::new(SYSTEM_MODERATOR), "system", true)
        .await;
    let dispatcher = Arc::new(FakeDispatcher {
        accept: accept_dispatch,
        calls: Mutex::new(Vec::new()),
    });
    let config = ServiceConfig {
        async_shared_secret: SECRET.to_string(),
        system_moderator_id: UserId::new(SYSTEM_MODERATOR),
        ..ServiceConfig::default()
    };
    let backends = Backends {
        requests: Arc::clone(&store) as Arc<dyn RequestStore>,
        users: Arc::clone(&store) as Arc<dyn UserStore>,
        catalog: Arc::clone(&store) as Arc<dyn StarCatalog>,
        cache: Arc::new(InMemoryCache::new()),
        dispatcher: Arc::clone(&dispatcher) as Arc<dyn ComputeDispatcher>,
    };
    let router = api::build_router().with_state(AppState::new(backends, &config));
    TestApp {
        router,
        store,
        dispatcher,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        };
        let Ok(request) = request else {
            panic!("failed to build request");
        };
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let Ok(response) = self.router.clone().oneshot(request).await else {
            panic!("router failed");
        };
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("failed to read body");
        };
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn user(&self, username: &str, is_moderator: bool) -> String {
        let (status, _) = self
            .call(
                Method::POST,
                "/api/v1/users/register",
                None,
                Some(json!({"username": username, "password": "password1", "is_moderator": is_moderator})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/users/login",
                None,
                Some(json!({"username": username, "password": "password1"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let Some(token) = body["token"].as_str() else {
            panic!("login returned no token: {body}");
        };
        token.to_string()
    }

    async fn star(&self, name: &str) -> StarId {
        self.store.insert_star(name, 10.0, 20.0).await.id
    }

    /// Creator adds `star` and submits; returns the request id.
    async fn formed_request(&self, creator: &str, star: StarId) -> i64 {
        let (status, link) = self
            .call(
                Method::POST,
                &format!("/api/v1/stars/{star}/draft"),
                Some(creator),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let Some(id) = link["request_id"].as_i64() else {
            panic!("no request id in {link}");
        };
        let (status, body) = self
            .call(
                Method::PUT,
                &format!("/api/v1/requests/{id}/submit"),
                Some(creator),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "formed");
        id
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = app(true).await;
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = app(true).await;
    let (status, body) = app
        .call(Method::GET, "/api/v1/requests/cart", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "unauthenticated");

    let (status, _) = app
        .call(Method::GET, "/api/v1/requests/cart", Some("forged"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_observation_cycle() {
    let app = app(true).await;
    let creator = app.user("observer", false).await;
    let moderator = app.user("moderator", true).await;
    let star = app.star("Vega").await;

    let id = app.formed_request(&creator, star).await;

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/v1/requests/{id}/resolve"),
            Some(&moderator),
            Some(json!({"action": "complete"})),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "formed");
    assert_eq!(body["computation"], "pending");
    assert_eq!(
        *app.dispatcher.calls.lock().await,
        vec![(RequestId::new(id), moderator.clone())]
    );

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/requests/{id}/results"),
            None,
            Some(json!({
                "auth_token": SECRET,
                "results": [{"star_id": star.get(), "result_value": 22.36}],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stars_updated"], 1);
    assert_eq!(body["total_stars"], 1);
    assert_eq!(body["status"], "completed");

    let (status, detail) = app
        .call(
            Method::GET,
            &format!("/api/v1/requests/{id}"),
            Some(&creator),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "completed");
    assert_eq!(detail["moderator_id"], SYSTEM_MODERATOR);
    assert!(detail["completed_at"].is_string());
    assert_eq!(detail["stars"][0]["name"], "Vega");
    assert_eq!(detail["stars"][0]["result_value"], 22.36);

    let (_, listed) = app
        .call(Method::GET, "/api/v1/requests", Some(&creator), None)
        .await;
    assert_eq!(listed[0]["completed_stars"], 1);
    assert_eq!(listed[0]["total_stars"], 1);
}

#[tokio::test]
async fn wrong_secret_changes_nothing() {
    let app = app(true).await;
    let creator = app.user("observer", false).await;
    let star = app.star("Deneb").await;
    let id = app.formed_request(&creator, star).await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/requests/{id}/results"),
            None,
            Some(json!({
                "auth_token": "not-the-secret",
                "results": [{"star_id": star.get(), "result_value": 1.0}],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "unauthenticated");

    let Ok(Some(request)) = app.store.find_request(RequestId::new(id)).await else {
        panic!("request missing");
    };
    assert_eq!(request.status.as_str(), "formed");
    let Ok(links) = app.store.links(RequestId::new(id)).await else {
        panic!("links failed");
    };
    assert_eq!(links[0].result_value, None);
}

#[tokio::test]
async fn failed_dispatch_is_bad_gateway_and_keeps_request_formed() {
    let app = app(false).await;
    let creator = app.user("observer", false).await;
    let moderator = app.user("moderator", true).await;
    let star = app.star("Altair").await;
    let id = app.formed_request(&creator, star).await;

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/v1/requests/{id}/resolve"),
            Some(&moderator),
            Some(json!({"action": "complete"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["kind"], "upstream_failure");

    let (_, detail) = app
        .call(
            Method::GET,
            &format!("/api/v1/requests/{id}"),
            Some(&moderator),
            None,
        )
        .await;
    assert_eq!(detail["status"], "formed");
    assert_eq!(detail["stars"][0]["result_value"], Value::Null);
}

#[tokio::test]
async fn moderators_cannot_resolve_their_own_requests() {
    let app = app(true).await;
    let moderator = app.user("moderator", true).await;
    let star = app.star("Rigel").await;
    let id = app.formed_request(&moderator, star).await;

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/v1/requests/{id}/resolve"),
            Some(&moderator),
            Some(json!({"action": "reject"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["kind"], "forbidden");
}

#[tokio::test]
async fn reject_then_late_callback_is_conflict() {
    let app = app(true).await;
    let creator = app.user("observer", false).await;
    let moderator = app.user("moderator", true).await;
    let star = app.star("Spica").await;
    let id = app.formed_request(&creator, star).await;

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/v1/requests/{id}/resolve"),
            Some(&moderator),
            Some(json!({"action": "reject"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert!(body.get("computation").is_none());

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/requests/{id}/results"),
            None,
            Some(json!({
                "auth_token": SECRET,
                "results": [{"star_id": star.get(), "result_value": 5.0}],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], "invalid_state");
}

#[tokio::test]
async fn draft_editing_and_deletion_rules() {
    let app = app(true).await;
    let creator = app.user("observer", false).await;
    let star = app.star("Capella").await;

    for _ in 0..3 {
        let (status, _) = app
            .call(
                Method::POST,
                &format!("/api/v1/stars/{star}/draft"),
                Some(&creator),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, cart) = app
        .call(Method::GET, "/api/v1/requests/cart", Some(&creator), None)
        .await;
    assert_eq!(cart["count"], 3);
    let Some(id) = cart["request_id"].as_i64() else {
        panic!("no draft id in {cart}");
    };

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/v1/requests/{id}"),
            Some(&creator),
            Some(json!({"observer_latitude": 120.0})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");

    // Unknown keys never reach the store.
    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/v1/requests/{id}/stars/{star}"),
            Some(&creator),
            Some(json!({"quantity": 5, "request_id": 12345})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 5);
    assert_eq!(body["request_id"], id);

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/v1/requests/{id}/submit"),
            Some(&creator),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/requests/{id}"),
            Some(&creator),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], "invalid_state");

    for _ in 0..2 {
        let (status, _) = app
            .call(
                Method::DELETE,
                &format!("/api/v1/requests/{id}/stars/{star}"),
                Some(&creator),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

#[tokio::test]
async fn deleted_draft_disappears() {
    let app = app(true).await;
    let creator = app.user("observer", false).await;
    let (_, cart) = app
        .call(Method::GET, "/api/v1/requests/cart", Some(&creator), None)
        .await;
    let Some(id) = cart["request_id"].as_i64() else {
        panic!("no draft id in {cart}");
    };

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/requests/{id}"),
            Some(&creator),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "deleted");

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/requests/{id}"),
            Some(&creator),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = app
        .call(Method::GET, "/api/v1/requests", Some(&creator), None)
        .await;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    // A fresh cart is a new draft.
    let (_, cart) = app
        .call(Method::GET, "/api/v1/requests/cart", Some(&creator), None)
        .await;
    assert_ne!(cart["request_id"].as_i64(), Some(id));
}

#[tokio::test]
async fn other_users_requests_are_hidden() {
    let app = app(true).await;
    let alice = app.user("alice", false).await;
    let bob = app.user("bob", false).await;
    let star = app.star("Mizar").await;
    let id = app.formed_request(&alice, star).await;

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/requests/{id}"),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, listed) = app
        .call(Method::GET, "/api/v1/requests", Some(&bob), None)
        .await;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn logout_ends_the_session_and_cookie_auth_works() {
    let app = app(true).await;
    let token = app.user("observer", false).await;

    let Ok(request) = Request::builder()
        .uri("/api/v1/users/me")
        .header(header::COOKIE, format!("session_id={token}"))
        .body(Body::empty())
    else {
        panic!("failed to build request");
    };
    let Ok(response) = app.router.clone().oneshot(request).await else {
        panic!("router failed");
    };
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = app
        .call(Method::POST, "/api/v1/users/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .call(Method::POST, "/api/v1/users/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(Method::GET, "/api/v1/users/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_sets_http_only_cookie() {
    let app = app(true).await;
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/users/register",
            None,
            Some(json!({"username": "ann", "password": "password1"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let Ok(request) = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/users/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"username": "ann", "password": "password1"}).to_string(),
        ))
    else {
        panic!("failed to build request");
    };
    let Ok(response) = app.router.clone().oneshot(request).await else {
        panic!("router failed");
    };
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cookie.starts_with("session_id="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn role_cannot_be_escalated_through_profile_update() {
    let app = app(true).await;
    let token = app.user("observer", false).await;
    let (status, body) = app
        .call(
            Method::PUT,
            "/api/v1/users/me",
            Some(&token),
            Some(json!({"username": "observer2", "is_moderator": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "observer2");
    assert_eq!(body["is_moderator"], false);
}

#[tokio::test]
async fn stale_cookie_falls_back_to_bearer() {
    let app = app(true).await;
    let token = app.user("observer", false).await;

    let Ok(request) = Request::builder()
        .uri("/api/v1/users/me")
        .header(header::COOKIE, "session_id=expired-session")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
    else {
        panic!("failed to build request");
    };
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "observer");

    let Ok(request) = Request::builder()
        .uri("/api/v1/users/me")
        .header(header::COOKIE, "session_id=expired-session")
        .header(header::AUTHORIZATION, "Bearer also-unknown")
        .body(Body::empty())
    else {
        panic!("failed to build request");
    };
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "unauthenticated");
}

#[tokio::test]
async fn malformed_input_is_a_structured_validation_error() {
    let app = app(true).await;
    let creator = app.user("observer", false).await;
    let star = app.star("Rigel").await;
    let id = app.formed_request(&creator, star).await;

    let Ok(request) = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/requests/{id}/results"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"auth_token": "#))
    else {
        panic!("failed to build request");
    };
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");
    assert_eq!(body["error"]["code"], 2001);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/requests/{id}/results"),
            None,
            Some(json!({"auth_token": SECRET, "results": [{"star_id": "vega"}]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");

    let (status, body) = app
        .call(
            Method::GET,
            "/api/v1/requests/not-a-number",
            Some(&creator),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation_error");

    let Ok(Some(request)) = app.store.find_request(RequestId::new(id)).await else {
        panic!("request missing");
    };
    assert_eq!(request.status.as_str(), "formed");
}

#[tokio::test]
async fn moderators_manage_the_catalog() {
    let app = app(true).await;
    let observer = app.user("observer", false).await;
    let moderator = app.user("moderator", true).await;
    let vega = json!({"name": "Vega", "short_description": "Alpha Lyrae", "ra": 279.235, "dec": 38.784});

    let (status, body) = app
        .call(Method::POST, "/api/v1/stars", Some(&observer), Some(vega.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["kind"], "forbidden");

    let (status, created) = app
        .call(Method::POST, "/api/v1/stars", Some(&moderator), Some(vega))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["is_active"], true);
    let Some(id) = created["id"].as_i64() else {
        panic!("no star id in {created}");
    };

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/stars",
            Some(&moderator),
            Some(json!({"name": "Nowhere", "ra": 400.0, "dec": 0.0})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = app
        .call(
            Method::PUT,
            &format!("/api/v1/stars/{id}"),
            Some(&moderator),
            Some(json!({"short_description": "Brightest star in Lyra", "is_active": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["short_description"], "Brightest star in Lyra");
    assert_eq!(updated["is_active"], true);

    // Linked before deactivation, so the request keeps it.
    let request_id = app.formed_request(&observer, StarId::new(id)).await;

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/stars/{id}"),
            Some(&observer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/stars/{id}"),
            Some(&moderator),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(Method::GET, &format!("/api/v1/stars/{id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, listed) = app.call(Method::GET, "/api/v1/stars", None, None).await;
    assert_eq!(listed, json!([]));

    let (status, detail) = app
        .call(
            Method::GET,
            &format!("/api/v1/requests/{request_id}"),
            Some(&observer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["stars"][0]["name"], "Vega");
}

