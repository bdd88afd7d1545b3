//! HTTP API tests.
//!
//! Drive the real router with an in-memory bead source standing in for `bd`,
//! so routing, fan-out, error mapping, and config handling are exercised
//! end-to-end without any external binaries.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use beadboard::aggregate::Aggregator;
use beadboard::config::ConfigStore;
use beadboard::registry::SourceRegistry;
use beadboard::server::{build_router, AppState};
use beadboard::tool::{BeadSource, GtCli, ListFilter, ToolCommand, ToolError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

// ─── In-memory bead source ──────────────────────────────────────────

/// Beads keyed by beads directory. Directories without an entry fail.
#[derive(Default)]
struct InMemorySource {
    beads: HashMap<PathBuf, Vec<Value>>,
    calls: Mutex<Vec<String>>,
}

impl InMemorySource {
    fn with(mut self, location: PathBuf, beads: Value) -> Self {
        let beads = beads.as_array().cloned().unwrap_or_default();
        self.beads.insert(location, beads);
        self
    }

    fn unavailable(location: &Path) -> ToolError {
        ToolError::Exit {
            command: "bd".to_string(),
            code: 1,
            stderr: format!("no database at {}", location.display()),
        }
    }
}

#[async_trait]
impl BeadSource for InMemorySource {
    async fn list(&self, location: &Path, filter: &ListFilter) -> Result<Value, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("list {}", location.display()));
        let beads = self
            .beads
            .get(location)
            .ok_or_else(|| Self::unavailable(location))?;
        let matching = beads
            .iter()
            .filter(|b| match filter.status.as_deref() {
                Some(status) if !status.is_empty() => b["status"] == status,
                _ => true,
            })
            .cloned()
            .collect();
        Ok(Value::Array(matching))
    }

    async fn show(&self, location: &Path, bead_id: &str) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(format!("show {}", bead_id));
        let beads = self
            .beads
            .get(location)
            .ok_or_else(|| Self::unavailable(location))?;
        beads
            .iter()
            .find(|b| b["id"] == bead_id)
            .map(|b| json!([b]))
            .ok_or_else(|| ToolError::Exit {
                command: format!("bd show {} --json", bead_id),
                code: 1,
                stderr: format!("issue not found: {}", bead_id),
            })
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

struct TestTown {
    tmp: TempDir,
    source: Arc<InMemorySource>,
    app: Router,
}

impl TestTown {
    fn root(&self) -> &Path {
        self.tmp.path()
    }

    fn config_path(&self) -> PathBuf {
        self.tmp.path().join("config.json")
    }
}

/// Town with hq, a manifest-declared `rigradar` rig, and a `broken` rig the
/// source cannot answer for.
fn test_town() -> TestTown {
    test_town_with_gt(|root| GtCli::new(ToolCommand::new("beadboard-test-missing-gt", root)))
}

fn test_town_with_gt(gt: impl FnOnce(&Path) -> GtCli) -> TestTown {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    std::fs::create_dir_all(root.join(".beads")).unwrap();
    std::fs::write(
        root.join(".beads").join("routes.jsonl"),
        concat!(
            "{\"prefix\":\"hq-\",\"path\":\".\"}\n",
            "{\"prefix\":\"ri-\",\"path\":\"rigradar\"}\n",
            "{\"prefix\":\"br-\",\"path\":\"broken\"}\n",
        ),
    )
    .unwrap();

    let source = Arc::new(
        InMemorySource::default()
            .with(
                root.join(".beads"),
                json!([{"id": "hq-1", "status": "open", "title": "Town chore"}]),
            )
            .with(
                root.join("rigradar").join(".beads"),
                json!([
                    {"id": "ri-1", "status": "open", "title": "Radar bug"},
                    {"id": "ri-2", "status": "closed", "title": "Radar feature"}
                ]),
            ),
    );

    let registry = Arc::new(SourceRegistry::build(root));
    let state = AppState {
        aggregator: Aggregator::new(registry, source.clone()),
        town: gt(root),
        config: Arc::new(ConfigStore::new(root.join("config.json"))),
    };

    TestTown {
        app: build_router(state),
        source,
        tmp,
    }
}

fn request(method: Method, uri: &str, body: Option<&str>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    match body {
        Some(b) => builder.body(Body::from(b.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, request(Method::GET, uri, None)).await
}

// ─── /health ────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok_and_town() {
    let town = test_town();
    let (status, body) = get(&town.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"], "rust");
    assert_eq!(body["town"], town.root().display().to_string());
}

// ─── /api/beads ─────────────────────────────────────────────────────

#[tokio::test]
async fn beads_merges_rigs_and_skips_broken_one() {
    let town = test_town();
    let (status, body) = get(&town.app, "/api/beads").await;
    assert_eq!(status, StatusCode::OK);

    let mut ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_str().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["hq-1", "ri-1", "ri-2"]);

    // hq, rigradar, broken: each queried once despite aliases.
    let lists = town
        .source
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.starts_with("list"))
        .count();
    assert_eq!(lists, 3);
}

#[tokio::test]
async fn beads_passes_status_filter() {
    let town = test_town();
    let (status, body) = get(&town.app, "/api/beads?status=closed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"id": "ri-2", "status": "closed", "title": "Radar feature"}]));
}

#[tokio::test]
async fn beads_repeated_query_param_uses_first_value() {
    let town = test_town();
    let (status, body) = get(&town.app, "/api/beads?status=closed&status=open&x=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"id": "ri-2", "status": "closed", "title": "Radar feature"}]));
}

#[tokio::test]
async fn beads_is_empty_array_when_nothing_answers() {
    let tmp = TempDir::new().unwrap();
    let registry = Arc::new(SourceRegistry::build(tmp.path()));
    let state = AppState {
        aggregator: Aggregator::new(registry, Arc::new(InMemorySource::default())),
        town: GtCli::new(ToolCommand::new("beadboard-test-missing-gt", tmp.path())),
        config: Arc::new(ConfigStore::new(tmp.path().join("config.json"))),
    };
    let app = build_router(state);

    let (status, body) = get(&app, "/api/beads").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// ─── /api/bead/{id} ─────────────────────────────────────────────────

#[tokio::test]
async fn bead_detail_routes_by_prefix() {
    let town = test_town();
    let (status, body) = get(&town.app, "/api/bead/ri-2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["title"], "Radar feature");
}

#[tokio::test]
async fn bead_detail_missing_id_is_bad_request() {
    let town = test_town();
    for uri in ["/api/bead/", "/api/bead"] {
        let (status, body) = get(&town.app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "bad_request");
        assert_eq!(body["error"]["message"], "missing bead id");
    }
    assert!(town.source.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bead_detail_not_found_is_server_error_with_tool_message() {
    let town = test_town();
    let (status, body) = get(&town.app, "/api/bead/ri-nonexistent").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "source_unavailable");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("issue not found: ri-nonexistent"));
}

#[tokio::test]
async fn bead_detail_unavailable_rig_is_server_error() {
    let town = test_town();
    let (status, body) = get(&town.app, "/api/bead/br-1").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("no database at"));
}

// ─── /api/config ────────────────────────────────────────────────────

#[tokio::test]
async fn config_defaults_when_no_file() {
    let town = test_town();
    let (status, body) = get(&town.app, "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "filters": {
                "hideSystemBeads": true,
                "hideEvents": true,
                "hideRigIdentity": true,
                "hideMaintenanceWisps": true,
                "hideHQBeads": true
            },
            "server": {"port": 9292, "host": "localhost"},
            "refreshInterval": 30000
        })
    );
}

#[tokio::test]
async fn config_partial_update_keeps_host() {
    let town = test_town();
    let (status, body) = send(
        &town.app,
        request(Method::POST, "/api/config", Some(r#"{"server":{"port":8888}}"#)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server"]["port"], 8888);
    assert_eq!(body["server"]["host"], "localhost");
    assert_eq!(body["filters"]["hideEvents"], true);

    let (_, body) = get(&town.app, "/api/config").await;
    assert_eq!(body["server"]["port"], 8888);
}

#[tokio::test]
async fn config_filters_object_replaces_all_flags() {
    let town = test_town();
    let (status, body) = send(
        &town.app,
        request(
            Method::POST,
            "/api/config",
            Some(r#"{"filters":{"hideSystemBeads":true}}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["filters"],
        json!({
            "hideSystemBeads": true,
            "hideEvents": false,
            "hideRigIdentity": false,
            "hideMaintenanceWisps": false,
            "hideHQBeads": false
        })
    );
}

#[tokio::test]
async fn config_bad_json_is_rejected_and_store_untouched() {
    let town = test_town();
    send(
        &town.app,
        request(Method::POST, "/api/config", Some(r#"{"refreshInterval":5000}"#)),
    )
    .await;
    let before = std::fs::read_to_string(town.config_path()).unwrap();

    let (status, body) = send(
        &town.app,
        request(Method::POST, "/api/config", Some("not json")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    assert_eq!(std::fs::read_to_string(town.config_path()).unwrap(), before);
}

// ─── CORS ───────────────────────────────────────────────────────────

#[tokio::test]
async fn cors_preflight_is_answered() {
    let town = test_town();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/beads")
        .header(header::ORIGIN, "http://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = town.app.clone().oneshot(req).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn cors_header_on_get() {
    let town = test_town();
    let req = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = town.app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

// ─── /api/ready, /api/status ────────────────────────────────────────

#[tokio::test]
async fn ready_without_gt_is_server_error() {
    let town = test_town();
    let (status, body) = get(&town.app, "/api/ready").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "source_unavailable");
}

#[cfg(unix)]
fn fake_gt(root: &Path) -> GtCli {
    let script = root.join("fake-gt.sh");
    std::fs::write(
        &script,
        r#"case "$1" in
  ready) echo '[{"id":"hq-1"}]' ;;
  status) echo '{"town":"test","rigs":["rigradar"]}' ;;
  *) echo "unknown command $1" >&2; exit 2 ;;
esac
"#,
    )
    .unwrap();
    GtCli::new(ToolCommand::new("sh", root).with_base_args([script]))
}

#[cfg(unix)]
#[tokio::test]
async fn ready_passes_through_gt_output() {
    let town = test_town_with_gt(fake_gt);
    let (status, body) = get(&town.app, "/api/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"id": "hq-1"}]));
}

#[cfg(unix)]
#[tokio::test]
async fn status_is_enriched_with_rig_prefixes() {
    let town = test_town_with_gt(fake_gt);
    let (status, body) = get(&town.app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["town"], "test");
    assert_eq!(
        body["rigPrefixes"],
        json!({"br": "broken", "hq": "town", "ri": "rigradar"})
    );
}
