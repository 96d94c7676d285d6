//! JSON API over the job store: listing and lookup through the query layer,
//! status and score updates, summary counts and the profile.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jobtrail_core::{
    Certification, Education, Honor, JobFilter, JobHistory, JobRecord, JobStatus, QueryError,
    Skill, Stored, ValidationError,
};
use jobtrail_storage::{JobStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "jobtrail-web";

#[derive(Clone)]
pub struct AppState {
    pub store: JobStore,
}

impl AppState {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(_) | StoreError::InvalidQuery(_) => {
                ApiError::BadRequest(err.to_string())
            }
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Internal(err) => {
                error!(error = ?err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "an internal error occurred".to_string(),
                )
            }
        };
        (status, Json(json!({ "code": code, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/lookup", get(lookup_job_handler))
        .route("/jobs/status", post(set_status_handler))
        .route("/jobs/score", post(set_score_handler))
        .route("/stats", get(stats_handler))
        .route("/profile", get(profile_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(store: JobStore, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "serving job API");
    axum::serve(listener, app(AppState::new(store))).await?;
    Ok(())
}

pub fn port_from_env() -> u16 {
    std::env::var("JOBTRAIL_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": CRATE_NAME }))
}

async fn list_jobs_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Vec<JobRecord>> {
    let filter = JobFilter::from_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
    Ok(Json(state.store.query(&filter).await?))
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    url: String,
}

async fn lookup_job_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupParams>,
) -> ApiResult<JobRecord> {
    state
        .store
        .get(&params.url)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no job with url {}", params.url)))
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    url: String,
    status: String,
}

async fn set_status_handler(
    State(state): State<Arc<AppState>>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<JobRecord> {
    let status: JobStatus = update.status.parse()?;
    Ok(Json(state.store.set_status(&update.url, status).await?))
}

#[derive(Debug, Deserialize)]
struct ScoreUpdate {
    url: String,
    score: f64,
    #[serde(default)]
    rationale: Option<String>,
}

async fn set_score_handler(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ScoreUpdate>,
) -> ApiResult<JobRecord> {
    let record = state
        .store
        .set_score(&update.url, update.score, update.rationale)
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Serialize)]
struct Stats {
    total: i64,
    by_status: BTreeMap<&'static str, i64>,
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> ApiResult<Stats> {
    let counts = state.store.status_counts().await?;
    let by_status = JobStatus::ALL
        .iter()
        .map(|s| (s.as_str(), counts.get(s).copied().unwrap_or(0)))
        .collect();
    Ok(Json(Stats {
        total: state.store.count().await?,
        by_status,
    }))
}

#[derive(Debug, Serialize)]
struct Profile {
    meta: BTreeMap<&'static str, String>,
    job_history: Vec<Stored<JobHistory>>,
    education: Vec<Stored<Education>>,
    certifications: Vec<Stored<Certification>>,
    honors: Vec<Stored<Honor>>,
    skills: Vec<Stored<Skill>>,
}

async fn profile_handler(State(state): State<Arc<AppState>>) -> ApiResult<Profile> {
    let store = &state.store;
    let meta = store
        .all_meta()
        .await?
        .into_iter()
        .map(|(key, value)| (key.as_str(), value))
        .collect();
    Ok(Json(Profile {
        meta,
        job_history: store.job_history().await?,
        education: store.education().await?,
        certifications: store.certifications().await?,
        honors: store.honors().await?,
        skills: store.skills(None).await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use jobtrail_core::{CandidateJob, ProfileKey, SkillCategory};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn seeded() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.db")).await.unwrap();
        let jobs = [
            CandidateJob::new("Writer in Seattle, WA", "https://x/1").with_source("builtin.com"),
            CandidateJob::new("Editor", "https://x/2").with_source("wellfound.com"),
        ];
        store.ingest_batch(&jobs, Utc::now()).await.unwrap();
        store.set_score("https://x/1", 8.5, None).await.unwrap();
        (dir, app(AppState::new(store)))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_dir, app) = seeded().await;
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn jobs_listing_applies_filters() {
        let (_dir, app) = seeded().await;
        let (status, body) = send(&app, get("/jobs?min_score=5&order_by=score%20desc")).await;
        assert_eq!(status, StatusCode::OK);
        let jobs = body.as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["url"], "https://x/1");

        let (_, body) = send(&app, get("/jobs?source=wellfound.com")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(&app, get("/jobs?order_by=salary")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let (status, _) = send(&app, get("/jobs?status=archived")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, get("/jobs?min_score=NaN")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lookup_finds_or_404s() {
        let (_dir, app) = seeded().await;
        let (status, body) = send(&app, get("/jobs/lookup?url=https%3A%2F%2Fx%2F2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Editor");

        let (status, body) = send(&app, get("/jobs/lookup?url=https%3A%2F%2Fx%2F9")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn status_and_score_updates() {
        let (_dir, app) = seeded().await;
        let (status, body) = send(
            &app,
            post_json("/jobs/status", json!({"url": "https://x/2", "status": "applied"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "applied");

        let (status, _) = send(
            &app,
            post_json("/jobs/status", json!({"url": "https://x/2", "status": "ghosted"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            post_json(
                "/jobs/score",
                json!({"url": "https://x/2", "score": 6.0, "rationale": "decent fit"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["score_rationale"], "decent fit");

        let (status, _) = send(
            &app,
            post_json("/jobs/score", json!({"url": "https://x/2", "score": 11.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            post_json("/jobs/score", json!({"url": "https://x/9", "score": 5.0})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_and_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.db")).await.unwrap();
        store
            .ingest(&CandidateJob::new("Writer", "https://x/1"), Utc::now())
            .await
            .unwrap();
        store.set_meta(ProfileKey::Name, "Jordan Doe").await.unwrap();
        store
            .upsert_skill(&Skill {
                name: "OpenAPI".into(),
                category: SkillCategory::ApiDevTools,
                proficiency: None,
                sort_order: Some(1),
            })
            .await
            .unwrap();
        let app = app(AppState::new(store));

        let (status, body) = send(&app, get("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["by_status"]["new"], 1);
        assert_eq!(body["by_status"]["offer"], 0);

        let (status, body) = send(&app, get("/profile")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["name"], "Jordan Doe");
        assert_eq!(body["skills"][0]["name"], "OpenAPI");
        assert_eq!(body["skills"][0]["category"], "api_dev_tools");
        assert!(body["job_history"].as_array().unwrap().is_empty());
    }
}
