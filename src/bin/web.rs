//! DocuBot HTTP 入口
//!
//! 启动: cargo run --bin docubot-web --features web
//!
//! - `POST /execute`：`{"query": "...", "patient_id": 1234567}`，响应为 `application/x-ndjson` 流
//! - `GET /health`
//!
//! 配置了 `[[identity.credentials]]` 时，患者身份只从 `Authorization: Bearer <token>` 解析，
//! 请求体中的 patient_id 被忽略。

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;

use docubot::config::load_config;
use docubot::identity::{bearer_token, IdentityProvider, StaticIdentityProvider};
use docubot::store::PatientId;
use docubot::stream::ndjson_lines;
use docubot::{build_from_config, observability, Orchestrator, TurnRequest};

struct AppState {
    engine: Arc<Orchestrator>,
    identity: Option<StaticIdentityProvider>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(alias = "message")]
    query: String,
    #[serde(default)]
    patient_id: Option<i64>,
}

fn resolve_patient(
    state: &AppState,
    headers: &HeaderMap,
    req: &ChatRequest,
) -> Result<PatientId, (StatusCode, String)> {
    match &state.identity {
        Some(provider) => {
            let raw = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            provider
                .resolve(bearer_token(raw))
                .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))
        }
        None => req
            .patient_id
            .and_then(PatientId::new)
            .ok_or((StatusCode::BAD_REQUEST, "patient_id must be a 7 or 8 digit number".to_string())),
    }
}

/// POST /execute：流式执行一轮；客户端断开时本轮被取消
async fn execute(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Response, (StatusCode, String)> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query is required".to_string()));
    }
    let patient = resolve_patient(&state, &headers, &req)?;
    tracing::info!(%patient, "execute");

    let events = state.engine.stream_turn(TurnRequest::for_patient(patient, query));
    let body = ndjson_lines(events).map(|line| Ok::<_, Infallible>(Bytes::from(line)));
    let mut res = Response::new(Body::from_stream(body));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/x-ndjson; charset=utf-8"),
    );
    Ok(res)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let engine = build_from_config(&cfg).await.context("Failed to build orchestrator")?;
    let provider = StaticIdentityProvider::from_entries(&cfg.identity.credentials);
    let state = Arc::new(AppState {
        engine,
        identity: (!provider.is_empty()).then_some(provider),
    });

    let app = Router::new()
        .route("/execute", post(execute))
        .route("/health", get(|| async { "OK" }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!("DocuBot web listening on http://{}", cfg.server.bind);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
