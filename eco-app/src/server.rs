//! EcoSentinel HTTP server.
//!
//! Opens the report store named by the config, mounts the conversation routes and
//! serves them until ctrl-c or SIGTERM.

use crate::config::{EcoConfig, StorageBackend};
use crate::conversation::ConversationManager;
use crate::routes;
use anyhow::Result;
use axum::Extension;
use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use eco_forms::{
    FeedbackCollector, FormConfig, FormController, MemoryReportStore, ReportStore,
    SqliteReportStore,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub conversations: ConversationManager,
    pub forms: FormController,
    pub feedback: FeedbackCollector,
    pub store_backend: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn ReportStore>, form_config: FormConfig) -> Self {
        Self {
            conversations: ConversationManager::new(),
            forms: FormController::new(store.clone(), form_config),
            feedback: FeedbackCollector::new(store.clone()),
            store_backend: store.backend().to_string(),
            started_at: Utc::now(),
        }
    }
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = EcoConfig::load(config_path).await?;
    let addr = cfg.bind_addr()?;
    tracing::info!(
        config_path = %path.display(),
        bind_addr = %addr,
        storage_backend = ?cfg.storage.backend,
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.http_max_in_flight,
        conversation_idle_seconds = cfg.server.conversation_idle_seconds,
        "ecosentinel config loaded"
    );

    let listener = preflight_bind_listener(addr).await?;
    let store = open_store(&cfg).await?;
    let state = Arc::new(AppState::new(store, cfg.forms.to_form_config()));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(|response: &Response, latency: Duration, _span: &tracing::Span| {
            tracing::info!(
                status = response.status().as_u16(),
                latency_ms = latency.as_millis() as u64,
                "http request completed"
            );
        })
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let mut app = build_router(state.clone());
    if let Some(cors) = cors_layer(&cfg.server.cors_allowed_origins) {
        app = app.layer(cors);
    }
    let app = app
        .layer(GlobalConcurrencyLimitLayer::new(cfg.server.http_max_in_flight))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.http_timeout_seconds),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let shutdown = CancellationToken::new();
    let sweeper = spawn_idle_sweeper(
        state,
        cfg.server.conversation_idle_seconds,
        Duration::from_secs(cfg.server.idle_sweep_interval_seconds),
        shutdown.child_token(),
    );

    tracing::info!(%addr, "ecosentinel serving");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "idle conversation sweeper join failed");
    }
    served?;
    tracing::info!("http server shutdown completed");
    Ok(())
}

/// Periodically drops idle conversations until `shutdown` is cancelled.
fn spawn_idle_sweeper(
    state: Arc<AppState>,
    idle_seconds: u64,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let idle = chrono::Duration::seconds(i64::from(u32::try_from(idle_seconds).unwrap_or(u32::MAX)));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    state.conversations.evict_idle(Utc::now() - idle);
                }
            }
        }
        tracing::info!("idle conversation sweeper stopped");
    })
}

/// Routes with shared state attached; transport layers are added by `serve`.
pub fn build_router(state: Arc<AppState>) -> Router {
    routes::router().layer(Extension(state))
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect::<Vec<_>>(),
        )
    };
    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([CONTENT_TYPE]),
    )
}

async fn open_store(cfg: &EcoConfig) -> Result<Arc<dyn ReportStore>> {
    match cfg.storage.backend {
        StorageBackend::Sqlite => {
            let path = cfg.sqlite_path()?;
            let store = SqliteReportStore::open(&path)
                .await
                .map_err(|e| anyhow::anyhow!("open sqlite store {}: {e}", path.display()))?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("memory report store selected; reports are lost on restart");
            Ok(Arc::new(MemoryReportStore::new()))
        }
    }
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_opens_without_disk() {
        let mut cfg = EcoConfig::default();
        cfg.storage.backend = StorageBackend::Memory;
        let store = open_store(&cfg).await.expect("memory store");
        assert_eq!(store.backend(), "memory");
    }

    #[tokio::test]
    async fn sqlite_backend_creates_database_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = EcoConfig::default();
        cfg.storage.sqlite_path = tmp
            .path()
            .join("nested")
            .join("reports.db")
            .to_string_lossy()
            .into_owned();
        let store = open_store(&cfg).await.expect("sqlite store");
        assert_eq!(store.backend(), "sqlite");
        assert!(tmp.path().join("nested").join("reports.db").exists());
    }

    #[tokio::test]
    async fn idle_sweeper_evicts_and_stops_on_cancel() {
        let state = Arc::new(AppState::new(
            Arc::new(MemoryReportStore::new()),
            FormConfig::default(),
        ));
        state
            .conversations
            .get_or_create("stale")
            .lock()
            .await
            .last_active = Utc::now() - chrono::Duration::hours(2);
        state.conversations.get_or_create("fresh");

        let shutdown = CancellationToken::new();
        let sweeper = spawn_idle_sweeper(
            state.clone(),
            3600,
            Duration::from_millis(10),
            shutdown.child_token(),
        );
        tokio::time::timeout(Duration::from_secs(2), async {
            while state.conversations.get("stale").is_some() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("stale conversation evicted");
        assert!(state.conversations.get("fresh").is_some());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), sweeper)
            .await
            .expect("sweeper stops")
            .expect("sweeper joins");
    }

    #[test]
    fn cors_is_off_without_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["*".to_string()]).is_some());
        assert!(cors_layer(&["https://chat.example.org".to_string()]).is_some());
    }

    #[test]
    fn request_id_falls_back_to_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id_from_headers(&headers), "missing");
        headers.insert("x-request-id", "abc".parse().expect("header value"));
        assert_eq!(request_id_from_headers(&headers), "abc");
    }
}
