//! `dynapictl serve`: HTTP front for custom objects plus the reconciliation task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    response::Response,
    routing::{any, get},
    Router,
};
use dynapi_api::{status_response, CustomObjectHandler};
use dynapi_controller::{InstalledApis, ThirdPartyController, API_ROOT};
use dynapi_core::ApiError;
use dynapi_schema::SchemaRegistry;
use dynapi_store::CustomObjectRegistry;
use tracing::{debug, info, warn};

pub struct AppState {
    handler: CustomObjectHandler,
    installed: Arc<InstalledApis>,
}

impl AppState {
    pub fn new(schemas: Arc<dyn SchemaRegistry>, objects: Arc<dyn CustomObjectRegistry>, installed: Arc<InstalledApis>) -> Self {
        Self { handler: CustomObjectHandler::new(schemas, objects), installed }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(API_ROOT, any(custom))
        .route(&format!("{}/{{*rest}}", API_ROOT), any(custom))
        .with_state(state)
}

/// Only schemas the controller has installed are reachable; everything else under the root is 404.
async fn custom(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let schema = req.uri().path().trim_start_matches('/').split('/').nth(1).unwrap_or("").to_string();
    if !schema.is_empty() && !state.installed.is_installed(&schema) {
        debug!(%schema, "request for api that is not installed");
        return status_response(&ApiError::not_found("api", format!("{}/{}", API_ROOT, schema)));
    }
    state.handler.serve(req).await
}

pub struct ServeOptions {
    pub listen: SocketAddr,
    pub sync_interval: Duration,
}

pub async fn run(
    opts: ServeOptions,
    schemas: Arc<dyn SchemaRegistry>,
    objects: Arc<dyn CustomObjectRegistry>,
) -> Result<()> {
    let installed = Arc::new(InstalledApis::new());
    let controller = Arc::new(ThirdPartyController::new(schemas.clone(), installed.clone()));
    let ctl = controller.spawn(opts.sync_interval);

    let app = router(Arc::new(AppState::new(schemas, objects, installed)));
    let listener = tokio::net::TcpListener::bind(opts.listen)
        .await
        .with_context(|| format!("binding {}", opts.listen))?;
    info!(addr = %opts.listen, sync_secs = opts.sync_interval.as_secs(), "dynapi listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "installing Ctrl-C handler failed");
                return;
            }
            info!("Ctrl-C received; shutting down");
        })
        .await
        .context("http server error");

    ctl.stop().await;
    served
}
