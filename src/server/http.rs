//! HTTP server implementation
//!
//! hyper http1 with TokioIo and hand-rolled path routing. All domain
//! services hang off [`AppState`]; in dev mode without MongoDB the domain
//! routes answer 503 while health stays up.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Args;
use crate::db::schemas::LiveViewDoc;
use crate::db::{MongoClient, MongoCollection};
use crate::live::{LiveAggregator, RebuildScheduler};
use crate::logging::AuditLogger;
use crate::nats::NatsClient;
use crate::production::SlotProductionEngine;
use crate::routes;
use crate::staking::StakeStore;
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    pub nats: Option<NatsClient>,
    pub audit: Arc<AuditLogger>,
    /// Canonical staking record store
    pub stake_store: Option<Arc<StakeStore>>,
    /// Job state machine
    pub engine: Option<Arc<SlotProductionEngine>>,
    /// Live view derivation
    pub aggregator: Option<Arc<LiveAggregator>>,
    /// Debounced rebuild dispatch
    pub scheduler: Option<RebuildScheduler>,
    /// Direct live-view reads for the poll endpoint
    pub live_views: Option<MongoCollection<LiveViewDoc>>,
}

impl AppState {
    /// State without persistence (dev mode); only health routes are useful
    pub fn bare(args: Args, audit: Arc<AuditLogger>) -> Self {
        Self {
            args,
            mongo: None,
            nats: None,
            audit,
            stake_store: None,
            engine: None,
            aggregator: None,
            scheduler: None,
            live_views: None,
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Lapidary listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let segs: Vec<&str> = segments.iter().map(String::as_str).collect();

    info!("{} {}", method, path);

    let response = match (&method, segs.as_slice()) {
        (&Method::GET, ["health"] | ["healthz"]) => routes::health_check(&state),
        (&Method::GET, ["ready"] | ["readyz"]) => routes::readiness_check(&state),
        (&Method::GET, ["version"]) => routes::version_info(),

        (&Method::GET, ["api", "accounts", account, "live"]) => {
            routes::live::handle_get_live(&state, account).await
        }

        (&Method::GET, ["api", "accounts", account, "staking"]) => {
            routes::staking::handle_get_record(&state, account).await
        }
        (&Method::POST, ["api", "accounts", account, "staking", page, slot]) => {
            routes::staking::handle_stake(&state, account, page, slot, req).await
        }
        (&Method::POST, ["api", "accounts", account, "staking", page, slot, "reconcile"]) => {
            routes::staking::handle_reconcile(&state, account, page, slot, req).await
        }
        (&Method::DELETE, ["api", "accounts", account, "staking", page, slot, role, asset_id]) => {
            routes::staking::handle_unstake(&state, account, page, slot, role, asset_id).await
        }

        (&Method::GET, ["api", "accounts", account, "jobs", page]) => {
            routes::jobs::handle_list(&state, account, page).await
        }
        (&Method::POST, ["api", "accounts", account, "jobs", "complete", job_id]) => {
            routes::jobs::handle_complete(&state, account, job_id).await
        }
        (&Method::POST, ["api", "accounts", account, "jobs", page]) => {
            routes::jobs::handle_start(&state, account, page, req).await
        }

        (&Method::POST, ["api", "accounts", account, "slots", page, "unlock"]) => {
            routes::jobs::handle_unlock(&state, account, page, req).await
        }

        _ => routes::not_found(&path),
    };

    Ok(response)
}

/// 503 helper for routes whose backing service is absent (dev mode)
pub fn service_unavailable() -> Response<Full<Bytes>> {
    let body = r#"{"error":"service unavailable, persistence not configured"}"#;
    Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}
