//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with demonstration handlers, plus any
//!   caller-supplied handlers mounted behind the gate
//! - Wire up middleware (tracing, request ID, panics, timeout, gate,
//!   compression, body limit, sanitization)
//! - Bind server to listener with peer addresses exposed
//! - Apply config reloads to the policy router
//!
//! # Layer Order (outermost first)
//! ```text
//! TraceLayer → SetRequestId → PropagateRequestId → CatchPanic → Timeout
//!     → metrics → security headers
//!     → /health
//!     → security gate → compression → body limit → JSON sanitizer → handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{MatchedPath, Path, Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::compression::{compression_middleware, CompressionNegotiator};
use crate::config::ShieldConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::catch_panic_layer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::PolicyRouter;
use crate::security::gate::{security_gate_middleware, GateState, SecurityGate};
use crate::security::headers::apply_security_headers;
use crate::security::key::ClientKey;
use crate::security::rate_limit::RateLimiter;
use crate::security::sanitize::sanitize_json_middleware;

/// Largest `/api/report` row count.
const MAX_REPORT_ROWS: usize = 10_000;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub policies: Arc<ArcSwap<PolicyRouter>>,
}

/// Edge server wrapping demonstration handlers in the shield layers.
pub struct ShieldServer {
    config: ShieldConfig,
    limiter: Arc<RateLimiter>,
    gate: Arc<SecurityGate>,
    policies: Arc<ArcSwap<PolicyRouter>>,
    negotiator: Arc<CompressionNegotiator>,
}

impl ShieldServer {
    pub fn new(config: ShieldConfig) -> Self {
        let limiter = RateLimiter::in_memory()
            .with_sweep_interval(Duration::from_secs(config.security.sweep_interval_secs));
        Self::with_limiter(config, Arc::new(limiter))
    }

    /// Build around an existing limiter (custom store or clock).
    pub fn with_limiter(config: ShieldConfig, limiter: Arc<RateLimiter>) -> Self {
        let gate = Arc::new(SecurityGate::new(limiter.clone()));
        let policies = Arc::new(ArcSwap::from_pointee(PolicyRouter::from_config(&config)));
        let negotiator = Arc::new(CompressionNegotiator::new(config.compression.clone()));
        Self {
            config,
            limiter,
            gate,
            policies,
            negotiator,
        }
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Shared handle to the live policy router.
    pub fn policies(&self) -> Arc<ArcSwap<PolicyRouter>> {
        self.policies.clone()
    }

    /// Swap in the route policies of a reloaded config.
    ///
    /// Listener, compression and timeout settings need a restart.
    pub fn reload(&self, config: &ShieldConfig) {
        apply_reload(&self.policies, config);
    }

    /// Largest body any route policy admits.
    fn body_limit(&self) -> usize {
        self.config
            .routes
            .iter()
            .filter_map(|r| r.max_request_size)
            .chain(std::iter::once(self.config.gate.max_request_size))
            .max()
            .unwrap_or(self.config.gate.max_request_size) as usize
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        self.router_with(Router::new())
    }

    /// Like [`router`](Self::router), with `handlers` mounted behind the
    /// gate next to the built-in demonstration routes.
    #[allow(deprecated)]
    pub fn router_with(&self, handlers: Router) -> Router {
        let state = AppState {
            limiter: self.limiter.clone(),
            policies: self.policies.clone(),
        };
        let gate_state = GateState {
            gate: self.gate.clone(),
            policies: self.policies.clone(),
        };

        let mut api = Router::new()
            .route("/api/echo", post(echo))
            .route("/api/whoami", get(whoami))
            .route("/api/report", get(report))
            .route("/api/items/{id}", delete(delete_item))
            .route("/public/report", get(report))
            .merge(handlers);

        if self.config.gate.sanitize_input {
            api = api.layer(middleware::from_fn(sanitize_json_middleware));
        }

        let api = api
            .layer(RequestBodyLimitLayer::new(self.body_limit()))
            .layer(middleware::from_fn_with_state(
                self.negotiator.clone(),
                compression_middleware,
            ))
            .layer(middleware::from_fn_with_state(gate_state, security_gate_middleware));

        let mut app = Router::new()
            .route("/health", get(health))
            .with_state(state)
            .merge(api);

        if self.config.security.enable_headers {
            app = app.layer(middleware::map_response(security_headers));
        }

        app.layer(middleware::from_fn(track_metrics))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(catch_panic_layer())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<ShieldConfig>>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            "Shield server starting"
        );

        if let Some(updates) = config_updates {
            tokio::spawn(watch_updates(self.policies.clone(), updates, shutdown.clone()));
        }

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("Shield server stopped");
        Ok(())
    }
}

fn apply_reload(policies: &ArcSwap<PolicyRouter>, config: &ShieldConfig) {
    let router = PolicyRouter::from_config(config);
    let routes = router.route_names().len();
    policies.store(Arc::new(router));
    tracing::info!(routes, "Route policies reloaded");
}

async fn watch_updates(
    policies: Arc<ArcSwap<PolicyRouter>>,
    mut updates: mpsc::UnboundedReceiver<ShieldConfig>,
    shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => apply_reload(&policies, &config),
                None => break,
            },
            _ = shutdown.wait() => break,
        }
    }
    tracing::debug!("Config update loop finished");
}

async fn security_headers(mut response: Response) -> Response {
    apply_security_headers(response.headers_mut());
    response
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), &route, start);
    response
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let policies = state.policies.load();
    Json(json!({
        "status": "ok",
        "counter_entries": state.limiter.store().len(),
        "routes": policies.route_names(),
    }))
}

async fn echo(Json(body): Json<Value>) -> Json<Value> {
    Json(body)
}

async fn whoami(Extension(key): Extension<ClientKey>) -> Json<Value> {
    Json(json!({
        "key": key.as_str(),
        "authenticated_subject": key.is_user(),
    }))
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    rows: Option<usize>,
}

async fn report(Query(query): Query<ReportQuery>) -> Json<Value> {
    let rows = query.rows.unwrap_or(100).min(MAX_REPORT_ROWS);
    let items: Vec<Value> = (0..rows)
        .map(|i| {
            json!({
                "id": i,
                "customer": format!("customer-{}", i % 17),
                "status": if i % 3 == 0 { "open" } else { "closed" },
                "amount_cents": (i * 1_337) % 100_000,
            })
        })
        .collect();
    Json(json!({ "rows": rows, "items": items }))
}

async fn delete_item(Path(id): Path<String>) -> impl IntoResponse {
    tracing::info!(item = %id, "Item deleted");
    StatusCode::NO_CONTENT
}
