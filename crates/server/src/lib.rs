//! Server crate provides HTTP server functionality.
//!
//! This module implements the HTTP API of the shop: order submission, a customer's
//! order history, the admin status update and the read-only product catalog,
//! plus health and Prometheus endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        MatchedPath, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use model::{OrderId, OrderRequest, OrderStatus, OrderSummary, ProductFilter, ProductId};
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use repository::{CatalogStore, RepositoryError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use service::{OrderService, ServiceError};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Header carrying the admin password for status updates.
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

const RETRY_LATER: &str = "Could not save your order right now. Please try again later.";

/// Server represents an HTTP server for working with orders.
pub struct Server {
    port: u16,
    state: AppState,
}

/// Metrics collects and exposes HTTP server metrics.
struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    errors_total: CounterVec,
    order_submissions_total: CounterVec,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )?;

        let errors_total = CounterVec::new(
            Opts::new("errors_total", "Total number of errors"),
            &["source", "endpoint"],
        )?;

        let order_submissions_total = CounterVec::new(
            Opts::new("order_submissions_total", "Order submissions by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(order_submissions_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
            order_submissions_total,
        })
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }

    fn record_error(&self, source: &str, endpoint: &str) {
        self.errors_total.with_label_values(&[source, endpoint]).inc();
    }

    fn record_submission(&self, outcome: &str) {
        self.order_submissions_total
            .with_label_values(&[outcome])
            .inc();
    }
}

/// Application state shared between request handlers
#[derive(Clone)]
struct AppState {
    orders: Arc<dyn OrderService>,
    catalog: Arc<dyn CatalogStore>,
    admin_password: Option<PasswordDigest>,
    metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    success: bool,
    order_id: OrderId,
    message: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    success: bool,
    status: OrderStatus,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    error: String,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    status: String,
}

type PasswordDigest = [u8; 32];

fn password_digest(password: &str) -> PasswordDigest {
    Sha256::digest(password.as_bytes()).into()
}

/// Compares SHA-256 digests without short-circuiting on the first mismatch.
fn password_matches(expected: &PasswordDigest, supplied: &str) -> bool {
    let supplied = password_digest(supplied);
    expected
        .iter()
        .zip(supplied.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn error_body(status: StatusCode, field: Option<String>, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            success: false,
            field,
            error: error.into(),
        }),
    )
        .into_response()
}

/// Maps a service failure onto an HTTP response. Store details stay in the log.
fn service_error_response(err: &ServiceError) -> Response {
    match err {
        ServiceError::Validation(e) => {
            error_body(StatusCode::UNPROCESSABLE_ENTITY, Some(e.field()), e.to_string())
        }
        ServiceError::StoreUnavailable(e) => {
            error!("Store failure: {}", e);
            error_body(StatusCode::SERVICE_UNAVAILABLE, None, RETRY_LATER)
        }
        ServiceError::NotFound(_) => error_body(StatusCode::NOT_FOUND, None, err.to_string()),
        ServiceError::InvalidStatus(_) => {
            error_body(StatusCode::BAD_REQUEST, Some("status".into()), err.to_string())
        }
        ServiceError::IllegalTransition { .. } | ServiceError::Conflict(_) => {
            error_body(StatusCode::CONFLICT, None, err.to_string())
        }
        ServiceError::IdempotencyKeyReused(_) => error_body(
            StatusCode::CONFLICT,
            Some("idempotency_key".into()),
            err.to_string(),
        ),
    }
}

impl Server {
    /// Creates a new Server instance.
    ///
    /// # Arguments
    ///
    /// * `port` - The port on which the server will listen
    /// * `orders` - Order submission, history and status updates
    /// * `catalog` - Product catalog
    /// * `admin_password` - Password for status updates; `None` or a blank
    ///   value disables them
    ///
    /// # Errors
    ///
    /// Fails if the Prometheus metrics cannot be registered.
    pub fn new(
        port: u16,
        orders: Arc<dyn OrderService>,
        catalog: Arc<dyn CatalogStore>,
        admin_password: Option<String>,
    ) -> Result<Self> {
        info!("Initializing HTTP server on port {}", port);
        let admin_password = admin_password.filter(|p| !p.trim().is_empty());
        if admin_password.is_none() {
            warn!("ADMIN_PASSWORD is not set, status updates are disabled");
        }

        let metrics = Metrics::new().context("Failed to register metrics")?;
        Ok(Self {
            port,
            state: AppState {
                orders,
                catalog,
                admin_password: admin_password.as_deref().map(password_digest),
                metrics: Arc::new(metrics),
            },
        })
    }

    /// Starts the server and blocks until `shutdown` is notified and in-flight
    /// requests have finished.
    pub async fn start(&self, shutdown: Arc<Notify>) -> Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .context("Failed to bind to port")?;

        info!("HTTP server listening on port {}", self.port);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await
            .context("Server error")?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    /// Builds the router with all routes and the metrics middleware.
    pub fn router(&self) -> Router {
        let metrics = self.state.metrics.clone();

        Router::new()
            .route("/api/orders", post(Self::handle_submit_order))
            .route("/api/orders/{telegram_id}", get(Self::handle_list_orders))
            .route(
                "/api/orders/{order_id}/status",
                patch(Self::handle_update_status),
            )
            .route("/api/products", get(Self::handle_list_products))
            .route("/api/products/{id}", get(Self::handle_get_product))
            .route("/health", get(Self::handle_health))
            .route("/metrics", get(Self::handle_metrics))
            .layer(axum::middleware::from_fn_with_state(
                metrics,
                Self::metrics_middleware,
            ))
            .with_state(self.state.clone())
    }

    /// Middleware for collecting metrics on HTTP requests
    async fn metrics_middleware(
        State(metrics): State<Arc<Metrics>>,
        req: axum::extract::Request,
        next: axum::middleware::Next,
    ) -> Response {
        let method = req.method().to_string();
        // Route templates keep label cardinality bounded.
        let endpoint = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "unmatched".to_string());

        let start = std::time::Instant::now();
        let response = next.run(req).await;
        let duration = start.elapsed();

        let status = response.status().as_u16();
        metrics.record_request(&method, &endpoint, status, duration);
        if status >= 400 {
            metrics.record_error("http", &endpoint);
        }

        response
    }

    async fn handle_submit_order(
        State(state): State<AppState>,
        payload: Result<Json<OrderRequest>, JsonRejection>,
    ) -> Response {
        let Json(request) = match payload {
            Ok(payload) => payload,
            Err(rejection) => {
                warn!("Malformed order payload: {}", rejection);
                state.metrics.record_submission("rejected");
                return error_body(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Some("body".into()),
                    rejection.body_text(),
                );
            }
        };
        info!("Received order from telegram user {:?}", request.telegram_id);

        match state.orders.submit_order(&request).await {
            Ok(submission) => {
                state.metrics.record_submission("accepted");
                (
                    StatusCode::OK,
                    Json(SubmitResponse {
                        success: true,
                        order_id: submission.order_id,
                        message: submission.message,
                    }),
                )
                    .into_response()
            }
            Err(err) => {
                let outcome = match err {
                    ServiceError::Validation(_) | ServiceError::IdempotencyKeyReused(_) => {
                        "rejected"
                    }
                    _ => "failed",
                };
                state.metrics.record_submission(outcome);
                service_error_response(&err)
            }
        }
    }

    async fn handle_list_orders(
        State(state): State<AppState>,
        Path(telegram_id): Path<i64>,
    ) -> Response {
        info!("Received order history request for telegram user {}", telegram_id);

        match state.orders.list_orders(telegram_id).await {
            Ok(orders) => {
                let summaries: Vec<OrderSummary> = orders.iter().map(OrderSummary::from).collect();
                (StatusCode::OK, Json(summaries)).into_response()
            }
            Err(err) => service_error_response(&err),
        }
    }

    async fn handle_update_status(
        State(state): State<AppState>,
        Path(order_id): Path<OrderId>,
        headers: HeaderMap,
        query: Result<Query<StatusQuery>, QueryRejection>,
    ) -> Response {
        let supplied = headers
            .get(ADMIN_PASSWORD_HEADER)
            .and_then(|v| v.to_str().ok());
        let authorized = match (state.admin_password.as_ref(), supplied) {
            (Some(expected), Some(supplied)) => password_matches(expected, supplied),
            _ => false,
        };
        if !authorized {
            warn!("Rejected status update for order {}: bad admin password", order_id);
            return error_body(StatusCode::FORBIDDEN, None, "forbidden");
        }

        // Only authorized callers learn about malformed queries.
        let Query(query) = match query {
            Ok(query) => query,
            Err(rejection) => {
                return error_body(
                    StatusCode::BAD_REQUEST,
                    Some("status".into()),
                    rejection.body_text(),
                );
            }
        };

        match state.orders.set_status(order_id, &query.status).await {
            Ok(status) => (
                StatusCode::OK,
                Json(StatusResponse {
                    success: true,
                    status,
                }),
            )
                .into_response(),
            Err(err) => service_error_response(&err),
        }
    }

    async fn handle_list_products(
        State(state): State<AppState>,
        Query(filter): Query<ProductFilter>,
    ) -> Response {
        match state.catalog.list_products(&filter).await {
            Ok(products) => (StatusCode::OK, Json(products)).into_response(),
            Err(e) => {
                error!("Failed to list products: {}", e);
                error_body(StatusCode::SERVICE_UNAVAILABLE, None, "catalog unavailable")
            }
        }
    }

    async fn handle_get_product(
        State(state): State<AppState>,
        Path(id): Path<ProductId>,
    ) -> Response {
        match state.catalog.get_product(id).await {
            Ok(product) => (StatusCode::OK, Json(product)).into_response(),
            Err(RepositoryError::NotFound) => {
                error_body(StatusCode::NOT_FOUND, None, "product not found")
            }
            Err(e) => {
                error!("Failed to load product {}: {}", id, e);
                error_body(StatusCode::SERVICE_UNAVAILABLE, None, "catalog unavailable")
            }
        }
    }

    async fn handle_health() -> &'static str {
        "OK"
    }

    async fn handle_metrics(State(state): State<AppState>) -> Response {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
        }

        match String::from_utf8(buffer) {
            Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
            Err(e) => {
                error!("Failed to convert metrics to UTF-8: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid metrics data").into_response()
            }
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_matches() {
        let expected = password_digest("s3cret");
        assert!(password_matches(&expected, "s3cret"));
        assert!(!password_matches(&expected, "s3cre"));
        assert!(!password_matches(&expected, "s3cret "));
        assert!(!password_matches(&expected, ""));
    }
}
