//! HTTP server assembly.
//!
//! Wires the booking simulator, the property filter and the record router
//! into one axum application and runs it until a shutdown signal arrives.

use crate::booking::{BookingOutcome, BookingSimulator, RandomSource, ThreadRandom};
use crate::config::{GlobalSettings, MockApiConfig};
use crate::error::ApiError;
use crate::filter::{filter_properties, PropertyQuery};
use crate::matcher::{route_property_listing, ListingRoute};
use crate::records;
use crate::store::{PropertySource, RecordStore, PROPERTIES};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Request counters, logged at shutdown.
#[derive(Debug, Default)]
pub struct ApiStats {
    listings_filtered: AtomicU64,
    listings_delegated: AtomicU64,
    bookings_succeeded: AtomicU64,
    bookings_failed: AtomicU64,
}

impl ApiStats {
    pub fn listings_filtered(&self) -> u64 {
        self.listings_filtered.load(Ordering::Relaxed)
    }

    pub fn listings_delegated(&self) -> u64 {
        self.listings_delegated.load(Ordering::Relaxed)
    }

    pub fn bookings_succeeded(&self) -> u64 {
        self.bookings_succeeded.load(Ordering::Relaxed)
    }

    pub fn bookings_failed(&self) -> u64 {
        self.bookings_failed.load(Ordering::Relaxed)
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub properties: Arc<dyn PropertySource>,
    pub bookings: Arc<BookingSimulator>,
    pub settings: Arc<GlobalSettings>,
    pub stats: Arc<ApiStats>,
}

/// The mock property API.
pub struct MockApiServer {
    config: MockApiConfig,
    state: AppState,
}

impl MockApiServer {
    /// Create a server over `store` with an OS-seeded random source.
    pub fn new(config: MockApiConfig, store: Arc<RecordStore>) -> Self {
        Self::with_random(config, store, Arc::new(ThreadRandom))
    }

    /// Create a server with an explicit random source for booking outcomes.
    pub fn with_random(
        config: MockApiConfig,
        store: Arc<RecordStore>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let properties: Arc<dyn PropertySource> = store.clone();
        Self::with_sources(config, store, properties, random)
    }

    /// Create a server reading properties from a separate source.
    pub fn with_sources(
        config: MockApiConfig,
        store: Arc<RecordStore>,
        properties: Arc<dyn PropertySource>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let bookings = BookingSimulator::new(config.booking.clone(), random)
            .with_payload_logging(config.settings.log_bookings);

        info!(
            failure_rate = config.booking.failure_rate,
            read_only = config.settings.read_only,
            "Mock API initialized"
        );

        let state = AppState {
            store,
            properties,
            bookings: Arc::new(bookings),
            settings: Arc::new(config.settings.clone()),
            stats: Arc::new(ApiStats::default()),
        };
        Self { config, state }
    }

    pub fn stats(&self) -> Arc<ApiStats> {
        self.state.stats.clone()
    }

    /// Build the application router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/bookings", post(simulate_booking).get(list_bookings))
            .route("/properties", get(list_properties).post(create_property))
            .merge(records::router())
            .fallback(not_found)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(self.state.clone())
    }

    /// Bind and serve until Ctrl-C or SIGTERM.
    pub async fn serve(self) -> anyhow::Result<()> {
        use anyhow::Context;

        let addr = SocketAddr::new(self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!(address = %addr, "Mock API running at http://localhost:{}", addr.port());

        let app = self.router();
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("error running server")?;

        let stats = &self.state.stats;
        info!(
            listings_filtered = stats.listings_filtered(),
            listings_delegated = stats.listings_delegated(),
            bookings_succeeded = stats.bookings_succeeded(),
            bookings_failed = stats.bookings_failed(),
            "Mock API stopped"
        );
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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

async fn simulate_booking(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> BookingOutcome {
    // Any payload is accepted, including a missing one
    let payload = body.map(|Json(value)| value).unwrap_or(Value::Null);
    let outcome = state.bookings.simulate(&payload).await;

    if outcome.is_success() {
        state.stats.bookings_succeeded.fetch_add(1, Ordering::Relaxed);
    } else {
        state.stats.bookings_failed.fetch_add(1, Ordering::Relaxed);
        debug!("Simulated booking failure");
    }
    outcome
}

async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    records::list(&state, "bookings", &query).await
}

async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    match route_property_listing(&query) {
        ListingRoute::RecordRouter => {
            state.stats.listings_delegated.fetch_add(1, Ordering::Relaxed);
            records::list(&state, PROPERTIES, &query).await
        }
        ListingRoute::PropertyFilter => {
            state.stats.listings_filtered.fetch_add(1, Ordering::Relaxed);
            let properties = state.properties.load_properties().await?;
            let filter = PropertyQuery::from_pairs(&query);
            let matched = filter_properties(&properties, &filter);
            if state.settings.log_filtered {
                info!(
                    total = properties.len(),
                    matched = matched.len(),
                    "Filtered property listing"
                );
            }
            Ok(Json(matched).into_response())
        }
    }
}

async fn create_property(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = body
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))?;
    records::create(&state, PROPERTIES, body).await
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({})))
}
