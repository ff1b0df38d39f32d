//! Rollcall Backend
//!
//! Class rosters, monthly attendance snapshots and cross-class attendance
//! reports over a SQLite-backed document store.

mod api;
mod auth;
mod calendar;
mod config;
mod db;
mod errors;
mod matrix;
mod models;
mod report;
mod sessions;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::{DocumentStore, RecordStore, RosterStore};
use sessions::EditSessions;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub roster: RosterStore,
    pub records: RecordStore,
    pub sessions: Arc<EditSessions>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: DocumentStore, config: Config) -> Self {
        Self {
            roster: RosterStore::new(store.clone()),
            records: RecordStore::new(store.clone()),
            store,
            sessions: Arc::new(EditSessions::new()),
            config: Arc::new(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Rollcall Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Default session weekday: {}", config.session_weekday);
    tracing::info!("Edit session idle TTL: {:?}", config.session_ttl);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (ROLLCALL_API_PSK). Authentication is disabled!");
    }

    let pool = db::init_database(&config.db_path).await?;
    let state = AppState::new(DocumentStore::new(pool), config.clone());

    let _watcher = sessions::spawn_roster_watch(&state.roster, state.sessions.clone());
    let _sweeper = sessions::spawn_idle_sweep(state.sessions.clone(), config.session_ttl);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Calendar
        .route("/calendar", get(api::get_calendar))
        // Classes and rosters
        .route("/groups", get(api::list_groups).post(api::create_group))
        .route(
            "/groups/{id}",
            get(api::get_group)
                .put(api::update_group)
                .delete(api::delete_group),
        )
        .route("/groups/{id}/members", post(api::add_member))
        .route(
            "/groups/{id}/members/{member_id}",
            put(api::update_member).delete(api::remove_member),
        )
        // Attendance records
        .route(
            "/groups/{id}/records",
            get(api::list_records).post(api::submit_record),
        )
        .route(
            "/groups/{id}/records/{record_id}",
            get(api::get_record)
                .put(api::update_record)
                .delete(api::delete_record),
        )
        .route("/records/recent", get(api::recent_records))
        .route("/records/export.csv", get(api::export_records))
        // Edit sessions
        .route("/groups/{id}/sessions", post(api::open_session))
        .route(
            "/sessions/{sid}",
            get(api::get_session).delete(api::close_session),
        )
        .route("/sessions/{sid}/toggle", post(api::toggle_cell))
        .route("/sessions/{sid}/members", post(api::insert_session_member))
        .route("/sessions/{sid}/submit", post(api::submit_session))
        // Reports
        .route("/reports/attendance", get(api::attendance_report))
        .route("/reports/attendance.csv", get(api::attendance_report_csv))
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
