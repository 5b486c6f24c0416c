use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_cookies::CookieManagerLayer;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::Config;
use crate::db::{create_pool, migrations};
use crate::error_pages::{error_page_middleware, fallback_handler};
use crate::handlers;
use crate::services::alerts::{spawn_worker, RETRY_BASE_DELAY};
use crate::services::mailer::{self, Mailer};
use crate::services::receipt::ReceiptImporter;
use crate::state::{AppState, SessionStore};
use crate::xsrf::{xsrf_middleware, XsrfToken};

/// Largest accepted request body (receipt photos and PDFs).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Build the application state and Axum router from a [`Config`], sending
/// e-mail through the transport the configuration names.
pub fn build_app(config: Config) -> Result<(AppState, Router), Box<dyn std::error::Error>> {
    let mailer: Arc<dyn Mailer> = Arc::from(mailer::from_config(&config.mail)?);
    build_app_with_mailer(config, mailer)
}

/// Build the application with an explicit mailer.
///
/// Creates the database pool, runs migrations, starts the alert worker, and
/// assembles the full middleware stack. Must be called inside a tokio
/// runtime.
pub fn build_app_with_mailer(
    config: Config,
    mailer: Arc<dyn Mailer>,
) -> Result<(AppState, Router), Box<dyn std::error::Error>> {
    let db = create_pool(&config.database_path)?;

    {
        let conn = db.get()?;
        migrations::run_migrations(&conn, &config.migrations_path)?;
    }

    let (alerts, _worker) = spawn_worker(
        db.clone(),
        mailer,
        config.site_url.clone(),
        RETRY_BASE_DELAY,
    );
    let importer = ReceiptImporter::new(config.fetch_timeout)?;
    tracing::info!(
        database = %config.database_path.display(),
        fetch_timeout = ?config.fetch_timeout,
        "Application state ready"
    );

    let state = AppState {
        db,
        config: Arc::new(config.clone()),
        sessions: SessionStore::default(),
        anon_xsrf: XsrfToken::generate(),
        alerts,
        importer: Arc::new(importer),
    };

    let app = Router::new()
        .merge(handlers::routes())
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .route("/signup", get(auth::signup_page).post(auth::signup_submit))
        .route("/logout", post(auth::logout))
        .fallback(fallback_handler)
        .nest_service("/static", ServeDir::new(&config.static_path))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            xsrf_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error_page_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CookieManagerLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    Ok((state, app))
}

/// Bind the router to `host:port` and spawn the server as a tokio task.
///
/// Returns the actual port the server bound to (useful when `port` is 0 for
/// OS-assigned ports) and a [`JoinHandle`] for the server task.
pub async fn serve(
    app: Router,
    host: &str,
    port: u16,
) -> Result<(u16, JoinHandle<()>), Box<dyn std::error::Error>> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_port, handle))
}
