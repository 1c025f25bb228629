use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;

use config::Config;
use middleware::rate_limit::RateLimiter;
use services::stripe_service::StripeClient;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub stripe: Option<StripeClient>,
    pub rate_limiter: RateLimiter,
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // --- Auth routes (no auth required) ---
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    // --- Webhook routes (raw body, no auth) ---
    let webhook_routes = Router::new().route("/stripe", post(routes::webhooks::stripe_webhook));

    // --- Authenticated billing routes ---
    let billing_routes = Router::new()
        .route("/subscribe", post(routes::billing::subscribe))
        .route("/promo", post(routes::billing::redeem_promo))
        .route("/status", get(routes::billing::subscription_status))
        .route("/cancel", post(routes::billing::cancel))
        .route(
            "/entitlement",
            get(routes::billing::entitlement).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::premium::premium_guard,
            )),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Admin promo-code routes ---
    let admin_routes = Router::new()
        .route(
            "/promo-codes",
            post(routes::admin::create_promo_code).get(routes::admin::list_promo_codes),
        )
        .route(
            "/promo-codes/:id",
            axum::routing::delete(routes::admin::delete_promo_code),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::admin::require_admin,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Compose full API ---
    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/billing", billing_routes)
        .nest("/webhooks", webhook_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health))
        // Global middleware
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let pool = db::create_pool(&config).await;
    let stripe = StripeClient::new(&config.billing);
    let rate_limiter =
        RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_secs);

    services::sweep::spawn(
        pool.clone(),
        config.billing.sweep_interval_secs,
        config.billing.trial_days,
    );

    tracing::info!("Flightdeck API initialized (Rust/Axum)");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState {
        db: pool,
        config: Arc::new(config),
        stripe,
        rate_limiter,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");

    tracing::info!("Listening on {addr}");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
