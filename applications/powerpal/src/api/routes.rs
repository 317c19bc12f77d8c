use crate::api::handlers::{auth, health, loads, pages, AppState};
use crate::api::middleware::require_session;
use crate::ws;
use axum::{
    extract::Request,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::Level;

pub fn create_router(state: AppState) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/auth/signup", post(auth::signup))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/ingest/loads", post(loads::ingest_loads))
        .route("/ws/dashboard", get(ws::ws_handler));

    // Pages handle a missing session themselves by redirecting to the login page
    let page_routes = Router::new()
        .route("/", get(|| async { axum::response::Redirect::to("/dashboard") }))
        .route("/login", get(pages::login_page).post(pages::login_submit))
        .route("/signup", get(pages::signup_page).post(pages::signup_submit))
        .route("/dashboard", get(pages::dashboard))
        .route("/dashboard/loads", post(pages::dashboard_add))
        .route("/dashboard/loads/{index}", post(pages::dashboard_save))
        .route("/add-load", get(pages::add_load_form).post(pages::add_load_submit))
        .route("/logout", post(pages::logout));

    // Protected API routes (require a session)
    let protected_routes = Router::new()
        .route("/api/v1/auth/me", get(auth::me))
        .route("/api/v1/loads", get(loads::list_loads).post(loads::add_load))
        .route("/api/v1/loads/{index}", put(loads::update_load))
        .route("/api/v1/add-load", post(loads::record_load))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(page_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    tracing::span!(
                        Level::INFO,
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(|_request: &Request, _span: &tracing::Span| {
                    tracing::event!(Level::DEBUG, "received request");
                })
                .on_response(|response: &axum::response::Response, latency: std::time::Duration, _span: &tracing::Span| {
                    tracing::event!(Level::INFO, status = %response.status(), latency = ?latency, "request completed");
                })
                .on_failure(|_error: tower_http::classify::ServerErrorsFailureClass, _latency: std::time::Duration, _span: &tracing::Span| {
                    tracing::event!(Level::ERROR, "request failed");
                }),
        )
}
