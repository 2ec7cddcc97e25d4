use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::auth::auth_middleware;

pub mod admin;
pub mod extract;
pub mod health;
pub mod member;

pub fn router(state: AppState) -> Router {
    let me = Router::new()
        .route(
            "/profile",
            get(member::get_profile).put(member::update_profile),
        )
        .route("/progress", get(member::progress))
        .route("/contributions", get(member::contributions))
        .route("/loans", get(member::loans).post(member::apply_for_loan))
        .route("/fines", get(member::fines));

    let admin = Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/members", get(admin::list_members))
        .route(
            "/members/{user_id}/approval",
            post(admin::set_member_approval),
        )
        .route("/members/{user_id}/progress", get(admin::member_progress))
        .route(
            "/contributions",
            get(admin::list_contributions).post(admin::record_contribution),
        )
        .route("/loans", get(admin::list_loans))
        .route("/loans/unscheduled", get(admin::unscheduled_loans))
        .route("/loans/{id}", get(admin::get_loan))
        .route("/loans/{id}/decision", post(admin::decide_loan))
        .route("/loans/{id}/payments", post(admin::record_loan_payment))
        .route("/fines", get(admin::list_fines).post(admin::issue_fine))
        .route("/fines/{id}", get(admin::get_fine))
        .route("/fines/{id}/payments", post(admin::pay_fine))
        .route("/fines/{id}/cancel", post(admin::cancel_fine))
        .route("/sweep", post(admin::run_sweep));

    let api = Router::new()
        .nest("/me", me)
        .nest("/admin", admin)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
