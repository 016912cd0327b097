pub mod stripe_webhook;
pub mod subscription;

use axum::Router;

use crate::adapters::http::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/stripe", stripe_webhook::router())
        .nest("/accounts", subscription::router())
}
