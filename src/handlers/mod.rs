//! JSON demo routes served on the HTTP gateway.

mod echo;
mod user;

use axum::routing::get;
use axum::Router;

pub use echo::{EchoRequest, EchoResponse, HealthzResponse, ServiceStatus};
pub use user::{CreateUserRequest, ListUsersResponse, User};

/// All demo routes under `/v1`
pub fn router() -> Router {
    Router::new()
        .route("/v1/echo", get(echo::echo_query).post(echo::echo))
        .route("/v1/healthz", get(echo::healthz))
        .route("/v1/users", get(user::list_users).post(user::create_user))
        .route("/v1/users/:id", get(user::get_user))
}
