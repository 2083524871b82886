use axum::extract::Query;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EchoRequest {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoResponse {
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthzResponse {
    pub status: ServiceStatus,
    pub timestamp: String,
    pub message: String,
}

pub(super) async fn echo(Json(request): Json<EchoRequest>) -> Json<EchoResponse> {
    Json(EchoResponse {
        value: request.value,
    })
}

pub(super) async fn echo_query(Query(request): Query<EchoRequest>) -> Json<EchoResponse> {
    Json(EchoResponse {
        value: request.value,
    })
}

pub(super) async fn healthz() -> Json<HealthzResponse> {
    Json(HealthzResponse {
        status: ServiceStatus::Healthy,
        timestamp: chrono::Local::now().to_rfc3339(),
        message: String::new(),
    })
}
