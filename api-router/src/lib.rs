use api_state::ApiState;
use axum::{extract::FromRef, routing::get, Router};
use routes::{
    packages::{get_package, search_packages},
    probes::{live, ready},
};
use serde::Serialize;

pub mod api_state;
pub mod error;
mod routes;

pub const API_VERSION: &str = "2.0.0";

/// Success envelope shared by every data endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub api_version: &'static str,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            api_version: API_VERSION,
            data,
        }
    }
}

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Probes for k8s/systemd
    let probes = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let packages = Router::new()
        .route("/packages", get(search_packages))
        .route("/packages/{*identifier}", get(get_package));

    probes.merge(packages)
}
