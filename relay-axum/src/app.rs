use axum::routing::{any, get};
use axum::Router;
use relay_pipe::RequestCoordinator;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::transfer;
use crate::RelayAxumState;

pub const DEFAULT_TRANSFER_PATH: &str = "/";
pub const HEALTH_PATH: &str = "/health";

#[derive(Clone)]
pub struct AxumApp {
    pub state: RelayAxumState,
    pub router: Router<()>,
}

impl AxumApp {
    /// Router with the transfer endpoint at `/` and `GET /health`.
    pub fn new(coordinator: RequestCoordinator) -> Self {
        Self::with_path(coordinator, DEFAULT_TRANSFER_PATH)
    }

    pub fn with_path(coordinator: RequestCoordinator, path: &str) -> Self {
        let state = RelayAxumState::new(coordinator);
        let path = normalize_path(path);

        let router = Router::new()
            .route(HEALTH_PATH, get(health))
            .route(&path, any(transfer::transfer))
            .with_state(state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            );

        Self { state, router }
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "relay listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

async fn health() -> &'static str {
    "ok"
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

pub fn axum(coordinator: RequestCoordinator) -> AxumApp {
    AxumApp::new(coordinator)
}
