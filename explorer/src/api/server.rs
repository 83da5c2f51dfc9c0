//! API server implementation

use axum::{
    Router,
    http::Method,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use crate::api::{routes, ApiState};
use crate::error::{ExplorerError, Result};

pub struct ApiServer {
    state: ApiState,
    symbol: String,
    bind_address: String,
    port: u16,
}

impl ApiServer {
    pub fn new(state: ApiState, symbol: &str, bind_address: &str, port: u16) -> Self {
        Self {
            state,
            symbol: symbol.to_string(),
            bind_address: bind_address.to_string(),
            port,
        }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(Any);

        Router::new()
            .nest(&format!("/api/{}", self.symbol), Router::new()
                .merge(routes::blocks::routes(self.state.clone()))
                .merge(routes::transactions::routes(self.state.clone()))
                .merge(routes::addresses::routes(self.state.clone()))
                .merge(routes::status::routes(self.state.clone()))
            )
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    pub async fn start(&self) -> Result<()> {
        let app = self.router();
        let addr = format!("{}:{}", self.bind_address, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await
            .map_err(|e| ExplorerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!("API server listening on {}", addr);

        axum::serve(listener, app).await
            .map_err(|e| ExplorerError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}
