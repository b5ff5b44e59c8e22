use axum::routing::get;
use axum::Router;
use log::{error, info};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

use super::{health_check_simple, index};

pub fn build_router() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check_simple))
        .layer(TraceLayer::new_for_http())
}

/// Serves the liveness routes until `shutdown` resolves.
pub async fn run_health_server<F>(host: &str, port: u16, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, build_router().into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(std::io::Error::other)
}
