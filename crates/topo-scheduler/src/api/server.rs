use std::sync::Arc;

use error_stack::Report;
use poem::listener::TcpListener;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::handlers::routes;
use super::ApiError;
use crate::scheduler::Priority;

/// HTTP server exposing the scheduler extender endpoints
pub struct ApiServer {
    priority: Arc<Priority>,
    listen_addr: String,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(priority: Arc<Priority>, listen_addr: String) -> Self {
        Self {
            priority,
            listen_addr,
        }
    }

    /// Start the API server
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to start or bind to the address
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting HTTP API server on {}", self.listen_addr);

        let app = routes(self.priority);
        let listener = TcpListener::bind(&self.listen_addr);
        let server = Server::new(listener);

        tokio::select! {
            result = server.run(app) => {
                match result {
                    Ok(()) => {
                        info!("API server stopped normally");
                        Ok(())
                    }
                    Err(e) => {
                        error!("API server failed: {e}");
                        Err(Report::new(ApiError::ServerError {
                            message: format!("Server failed: {e}"),
                        }))
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("API server shutdown requested");
                Ok(())
            }
        }
    }
}
