// Front Door Server
// HTTP endpoint the workflow engine calls to run a driver template

use crate::error::{RpcError, RpcResult};
use crate::handlers::TemplateHandler;
use crate::template::{ExecuteTemplateArgs, ExecuteTemplateReply};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use pipeline_driver::Driver;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub const TEMPLATE_EXECUTE_PATH: &str = "/api/v1/template.execute";

pub struct RpcServer {
    template_handler: TemplateHandler,
    port: u16,
}

impl RpcServer {
    pub fn new(driver: Arc<Driver>) -> Self {
        let port = driver.config().port;
        Self {
            template_handler: TemplateHandler::new(driver),
            port,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(TEMPLATE_EXECUTE_PATH, post(execute_template))
            .with_state(self.template_handler.clone())
    }

    /// Serve until the listener fails
    pub async fn start(&self) -> RpcResult<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::InternalError(format!("failed to bind {}: {}", addr, e)))?;
        info!(port = self.port, "Starting driver REST server");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| RpcError::InternalError(e.to_string()))
    }

    pub fn template_handler(&self) -> &TemplateHandler {
        &self.template_handler
    }
}

/// `POST /api/v1/template.execute`
pub async fn execute_template(
    State(handler): State<TemplateHandler>,
    payload: Result<Json<ExecuteTemplateArgs>, JsonRejection>,
) -> RpcResult<Json<ExecuteTemplateReply>> {
    let Json(args) = payload.map_err(|e| {
        RpcError::InvalidRequest(format!("Failed to decode request body: {}", e.body_text()))
    })?;
    let reply = handler.execute(&args).await?;
    Ok(Json(reply))
}
