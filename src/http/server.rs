//! HTTP server for composition requests

use crate::engine::{CompositionResult, ExecutionEngine};
use crate::http::messages::{HealthResponse, InvocationForm, ERROR_HEADER};
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use slog::{error, info, Logger};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// HTTP server exposing the services of one host
#[derive(Clone)]
pub struct HttpServer {
    /// Engine running the requests
    engine: Arc<ExecutionEngine>,
    /// Bind address
    address: SocketAddr,
    /// Logger
    logger: Logger,
}

impl HttpServer {
    pub fn new(address: SocketAddr, engine: Arc<ExecutionEngine>, logger: Logger) -> Self {
        Self {
            engine,
            address,
            logger,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/*path", post(handle_invocation))
            .layer(CorsLayer::permissive())
            .with_state(self.clone())
    }

    /// Bind the listen address and serve until the task is dropped
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.address).await.map_err(|e| {
            error!(self.logger, "Failed to bind HTTP server"; "error" => %e);
            e
        })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(self.logger, "HTTP server listening";
            "address" => %self.address,
            "advertised" => self.engine.host()
        );
        let app = self.router();
        axum::serve(listener, app).await.map_err(|e| {
            error!(self.logger, "HTTP server error"; "error" => %e);
            e
        })?;
        Ok(())
    }
}

/// Run an invocation or a composition addressed to this host
async fn handle_invocation(
    State(server): State<HttpServer>,
    uri: Uri,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let path = uri.path();
    info!(server.logger, "Received invocation request"; "path" => path);

    let form = InvocationForm::from_pairs(fields);
    let result = match form.into_request(path, server.engine.host()) {
        Ok(request) => server.engine.handle(request).await,
        Err(e) => {
            error!(server.logger, "Rejected invocation request"; "path" => path, "error" => %e);
            CompositionResult {
                error: Some(e.to_string()),
                ..Default::default()
            }
        }
    };

    into_response(result)
}

/// Always 200: failures travel in the error header next to the partial result
fn into_response(result: CompositionResult) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(message) = &result.error {
        if let Ok(value) = HeaderValue::from_str(&header_safe(message)) {
            headers.insert(ERROR_HEADER, value);
        }
    }
    (StatusCode::OK, headers, Json(result.values)).into_response()
}

fn header_safe(message: &str) -> String {
    message
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { ' ' })
        .collect()
}

/// Health check endpoint
async fn handle_health(State(server): State<HttpServer>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        address: server.engine.host().to_string(),
    })
}
