//! HTTP listener for the broker.
//!
//! One POST endpoint on any path. Each connection is served by hyper's
//! HTTP/1 implementation; each request's broker work runs on tokio's
//! blocking pool so backend I/O never stalls the accept loop.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler, RequestTicket};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response as HttpResponse, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use synclitedb_core::Registry;
use synclitedb_protocol::Response;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

/// The broker server.
///
/// # Example
///
/// ```no_run
/// use synclitedb_server::{BrokerServer, ServerConfig};
///
/// # async fn run() -> synclitedb_server::ServerResult<()> {
/// let server = BrokerServer::new(ServerConfig::default());
/// // Serves until ctrl-c, then closes every open database.
/// server.run().await
/// # }
/// ```
pub struct BrokerServer {
    handler: Arc<RequestHandler>,
}

impl BrokerServer {
    /// Creates a server with a SQLite-backed registry.
    pub fn new(config: ServerConfig) -> Self {
        Self::from_context(HandlerContext::new(config))
    }

    /// Creates a server around an existing registry.
    pub fn with_registry(config: ServerConfig, registry: Registry) -> Self {
        Self::from_context(HandlerContext::with_registry(config, registry))
    }

    fn from_context(context: HandlerContext) -> Self {
        Self {
            handler: Arc::new(RequestHandler::new(context)),
        }
    }

    /// Returns the request handler shared by all connections.
    pub fn handler(&self) -> Arc<RequestHandler> {
        Arc::clone(&self.handler)
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        self.handler.config()
    }

    /// Binds the configured address and serves until ctrl-c.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn run(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config().bind_addr).await?;
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for ctrl-c, serving until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serves connections from `listener` until `shutdown` resolves, then
    /// closes every open database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection limiter is closed.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> ServerResult<()> {
        let limiter = Arc::new(Semaphore::new(self.config().max_connections));
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "broker listening");
        }
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                () = &mut shutdown => break,
                permit = Arc::clone(&limiter).acquire_owned() => {
                    permit.map_err(|e| ServerError::Internal(e.to_string()))?
                }
            };
            let (stream, peer) = tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };

            let io = TokioIo::new(stream);
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let _permit = permit;
                let service = service_fn(move |req: Request<Incoming>| {
                    let handler = Arc::clone(&handler);
                    async move { Ok::<_, Infallible>(respond(req, handler).await) }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!(%peer, error = %e, "connection closed with error");
                }
            });
        }

        tracing::info!("shutting down, closing all databases");
        let handler = Arc::clone(&self.handler);
        tokio::task::spawn_blocking(move || handler.shutdown())
            .await
            .map_err(|e| ServerError::Internal(format!("shutdown task failed: {e}")))
    }
}

async fn respond(req: Request<Incoming>, handler: Arc<RequestHandler>) -> HttpResponse<Full<Bytes>> {
    match process(req, handler).await {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(err) => {
            tracing::debug!(error = %err, "rejected request");
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            json_response(status, &err.to_response())
        }
    }
}

async fn process(req: Request<Incoming>, handler: Arc<RequestHandler>) -> ServerResult<Response> {
    if req.method() != Method::POST {
        return Err(ServerError::MethodNotAllowed(req.method().to_string()));
    }
    let body = read_body(req, handler.config().max_body_bytes).await?;

    let timeout = handler.config().request_timeout;
    let ticket = Arc::new(RequestTicket::new());
    let worker_ticket = Arc::clone(&ticket);
    let mut worker =
        tokio::task::spawn_blocking(move || handler.handle_bytes_for(&body, &worker_ticket));
    let waited = tokio::time::timeout(timeout, &mut worker).await;
    let joined = match waited {
        Ok(joined) => joined,
        Err(_) if ticket.abandon() => {
            tracing::warn!(?timeout, "request timed out");
            return Ok(Response::failure(format!(
                "ExecutionError: request timed out after {} ms, the operation may still complete",
                timeout.as_millis()
            )));
        }
        // The worker already claimed its result; it must reach the client.
        Err(_) => worker.await,
    };
    joined.map_err(|e| ServerError::Internal(format!("request worker failed: {e}")))?
}

async fn read_body(req: Request<Incoming>, limit: usize) -> ServerResult<Bytes> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(ServerError::PayloadTooLarge { limit });
    }

    match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ServerError::PayloadTooLarge { limit })
        }
        Err(e) => Err(ServerError::InvalidRequest(format!("failed to read body: {e}"))),
    }
}

fn json_response(status: StatusCode, body: &Response) -> HttpResponse<Full<Bytes>> {
    let mut response = HttpResponse::new(Full::new(Bytes::from(body.encode())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
