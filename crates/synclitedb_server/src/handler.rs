//! Request handling: maps decoded operations onto the registry.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use std::sync::atomic::{AtomicU8, Ordering};
use synclitedb_core::{CoreResult, Registry};
use synclitedb_protocol::{Operation, Response};

const PENDING: u8 = 0;
const CLAIMED: u8 = 1;
const ABANDONED: u8 = 2;

/// Decides, exactly once, whether a request's result reaches its caller.
///
/// The worker claims the ticket right before a side effect the caller
/// must learn about; the waiter abandons it when it stops waiting. Only
/// one of the two can win.
#[derive(Debug, Default)]
pub struct RequestTicket {
    state: AtomicU8,
}

impl RequestTicket {
    /// Creates a pending ticket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits the worker to delivering its result. Returns false if the
    /// waiter already gave up.
    pub fn claim(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Gives up on the result. Returns false if the worker already
    /// claimed it, in which case the waiter must wait for the result.
    pub fn abandon(&self) -> bool {
        self.state
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Open databases (shared across all workers).
    pub registry: Registry,
}

impl HandlerContext {
    /// Creates a handler context with a SQLite-backed registry.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Registry::new(config.broker.clone());
        Self { config, registry }
    }

    /// Creates a handler context around an existing registry.
    pub fn with_registry(config: ServerConfig, registry: Registry) -> Self {
        Self { config, registry }
    }
}

/// Handler for broker requests.
///
/// Every call blocks on backend I/O and is meant to run on a worker
/// thread, not on the async runtime.
pub struct RequestHandler {
    context: HandlerContext,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the database registry.
    pub fn registry(&self) -> &Registry {
        &self.context.registry
    }

    /// Decodes and handles a raw request body.
    ///
    /// # Errors
    ///
    /// Returns an error only if the body cannot be decoded. Broker
    /// failures are reported inside the [`Response`].
    pub fn handle_bytes(&self, body: &[u8]) -> ServerResult<Response> {
        self.handle_bytes_for(body, &RequestTicket::new())
    }

    /// Decodes and handles a raw request body on behalf of `ticket`.
    ///
    /// # Errors
    ///
    /// As [`RequestHandler::handle_bytes`].
    pub fn handle_bytes_for(&self, body: &[u8], ticket: &RequestTicket) -> ServerResult<Response> {
        let op = Operation::decode(body)?;
        Ok(self.handle_with(op, ticket))
    }

    /// Handles a decoded operation. Always yields a response.
    pub fn handle(&self, op: Operation) -> Response {
        self.handle_with(op, &RequestTicket::new())
    }

    /// Handles a decoded operation on behalf of `ticket`.
    ///
    /// A `begin` whose ticket was abandoned before the database lock was
    /// acquired starts no transaction.
    pub fn handle_with(&self, op: Operation, ticket: &RequestTicket) -> Response {
        let name = op.name();
        tracing::debug!(operation = name, path = ?op.path(), "handling request");
        match self.dispatch(op, ticket) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(operation = name, kind = err.kind(), error = %err, "operation failed");
                Response::from_core_error(&err)
            }
        }
    }

    /// Closes every open database, rolling back open transactions.
    pub fn shutdown(&self) {
        match self.registry().close_all() {
            Ok(closed) => tracing::info!(closed, "closed all databases"),
            Err(err) => tracing::warn!(error = %err, "close-all during shutdown failed"),
        }
    }

    fn dispatch(&self, op: Operation, ticket: &RequestTicket) -> CoreResult<Response> {
        let registry = self.registry();
        match op {
            Operation::Initialize { path, options } => {
                let resolved = registry.initialize(&path, options)?;
                Ok(Response::success(format!(
                    "Database initialized successfully at {}",
                    resolved.display()
                )))
            }
            Operation::Begin { path } => {
                let handle = registry.begin_if(&path, || ticket.claim())?;
                Ok(Response::success("Transaction started successfully").with_txn_handle(&handle))
            }
            Operation::Commit { path, txn } => {
                registry.commit(&path, &txn)?;
                Ok(Response::success("Transaction committed successfully"))
            }
            Operation::Rollback { path, txn } => {
                registry.rollback(&path, &txn)?;
                Ok(Response::success("Transaction rolled back successfully"))
            }
            Operation::Close { path } => {
                let outcome = registry.close(&path)?;
                let message = match outcome.rolled_back {
                    Some(handle) => format!(
                        "Database {} closed successfully, open transaction {handle} rolled back",
                        outcome.path.display()
                    ),
                    None => format!("Database {} closed successfully", outcome.path.display()),
                };
                Ok(Response::success(message))
            }
            Operation::CloseAll => {
                let closed = registry.close_all()?;
                Ok(Response::success(format!(
                    "Closed {closed} database(s) successfully"
                )))
            }
            Operation::Execute {
                path,
                txn,
                sql,
                arguments,
            } => {
                let outcome = registry.execute(&path, txn.as_ref(), &sql, arguments.as_deref())?;
                Ok(match outcome.result_set {
                    Some(rows) => Response::success("SQL executed successfully").with_resultset(rows),
                    None => Response::success(format!(
                        "SQL executed successfully, {} row(s) affected",
                        outcome.rows_affected
                    )),
                })
            }
        }
    }
}
