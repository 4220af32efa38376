//! # SyncLiteDB Server
//!
//! HTTP request broker for SyncLiteDB.
//!
//! This crate provides:
//! - A single POST endpoint accepting JSON operations
//! - Request handling on a pool of blocking workers
//! - Per-request timeouts and a connection limit
//! - Graceful shutdown that rolls back open transactions
//!
//! # Status codes
//!
//! Every well-formed request is answered with `200 OK`, whether or not
//! the operation succeeded; `result` in the body carries the outcome.
//! Only transport-level problems use other codes: `400` for an
//! undecodable body, `405` for a method other than POST and `413` for
//! an oversized body.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler, RequestTicket};
pub use server::BrokerServer;
