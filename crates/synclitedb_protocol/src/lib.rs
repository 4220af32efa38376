//! # SyncLiteDB Protocol
//!
//! JSON wire format of the SyncLiteDB broker.
//!
//! Requests are decoded into an [`Operation`]; every processed request is
//! answered with a [`Response`] carrying `result` and `message`, plus
//! `txn-handle` after a successful `begin` and `resultset` when a
//! statement produced rows.
//!
//! This crate performs no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod request;
mod response;
mod value;

pub use error::{ProtocolError, ProtocolResult};
pub use request::{Operation, RawRequest};
pub use response::Response;
pub use value::sql_value_from_json;
