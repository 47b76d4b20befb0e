//! Ledger implementation backed by a Unique-style JSON-RPC node.

pub mod client;
pub mod error;
pub mod parse;

pub use client::{RpcConfig, RpcLedger, http_url};
pub use error::RpcError;
