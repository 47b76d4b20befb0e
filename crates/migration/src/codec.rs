//! Decoding of opaque token payloads.

use std::fmt::Debug;

use serde_json::Value;

use crate::{error::DecodeError, types::CollectionSnapshot};

/// Turns a token's constant payload into a structured value. Exports treat
/// every failure as "no decoded form" and carry on.
pub trait PayloadDecoder: Debug + Send + Sync {
    fn decode(&self, collection: &CollectionSnapshot, payload: &[u8]) -> Result<Value, DecodeError>;
}

/// Reads payloads that are UTF-8 JSON documents, which is how most
/// collections without an on-chain schema store their metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadDecoder;

impl PayloadDecoder for JsonPayloadDecoder {
    fn decode(&self, _collection: &CollectionSnapshot, payload: &[u8]) -> Result<Value, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError("empty payload".to_owned()));
        }
        let text = std::str::from_utf8(payload).map_err(|err| DecodeError(err.to_string()))?;
        serde_json::from_str(text).map_err(|err| DecodeError(err.to_string()))
    }
}

/// Never decodes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDecoder;

impl PayloadDecoder for NoopDecoder {
    fn decode(&self, _collection: &CollectionSnapshot, _payload: &[u8]) -> Result<Value, DecodeError> {
        Err(DecodeError("decoding disabled".to_owned()))
    }
}
