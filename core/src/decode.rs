//! Turning validated response bodies into values.
//!
//! # Design
//! `Decoder` is the pluggable wire-format collaborator (JSON by default).
//! `ResponseShape` is what a request resolves to: every deserializable type
//! goes through the decoder, while the `NoContent` marker skips decoding
//! entirely so empty `204` bodies succeed.

use serde::de::DeserializeOwned;

use crate::error::DecodeError;
use crate::http::RawResponse;

pub trait Decoder: Send + Sync {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A type a response can resolve to.
pub trait ResponseShape: Sized {
    fn from_response<D: Decoder>(decoder: &D, response: &RawResponse) -> Result<Self, DecodeError>;
}

impl<T: DeserializeOwned> ResponseShape for T {
    fn from_response<D: Decoder>(decoder: &D, response: &RawResponse) -> Result<Self, DecodeError> {
        decoder.decode(&response.body)
    }
}

/// Marker for endpoints whose body is irrelevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoContent;

impl ResponseShape for NoContent {
    fn from_response<D: Decoder>(_decoder: &D, _response: &RawResponse) -> Result<Self, DecodeError> {
        Ok(NoContent)
    }
}
