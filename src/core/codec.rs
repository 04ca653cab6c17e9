//! Pure transforms shared by every stage of the pipeline: base64url, raw deflate and UTF-8.

use std::io::{Read, Write};

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};

/// Standard alphabet, padding optional. URL-safe input is translated before decoding.
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const URL_SAFE_NO_PAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_encode_padding(false),
);

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed base64url: {0}")]
    MalformedEncoding(String),
    #[error("raw deflate decompression failed: {0}")]
    DecompressionFailed(String),
    #[error("raw deflate compression failed: {0}")]
    CompressionFailed(String),
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(String),
}

/// Decodes base64url, tolerating missing or present padding.
pub fn decode_base64url(s: &str) -> Result<Vec<u8>, CodecError> {
    let standard: String = s
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    STANDARD_LENIENT
        .decode(standard)
        .map_err(|e| CodecError::MalformedEncoding(e.to_string()))
}

/// Encodes as unpadded base64url.
pub fn encode_base64url(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Inflates a raw deflate stream (no zlib or gzip container) into UTF-8 text.
pub fn inflate_raw(bytes: &[u8]) -> Result<String, CodecError> {
    let mut inflated = Vec::new();
    DeflateDecoder::new(bytes)
        .read_to_end(&mut inflated)
        .map_err(|e| CodecError::DecompressionFailed(e.to_string()))?;
    decode_utf8(inflated)
}

/// Compresses with raw deflate (no zlib or gzip container).
pub fn deflate_raw(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(bytes)
        .map_err(|e| CodecError::CompressionFailed(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CodecError::CompressionFailed(e.to_string()))
}

pub fn decode_utf8(bytes: Vec<u8>) -> Result<String, CodecError> {
    String::from_utf8(bytes).map_err(|e| CodecError::InvalidUtf8(e.to_string()))
}
