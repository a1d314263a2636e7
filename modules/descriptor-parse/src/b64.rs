use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use nodescore_core::ParseFailure;

// Share-link encoders are sloppy: accept stray trailing bits and any padding.
const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_allow_trailing_bits(true)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decode base64 that may have lost its padding or been wrapped across lines.
/// The standard alphabet is tried first, then the URL-safe one.
pub(crate) fn decode_lenient(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let mut padded = cleaned.trim_end_matches('=').to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    STANDARD
        .decode(padded.as_bytes())
        .or_else(|e| URL_SAFE.decode(padded.as_bytes()).map_err(|_| e))
}

pub(crate) fn decode_text(input: &str, what: &str) -> Result<String, ParseFailure> {
    let bytes = decode_lenient(input)
        .map_err(|e| ParseFailure::malformed(format!("{} is not valid base64: {}", what, e)))?;
    String::from_utf8(bytes)
        .map_err(|_| ParseFailure::malformed(format!("{} does not decode to UTF-8 text", what)))
}
