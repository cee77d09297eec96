use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::{DecodeError, Engine};

/// Encodes `bytes` as unpadded url-safe base64.
pub(crate) fn b64url_encode(bytes: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes an unpadded url-safe base64 string. Non-alphabet characters and
/// padding are rejected.
pub(crate) fn b64url_decode(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64_URL_SAFE_NO_PAD.decode(encoded)
}
