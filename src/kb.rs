use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::provider::{Clock, Signer};
use crate::utils::{b64url_decode, b64url_encode};
use crate::{Error, SdAlg};

/// Required `typ` header value of a key-binding JWT.
const KB_JWT_TYP: &str = "kb+jwt";

/// A key-binding JWT: the holder-signed token pinning an SD-JWT
/// presentation to an audience and nonce via a hash of the presented
/// prefix.
///
/// Parsing validates shape and required claims only; the signature is
/// retained opaquely for the caller to verify.
#[derive(Clone, Debug, PartialEq)]
pub struct KbJwt {
    header: Map<String, Value>,
    body: KbJwtBody,
    token: String,
}

/// The required KB-JWT claims, in wire order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct KbJwtBody {
    iat: i64,
    aud: String,
    nonce: String,
    sd_hash: String,
}

impl KbJwt {
    /// Parses a compact KB-JWT token.
    ///
    /// Requires three dot-separated segments, a `typ` of `kb+jwt`, and all
    /// of `iat` (integer), `aud`, `nonce` and `sd_hash` (strings) present
    /// in the body.
    pub fn parse(token: &str) -> Result<Self, Error> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidKbJwt("kb jwt is in an invalid format".to_owned()));
        }

        let header_bytes = b64url_decode(parts[0])
            .map_err(|e| Error::InvalidKbJwt(format!("failed to decode header: {e}")))?;
        let header: Map<String, Value> = serde_json::from_slice(&header_bytes)
            .map_err(|e| Error::InvalidKbJwt(format!("failed to parse header: {e}")))?;

        if header.get("typ").and_then(Value::as_str) != Some(KB_JWT_TYP) {
            return Err(Error::InvalidKbJwt("kb jwt is not of type kb+jwt".to_owned()));
        }

        let body_bytes = b64url_decode(parts[1])
            .map_err(|e| Error::InvalidKbJwt(format!("failed to decode body: {e}")))?;
        let body: KbJwtBody = serde_json::from_slice(&body_bytes)
            .map_err(|e| Error::InvalidKbJwt(format!("failed to parse body: {e}")))?;

        Ok(Self {
            header,
            body,
            token: token.to_owned(),
        })
    }

    /// Builds and signs a KB-JWT whose `sd_hash` commits to the given
    /// `~`-terminated presentation prefix.
    pub(crate) fn build(
        signer: &impl Signer,
        hash: SdAlg,
        alg: &str,
        aud: &str,
        nonce: &str,
        prefix: &str,
        clock: &impl Clock,
    ) -> Result<Self, Error> {
        let mut header = Map::new();
        header.insert("typ".to_owned(), Value::String(KB_JWT_TYP.to_owned()));
        header.insert("alg".to_owned(), Value::String(alg.to_uppercase()));

        let body = KbJwtBody {
            iat: clock.now_unix_seconds(),
            aud: aud.to_owned(),
            nonce: nonce.to_owned(),
            sd_hash: hash.hash(prefix.as_bytes()),
        };

        let signing_input = format!(
            "{}.{}",
            b64url_encode(serde_json::to_string(&header)?),
            b64url_encode(serde_json::to_string(&body)?),
        );
        let signature = signer.sign(signing_input.as_bytes()).map_err(Error::Signature)?;
        let token = format!("{signing_input}.{}", b64url_encode(signature));

        Ok(Self { header, body, token })
    }

    /// The decoded KB-JWT protected header.
    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// Issuance time, seconds since the Unix epoch.
    pub fn iat(&self) -> i64 {
        self.body.iat
    }

    /// The audience the presentation is bound to.
    pub fn aud(&self) -> &str {
        &self.body.aud
    }

    /// The verifier-chosen nonce.
    pub fn nonce(&self) -> &str {
        &self.body.nonce
    }

    /// Base64url digest of the bound presentation prefix.
    pub fn sd_hash(&self) -> &str {
        &self.body.sd_hash
    }

    /// The full signed token.
    pub fn token(&self) -> &str {
        &self.token
    }
}
