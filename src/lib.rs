//! Core machinery for Selective Disclosure JWTs ([SD-JWT]).
//!
//! An SD-JWT is an issuer-signed JWS whose payload replaces chosen claims
//! with digests, accompanied by the *disclosures*: base64url-encoded
//! `[salt, claim_name?, claim_value]` arrays that reveal them. This
//! crate parses the compact representation, binds disclosures back into
//! the payload, enforces the digest-integrity rules of the SD-JWT
//! specification, and produces or validates the optional key-binding JWT
//! (KB-JWT) pinning a presentation to a holder.
//!
//! Issuer and holder signatures are carried opaquely: verifying them is
//! the caller's business, through whatever [`SignatureVerifier`]
//! implementation fits their key infrastructure. Signing, randomness and
//! time enter through the [`provider`] capability traits.
//!
//! # Grammar
//!
//! ```abnf
//! ALPHA = %x41-5A / %x61-7A ; A-Z / a-z
//! DIGIT = %x30-39 ; 0-9
//! BASE64URL = 1*(ALPHA / DIGIT / "-" / "_")
//! JWT = BASE64URL "." BASE64URL "." BASE64URL
//! DISCLOSURE = BASE64URL
//! KB-JWT = JWT
//! SD-JWT = JWT "~" *(DISCLOSURE "~") [KB-JWT]
//! ```
//!
//! [SD-JWT]: <https://www.ietf.org/archive/id/draft-ietf-oauth-selective-disclosure-jwt-17.html>
#![warn(missing_docs)]

use std::collections::HashSet;
use std::fmt;

use serde_json::{Map, Value};

mod collect;
mod digest;
mod disclosure;
mod error;
mod kb;
pub mod provider;
mod reveal;
mod utils;

pub use digest::SdAlg;
pub use disclosure::Disclosure;
pub use error::Error;
pub use kb::KbJwt;
pub use provider::{BoxError, Clock, Entropy, SignatureVerifier, Signer, SystemClock};
pub use reveal::StripMode;

const SD_CLAIM_NAME: &str = "_sd";
const SD_ALG_CLAIM_NAME: &str = "_sd_alg";
const ARRAY_CLAIM_ITEM_PROPERTY_NAME: &str = "...";

/// A parsed SD-JWT.
///
/// Produced by [`SdJwt::parse`] or [`SdJwt::from_components`], both of
/// which validate the compact structure, every disclosure, digest
/// uniqueness across the payload, and the `sd_hash` binding of any
/// KB-JWT riding along.
///
/// An `SdJwt` is immutable except for [`SdJwt::add_key_binding`], which
/// may attach a KB-JWT when none is present. [`SdJwt::disclosed_claims`]
/// works on a private copy of the payload and never mutates the receiver.
#[derive(Clone, Debug)]
pub struct SdJwt {
    header: Map<String, Value>,
    payload: Map<String, Value>,
    signature: String,
    disclosures: Vec<Disclosure>,
    kb_jwt: Option<KbJwt>,
    // Received segments, kept byte-exact so the compact form round-trips
    // and hashes match the wire bytes.
    header_b64: String,
    payload_b64: String,
}

impl SdJwt {
    /// Parses a compact-form SD-JWT.
    ///
    /// The token must contain the issuer JWS and at least one disclosure
    /// slot (a trailing `~`, even when no disclosures are present). A
    /// non-empty final segment is a KB-JWT; otherwise the token must end
    /// with `~`.
    pub fn parse(token: &str) -> Result<Self, Error> {
        let mut sections: Vec<&str> = token.split('~').collect();
        if sections.len() < 2 {
            return Err(Error::InvalidToken(
                "token has no specified disclosures".to_owned(),
            ));
        }

        let jws_parts: Vec<&str> = sections[0].split('.').collect();
        if jws_parts.len() != 3 {
            return Err(Error::InvalidToken("token is not a valid JWT".to_owned()));
        }

        let header = decode_json_segment(jws_parts[0], "header")?;

        let last = sections[sections.len() - 1];
        let kb_jwt = if last.is_empty() {
            None
        } else if last.split('.').count() == 3 {
            let kb = KbJwt::parse(last)?;
            sections.pop();
            Some(kb)
        } else {
            return Err(Error::InvalidToken(
                "if no kb-jwt is provided, the last disclosure must be followed by a ~".to_owned(),
            ));
        };

        let mut disclosures = vec![];
        let mut seen = HashSet::new();
        for segment in &sections[1..] {
            if segment.is_empty() {
                continue;
            }
            if !seen.insert(*segment) {
                return Err(Error::DuplicateDisclosure((*segment).to_owned()));
            }
            disclosures.push(Disclosure::from_encoded(segment)?);
        }

        let payload = decode_json_segment(jws_parts[1], "payload")?;
        collect::validate_digests(&payload)?;
        let alg = sd_alg(&payload)?;

        if let Some(kb) = &kb_jwt {
            // The hash input is the received prefix, byte-exact: the JWS
            // and every disclosure segment, `~`-joined and `~`-terminated.
            let prefix = format!("{}~", sections.join("~"));
            let calculated = alg.hash(prefix.as_bytes());
            if calculated != kb.sd_hash() {
                return Err(Error::KbHashMismatch {
                    calculated,
                    provided: kb.sd_hash().to_owned(),
                });
            }
        }

        Ok(Self {
            header,
            payload,
            signature: jws_parts[2].to_owned(),
            disclosures,
            kb_jwt,
            header_b64: jws_parts[0].to_owned(),
            payload_b64: jws_parts[1].to_owned(),
        })
    }

    /// Assembles the compact form from pre-encoded components and parses
    /// it, applying exactly the validation of [`SdJwt::parse`].
    pub fn from_components(
        header_b64: &str,
        payload_b64: &str,
        signature_b64: &str,
        disclosures: &[String],
        kb_jwt: Option<&str>,
    ) -> Result<Self, Error> {
        let mut token = format!("{header_b64}.{payload_b64}.{signature_b64}~");
        for disclosure in disclosures {
            token.push_str(disclosure);
            token.push('~');
        }
        if let Some(kb) = kb_jwt {
            token.push_str(kb);
        }

        Self::parse(&token)
    }

    /// Resolves every disclosure into a copy of the payload and returns
    /// the disclosed claim set: all plaintext claims plus the revealed
    /// ones, without `_sd`, `_sd_alg`, or undisclosed array stubs.
    ///
    /// Fails when a disclosure matches no digest ([`Error::OrphanDisclosure`])
    /// or when an `_sd` digest is matched by a nameless array-element
    /// disclosure ([`Error::MalformedSdClaim`]).
    pub fn disclosed_claims(&self) -> Result<Map<String, Value>, Error> {
        self.disclosed_claims_with(StripMode::DropUndisclosed)
    }

    /// As [`SdJwt::disclosed_claims`], with the given treatment of array
    /// stubs whose element remains withheld.
    pub fn disclosed_claims_with(&self, mode: StripMode) -> Result<Map<String, Value>, Error> {
        let alg = sd_alg(&self.payload)?;
        reveal::reveal_claims(&self.payload, &self.disclosures, alg, mode)
    }

    /// Signs and attaches a KB-JWT binding this presentation to `aud` and
    /// `nonce`, with `iat` taken from the system clock.
    ///
    /// `hash` must be the SD-JWT's digest algorithm: the payload's
    /// `_sd_alg`, or SHA-256 when absent. Fails with
    /// [`Error::KbAlreadyPresent`] when a KB-JWT is already attached.
    pub fn add_key_binding(
        &mut self,
        signer: &impl Signer,
        hash: SdAlg,
        alg: &str,
        aud: &str,
        nonce: &str,
    ) -> Result<(), Error> {
        self.add_key_binding_with(signer, hash, alg, aud, nonce, &SystemClock)
    }

    /// As [`SdJwt::add_key_binding`], with an injected time source.
    pub fn add_key_binding_with(
        &mut self,
        signer: &impl Signer,
        hash: SdAlg,
        alg: &str,
        aud: &str,
        nonce: &str,
        clock: &impl Clock,
    ) -> Result<(), Error> {
        if self.kb_jwt.is_some() {
            return Err(Error::KbAlreadyPresent);
        }

        let expected = sd_alg(&self.payload)?;
        if hash != expected {
            return Err(Error::HashAlgorithmMismatch {
                requested: hash.to_str().to_owned(),
                expected: expected.to_str().to_owned(),
            });
        }

        let prefix = self.binding_prefix()?;
        self.kb_jwt = Some(KbJwt::build(signer, hash, alg, aud, nonce, &prefix, clock)?);

        Ok(())
    }

    /// The `~`-terminated presentation prefix committed to by `sd_hash`,
    /// rebuilt from the re-serialized header and payload, the retained
    /// signature, and every disclosure's exact encoding.
    fn binding_prefix(&self) -> Result<String, Error> {
        let mut prefix = format!(
            "{}.{}.{}~",
            utils::b64url_encode(serde_json::to_string(&self.header)?),
            utils::b64url_encode(serde_json::to_string(&self.payload)?),
            self.signature,
        );
        for disclosure in &self.disclosures {
            prefix.push_str(disclosure.encoded());
            prefix.push('~');
        }

        Ok(prefix)
    }

    /// The decoded issuer protected header.
    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// The decoded payload, disclosures still concealed.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// The issuer JWS signature, base64url as received. Not verified
    /// here.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The disclosures, in presentation order.
    pub fn disclosures(&self) -> &[Disclosure] {
        &self.disclosures
    }

    /// The attached KB-JWT, if any.
    pub fn kb_jwt(&self) -> Option<&KbJwt> {
        self.kb_jwt.as_ref()
    }
}

impl fmt::Display for SdJwt {
    /// Writes the compact form. The issuer JWS round-trips byte-exactly;
    /// a KB-JWT (received or added) is appended after the final `~`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}~",
            self.header_b64, self.payload_b64, self.signature
        )?;
        for disclosure in &self.disclosures {
            write!(f, "{disclosure}~")?;
        }
        if let Some(kb) = &self.kb_jwt {
            f.write_str(kb.token())?;
        }

        Ok(())
    }
}

fn decode_json_segment(segment: &str, what: &str) -> Result<Map<String, Value>, Error> {
    let bytes = utils::b64url_decode(segment)
        .map_err(|e| Error::InvalidToken(format!("failed to decode {what}: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidToken(format!("failed to parse decoded {what}: {e}")))
}

/// The digest algorithm the payload selects: `_sd_alg` when present as a
/// string (matched case-insensitively), SHA-256 otherwise.
fn sd_alg(payload: &Map<String, Value>) -> Result<SdAlg, Error> {
    match payload.get(SD_ALG_CLAIM_NAME).and_then(Value::as_str) {
        Some(name) => name.parse(),
        None => Ok(SdAlg::Sha256),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn b64_json(value: Value) -> String {
        utils::b64url_encode(serde_json::to_string(&value).unwrap())
    }

    fn minimal_token() -> String {
        let disclosure =
            Disclosure::from_object("given_name", &json!("John"), None).unwrap();
        let payload = b64_json(json!({
            "_sd": [disclosure.hash(SdAlg::Sha256)],
            "_sd_alg": "sha-256",
            "iss": "https://example.com/issuer",
        }));
        let header = b64_json(json!({"alg": "ES256"}));

        format!("{header}.{payload}.c2lnbmF0dXJl~{}~", disclosure.encoded())
    }

    #[test]
    fn parse_splits_the_compact_form() {
        let token = minimal_token();
        let sd_jwt = SdJwt::parse(&token).unwrap();

        assert_eq!(
            sd_jwt.header().get("alg").and_then(Value::as_str),
            Some("ES256"),
        );
        assert_eq!(sd_jwt.signature(), "c2lnbmF0dXJl");
        assert_eq!(sd_jwt.disclosures().len(), 1);
        assert!(sd_jwt.kb_jwt().is_none());
        assert!(sd_jwt.payload().contains_key("_sd"));
    }

    #[test]
    fn display_round_trips() {
        let token = minimal_token();
        let sd_jwt = SdJwt::parse(&token).unwrap();

        assert_eq!(sd_jwt.to_string(), token);
    }

    #[test]
    fn parse_is_a_left_inverse_of_from_components() {
        let token = minimal_token();
        let parsed = SdJwt::parse(&token).unwrap();

        let rebuilt = SdJwt::from_components(
            &parsed.header_b64,
            &parsed.payload_b64,
            parsed.signature(),
            &parsed
                .disclosures()
                .iter()
                .map(|d| d.encoded().to_owned())
                .collect::<Vec<_>>(),
            None,
        )
        .unwrap();

        assert_eq!(rebuilt.to_string(), token);
    }

    #[test]
    fn token_without_a_tilde_is_rejected() {
        assert!(matches!(
            SdJwt::parse("a.b.c"),
            Err(Error::InvalidToken(_)),
        ));
    }

    #[test]
    fn jws_must_have_three_parts() {
        assert!(matches!(
            SdJwt::parse("a.b~"),
            Err(Error::InvalidToken(_)),
        ));
        assert!(matches!(
            SdJwt::parse("a.b.c.d~"),
            Err(Error::InvalidToken(_)),
        ));
    }

    #[test]
    fn missing_trailing_tilde_is_rejected() {
        // The final segment is neither empty nor a 3-part KB-JWT.
        let token = minimal_token();
        let truncated = token.trim_end_matches('~');

        assert!(matches!(
            SdJwt::parse(truncated),
            Err(Error::InvalidToken(message)) if message.contains("followed by a ~"),
        ));
    }

    #[test]
    fn header_must_be_json() {
        assert!(matches!(
            SdJwt::parse("bm90anNvbg.e30.sig~"),
            Err(Error::InvalidToken(message)) if message.contains("header"),
        ));
    }

    #[test]
    fn unknown_sd_alg_is_rejected_at_parse() {
        let header = b64_json(json!({"alg": "ES256"}));
        let payload = b64_json(json!({"_sd_alg": "md5", "sub": "user_42"}));
        let token = format!("{header}.{payload}.sig~");

        assert!(matches!(
            SdJwt::parse(&token),
            Err(Error::UnsupportedAlgorithm(name)) if name == "md5",
        ));
    }
}
