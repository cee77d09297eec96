//! Capability seams injected by the caller.
//!
//! The core is a pure transformation over in-memory values; everything
//! that touches key material, randomness or the clock comes in through
//! these traits.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;

/// Boxed error type for capability implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Private-key signing capability, used to sign a freshly built KB-JWT.
pub trait Signer {
    /// Signs the message, returning the raw (unencoded) signature bytes.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, BoxError>;

    /// JWS algorithm name of the signatures produced, e.g. `ES256`.
    fn algorithm(&self) -> String;
}

/// Signature-checking capability by algorithm name and public key
/// material.
///
/// The core carries issuer and holder signatures opaquely and never calls
/// this itself; it is the seam through which callers verify the JWS
/// signatures of a parsed token.
pub trait SignatureVerifier {
    /// Returns true when `signature` is valid for `message` under `key`.
    fn verify(&self, message: &[u8], signature: &[u8], key: &[u8]) -> bool;
}

/// Source of cryptographically secure randomness for disclosure salts.
pub trait Entropy {
    /// Returns `n` random bytes.
    fn random(&mut self, n: usize) -> Vec<u8>;
}

/// [`Entropy`] backed by the operating system's random number generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

impl Entropy for OsEntropy {
    fn random(&mut self, n: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; n];
        OsRng.fill_bytes(&mut bytes);
        bytes
    }
}

/// Time source for the KB-JWT `iat` claim.
pub trait Clock {
    /// Whole seconds since the Unix epoch.
    fn now_unix_seconds(&self) -> i64;
}

/// [`Clock`] backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_seconds(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as i64)
    }
}
