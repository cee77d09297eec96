/// Errors raised while parsing an SD-JWT, resolving its disclosures, or
/// handling a key-binding JWT.
///
/// Every failure carries enough context (the offending disclosure, digest
/// or hash pair) to be actionable by the caller. The library never
/// retries and never returns partial results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token is structurally broken: wrong segment counts, undecodable
    /// segments, non-JSON header or payload, or a missing trailing `~`.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A disclosure segment fails base64 decoding, is not a JSON array, or
    /// has the wrong arity or element types.
    #[error("invalid disclosure: {0}")]
    InvalidDisclosure(String),

    /// Two entries in the disclosure list are byte-identical.
    #[error("duplicate disclosure found: {0}")]
    DuplicateDisclosure(String),

    /// The same digest is declared more than once in the payload, across
    /// any `_sd` arrays or array element stubs.
    #[error("duplicate digest found: {0}")]
    DuplicateDigest(String),

    /// A full resolver pass placed no disclosure while some remain; the
    /// leftovers reference no digest in the payload.
    #[error("no matching digest found for: {0}")]
    OrphanDisclosure(String),

    /// A digest listed under `_sd` matched a disclosure that carries no
    /// claim name.
    #[error("disclosure matching digest {0} has no claim name")]
    MalformedSdClaim(String),

    /// `_sd_alg` names a hash this library does not provide.
    #[error("unsupported _sd_alg: {0}")]
    UnsupportedAlgorithm(String),

    /// The KB-JWT's `sd_hash` does not equal the hash of the presented
    /// SD-JWT prefix.
    #[error(
        "sd hash validation failed: calculated hash {calculated} does not equal provided hash {provided}"
    )]
    KbHashMismatch {
        /// Hash recomputed over the received presentation prefix.
        calculated: String,
        /// Hash carried in the KB-JWT body.
        provided: String,
    },

    /// `add_key_binding` was called with a hash incompatible with the
    /// SD-JWT's `_sd_alg` (or with SHA-256 when `_sd_alg` is absent).
    #[error("key binding hash {requested} does not match the sd-jwt hashing algorithm {expected}")]
    HashAlgorithmMismatch {
        /// Hash requested by the caller.
        requested: String,
        /// Hash the SD-JWT's digests use.
        expected: String,
    },

    /// `add_key_binding` was called on an SD-JWT that already carries a
    /// KB-JWT.
    #[error("key binding jwt already exists")]
    KbAlreadyPresent,

    /// The KB-JWT header or body is missing required fields or has the
    /// wrong `typ`.
    #[error("invalid kb-jwt: {0}")]
    InvalidKbJwt(String),

    /// The injected signer failed to produce a signature.
    #[error("signing failed: {0}")]
    Signature(#[source] crate::provider::BoxError),

    /// JSON re-serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
