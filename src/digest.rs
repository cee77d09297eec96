use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::utils::b64url_encode;
use crate::Error;

/// Hash algorithms recognised in the `_sd_alg` claim.
///
/// Names are matched case-insensitively; an absent or empty `_sd_alg`
/// selects SHA-256.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SdAlg {
    /// SHA-256, the default.
    Sha256,
    /// SHA-224.
    Sha224,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
    /// SHA-512/224.
    Sha512_224,
    /// SHA-512/256.
    Sha512_256,
    /// SHA3-224.
    Sha3_224,
    /// SHA3-256.
    Sha3_256,
    /// SHA3-384.
    Sha3_384,
    /// SHA3-512.
    Sha3_512,
}

impl SdAlg {
    /// String encoding of the `_sd_alg` field.
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha-256",
            Self::Sha224 => "sha-224",
            Self::Sha384 => "sha-384",
            Self::Sha512 => "sha-512",
            Self::Sha512_224 => "sha-512/224",
            Self::Sha512_256 => "sha-512/256",
            Self::Sha3_224 => "sha3-224",
            Self::Sha3_256 => "sha3-256",
            Self::Sha3_384 => "sha3-384",
            Self::Sha3_512 => "sha3-512",
        }
    }

    /// Base64url digest of the given bytes.
    ///
    /// A hasher is created fresh for every call; partial state is never
    /// shared between disclosures.
    pub fn hash(&self, bytes: &[u8]) -> String {
        let digest = match self {
            Self::Sha256 => sha2::Sha256::digest(bytes).to_vec(),
            Self::Sha224 => sha2::Sha224::digest(bytes).to_vec(),
            Self::Sha384 => sha2::Sha384::digest(bytes).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(bytes).to_vec(),
            Self::Sha512_224 => sha2::Sha512_224::digest(bytes).to_vec(),
            Self::Sha512_256 => sha2::Sha512_256::digest(bytes).to_vec(),
            Self::Sha3_224 => sha3::Sha3_224::digest(bytes).to_vec(),
            Self::Sha3_256 => sha3::Sha3_256::digest(bytes).to_vec(),
            Self::Sha3_384 => sha3::Sha3_384::digest(bytes).to_vec(),
            Self::Sha3_512 => sha3::Sha3_512::digest(bytes).to_vec(),
        };

        b64url_encode(digest)
    }
}

impl FromStr for SdAlg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SdAlg::try_from(s)
    }
}

impl TryFrom<&str> for SdAlg {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(match value.to_lowercase().as_str() {
            "sha-256" | "" => Self::Sha256,
            "sha-224" => Self::Sha224,
            "sha-384" => Self::Sha384,
            "sha-512" => Self::Sha512,
            "sha-512/224" => Self::Sha512_224,
            "sha-512/256" => Self::Sha512_256,
            "sha3-224" => Self::Sha3_224,
            "sha3-256" => Self::Sha3_256,
            "sha3-384" => Self::Sha3_384,
            "sha3-512" => Self::Sha3_512,
            other => return Err(Error::UnsupportedAlgorithm(other.to_owned())),
        })
    }
}

impl From<SdAlg> for &'static str {
    fn from(value: SdAlg) -> Self {
        value.to_str()
    }
}

impl fmt::Display for SdAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

impl Serialize for SdAlg {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SdAlg {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}
