use std::fmt;

use serde_json::{json, Value};

use crate::provider::{Entropy, OsEntropy};
use crate::utils::{b64url_decode, b64url_encode};
use crate::{Error, SdAlg};

/// Salt bytes drawn when the caller does not supply a salt.
const DEFAULT_SALT_SIZE: usize = 128 / 8;

/// A single disclosure: the salt, optional claim name and claim value
/// carried by one `~`-separated segment of an SD-JWT.
///
/// The encoded form is kept byte-exact as received. Digests are always
/// computed over these bytes, never over a re-serialization: issuers are
/// free to vary the JSON whitespace inside the encoding, and two
/// disclosures with the same content but different whitespace hash
/// differently.
#[derive(Clone, Debug, PartialEq)]
pub struct Disclosure {
    salt: String,
    claim_name: Option<String>,
    claim_value: Value,
    encoded: String,
}

impl Disclosure {
    /// Decodes a disclosure from its base64url segment.
    ///
    /// The decoded bytes must be a JSON array of the form
    /// `[salt, value]` (array element disclosure) or
    /// `[salt, claim_name, value]` (object member disclosure).
    pub fn from_encoded(encoded: &str) -> Result<Self, Error> {
        let bytes = b64url_decode(encoded)
            .map_err(|e| Error::InvalidDisclosure(format!("{encoded}: {e}")))?;

        // Outer brackets are required on the exact bytes, untrimmed.
        if bytes.first() != Some(&b'[') || bytes.last() != Some(&b']') {
            return Err(Error::InvalidDisclosure(format!(
                "{encoded}: decoded form is not a JSON array"
            )));
        }

        let parsed: Value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidDisclosure(format!("{encoded}: {e}")))?;

        let Value::Array(elements) = parsed else {
            return Err(Error::InvalidDisclosure(format!(
                "{encoded}: decoded form is not a JSON array"
            )));
        };

        let (salt, claim_name, claim_value) = match elements.as_slice() {
            [salt, value] => (salt, None, value),
            [salt, name, value] => {
                let name = name.as_str().ok_or_else(|| {
                    Error::InvalidDisclosure(format!("{encoded}: claim name is not a string"))
                })?;
                (salt, Some(name.to_owned()), value)
            }
            _ => {
                return Err(Error::InvalidDisclosure(format!(
                    "{encoded}: array must contain 2 or 3 elements"
                )))
            }
        };

        let salt = salt
            .as_str()
            .ok_or_else(|| Error::InvalidDisclosure(format!("{encoded}: salt is not a string")))?
            .to_owned();

        Ok(Self {
            salt,
            claim_name,
            claim_value: claim_value.clone(),
            encoded: encoded.to_owned(),
        })
    }

    /// Builds an object member disclosure. When `salt` is `None`, 128 bits
    /// are drawn from the operating system.
    pub fn from_object(
        claim_name: &str,
        claim_value: &Value,
        salt: Option<String>,
    ) -> Result<Self, Error> {
        Self::from_object_with(&mut OsEntropy, claim_name, claim_value, salt)
    }

    /// As [`Disclosure::from_object`], drawing any required salt from the
    /// given entropy source.
    pub fn from_object_with(
        entropy: &mut impl Entropy,
        claim_name: &str,
        claim_value: &Value,
        salt: Option<String>,
    ) -> Result<Self, Error> {
        let salt = salt.unwrap_or_else(|| generate_salt(entropy));
        let encoded = encode_array(&json!([salt, claim_name, claim_value]))?;

        Ok(Self {
            salt,
            claim_name: Some(claim_name.to_owned()),
            claim_value: claim_value.clone(),
            encoded,
        })
    }

    /// Builds an array element disclosure. When `salt` is `None`, 128 bits
    /// are drawn from the operating system.
    pub fn from_array_element(claim_value: &Value, salt: Option<String>) -> Result<Self, Error> {
        Self::from_array_element_with(&mut OsEntropy, claim_value, salt)
    }

    /// As [`Disclosure::from_array_element`], drawing any required salt
    /// from the given entropy source.
    pub fn from_array_element_with(
        entropy: &mut impl Entropy,
        claim_value: &Value,
        salt: Option<String>,
    ) -> Result<Self, Error> {
        let salt = salt.unwrap_or_else(|| generate_salt(entropy));
        let encoded = encode_array(&json!([salt, claim_value]))?;

        Ok(Self {
            salt,
            claim_name: None,
            claim_value: claim_value.clone(),
            encoded,
        })
    }

    /// Digest of the exact encoded bytes under the given algorithm.
    pub fn hash(&self, alg: SdAlg) -> String {
        alg.hash(self.encoded.as_bytes())
    }

    /// The issuer-chosen salt.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// The claim name; present for object member disclosures, absent for
    /// array element disclosures.
    pub fn claim_name(&self) -> Option<&str> {
        self.claim_name.as_deref()
    }

    /// The revealed claim value.
    pub fn claim_value(&self) -> &Value {
        &self.claim_value
    }

    /// The base64url form as received (or as first produced).
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for Disclosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

fn generate_salt(entropy: &mut impl Entropy) -> String {
    b64url_encode(entropy.random(DEFAULT_SALT_SIZE))
}

/// Compact JSON serialization (no insignificant whitespace) of a fresh
/// disclosure array, base64url-encoded. These bytes are what later hash to
/// the digest the issuer listed.
fn encode_array(array: &Value) -> Result<String, Error> {
    Ok(b64url_encode(serde_json::to_string(array)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEntropy(u8);

    impl Entropy for FixedEntropy {
        fn random(&mut self, n: usize) -> Vec<u8> {
            vec![self.0; n]
        }
    }

    #[test]
    fn object_disclosure_encoding() {
        let disclosure = Disclosure::from_object(
            "family_name",
            &json!("Möbius"),
            Some("_26bc4LT-ac6q2KI6cBW5es".to_owned()),
        )
        .unwrap();

        assert_eq!(
            disclosure.encoded(),
            "WyJfMjZiYzRMVC1hYzZxMktJNmNCVzVlcyIsImZhbWlseV9uYW1lIiwiTcO2Yml1cyJd",
        );
        assert_eq!(disclosure.claim_name(), Some("family_name"));
        assert_eq!(disclosure.salt(), "_26bc4LT-ac6q2KI6cBW5es");
    }

    #[test]
    fn array_element_disclosure_encoding() {
        let disclosure =
            Disclosure::from_array_element(&json!("FR"), Some("lklxF5jMYlGTPUovMNIvCA".to_owned()))
                .unwrap();

        assert_eq!(
            disclosure.encoded(),
            "WyJsa2x4RjVqTVlsR1RQVW92TU5JdkNBIiwiRlIiXQ",
        );
        assert_eq!(disclosure.claim_name(), None);
        assert_eq!(
            disclosure.hash(SdAlg::Sha256),
            "w0I8EKcdCtUPkGCNUrfwVp2xEgNjtoIDlOxc9-PlOhs",
        );
    }

    #[test]
    fn whitespace_variants_decode_to_the_same_claim() {
        // The same family_name claim encoded with newlines, spaces after
        // separators, and compactly. All decode alike, but each keeps its
        // own bytes.
        let variants = [
            "WwoiXzI2YmM0TFQtYWM2cTJLSTZjQlc1ZXMiLAoiZmFtaWx5X25hbWUiLAoiTcO2Yml1cyIKXQ",
            "WyJfMjZiYzRMVC1hYzZxMktJNmNCVzVlcyIsICJmYW1pbHlfbmFtZSIsICJNXHUwMGY2Yml1cyJd",
            "WyJfMjZiYzRMVC1hYzZxMktJNmNCVzVlcyIsImZhbWlseV9uYW1lIiwiTcO2Yml1cyJd",
        ];

        for encoded in variants {
            let disclosure = Disclosure::from_encoded(encoded).unwrap();
            assert_eq!(disclosure.salt(), "_26bc4LT-ac6q2KI6cBW5es");
            assert_eq!(disclosure.claim_name(), Some("family_name"));
            assert_eq!(disclosure.claim_value(), &json!("Möbius"));
            assert_eq!(disclosure.encoded(), encoded);
        }
    }

    #[test]
    fn received_encoding_drives_the_digest() {
        let spaced = Disclosure::from_encoded(
            "WyI2cU1RdlJMNWhhaiIsICJmYW1pbHlfbmFtZSIsICJNw7ZiaXVzIl0",
        )
        .unwrap();
        let compact =
            Disclosure::from_object("family_name", &json!("Möbius"), Some("6qMQvRL5haj".to_owned()))
                .unwrap();

        assert_eq!(spaced.claim_value(), compact.claim_value());
        assert_eq!(
            spaced.hash(SdAlg::Sha256),
            "uutlBuYeMDyjLLTpf6Jxi7yNkEF35jdyWMn9U7b_RYY",
        );
        assert_ne!(spaced.hash(SdAlg::Sha256), compact.hash(SdAlg::Sha256));
    }

    #[test]
    fn generated_salt_is_128_bits() {
        let disclosure =
            Disclosure::from_object_with(&mut FixedEntropy(0xA5), "sub", &json!("user_42"), None)
                .unwrap();

        // 16 bytes of base64url: 22 characters.
        assert_eq!(disclosure.salt().len(), 22);
        assert_eq!(disclosure.salt(), b64url_encode([0xA5u8; 16]));
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        // Not base64url.
        assert!(matches!(
            Disclosure::from_encoded("not!base64"),
            Err(Error::InvalidDisclosure(_))
        ));
        // `{"a": 1}` is not an array.
        assert!(matches!(
            Disclosure::from_encoded("eyJhIjogMX0"),
            Err(Error::InvalidDisclosure(_))
        ));
        // `["only-salt"]` has the wrong arity.
        assert!(matches!(
            Disclosure::from_encoded("WyJvbmx5LXNhbHQiXQ"),
            Err(Error::InvalidDisclosure(_))
        ));
        // `["s", "a", "b", "c"]` has the wrong arity.
        assert!(matches!(
            Disclosure::from_encoded("WyJzIiwgImEiLCAiYiIsICJjIl0"),
            Err(Error::InvalidDisclosure(_))
        ));
        // `[42, "name", "value"]` has a non-string salt.
        assert!(matches!(
            Disclosure::from_encoded("WzQyLCAibmFtZSIsICJ2YWx1ZSJd"),
            Err(Error::InvalidDisclosure(_))
        ));
        // `["salt", 42, "value"]` has a non-string claim name.
        assert!(matches!(
            Disclosure::from_encoded("WyJzYWx0IiwgNDIsICJ2YWx1ZSJd"),
            Err(Error::InvalidDisclosure(_))
        ));
    }

    #[test]
    fn decode_of_encode_preserves_parts() {
        let value = json!({"country": "DE", "codes": [1, 2.5, null]});
        let built = Disclosure::from_object("address", &value, None).unwrap();
        let decoded = Disclosure::from_encoded(built.encoded()).unwrap();

        assert_eq!(decoded, built);
    }
}
