use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::{Error, ARRAY_CLAIM_ITEM_PROPERTY_NAME, SD_CLAIM_NAME};

/// Checks that every digest declared anywhere in the payload is unique
/// across the whole document.
///
/// Digests appear as string elements of `_sd` arrays and as the value of
/// `{"...": "<digest>"}` stubs occupying array slots; the walk recurses
/// into every other object member and array element, so duplicates are
/// caught across scopes, not only within one `_sd` array.
pub(crate) fn validate_digests(payload: &Map<String, Value>) -> Result<(), Error> {
    let mut seen = HashSet::new();
    check_object(payload, &mut seen)
}

/// Matches the `{"...": "<digest>"}` shape concealing an array element: an
/// object of arity one whose sole key is `...` with a string value.
pub(crate) fn concealed_array_item(item: &Value) -> Option<&str> {
    let object = item.as_object()?;

    if object.len() != 1 {
        return None;
    }

    object.get(ARRAY_CLAIM_ITEM_PROPERTY_NAME)?.as_str()
}

fn check_object<'a>(
    object: &'a Map<String, Value>,
    seen: &mut HashSet<&'a str>,
) -> Result<(), Error> {
    if let Some(Value::Array(digests)) = object.get(SD_CLAIM_NAME) {
        for digest in digests.iter().filter_map(Value::as_str) {
            record(digest, seen)?;
        }
    }

    for (key, value) in object {
        if key != SD_CLAIM_NAME {
            check_value(value, seen)?;
        }
    }

    Ok(())
}

fn check_value<'a>(value: &'a Value, seen: &mut HashSet<&'a str>) -> Result<(), Error> {
    match value {
        Value::Object(object) => check_object(object, seen),
        Value::Array(items) => {
            for item in items {
                match concealed_array_item(item) {
                    Some(digest) => record(digest, seen)?,
                    None => check_value(item, seen)?,
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn record<'a>(digest: &'a str, seen: &mut HashSet<&'a str>) -> Result<(), Error> {
    if seen.insert(digest) {
        Ok(())
    } else {
        Err(Error::DuplicateDigest(digest.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn unique_digests_pass() {
        let body = payload(json!({
            "_sd": ["digest-a", "digest-b"],
            "address": {"_sd": ["digest-c"]},
            "nationalities": [{"...": "digest-d"}, "DE"],
        }));

        assert!(validate_digests(&body).is_ok());
    }

    #[test]
    fn duplicate_within_one_sd_array() {
        let body = payload(json!({"_sd": ["digest-a", "digest-a"]}));

        assert!(matches!(
            validate_digests(&body),
            Err(Error::DuplicateDigest(d)) if d == "digest-a"
        ));
    }

    #[test]
    fn duplicate_across_nested_scopes() {
        let body = payload(json!({
            "_sd": ["digest-a"],
            "address": {"_sd": ["digest-a"]},
        }));

        assert!(validate_digests(&body).is_err());
    }

    #[test]
    fn duplicate_between_sd_array_and_array_stub() {
        let body = payload(json!({
            "_sd": ["digest-a"],
            "nationalities": [{"...": "digest-a"}],
        }));

        assert!(validate_digests(&body).is_err());
    }

    #[test]
    fn duplicate_between_array_stubs() {
        let body = payload(json!({
            "nationalities": [{"...": "digest-a"}, {"...": "digest-a"}],
        }));

        assert!(validate_digests(&body).is_err());
    }

    #[test]
    fn duplicate_hidden_inside_array_of_objects() {
        let body = payload(json!({
            "_sd": ["digest-a"],
            "evidence": [{"document": {"_sd": ["digest-a"]}}],
        }));

        assert!(validate_digests(&body).is_err());
    }

    #[test]
    fn multi_key_objects_with_ellipsis_are_not_stubs() {
        let body = payload(json!({
            "items": [{"...": "digest-a", "other": 1}, {"...": "digest-a", "other": 2}],
        }));

        assert!(validate_digests(&body).is_ok());
    }
}
