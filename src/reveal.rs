use serde_json::{Map, Value};

use crate::collect::concealed_array_item;
use crate::disclosure::Disclosure;
use crate::{Error, SdAlg, SD_ALG_CLAIM_NAME, SD_CLAIM_NAME};

/// Treatment of array stubs whose digest has no matching disclosure,
/// i.e. intentionally withheld array elements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StripMode {
    /// Remove unresolved `{"...": …}` stubs, hiding the concealed
    /// skeleton. This is what [`crate::SdJwt::disclosed_claims`] uses.
    #[default]
    DropUndisclosed,
    /// Leave unresolved stubs in place for inspection.
    KeepUndisclosed,
}

/// Substitutes every disclosure into a copy of the payload and strips the
/// SD bookkeeping, returning the disclosed claim set.
pub(crate) fn reveal_claims(
    payload: &Map<String, Value>,
    disclosures: &[Disclosure],
    alg: SdAlg,
    mode: StripMode,
) -> Result<Map<String, Value>, Error> {
    let mut claims = payload.clone();
    resolve_disclosures(&mut claims, disclosures, alg)?;
    strip_object(&mut claims, mode);

    Ok(claims)
}

/// Iterative fixed point over the disclosure set.
///
/// Each pass hashes every remaining disclosure (one fresh hasher per
/// disclosure) and substitutes those whose digest is currently visible in
/// the tree. A disclosure nested inside another disclosure's value only
/// becomes placeable once the outer value has been substituted, hence the
/// outer loop. A pass that places nothing while disclosures remain means
/// the leftovers reference no digest at all.
fn resolve_disclosures(
    claims: &mut Map<String, Value>,
    disclosures: &[Disclosure],
    alg: SdAlg,
) -> Result<(), Error> {
    let mut remaining: Vec<&Disclosure> = disclosures.iter().collect();

    while !remaining.is_empty() {
        let mut placed = vec![];
        for (i, disclosure) in remaining.iter().enumerate() {
            let digest = disclosure.hash(alg);
            if resolve_in_object(claims, disclosure, &digest)? {
                placed.push(i);
            }
        }

        if placed.is_empty() {
            return Err(Error::OrphanDisclosure(stringify(&remaining)));
        }
        for i in placed.into_iter().rev() {
            remaining.remove(i);
        }
    }

    Ok(())
}

fn resolve_in_object(
    object: &mut Map<String, Value>,
    disclosure: &Disclosure,
    digest: &str,
) -> Result<bool, Error> {
    let listed = matches!(
        object.get(SD_CLAIM_NAME),
        Some(Value::Array(digests)) if digests.iter().any(|d| d.as_str() == Some(digest))
    );

    if listed {
        let Some(name) = disclosure.claim_name() else {
            return Err(Error::MalformedSdClaim(digest.to_owned()));
        };
        object.insert(name.to_owned(), disclosure.claim_value().clone());
        return Ok(true);
    }

    for (key, value) in object.iter_mut() {
        if key == SD_CLAIM_NAME || key == SD_ALG_CLAIM_NAME {
            continue;
        }
        let found = match value {
            Value::Object(child) => resolve_in_object(child, disclosure, digest)?,
            Value::Array(items) => resolve_in_array(items, disclosure, digest)?,
            _ => false,
        };
        if found {
            return Ok(true);
        }
    }

    Ok(false)
}

fn resolve_in_array(
    items: &mut [Value],
    disclosure: &Disclosure,
    digest: &str,
) -> Result<bool, Error> {
    for item in items.iter_mut() {
        if concealed_array_item(item) == Some(digest) {
            *item = disclosure.claim_value().clone();
            return Ok(true);
        }

        let found = match item {
            Value::Object(child) => resolve_in_object(child, disclosure, digest)?,
            Value::Array(child) => resolve_in_array(child, disclosure, digest)?,
            _ => false,
        };
        if found {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Removes every `_sd` and `_sd_alg` key from every object. All other
/// keys stay, empty containers included; surviving array stubs are
/// dropped or kept according to `mode`.
fn strip_object(object: &mut Map<String, Value>, mode: StripMode) {
    // shift_remove keeps the remaining keys in insertion order; plain
    // remove is a swap-remove on the order-preserving map.
    object.shift_remove(SD_CLAIM_NAME);
    object.shift_remove(SD_ALG_CLAIM_NAME);

    for value in object.values_mut() {
        strip_value(value, mode);
    }
}

fn strip_value(value: &mut Value, mode: StripMode) {
    match value {
        Value::Object(object) => strip_object(object, mode),
        Value::Array(items) => {
            if mode == StripMode::DropUndisclosed {
                items.retain(|item| concealed_array_item(item).is_none());
            }
            for item in items.iter_mut() {
                strip_value(item, mode);
            }
        }
        _ => {}
    }
}

fn stringify(disclosures: &[&Disclosure]) -> String {
    let parts: Vec<String> = disclosures
        .iter()
        .map(|d| match d.claim_name() {
            Some(name) => format!("({name}) {}", d.encoded()),
            None => d.encoded().to_owned(),
        })
        .collect();

    format!("[{}]", parts.join(", "))
}
