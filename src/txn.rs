//! Short correlation identifiers threaded through requests, tasks, and logs.

use uuid::Uuid;

/// Generate a fresh six-digit transaction identifier (`100000..=999999`).
#[must_use]
pub fn generate_txn_id() -> String {
    let entropy = Uuid::new_v4().as_u128();
    // The modulus is far below u64::MAX, so the cast cannot truncate.
    #[allow(clippy::cast_possible_truncation)]
    let value = (entropy % 900_000) as u64 + 100_000;
    value.to_string()
}

/// Return `candidate` when it is a usable identifier, otherwise a fresh one.
#[must_use]
pub fn resolve_txn_id(candidate: Option<&str>) -> String {
    match candidate.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => generate_txn_id(),
    }
}
