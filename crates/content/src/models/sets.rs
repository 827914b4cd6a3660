//! Identifier sets stored on the content row.
//!
//! Topics and privileges are sets of integer identifiers. Both live in a
//! `TEXT` column as a JSON array (`[3,7]`), and both reserve the identifier
//! `0` as a sentinel. An empty set is stored as the empty string.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use facet_json::{from_str as from_json, to_string as to_json};
use std::collections::BTreeSet;

/// Identifier set type shared by topics and privileges.
pub type IdSet = BTreeSet<u64>;

/// Privilege group meaning "every group". Its presence lifts all restrictions.
pub const ALL_GROUPS: u64 = 0;
/// Topic placeholder meaning "no topic". Never persisted.
pub const NO_TOPIC: u64 = 0;

/// Collapse a privilege set: any occurrence of [`ALL_GROUPS`] means the
/// content is unrestricted, which is stored as the empty set.
pub fn normalize_privileges(privileges: &IdSet) -> IdSet {
    match privileges.contains(&ALL_GROUPS) {
        true => IdSet::new(),
        false => privileges.clone(),
    }
}

/// Drop the [`NO_TOPIC`] placeholder from a topic set.
pub fn normalize_topics(topics: &IdSet) -> IdSet {
    topics.iter().copied().filter(|t| *t != NO_TOPIC).collect()
}

/// Serialize a set for storage. The empty set becomes the empty string.
pub(crate) fn encode(set: &IdSet, what: &'static str) -> Result<String> {
    if set.is_empty() {
        return Ok(String::new());
    }
    let ids = set.iter().copied().collect::<Vec<u64>>();
    to_json(&ids).or_raise(|| ErrorKind::InvalidData(what))
}

/// Deserialize a stored set. Empty columns (and empty arrays) yield `None`.
pub(crate) fn decode(column: &str, what: &'static str) -> Result<Option<IdSet>> {
    if column.trim().is_empty() {
        return Ok(None);
    }
    let ids = from_json::<Vec<u64>>(column).or_raise(|| ErrorKind::InvalidData(what))?;
    let set = ids.into_iter().collect::<IdSet>();
    Ok((!set.is_empty()).then_some(set))
}
