// Presence masks and file identities :: the directory-merge visibility primitives from
// spec.md §3 and §4.4. Shared by the Resolver (mask decoding, §4.1 rule 1) and the
// Dispatcher (mask encoding during readdir, §4.4).

use std::ffi::{OsStr, OsString};

use crate::registry::RootRegistry;

/// The tuple spec.md §3 uses to decide whether same-named entries in different roots are
/// "the same" file for masking purposes. Deliberately ignores content — documented as a
/// heuristic, not a guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub name: OsString,
    pub mtime_ns: i128,
    pub size: u64,
}

/// An N-character string tagging per-root presence of an entry: `.` marks absence, a root's
/// own label marks presence. `N` always equals the owning [`RootRegistry`]'s length.
pub type PresenceMask = String;

/// Builds the presence mask for an entry, given a predicate telling which root indices it's
/// present under.
pub fn encode_mask(registry: &RootRegistry, mut present: impl FnMut(usize) -> bool) -> PresenceMask {
    (0..registry.len())
        .map(|i| if present(i) { registry.get(i).label } else { '.' })
        .collect()
}

/// Decodes a presence mask into the root indices it selects, per spec.md §4.1 rule 1: a `.`
/// skips a root, a matching label selects it, anything else invalidates the whole mask.
/// `mask` must already be exactly `registry.len()` characters long.
///
/// Returns `None` for an invalid or all-`.` mask — not an error, since an invalid mask just
/// means this isn't a masked name and resolution should fall through to the next rule.
pub fn decode_mask(registry: &RootRegistry, mask: &[char]) -> Option<Vec<usize>> {
    debug_assert_eq!(mask.len(), registry.len());

    let mut selected = Vec::new();
    for (i, root) in registry.iter().enumerate() {
        match mask[i] {
            '.' => continue,
            c if c == root.label => selected.push(i),
            _ => return None,
        }
    }

    if selected.is_empty() {
        None
    } else {
        Some(selected)
    }
}

/// Formats a `MaskedName`: `<mask>_<basename>` (spec.md §3, §4.4).
pub fn masked_name(mask: &str, basename: &OsStr) -> OsString {
    let mut out = OsString::with_capacity(mask.len() + 1 + basename.len());
    out.push(mask);
    out.push("_");
    out.push(basename);
    out
}
