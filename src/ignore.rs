//! Per-directory exclusion list and glob matcher
//!
//! One [`IgnoreList`] lives for the duration of a single directory frame.
//! It serves double duty: patterns loaded from the directory's ignore file
//! suppress both mirroring and pruning, and the same structure records
//! which names were seen on which side so the prune pass can run without a
//! second data structure.
//!
//! Patterns split into two buckets: names containing any glob
//! metacharacter go to the wildcard bucket and are scanned with
//! [`wild_match`]; everything else lands in an exact-match bucket. The
//! wildcard bucket is consulted first.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

/// Where a list entry came from
///
/// The numeric ordering matters to nobody; what matters is that a lookup
/// returns the origin of the *first* matching entry, which lets the caller
/// distinguish "authored exclusion" from "seen while walking a side".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Pattern read from the directory's ignore file (or a configured
    /// cache filename)
    IgnoreFile = 1,
    /// Name recorded while walking the source listing
    Source = 2,
    /// Name recorded while walking the destination listing
    Destination = 3,
}

/// Characters that force a pattern into the wildcard bucket
const WILD_CHARS: &[u8] = b"?*{}[]|";

/// Exclusion and bookkeeping list for one directory frame
#[derive(Debug, Default)]
pub struct IgnoreList {
    literals: HashMap<OsString, Origin>,
    wildcards: Vec<(Vec<u8>, Origin)>,
}

impl IgnoreList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern with the given origin. Wildcard-looking patterns go
    /// to the wildcard bucket; the rest are exact names. An existing exact
    /// entry keeps its original origin.
    pub fn add(&mut self, pattern: &OsStr, origin: Origin) {
        let bytes = pattern.as_bytes();
        if bytes.iter().any(|b| WILD_CHARS.contains(b)) {
            self.wildcards.push((bytes.to_vec(), origin));
        } else {
            self.literals
                .entry(pattern.to_os_string())
                .or_insert(origin);
        }
    }

    /// Look a name up, inserting it with `origin` when nothing matches.
    ///
    /// Returns the origin of the first match: wildcard entries are scanned
    /// first, then the exact bucket. The returned value equals `origin`
    /// exactly when the name was new.
    pub fn lookup_or_insert(&mut self, name: &OsStr, origin: Origin) -> Origin {
        for (pattern, found) in &self.wildcards {
            if wild_match(pattern, name.as_bytes()) {
                return *found;
            }
        }
        if let Some(found) = self.literals.get(name) {
            return *found;
        }
        self.literals.insert(name.to_os_string(), origin);
        origin
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty() && self.wildcards.is_empty()
    }
}

/// Shell-style glob match over raw bytes
///
/// `?` matches exactly one byte, `*` any run (possibly empty); every other
/// byte matches itself. Both the pattern and the name must be consumed
/// completely for the match to succeed.
#[must_use]
pub fn wild_match(pattern: &[u8], name: &[u8]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((b'*', rest)) => {
            if rest.is_empty() {
                return true;
            }
            (0..=name.len()).any(|skip| wild_match(rest, &name[skip..]))
        }
        Some((b'?', rest)) => match name.split_first() {
            Some((_, tail)) => wild_match(rest, tail),
            None => false,
        },
        Some((&lit, rest)) => match name.split_first() {
            Some((&head, tail)) if head == lit => wild_match(rest, tail),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wild_match_literal() {
        assert!(wild_match(b"abc", b"abc"));
        assert!(!wild_match(b"abc", b"abd"));
        assert!(!wild_match(b"abc", b"ab"));
        assert!(!wild_match(b"ab", b"abc"));
    }

    #[test]
    fn wild_match_question_mark() {
        assert!(wild_match(b"a?c", b"abc"));
        assert!(wild_match(b"???", b"abc"));
        assert!(!wild_match(b"a?c", b"ac"));
        assert!(!wild_match(b"?", b""));
    }

    #[test]
    fn wild_match_star() {
        assert!(wild_match(b"*", b""));
        assert!(wild_match(b"*", b"anything"));
        assert!(wild_match(b"*.o", b"foo.o"));
        assert!(wild_match(b"a*b*c", b"axxbyyc"));
        assert!(wild_match(b"a*b*c", b"abc"));
        assert!(!wild_match(b"*.o", b"foo.c"));
        assert!(!wild_match(b"a*b", b"a"));
    }

    #[test]
    fn wild_match_treats_other_metachars_literally() {
        // Braces and brackets classify a pattern as wildcard but have no
        // special matching semantics.
        assert!(wild_match(b"a{b}c", b"a{b}c"));
        assert!(!wild_match(b"a{b,c}", b"ab"));
    }

    #[test]
    fn exact_patterns_win_over_insertion() {
        let mut list = IgnoreList::new();
        list.add(OsStr::new("skip.log"), Origin::IgnoreFile);

        assert_eq!(
            list.lookup_or_insert(OsStr::new("skip.log"), Origin::Source),
            Origin::IgnoreFile
        );
        assert_eq!(
            list.lookup_or_insert(OsStr::new("keep.txt"), Origin::Source),
            Origin::Source
        );
    }

    #[test]
    fn wildcard_patterns_match_before_insertion() {
        let mut list = IgnoreList::new();
        list.add(OsStr::new("*.tmp"), Origin::IgnoreFile);

        assert_eq!(
            list.lookup_or_insert(OsStr::new("foo.tmp"), Origin::Source),
            Origin::IgnoreFile
        );
        assert_eq!(
            list.lookup_or_insert(OsStr::new("foo.txt"), Origin::Source),
            Origin::Source
        );
    }

    #[test]
    fn destination_pass_sees_source_insertions() {
        let mut list = IgnoreList::new();

        // Source walk records the name; the destination walk then learns
        // the entry is shared rather than destination-only.
        assert_eq!(
            list.lookup_or_insert(OsStr::new("shared"), Origin::Source),
            Origin::Source
        );
        assert_eq!(
            list.lookup_or_insert(OsStr::new("shared"), Origin::Destination),
            Origin::Source
        );
        assert_eq!(
            list.lookup_or_insert(OsStr::new("stale"), Origin::Destination),
            Origin::Destination
        );
    }
}
