//! `__debug_str` rewriting.
//!
//! The section is a contiguous pool of NUL-terminated strings referenced by
//! byte offset from `__debug_info`. When every replacement fits in its
//! original string, strings are overwritten in place and no reference moves.
//! When any replacement is longer the whole pool is rebuilt, every string
//! gets a fresh offset, and the caller must relocate all `DW_FORM_strp`
//! references through the returned table.

use std::collections::BTreeMap;

use crate::prefix::PrefixMap;
use crate::util::cstr_len;

/// Mapping from original string offset to its offset in a rebuilt pool.
pub type RelocationTable = BTreeMap<u64, u64>;

/// Outcome of patching the string pool.
#[derive(Debug)]
pub enum StringPatch {
    /// No string matched the prefix map; the section is untouched.
    Unchanged,
    /// Same-size rewrite; no reference moves.
    InPlace(Vec<u8>),
    /// The pool was rebuilt and references must be relocated.
    Rebuilt {
        /// The new section bytes.
        data: Vec<u8>,
        /// Offset relocations for every string in the pool.
        relocations: RelocationTable,
    },
}

/// Patches string prefixes in a `__debug_str` pool.
///
/// `data` must carry one trailing zero byte beyond the section content so
/// the final entry terminates predictably (DWARF string tables may omit the
/// final NUL and delimit by section size); the returned buffers are sized
/// back to true section length.
pub fn patch_string_section(data: &[u8], prefix_map: &PrefixMap) -> StringPatch {
    // Scan once to decide between the in-place and rebuild strategies.
    let mut modified = false;
    let mut lengthened = false;
    let mut pos = 0;
    while pos < data.len() {
        let len = cstr_len(&data[pos..]);
        let entry = &data[pos..pos + len];
        if let Some(replaced) = prefix_map.rewrite_bytes(entry) {
            if replaced != entry {
                modified = true;
                if replaced.len() > entry.len() {
                    lengthened = true;
                }
            }
        }
        pos += len + 1;
    }

    if !modified {
        return StringPatch::Unchanged;
    }

    if !lengthened {
        // Shrinking or same-size replacements terminate early and leave the
        // vacated bytes behind; nothing references string interiors by
        // offset arithmetic that the gap would break.
        let mut patched = data.to_vec();
        let mut pos = 0;
        while pos < patched.len() {
            let len = cstr_len(&patched[pos..]);
            let replaced = prefix_map
                .rewrite_bytes(&patched[pos..pos + len])
                .filter(|r| r != &patched[pos..pos + len]);
            if let Some(replaced) = replaced {
                patched[pos..pos + replaced.len()].copy_from_slice(&replaced);
                patched[pos + replaced.len()] = 0;
            }
            pos += len + 1;
        }
        patched.truncate(data.len() - 1);
        return StringPatch::InPlace(patched);
    }

    // Full rebuild with a relocation entry per string.
    let mut relocations = RelocationTable::new();
    let mut new_data = Vec::with_capacity(data.len());
    let mut pos = 0;
    while pos < data.len() {
        let len = cstr_len(&data[pos..]);
        let entry = &data[pos..pos + len];
        relocations.insert(pos as u64, new_data.len() as u64);
        match prefix_map.rewrite_bytes(entry) {
            Some(replaced) => new_data.extend_from_slice(&replaced),
            None => new_data.extend_from_slice(entry),
        }
        new_data.push(0);
        pos += len + 1;
    }
    // The final entry need not be NUL terminated.
    new_data.truncate(new_data.len() - 1);

    StringPatch::Rebuilt {
        data: new_data,
        relocations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Joins entries into a guarded section buffer (content + one zero).
    fn pool(entries: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for e in entries {
            out.extend_from_slice(e);
            out.push(0);
        }
        out.push(0); // read-side guard byte
        out
    }

    #[test]
    fn test_unchanged_when_nothing_matches() {
        let data = pool(&[b"/usr/x.c", b"/usr/y.c"]);
        let map = PrefixMap::from_pair("/sandbox", "/home");
        assert!(matches!(
            patch_string_section(&data, &map),
            StringPatch::Unchanged
        ));
    }

    #[test]
    fn test_identity_rewrite_is_unchanged() {
        let data = pool(&[b"/sandbox/x.c"]);
        let map = PrefixMap::from_pair("/sandbox", "/sandbox");
        assert!(matches!(
            patch_string_section(&data, &map),
            StringPatch::Unchanged
        ));
    }

    #[test]
    fn test_same_length_in_place() {
        let data = pool(&[b"/aa/x.c", b"/usr/y.c"]);
        let map = PrefixMap::from_pair("/aa", "/bb");
        match patch_string_section(&data, &map) {
            StringPatch::InPlace(patched) => {
                let mut expected = pool(&[b"/bb/x.c", b"/usr/y.c"]);
                expected.truncate(expected.len() - 1); // drop the guard byte
                assert_eq!(patched, expected);
            }
            other => panic!("expected in-place patch, got {other:?}"),
        }
    }

    #[test]
    fn test_shrinking_in_place_leaves_gap() {
        let data = pool(&[b"/sandbox/x.c", b"/usr/y.c"]);
        let map = PrefixMap::from_pair("/sandbox", "/s");
        match patch_string_section(&data, &map) {
            StringPatch::InPlace(patched) => {
                // Same total size; first entry terminates early.
                assert_eq!(patched.len(), data.len() - 1);
                assert_eq!(&patched[..7], b"/s/x.c\0");
                // Second entry is still at its original offset.
                let second = b"/sandbox/x.c".len() + 1;
                assert_eq!(&patched[second..second + 8], b"/usr/y.c");
            }
            other => panic!("expected in-place patch, got {other:?}"),
        }
    }

    #[test]
    fn test_lengthening_rebuilds_with_relocations() {
        let data = pool(&[b"/a/x.c", b"/usr/y.c", b"/a/z.c"]);
        let map = PrefixMap::from_pair("/a", "/bb");
        match patch_string_section(&data, &map) {
            StringPatch::Rebuilt { data, relocations } => {
                let mut expected = pool(&[b"/bb/x.c", b"/usr/y.c", b"/bb/z.c"]);
                expected.truncate(expected.len() - 2); // guard + final NUL
                assert_eq!(data, expected);

                // Offsets: originals at 0, 7, 16; rebuilt at 0, 8, 17.
                assert_eq!(relocations.get(&0), Some(&0));
                assert_eq!(relocations.get(&7), Some(&8));
                assert_eq!(relocations.get(&16), Some(&17));
            }
            other => panic!("expected rebuild, got {other:?}"),
        }
    }

    #[test]
    fn test_rebuild_handles_missing_final_nul() {
        // Section content "a\0/a/x.c" with the final NUL omitted; the guard
        // byte supplies the terminator.
        let mut data = b"a\0/a/x.c".to_vec();
        data.push(0); // guard
        let map = PrefixMap::from_pair("/a", "/bb");
        match patch_string_section(&data, &map) {
            StringPatch::Rebuilt { data, relocations } => {
                assert_eq!(data, b"a\0/bb/x.c");
                assert_eq!(relocations.get(&2), Some(&2));
            }
            other => panic!("expected rebuild, got {other:?}"),
        }
    }
}
