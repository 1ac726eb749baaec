//! Path-prefix rewrite rules.
//!
//! A [`PrefixMap`] holds the `(old_prefix, new_prefix)` pairs applied by the
//! patchers. When several old prefixes match the same path, the longest key
//! wins so that rewriting is deterministic regardless of insertion order.

use std::fs;
use std::path::Path;

/// An ordered set of path-prefix rewrite rules with longest-match lookup.
#[derive(Debug, Clone, Default)]
pub struct PrefixMap {
    // Sorted by descending key length so the first match is the longest.
    entries: Vec<(String, String)>,
}

impl PrefixMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map holding a single rewrite pair.
    pub fn from_pair(old_prefix: impl Into<String>, new_prefix: impl Into<String>) -> Self {
        let mut map = Self::new();
        map.insert(old_prefix, new_prefix);
        map
    }

    /// Adds a rewrite pair.
    pub fn insert(&mut self, old_prefix: impl Into<String>, new_prefix: impl Into<String>) {
        let old = old_prefix.into();
        let pos = self
            .entries
            .partition_point(|(k, _)| k.len() >= old.len());
        self.entries.insert(pos, (old, new_prefix.into()));
    }

    /// Returns the number of rules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map holds no rules.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrites `path` through the longest-matching rule, if any.
    ///
    /// Matching is whole-prefix only: the path must start with the rule's old
    /// prefix byte for byte.
    pub fn rewrite(&self, path: &str) -> Option<String> {
        for (old, new) in &self.entries {
            if path.len() >= old.len() && path.starts_with(old.as_str()) {
                let mut replaced = String::with_capacity(new.len() + path.len() - old.len());
                replaced.push_str(new);
                replaced.push_str(&path[old.len()..]);
                return Some(replaced);
            }
        }
        None
    }

    /// Byte-slice variant of [`rewrite`](Self::rewrite) for sections whose
    /// strings are not guaranteed to be UTF-8.
    pub fn rewrite_bytes(&self, path: &[u8]) -> Option<Vec<u8>> {
        for (old, new) in &self.entries {
            if path.len() >= old.len() && path.starts_with(old.as_bytes()) {
                let mut replaced = Vec::with_capacity(new.len() + path.len() - old.len());
                replaced.extend_from_slice(new.as_bytes());
                replaced.extend_from_slice(&path[old.len()..]);
                return Some(replaced);
            }
        }
        None
    }

    /// Loads rewrite rules from a sed-style map file.
    ///
    /// One rule per line. The first character of a non-empty line selects the
    /// separator; the line then splits into `<sep><old><sep><new><sep>` or
    /// `<sep><header><sep><old><sep><new><sep>` with the header field
    /// discarded. Lines of length <= 3 are ignored. Any other shape is
    /// malformed and reported as an error string suitable for usage output.
    pub fn from_map_file(path: &Path) -> std::result::Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cannot read prefix map '{}': {e}", path.display()))?;
        let mut map = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.len() <= 3 {
                continue;
            }
            let sep = line.chars().next().unwrap();
            let fields: Vec<&str> = line.split(sep).collect();
            // split() yields a leading empty field for the leading separator
            // and a trailing empty field for the trailing one.
            let (old, new) = match fields.as_slice() {
                ["", old, new, ""] => (*old, *new),
                ["", _header, old, new, ""] => (*old, *new),
                _ => {
                    return Err(format!(
                        "{}:{}: malformed prefix-map line",
                        path.display(),
                        lineno + 1
                    ));
                }
            };
            map.insert(old, new);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_rewrite_basic() {
        let map = PrefixMap::from_pair("/private/sandbox", "/home/u");
        assert_eq!(
            map.rewrite("/private/sandbox/foo.c").as_deref(),
            Some("/home/u/foo.c")
        );
        assert_eq!(map.rewrite("/usr/lib/bar.c"), None);
        // Whole-prefix match only.
        assert_eq!(map.rewrite("/private/sand"), None);
    }

    #[test]
    fn test_longest_match_wins() {
        let mut map = PrefixMap::new();
        map.insert("/a", "/short");
        map.insert("/a/b", "/long");
        assert_eq!(map.rewrite("/a/b/c.c").as_deref(), Some("/long/c.c"));
        assert_eq!(map.rewrite("/a/x.c").as_deref(), Some("/short/x.c"));

        // Insertion order must not matter.
        let mut map = PrefixMap::new();
        map.insert("/a/b", "/long");
        map.insert("/a", "/short");
        assert_eq!(map.rewrite("/a/b/c.c").as_deref(), Some("/long/c.c"));
    }

    #[test]
    fn test_rewrite_bytes() {
        let map = PrefixMap::from_pair("/old", "/new");
        assert_eq!(
            map.rewrite_bytes(b"/old/f.c").as_deref(),
            Some(b"/new/f.c".as_slice())
        );
        assert_eq!(map.rewrite_bytes(b"/other/f.c"), None);
    }

    #[test]
    fn test_map_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "|/old|/new|").unwrap();
        writeln!(f, ",s,/a,/b,").unwrap();
        writeln!(f, "xx").unwrap(); // <= 3 chars: ignored
        f.flush().unwrap();

        let map = PrefixMap::from_map_file(f.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.rewrite("/old/x").as_deref(), Some("/new/x"));
        assert_eq!(map.rewrite("/a/x").as_deref(), Some("/b/x"));
    }

    #[test]
    fn test_map_file_malformed() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "|only-one-field|").unwrap();
        f.flush().unwrap();
        assert!(PrefixMap::from_map_file(f.path()).is_err());
    }
}
