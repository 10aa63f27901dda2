//! String pool for the ABF2 `StringsSection`.
//!
//! The strings section is a single raw blob: a header (skipped past by
//! finding the first NUL) followed by a sequence of labels packed back to
//! back, separated by NUL and whitespace runs. Everything else in the file
//! that names a string (channel names, units, protocol path, creator name)
//! refers to one of these labels by a 1-based ordinal.

use crate::io::reader::trim_fixed_string;

/// A 1-based reference into a [`StringPool`].
///
/// Value `0` is reserved to mean "no string" (redesigned per the format's
/// convention of using index 0 as an implicit empty string — see
/// `StringIndex::NONE`), so callers never have to special-case a bare
/// integer at every lookup site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StringIndex(pub u32);

impl StringIndex {
    pub const NONE: StringIndex = StringIndex(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for StringIndex {
    fn from(v: u32) -> Self {
        StringIndex(v)
    }
}

impl From<i32> for StringIndex {
    fn from(v: i32) -> Self {
        StringIndex(v.max(0) as u32)
    }
}

/// An ordered collection of labels sliced out of the strings blob.
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    labels: Vec<String>,
}

impl StringPool {
    /// Parses the raw `StringsSection` bytes into a label pool.
    ///
    /// The first record in the strings blob begins with a header the
    /// reference reader skips past by finding the first NUL byte; the
    /// remainder is split on NUL/whitespace runs into individual labels.
    pub fn parse(raw: &[u8]) -> Self {
        let body = match raw.iter().position(|&b| b == 0) {
            Some(pos) => &raw[pos + 1..],
            None => raw,
        };

        let mut labels = Vec::new();
        let mut start = 0usize;
        for (i, &b) in body.iter().enumerate() {
            if b == 0 || b.is_ascii_whitespace() {
                if i > start {
                    labels.push(trim_fixed_string(&body[start..i]));
                }
                start = i + 1;
            }
        }
        if start < body.len() {
            labels.push(trim_fixed_string(&body[start..]));
        }

        Self { labels }
    }

    /// Looks up a label by its 1-based index. Index 0 or an out-of-range
    /// index both yield an empty string.
    pub fn get(&self, index: StringIndex) -> String {
        if index.is_none() {
            return String::new();
        }
        self.labels
            .get(index.0 as usize - 1)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_zero_is_empty() {
        let pool = StringPool::parse(b"\0clampex\0pA\0mV\0");
        assert_eq!(pool.get(StringIndex::NONE), "");
    }

    #[test]
    fn indexes_are_one_based() {
        let pool = StringPool::parse(b"\0clampex\0pA\0mV\0");
        assert_eq!(pool.get(StringIndex(1)), "clampex");
        assert_eq!(pool.get(StringIndex(2)), "pA");
        assert_eq!(pool.get(StringIndex(3)), "mV");
    }

    #[test]
    fn out_of_range_is_empty() {
        let pool = StringPool::parse(b"\0clampex\0");
        assert_eq!(pool.get(StringIndex(99)), "");
    }

    #[test]
    fn splits_on_whitespace_runs_too() {
        let pool = StringPool::parse(b"\0IN 0\x00\x00Cmd 0\x00");
        assert_eq!(pool.get(StringIndex(1)), "IN");
        assert_eq!(pool.get(StringIndex(2)), "0");
        assert_eq!(pool.get(StringIndex(3)), "Cmd");
        assert_eq!(pool.get(StringIndex(4)), "0");
    }

    #[test]
    fn empty_blob_has_no_labels() {
        let pool = StringPool::default();
        assert!(pool.is_empty());
        assert_eq!(pool.get(StringIndex(1)), "");
    }
}
