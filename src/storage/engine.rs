use std::ops::{Bound, RangeBounds};

use crate::error::Result;

/// Ordered byte-level key/value store underneath the MVCC layer
///
/// Keys sort lexicographically; the MVCC layer relies on that ordering to find
/// the newest version of a key with a bounded range scan.
pub trait Engine {
    type EngineIterator<'a>: EngineIterator
    where
        Self: 'a;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn delete(&mut self, key: &[u8]) -> Result<()>;
    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_>;

    /// Prefix scan using lexicographic ordering
    ///
    /// The prefix "ab" becomes the range ["ab", "ac"). Trailing 0xff bytes are
    /// dropped before incrementing, and an all-0xff prefix is unbounded above.
    fn scan_prefix(&mut self, prefix: Vec<u8>) -> Self::EngineIterator<'_> {
        let start = Bound::Included(prefix.clone());
        let mut upper = prefix;
        while upper.last() == Some(&0xff) {
            upper.pop();
        }
        let end = match upper.last_mut() {
            Some(last) => {
                *last += 1;
                Bound::Excluded(upper)
            }
            None => Bound::Unbounded,
        };
        self.scan((start, end))
    }
}

/// Storage engine iterator trait (supports reverse traversal)
pub trait EngineIterator: DoubleEndedIterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}
