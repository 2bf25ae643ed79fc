//! Store iterators.
//!
//! Backends expose a single primitive, [`RangeSource::fetch`], returning up
//! to `limit` entries starting at a bound. [`ChunkedIterator`] turns it into
//! the seek / next / valid cursor used above the storage layer, refetching
//! from the last returned key. Because every refetch reads the transaction's
//! current state, writes made while iterating are visible to it.

use std::collections::VecDeque;
use std::ops::Bound;

use crate::error::{DocqlError, DocqlResult};

const CHUNK: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IteratorOptions {
    pub reverse: bool,
}

impl IteratorOptions {
    pub fn reverse() -> Self {
        IteratorOptions { reverse: true }
    }
}

/// Cursor over a store.
///
/// `seek(pivot)` positions on the first key `>= pivot` (forward) or the last
/// key `<= pivot` (reverse); an empty pivot means the first (or last) key.
pub trait StoreIterator {
    fn seek(&mut self, pivot: &[u8]);

    fn next(&mut self);

    /// `false` once exhausted or after an error.
    fn valid(&self) -> bool;

    fn err(&self) -> Option<&DocqlError>;

    fn key(&self) -> Option<&[u8]>;

    fn value(&self) -> Option<&[u8]>;

    /// Releases buffered entries and reports any pending error.
    fn close(&mut self) -> DocqlResult<()>;
}

pub(crate) type Entry = (Vec<u8>, Vec<u8>);

/// Range access implemented by each backend's store handle.
pub(crate) trait RangeSource {
    /// Cancellation and transaction-state check.
    fn check(&self) -> DocqlResult<()>;

    /// Up to `limit` entries starting at `from`, ascending or descending.
    fn fetch(&self, from: Bound<&[u8]>, reverse: bool, limit: usize) -> DocqlResult<Vec<Entry>>;
}

pub(crate) struct ChunkedIterator<S> {
    source: S,
    reverse: bool,
    buffered: VecDeque<Entry>,
    current: Option<Entry>,
    exhausted: bool,
    err: Option<DocqlError>,
}

impl<S: RangeSource> ChunkedIterator<S> {
    pub(crate) fn new(source: S, opts: IteratorOptions) -> Self {
        ChunkedIterator {
            source,
            reverse: opts.reverse,
            buffered: VecDeque::new(),
            current: None,
            exhausted: true,
            err: None,
        }
    }

    fn fill(&mut self, from: Bound<&[u8]>) {
        if let Err(e) = self.source.check() {
            self.fail(e);
            return;
        }
        match self.source.fetch(from, self.reverse, CHUNK) {
            Ok(entries) => {
                self.exhausted = entries.len() < CHUNK;
                self.buffered = entries.into();
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, e: DocqlError) {
        self.err = Some(e);
        self.current = None;
        self.buffered.clear();
        self.exhausted = true;
    }
}

impl<S: RangeSource> StoreIterator for ChunkedIterator<S> {
    fn seek(&mut self, pivot: &[u8]) {
        self.err = None;
        let from = if pivot.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(pivot)
        };
        self.fill(from);
        self.current = self.buffered.pop_front();
    }

    fn next(&mut self) {
        if self.err.is_some() {
            return;
        }
        if let Err(e) = self.source.check() {
            self.fail(e);
            return;
        }
        let Some((last, _)) = self.current.take() else {
            return;
        };
        if self.buffered.is_empty() && !self.exhausted {
            self.fill(Bound::Excluded(last.as_slice()));
        }
        self.current = self.buffered.pop_front();
    }

    fn valid(&self) -> bool {
        self.err.is_none() && self.current.is_some()
    }

    fn err(&self) -> Option<&DocqlError> {
        self.err.as_ref()
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    fn close(&mut self) -> DocqlResult<()> {
        self.buffered.clear();
        self.current = None;
        self.exhausted = true;
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Whether `key` lies on the scanned side of `from`.
pub(crate) fn after_bound(key: &[u8], from: &Bound<&[u8]>, reverse: bool) -> bool {
    match (from, reverse) {
        (Bound::Unbounded, _) => true,
        (Bound::Included(b), false) => key >= *b,
        (Bound::Excluded(b), false) => key > *b,
        (Bound::Included(b), true) => key <= *b,
        (Bound::Excluded(b), true) => key < *b,
    }
}
