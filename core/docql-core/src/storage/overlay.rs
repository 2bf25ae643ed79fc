//! Pending writes of a writable transaction, layered over committed data.
//!
//! Used by the memory and log-structured engines, which have no native
//! multi-key transactions: reads merge the overlay with the base state and
//! commit applies it in one step.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

use crate::error::DocqlResult;
use crate::storage::iterator::{Entry, after_bound};

/// Writes to one store. `None` marks a tombstone.
#[derive(Debug, Default)]
pub(crate) struct PendingStore {
    /// Committed contents are hidden (truncate, or drop + create).
    pub(crate) cleared: bool,
    pub(crate) writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

#[derive(Debug, Default)]
pub(crate) struct Overlay {
    pub(crate) stores: HashMap<Vec<u8>, PendingStore>,
    pub(crate) created: HashSet<Vec<u8>>,
    pub(crate) dropped: HashSet<Vec<u8>>,
}

/// Result of looking a key up in the overlay.
pub(crate) enum Lookup {
    Found(Vec<u8>),
    Deleted,
    /// Ask the committed state.
    Base,
}

impl Overlay {
    /// Whether `name` exists given its committed existence.
    pub(crate) fn store_exists(&self, name: &[u8], in_base: bool) -> bool {
        self.created.contains(name) || (in_base && !self.dropped.contains(name))
    }

    pub(crate) fn create_store(&mut self, name: &[u8], in_base: bool) {
        if in_base {
            // dropped earlier in this transaction, comes back empty
            self.dropped.remove(name);
        }
        self.created.insert(name.to_vec());
        self.stores.insert(
            name.to_vec(),
            PendingStore {
                cleared: true,
                writes: BTreeMap::new(),
            },
        );
    }

    pub(crate) fn drop_store(&mut self, name: &[u8], in_base: bool) {
        self.created.remove(name);
        self.stores.remove(name);
        if in_base {
            self.dropped.insert(name.to_vec());
        }
    }

    pub(crate) fn lookup(&self, name: &[u8], key: &[u8]) -> Lookup {
        match self.stores.get(name) {
            Some(store) => match store.writes.get(key) {
                Some(Some(v)) => Lookup::Found(v.clone()),
                Some(None) => Lookup::Deleted,
                None if store.cleared => Lookup::Deleted,
                None => Lookup::Base,
            },
            None => Lookup::Base,
        }
    }

    pub(crate) fn put(&mut self, name: &[u8], key: &[u8], value: &[u8]) {
        self.stores
            .entry(name.to_vec())
            .or_default()
            .writes
            .insert(key.to_vec(), Some(value.to_vec()));
    }

    pub(crate) fn delete(&mut self, name: &[u8], key: &[u8]) {
        self.stores
            .entry(name.to_vec())
            .or_default()
            .writes
            .insert(key.to_vec(), None);
    }

    pub(crate) fn truncate(&mut self, name: &[u8]) {
        let store = self.stores.entry(name.to_vec()).or_default();
        store.cleared = true;
        store.writes.clear();
    }

    pub(crate) fn is_cleared(&self, name: &[u8]) -> bool {
        self.stores.get(name).is_some_and(|s| s.cleared)
    }

    /// Merges up to `limit` entries of the overlay with `base`, an ordered
    /// iterator over the committed entries already positioned at `from`.
    pub(crate) fn merge<I>(
        &self,
        name: &[u8],
        base: I,
        from: Bound<&[u8]>,
        reverse: bool,
        limit: usize,
    ) -> DocqlResult<Vec<Entry>>
    where
        I: Iterator<Item = DocqlResult<Entry>>,
    {
        let empty = BTreeMap::new();
        let (writes, cleared) = match self.stores.get(name) {
            Some(s) => (&s.writes, s.cleared),
            None => (&empty, false),
        };
        let pending: Box<dyn Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> + '_> = {
            let range = writes
                .iter()
                .filter(move |(k, _)| after_bound(k, &from, reverse));
            if reverse { Box::new(range.rev()) } else { Box::new(range) }
        };
        let mut pending = pending.peekable();
        let mut base = if cleared { None } else { Some(base.peekable()) };

        let mut out = Vec::with_capacity(limit.min(64));
        while out.len() < limit {
            let next_base = match base.as_mut() {
                Some(it) => match it.peek() {
                    Some(Ok((k, _))) => Some(k.clone()),
                    Some(Err(_)) => {
                        if let Some(Err(e)) = it.next() {
                            return Err(e);
                        }
                        continue;
                    }
                    None => None,
                },
                None => None,
            };
            let next_pending = pending.peek().map(|(k, _)| (*k).clone());

            let take_pending = match (&next_base, &next_pending) {
                (None, None) => break,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (Some(b), Some(p)) => {
                    let ord = if reverse { b.cmp(p).reverse() } else { b.cmp(p) };
                    if ord == std::cmp::Ordering::Equal {
                        // pending write shadows the committed entry
                        if let Some(it) = base.as_mut() {
                            it.next();
                        }
                        true
                    } else {
                        ord == std::cmp::Ordering::Greater
                    }
                }
            };

            if take_pending {
                if let Some((k, v)) = pending.next() {
                    if let Some(v) = v {
                        out.push((k.clone(), v.clone()));
                    }
                }
            } else if let Some(it) = base.as_mut() {
                if let Some(entry) = it.next() {
                    out.push(entry?);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(keys: &[&[u8]]) -> impl Iterator<Item = DocqlResult<Entry>> {
        keys.iter()
            .map(|k| Ok((k.to_vec(), b"base".to_vec())))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn pending_writes_shadow_and_interleave() {
        let mut o = Overlay::default();
        o.put(b"s", b"b", b"new");
        o.delete(b"s", b"c");
        o.put(b"s", b"e", b"new");
        let out = o
            .merge(b"s", base(&[b"a", b"b", b"c", b"d"]), Bound::Unbounded, false, 10)
            .unwrap();
        let keys: Vec<_> = out.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"a"[..], b"b", b"d", b"e"]);
        assert_eq!(out[1].1, b"new");
    }

    #[test]
    fn delete_then_put_resurfaces_value() {
        let mut o = Overlay::default();
        o.delete(b"s", b"a");
        o.put(b"s", b"a", b"again");
        assert!(matches!(o.lookup(b"s", b"a"), Lookup::Found(v) if v == b"again"));
    }

    #[test]
    fn cleared_store_hides_base() {
        let mut o = Overlay::default();
        o.truncate(b"s");
        o.put(b"s", b"z", b"1");
        let out = o.merge(b"s", base(&[b"a"]), Bound::Unbounded, false, 10).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(o.lookup(b"s", b"a"), Lookup::Deleted));
    }

    #[test]
    fn reverse_merge() {
        let mut o = Overlay::default();
        o.put(b"s", b"b", b"1");
        let out = o
            .merge(b"s", base(&[b"c", b"a"]), Bound::Unbounded, true, 10)
            .unwrap();
        let keys: Vec<_> = out.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"c"[..], b"b", b"a"]);
    }

    #[test]
    fn drop_and_recreate() {
        let mut o = Overlay::default();
        o.drop_store(b"s", true);
        assert!(!o.store_exists(b"s", true));
        o.create_store(b"s", true);
        assert!(o.store_exists(b"s", true));
        assert!(o.is_cleared(b"s"));
    }
}
