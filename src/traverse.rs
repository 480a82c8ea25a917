//! Collection traversal built on the loop engines.
//!
//! A [`Collection`] is either an ordered sequence or an insertion-ordered
//! mapping; [`traverse`] and [`traverse_batch`] apply an async transform to
//! every entry and return a collection of the same shape, with each result
//! placed at the key that produced it. The batched variant keeps up to N
//! transforms in flight; placement is keyed, so the output is correct no
//! matter which transform finishes first. Side effects inside the
//! transforms (logging, counters) interleave in completion order.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::loops::{while_batch, while_loop};

/// A keyed input or output collection.
///
/// Serializes untagged: a sequence becomes a JSON array, a mapping becomes a
/// JSON object with keys in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Collection<V> {
    /// Ordered sequence; keys are 0..len.
    Sequence(Vec<V>),
    /// Mapping with insertion-ordered keys.
    Mapping(IndexMap<String, V>),
}

/// Key of one collection entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(n) => write!(f, "{n}"),
        }
    }
}

impl<V> Collection<V> {
    /// True if this is an ordered sequence.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Collection::Sequence(_))
    }

    /// True if this is a keyed mapping.
    pub fn is_mapping(&self) -> bool {
        matches!(self, Collection::Mapping(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Collection::Sequence(items) => items.len(),
            Collection::Mapping(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a single entry by key.
    pub fn get(&self, key: &Key) -> Option<&V> {
        match (self, key) {
            (Collection::Sequence(items), Key::Index(i)) => items.get(*i),
            (Collection::Mapping(map), Key::Name(name)) => map.get(name),
            _ => None,
        }
    }

    /// All entries in key order.
    pub fn entries(&self) -> Vec<(Key, &V)> {
        match self {
            Collection::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::Index(i), v))
                .collect(),
            Collection::Mapping(map) => map
                .iter()
                .map(|(k, v)| (Key::Name(k.clone()), v))
                .collect(),
        }
    }

    /// An empty collection of the same shape.
    fn empty_like<R>(&self) -> Collection<R> {
        match self {
            Collection::Sequence(_) => Collection::Sequence(Vec::new()),
            Collection::Mapping(_) => Collection::Mapping(IndexMap::new()),
        }
    }
}

impl<V> From<Vec<V>> for Collection<V> {
    fn from(items: Vec<V>) -> Self {
        Collection::Sequence(items)
    }
}

impl<V> From<IndexMap<String, V>> for Collection<V> {
    fn from(map: IndexMap<String, V>) -> Self {
        Collection::Mapping(map)
    }
}

/// Output under construction: pre-keyed to mirror the input so writes by
/// key are valid before earlier keys have finished.
enum Staging<R> {
    Sequence(Vec<Option<R>>),
    Mapping(IndexMap<String, Option<R>>),
}

impl<R> Staging<R> {
    fn for_input<V>(input: &Collection<V>) -> Self {
        match input {
            Collection::Sequence(items) => {
                Staging::Sequence(std::iter::repeat_with(|| None).take(items.len()).collect())
            }
            Collection::Mapping(map) => {
                Staging::Mapping(map.keys().map(|k| (k.clone(), None)).collect())
            }
        }
    }

    fn write(&mut self, key: &Key, value: R) {
        match (self, key) {
            (Staging::Sequence(slots), Key::Index(i)) => slots[*i] = Some(value),
            (Staging::Mapping(map), Key::Name(name)) => {
                map.insert(name.clone(), Some(value));
            }
            _ => debug_assert!(false, "key shape does not match staging shape"),
        }
    }

    fn finish(self) -> Collection<R> {
        // Each slot was written exactly once: the cursor hands every key to
        // exactly one invocation, and the loop only resolves after all
        // invocations completed. An empty slot here means that invariant
        // broke upstream, so fail loudly instead of shrinking the output.
        match self {
            Staging::Sequence(slots) => Collection::Sequence(
                slots
                    .into_iter()
                    .enumerate()
                    .map(|(i, slot)| slot.unwrap_or_else(|| panic!("slot {i} never written")))
                    .collect(),
            ),
            Staging::Mapping(map) => Collection::Mapping(
                map.into_iter()
                    .map(|(k, v)| {
                        let v = v.unwrap_or_else(|| panic!("slot {k} never written"));
                        (k, v)
                    })
                    .collect(),
            ),
        }
    }
}

/// Apply an async transform to every entry, one at a time, in key order.
///
/// An empty input resolves immediately to an empty collection of the same
/// shape without calling the transform. The transform receives the entry's
/// key, its value, and the whole input collection; the future it returns
/// must own whatever it needs from them. A failed transform rejects the
/// whole traversal.
pub async fn traverse<V, R, E, F, Fut>(
    input: &Collection<V>,
    mut transform: F,
) -> Result<Collection<R>, E>
where
    F: FnMut(&Key, &V, &Collection<V>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let total = input.len();
    if total == 0 {
        return Ok(input.empty_like());
    }
    log::trace!("traverse: {total} entries");

    let staging = Mutex::new(Staging::for_input(input));
    let cursor = AtomicUsize::new(0);
    let entries = input.entries();

    let staging_ref = &staging;
    let cursor_ref = &cursor;
    // Each generator call claims the next key at call time, before any
    // await, so the cursor advance is never split across a suspension.
    let generator = move || {
        let i = cursor_ref.fetch_add(1, Ordering::SeqCst);
        let (key, value) = &entries[i];
        let key = key.clone();
        let pending = transform(&key, *value, input);
        async move {
            let result = pending.await?;
            staging_ref
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .write(&key, result);
            Ok(())
        }
    };

    while_loop(
        |_: Option<&()>| cursor.load(Ordering::SeqCst) < total,
        generator,
        Vec::new(),
        None,
    )
    .await?;

    Ok(staging.into_inner().unwrap_or_else(|e| e.into_inner()).finish())
}

/// Apply an async transform to every entry with up to `size` in flight.
///
/// Results land at their own keys, so the output matches [`traverse`]
/// exactly; only the timing of the transforms' side effects differs. A
/// `size` of zero is clamped to one; the first transform failure rejects
/// the traversal and cancels transforms that have not yet completed.
pub async fn traverse_batch<V, R, E, F, Fut>(
    size: usize,
    input: &Collection<V>,
    mut transform: F,
) -> Result<Collection<R>, E>
where
    F: FnMut(&Key, &V, &Collection<V>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let total = input.len();
    if total == 0 {
        return Ok(input.empty_like());
    }
    log::trace!("traverse_batch: {total} entries, {size} lanes");

    let staging = Mutex::new(Staging::for_input(input));
    let cursor = AtomicUsize::new(0);
    let entries = input.entries();

    let staging_ref = &staging;
    let cursor_ref = &cursor;
    // Claim-at-call-time keeps concurrent lanes from taking the same key:
    // the cursor advance and the range check in the condition never
    // straddle an await, and lanes only interleave at awaits.
    let generator = move || {
        let i = cursor_ref.fetch_add(1, Ordering::SeqCst);
        let (key, value) = &entries[i];
        let key = key.clone();
        let pending = transform(&key, *value, input);
        async move {
            let result = pending.await?;
            staging_ref
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .write(&key, result);
            Ok(())
        }
    };

    while_batch(
        size,
        |_: Option<&()>| cursor.load(Ordering::SeqCst) < total,
        generator,
        Vec::new(),
        None,
    )
    .await?;

    Ok(staging.into_inner().unwrap_or_else(|e| e.into_inner()).finish())
}
