use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::hash::Hash;
use std::marker::PhantomData;

// ========== Core map-reduce traits ==========

/// Turns a stream of input lines into keyed values. One mapper instance is
/// shared by all map tasks, so it should stay stateless; per-call tallies
/// travel in the return value.
///
/// Returns the number of input records skipped as malformed. The runtime
/// folds the count into the phase stats only when the task attempt
/// succeeds, so a retried task never double-counts its skips. An `Err`
/// fails the attempt and lands on the retry path.
pub trait Mapper {
    type Key: Send + Serialize + DeserializeOwned + Hash + Eq + Clone + 'static;
    type Value: Send + Serialize + DeserializeOwned + Clone + 'static;

    fn do_map<I, F>(&self, input: I, emit: &mut F) -> Result<u64>
    where
        I: IntoIterator<Item = String>,
        F: FnMut(Self::Key, Self::Value);
}

/// Pre-shuffle local reduction. Must be associative and safe to apply zero,
/// one, or many times to a key's values without changing the final result;
/// the runtime applies it whenever a map task's buffer fills up and once more
/// at task end.
pub trait Combiner {
    type Key: Send + Serialize + DeserializeOwned + Hash + Eq + Clone + 'static;
    type Value: Send + Serialize + DeserializeOwned + Clone + 'static;

    fn combine(&self, key: &Self::Key, values: Vec<Self::Value>) -> Vec<Self::Value>;
}

/// Combiner that forwards values untouched, for stages whose values carry no
/// local redundancy worth folding.
pub struct IdentityCombiner<K, V> {
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> IdentityCombiner<K, V> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<K, V> Default for IdentityCombiner<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Combiner for IdentityCombiner<K, V>
where
    K: Send + Serialize + DeserializeOwned + Hash + Eq + Clone + 'static,
    V: Send + Serialize + DeserializeOwned + Clone + 'static,
{
    type Key = K;
    type Value = V;

    fn combine(&self, _key: &K, values: Vec<V>) -> Vec<V> {
        values
    }
}

/// Consumes all values grouped under one key and emits final output lines.
/// The runtime guarantees every value for the key has arrived before
/// `do_reduce` is called (the shuffle barrier). An `Err` fails the task;
/// the phase never emits a partial group.
pub trait Reducer {
    type Key: Send + Serialize + DeserializeOwned + Hash + Eq + Clone + 'static;
    type ValueIn: Send + Serialize + DeserializeOwned + Clone + 'static;

    fn do_reduce<I, F>(&self, key: &Self::Key, values: I, emit: &mut F) -> Result<()>
    where
        I: IntoIterator<Item = Self::ValueIn>,
        F: FnMut(String);
}
