//! Map value summaries: parallel key and value lists.

use crate::list::ListVS;
use crate::primitive::{PrimValue, PrimitiveVS};
use crate::{ValueSummary, VsError, VsResult};
use relay_solver::Guard;

/// A map from concrete keys to value summaries, stored as a key list
/// (unique per guard) and an index-aligned value list. Keys are appended in
/// program order, so two maps built along the same path agree positionally.
#[derive(Clone, Debug)]
pub struct MapVS<K: PrimValue, V> {
    keys: ListVS<PrimitiveVS<K>>,
    values: ListVS<V>,
}

impl<K: PrimValue, V: ValueSummary> MapVS<K, V> {
    pub fn new(universe: Guard) -> Self {
        Self {
            keys: ListVS::new(universe),
            values: ListVS::new(universe),
        }
    }

    pub(crate) fn from_parts(keys: ListVS<PrimitiveVS<K>>, values: ListVS<V>) -> Self {
        Self { keys, values }
    }

    pub fn keys(&self) -> &ListVS<PrimitiveVS<K>> {
        &self.keys
    }

    pub fn values(&self) -> &ListVS<V> {
        &self.values
    }

    pub fn size(&self) -> &PrimitiveVS<i64> {
        self.keys.size()
    }

    pub fn contains_key(&self, key: &PrimitiveVS<K>) -> PrimitiveVS<bool> {
        self.keys.contains(key)
    }

    fn key_index(&self, key: &PrimitiveVS<K>) -> PrimitiveVS<i64> {
        self.keys.index_of(key)
    }

    /// Look the key up under the guard where it is present; absent
    /// everywhere is a model error.
    pub fn get(&self, key: &PrimitiveVS<K>) -> VsResult<V> {
        let present = self.contains_key(key).true_guard();
        if present.is_false() {
            return Err(VsError::KeyNotFound {
                key: format!("{:?}", key),
            });
        }
        let idx = self.key_index(key).restrict(present);
        self.values.get(&idx)
    }

    /// Update the value where the key is present; append to both lists
    /// where it is absent.
    pub fn put(&self, key: &PrimitiveVS<K>, value: &V) -> Self {
        let present = self.contains_key(key).true_guard();
        let absent = key.universe().and(value.universe()).and(present.not());
        let mut keys = self.keys.clone();
        let mut values = self.values.clone();
        if !present.is_false() {
            let idx = self.key_index(key).restrict(present);
            if let Ok(updated) = values.set(&idx, value) {
                values = updated;
            }
        }
        if !absent.is_false() {
            keys = keys.add(&key.restrict(absent));
            values = values.add(&value.restrict(absent));
        }
        Self { keys, values }
    }

    /// Remove the key where present; no-op elsewhere.
    pub fn remove(&self, key: &PrimitiveVS<K>) -> Self {
        let present = self.contains_key(key).true_guard();
        if present.is_false() {
            return self.clone();
        }
        let idx = self.key_index(key).restrict(present);
        match (self.keys.remove_at(&idx), self.values.remove_at(&idx)) {
            (Ok(keys), Ok(values)) => Self { keys, values },
            // The index is in range wherever the key is present.
            _ => self.clone(),
        }
    }
}

impl<K: PrimValue, V: ValueSummary> ValueSummary for MapVS<K, V> {
    fn is_empty_vs(&self) -> bool {
        self.keys.is_empty_vs()
    }

    fn universe(&self) -> Guard {
        self.keys.universe()
    }

    fn restrict(&self, guard: Guard) -> Self {
        Self {
            keys: self.keys.restrict(guard),
            values: self.values.restrict(guard),
        }
    }

    fn merge(&self, others: &[Self]) -> Self {
        let key_lists: Vec<_> = others.iter().map(|o| o.keys.clone()).collect();
        let value_lists: Vec<_> = others.iter().map(|o| o.values.clone()).collect();
        Self {
            keys: self.keys.merge(&key_lists),
            values: self.values.merge(&value_lists),
        }
    }

    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        let u = pc.and(self.universe()).and(other.universe());
        let keys_eq = self.keys.symbolic_equals(&other.keys, u).true_guard();
        let values_eq = self.values.symbolic_equals(&other.values, u).true_guard();
        let acc = keys_eq.and(values_eq);
        PrimitiveVS::from_guarded([(true, acc.and(u)), (false, u.and(acc.not()))])
    }
}
