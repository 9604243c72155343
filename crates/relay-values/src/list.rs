//! List value summaries.

use crate::primitive::PrimitiveVS;
use crate::{ValueSummary, VsError, VsResult};
use relay_solver::Guard;

/// A guarded integer size plus an indexed sequence of element summaries.
/// The slot at position `i` is meaningful only under the guard that the
/// size exceeds `i`; slots past every possible size are dropped eagerly.
#[derive(Clone, Debug)]
pub struct ListVS<T> {
    size: PrimitiveVS<i64>,
    items: Vec<T>,
}

impl<T: ValueSummary> ListVS<T> {
    /// An empty list defined under `universe`.
    pub fn new(universe: Guard) -> Self {
        Self {
            size: PrimitiveVS::new(0).restrict(universe),
            items: Vec::new(),
        }
    }

    pub(crate) fn from_parts(size: PrimitiveVS<i64>, items: Vec<T>) -> Self {
        Self { size, items }
    }

    pub fn size(&self) -> &PrimitiveVS<i64> {
        &self.size
    }

    /// Raw slots, index-aligned. Slot `i` is only meaningful under
    /// [`pos_guard`](Self::pos_guard)`(i)`.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Guard under which position `i` is in range.
    pub fn pos_guard(&self, i: usize) -> Guard {
        let mut g = Guard::const_false();
        for e in self.size.guarded_values() {
            if e.value > i as i64 {
                g = g.or(e.guard);
            }
        }
        g
    }

    /// Universe under which the list holds at least one element.
    pub fn non_empty_universe(&self) -> Guard {
        self.pos_guard(0)
    }

    /// True when the list is empty under every guard.
    pub fn is_empty(&self) -> bool {
        self.non_empty_universe().is_false()
    }

    pub fn in_range(&self, index: &PrimitiveVS<i64>) -> PrimitiveVS<bool> {
        let nonneg = index.map(|i| *i >= 0);
        let below = index.map2(&self.size, |i, n| i < n);
        nonneg.and_vs(&below)
    }

    fn invalid_index<U>(&self, index: &PrimitiveVS<i64>) -> VsResult<U> {
        Err(VsError::InvalidIndex {
            index: format!("{:?}", index),
            size: format!("{:?}", self.size),
        })
    }

    /// Select the element at each possible index and merge the selections.
    /// Parts of `index` that are out of range yield no entry; an index that
    /// is out of range everywhere is a model error.
    pub fn get(&self, index: &PrimitiveVS<i64>) -> VsResult<T> {
        let ok = self.in_range(index).true_guard();
        if ok.is_false() {
            return self.invalid_index(index);
        }
        let index = index.restrict(ok);
        let mut parts: Vec<T> = Vec::new();
        for e in index.guarded_values() {
            parts.push(self.items[e.value as usize].restrict(e.guard));
        }
        match parts.split_first() {
            Some((first, rest)) => Ok(first.merge(rest)),
            None => self.invalid_index(&index),
        }
    }

    /// Replace the element at each possible index with `item` under the
    /// corresponding guard.
    pub fn set(&self, index: &PrimitiveVS<i64>, item: &T) -> VsResult<Self> {
        let ok = self.in_range(index).true_guard().and(item.universe());
        if ok.is_false() {
            return self.invalid_index(index);
        }
        let index = index.restrict(ok);
        let mut out = self.clone();
        for e in index.guarded_values() {
            let slot = e.value as usize;
            out.items[slot] = out.items[slot].update_under_guard(e.guard, item);
        }
        Ok(out)
    }

    /// Append `item` under its universe: the size grows by one there and
    /// the item lands at each possible old-size position.
    pub fn add(&self, item: &T) -> Self {
        let u = item.universe();
        let mut out = self.clone();
        for e in self.size.guarded_values() {
            let g = e.guard.and(u);
            if g.is_false() {
                continue;
            }
            let slot = e.value as usize;
            if slot == out.items.len() {
                out.items.push(item.restrict(g));
            } else {
                out.items[slot] = out.items[slot].update_under_guard(g, item);
            }
        }
        out.size = self.size.update_under_guard(u, &self.size.add_i64(1));
        out
    }

    /// Insert `item` at each possible index (`0 <= i <= size`), shifting
    /// later elements right under that index's guard.
    pub fn insert_at(&self, index: &PrimitiveVS<i64>, item: &T) -> VsResult<Self> {
        let nonneg = index.map(|i| *i >= 0);
        let at_most_size = index.map2(&self.size, |i, n| i <= n);
        let ok = nonneg.and_vs(&at_most_size).true_guard().and(item.universe());
        if ok.is_false() {
            return self.invalid_index(index);
        }
        let index = index.restrict(ok);
        let mut out = self.clone();
        // One fresh tail slot shared by every index entry.
        if let Some(last) = out.items.last() {
            let tail = last.restrict(Guard::const_false());
            out.items.push(tail);
        }
        for e in index.guarded_values() {
            let g = e.guard;
            let at = e.value as usize;
            let n = out.items.len();
            let prev = out.items.clone();
            for j in (at + 1..n).rev() {
                out.items[j] = out.items[j].update_under_guard(g, &prev[j - 1]);
            }
            if at < n {
                out.items[at] = out.items[at].update_under_guard(g, item);
            } else {
                out.items.push(item.restrict(g));
            }
        }
        out.size = self.size.update_under_guard(ok, &self.size.add_i64(1));
        Ok(out)
    }

    /// Remove the element at each possible index, shifting later elements
    /// left under that index's guard.
    pub fn remove_at(&self, index: &PrimitiveVS<i64>) -> VsResult<Self> {
        let ok = self.in_range(index).true_guard();
        if ok.is_false() {
            return self.invalid_index(index);
        }
        let index = index.restrict(ok);
        let mut out = self.clone();
        for e in index.guarded_values() {
            let g = e.guard;
            let at = e.value as usize;
            let n = out.items.len();
            let prev = out.items.clone();
            for j in at..n.saturating_sub(1) {
                out.items[j] = out.items[j].update_under_guard(g, &prev[j + 1]);
            }
            if n > 0 {
                out.items[n - 1] = prev[n - 1].restrict(g.not());
            }
        }
        out.size = self.size.update_under_guard(ok, &self.size.add_i64(-1));
        while matches!(out.items.last(), Some(t) if t.is_empty_vs()) {
            out.items.pop();
        }
        Ok(out)
    }

    /// Disjunction over elements of symbolic equality with `item`, each
    /// under its in-range guard.
    pub fn contains(&self, item: &T) -> PrimitiveVS<bool> {
        let u = self.universe().and(item.universe());
        let mut found = Guard::const_false();
        for (i, it) in self.items.iter().enumerate() {
            let within = self.pos_guard(i);
            if within.is_false() {
                continue;
            }
            found = found.or(it.symbolic_equals(item, within).true_guard());
        }
        PrimitiveVS::from_guarded([(true, found.and(u)), (false, u.and(found.not()))])
    }

    /// Index of the first element equal to `item` under each guard. The
    /// result's universe is the guard under which the item is present.
    pub fn index_of(&self, item: &T) -> PrimitiveVS<i64> {
        let mut found = Guard::const_false();
        let mut entries: Vec<(i64, Guard)> = Vec::new();
        for (i, it) in self.items.iter().enumerate() {
            let within = self.pos_guard(i).and(item.universe());
            if within.is_false() {
                continue;
            }
            let eq = it
                .symbolic_equals(item, within)
                .true_guard()
                .and(found.not());
            if !eq.is_false() {
                entries.push((i as i64, eq));
                found = found.or(eq);
            }
        }
        PrimitiveVS::from_guarded(entries)
    }
}

impl<T: ValueSummary> ValueSummary for ListVS<T> {
    fn is_empty_vs(&self) -> bool {
        self.size.is_empty_vs()
    }

    fn universe(&self) -> Guard {
        self.size.universe()
    }

    fn restrict(&self, guard: Guard) -> Self {
        if guard.is_true() {
            return self.clone();
        }
        let size = self.size.restrict(guard);
        let keep = size.max_value().unwrap_or(0).max(0) as usize;
        let items = self
            .items
            .iter()
            .take(keep)
            .map(|it| it.restrict(guard))
            .collect();
        Self { size, items }
    }

    fn merge(&self, others: &[Self]) -> Self {
        let sizes: Vec<_> = others.iter().map(|o| o.size.clone()).collect();
        let size = self.size.merge(&sizes);
        let mut items = self.items.clone();
        for other in others {
            for (i, it) in other.items.iter().enumerate() {
                if i < items.len() {
                    items[i] = items[i].merge_with(it);
                } else {
                    items.push(it.clone());
                }
            }
        }
        Self { size, items }
    }

    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        let u = pc.and(self.universe()).and(other.universe());
        let mut acc = self.size.symbolic_equals(&other.size, u).true_guard();
        let max = self.items.len().max(other.items.len());
        for i in 0..max {
            if acc.is_false() {
                break;
            }
            let within = self.pos_guard(i).and(other.pos_guard(i));
            match (self.items.get(i), other.items.get(i)) {
                (Some(a), Some(b)) => {
                    let eq = a.symbolic_equals(b, within).true_guard();
                    acc = acc.and(eq.or(within.not()));
                }
                // One side has no slot here at all: equal only where the
                // position is out of range.
                _ => acc = acc.and(within.not()),
            }
        }
        PrimitiveVS::from_guarded([(true, acc.and(u)), (false, u.and(acc.not()))])
    }
}
