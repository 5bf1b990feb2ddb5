// src/matcher.rs
//
// Constraint matcher over the read-only catalog (the DB query layer).
//
// A record matches a constraint set iff it carries an identical value for
// every constraint slot present (strict, case-sensitive equality);
// unconstrained slots are ignored. Results are cached keyed by the frozen,
// order-independent constraint set. Cache entries are write-once per key:
// recomputation is idempotent, so concurrent population behind the RwLock
// can at most duplicate work, never produce a different result.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::catalog::Catalog;
use crate::config::DialogueConfig;
use crate::types::{RecordId, SlotMap, ANYTHING, NO_MATCH};

/// Records matching one constraint set, keyed by record id.
pub type QueryResult = BTreeMap<RecordId, SlotMap>;

/// Frozen cache key: the constraint set as sorted (slot, value) pairs.
type FrozenKey = Vec<(String, String)>;

pub struct ConstraintMatcher {
    catalog: Arc<Catalog>,
    no_query_slots: std::collections::BTreeSet<String>,
    cache: RwLock<HashMap<FrozenKey, Arc<QueryResult>>>,
}

impl ConstraintMatcher {
    pub fn new(catalog: Arc<Catalog>, cfg: &DialogueConfig) -> Self {
        ConstraintMatcher {
            catalog,
            no_query_slots: cfg.no_query_slots.clone(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Strip constraints that must not reach the catalog: no-query slots
    /// and `anything` values.
    pub fn queryable_constraints(&self, informs: &SlotMap) -> SlotMap {
        informs
            .iter()
            .filter(|(slot, value)| {
                !self.no_query_slots.contains(*slot) && value.as_str() != ANYTHING
            })
            .map(|(slot, value)| (slot.clone(), value.clone()))
            .collect()
    }

    /// All records matching the constraint set. An empty constraint set
    /// matches every record.
    pub fn query(&self, constraints: &SlotMap) -> Arc<QueryResult> {
        let key: FrozenKey = constraints
            .iter()
            .map(|(slot, value)| (slot.clone(), value.clone()))
            .collect();

        if let Some(hit) = self
            .cache
            .read()
            .expect("matcher cache lock poisoned")
            .get(&key)
        {
            return Arc::clone(hit);
        }

        let computed = Arc::new(self.compute(constraints));
        let mut cache = self.cache.write().expect("matcher cache lock poisoned");
        // A concurrent writer may have won the race; the computed value is
        // identical either way, keep whichever entry is already in place.
        Arc::clone(cache.entry(key).or_insert(computed))
    }

    /// Number of records matching the constraint set.
    pub fn match_count(&self, constraints: &SlotMap) -> usize {
        self.query(constraints).len()
    }

    /// Fill an agent inform template: the most common catalog value for
    /// `slot` among records matching the remaining constraints, or the
    /// "no match available" sentinel when nothing matches.
    ///
    /// Ties break toward the lexicographically smallest value so filling
    /// stays deterministic.
    pub fn fill_inform_value(&self, slot: &str, current_informs: &SlotMap) -> String {
        let mut constraints = self.queryable_constraints(current_informs);
        constraints.remove(slot);

        let results = self.query(&constraints);

        let mut counts: BTreeMap<&String, usize> = BTreeMap::new();
        for record in results.values() {
            if let Some(value) = record.get(slot) {
                *counts.entry(value).or_insert(0) += 1;
            }
        }

        counts
            .into_iter()
            .max_by(|(a_val, a_n), (b_val, b_n)| a_n.cmp(b_n).then(b_val.cmp(a_val)))
            .map(|(value, _)| value.clone())
            .unwrap_or_else(|| NO_MATCH.to_string())
    }

    fn compute(&self, constraints: &SlotMap) -> QueryResult {
        self.catalog
            .records()
            .iter()
            .filter(|(_, record)| {
                constraints
                    .iter()
                    .all(|(slot, value)| record.get(slot) == Some(value))
            })
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }
}
