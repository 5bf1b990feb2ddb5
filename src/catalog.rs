// src/catalog.rs
//
// Read-only product catalog and the user goal corpus.
//
// The catalog is loaded once per run and never mutated; components share
// it through an Arc. Alongside the records it carries a per-slot value
// pool (every distinct value seen for a slot, sorted) used by the error
// injector to draw legal replacement values.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Goal, RecordId, SlotMap, UNK};

/// Immutable record store keyed by record id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    records: BTreeMap<RecordId, SlotMap>,
    /// slot -> sorted distinct values across all records.
    value_pool: BTreeMap<String, Vec<String>>,
}

impl Catalog {
    /// Build a catalog from records. Fails on an empty record set.
    pub fn new(records: BTreeMap<RecordId, SlotMap>) -> Result<Self, CorpusError> {
        if records.is_empty() {
            return Err(CorpusError::Empty {
                what: "catalog".to_string(),
            });
        }

        let mut value_pool: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in records.values() {
            for (slot, value) in record {
                let values = value_pool.entry(slot.clone()).or_default();
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        for values in value_pool.values_mut() {
            values.sort();
        }

        Ok(Catalog {
            records,
            value_pool,
        })
    }

    /// Parse a catalog from a JSON object mapping record id to record.
    pub fn from_json_str(json: &str) -> Result<Self, CorpusError> {
        let raw: BTreeMap<String, SlotMap> =
            serde_json::from_str(json).map_err(|e| CorpusError::Parse {
                source: e.to_string(),
            })?;
        let mut records = BTreeMap::new();
        for (key, record) in raw {
            let id: RecordId = key.parse().map_err(|_| CorpusError::Parse {
                source: format!("record id '{}' is not an integer", key),
            })?;
            records.insert(id, record);
        }
        Catalog::new(records)
    }

    /// Load a catalog from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| CorpusError::Io {
            path: path.as_ref().display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_json_str(&contents)
    }

    pub fn records(&self) -> &BTreeMap<RecordId, SlotMap> {
        &self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&SlotMap> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct legal values for a slot, sorted. None if the slot never
    /// appears in the catalog.
    pub fn slot_values(&self, slot: &str) -> Option<&[String]> {
        self.value_pool.get(slot).map(|v| v.as_slice())
    }

    /// Slots that appear in at least one record.
    pub fn slots(&self) -> impl Iterator<Item = &String> {
        self.value_pool.keys()
    }

    /// A small built-in shopping catalog for demos and tests.
    pub fn demo() -> Self {
        fn record(pairs: &[(&str, &str)]) -> SlotMap {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }

        let mut records = BTreeMap::new();
        records.insert(
            0,
            record(&[
                ("name_product", "linen shirt"),
                ("size_product", "M"),
                ("color_product", "white"),
                ("material_product", "linen"),
                ("cost_product", "35"),
                ("amount_product", "12"),
            ]),
        );
        records.insert(
            1,
            record(&[
                ("name_product", "linen shirt"),
                ("size_product", "L"),
                ("color_product", "navy"),
                ("material_product", "linen"),
                ("cost_product", "35"),
                ("amount_product", "4"),
            ]),
        );
        records.insert(
            2,
            record(&[
                ("name_product", "denim jacket"),
                ("size_product", "M"),
                ("color_product", "blue"),
                ("material_product", "denim"),
                ("cost_product", "80"),
                ("amount_product", "7"),
            ]),
        );
        records.insert(
            3,
            record(&[
                ("name_product", "wool sweater"),
                ("size_product", "S"),
                ("color_product", "grey"),
                ("material_product", "wool"),
                ("cost_product", "60"),
                ("amount_product", "9"),
            ]),
        );
        records.insert(
            4,
            record(&[
                ("name_product", "wool sweater"),
                ("size_product", "M"),
                ("color_product", "black"),
                ("material_product", "wool"),
                ("cost_product", "60"),
                ("amount_product", "2"),
            ]),
        );
        records.insert(
            5,
            record(&[
                ("name_product", "canvas tote"),
                ("size_product", "one size"),
                ("color_product", "beige"),
                ("material_product", "canvas"),
                ("cost_product", "18"),
                ("amount_product", "25"),
            ]),
        );

        Catalog::new(records).expect("demo catalog is non-empty")
    }
}

/// User goal corpus, sampled with replacement once per episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalCorpus {
    goals: Vec<Goal>,
}

impl GoalCorpus {
    /// Build a corpus. Fails on an empty goal list.
    pub fn new(goals: Vec<Goal>) -> Result<Self, CorpusError> {
        if goals.is_empty() {
            return Err(CorpusError::Empty {
                what: "goal corpus".to_string(),
            });
        }
        Ok(GoalCorpus { goals })
    }

    /// Parse a corpus from a JSON array of goals.
    pub fn from_json_str(json: &str) -> Result<Self, CorpusError> {
        let goals: Vec<Goal> = serde_json::from_str(json).map_err(|e| CorpusError::Parse {
            source: e.to_string(),
        })?;
        GoalCorpus::new(goals)
    }

    /// Load a corpus from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| CorpusError::Io {
            path: path.as_ref().display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_json_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    /// Uniformly sample one goal (cloned; the corpus itself stays immutable).
    pub fn sample(&self, rng: &mut ChaCha8Rng) -> Goal {
        let idx = rng.gen_range(0..self.goals.len());
        self.goals[idx].clone()
    }

    /// A small built-in goal set matching `Catalog::demo()`.
    pub fn demo() -> Self {
        fn goal(informs: &[(&str, &str)], requests: &[&str]) -> Goal {
            Goal {
                intent: crate::types::Intent::Request,
                inform_slots: informs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                request_slots: requests
                    .iter()
                    .map(|k| (k.to_string(), UNK.to_string()))
                    .collect(),
            }
        }

        let goals = vec![
            goal(&[("name_product", "linen shirt")], &["cost_product"]),
            goal(
                &[("name_product", "wool sweater"), ("size_product", "M")],
                &["cost_product", "color_product"],
            ),
            goal(
                &[("name_product", "denim jacket"), ("color_product", "blue")],
                &[],
            ),
            goal(
                &[("material_product", "canvas")],
                &["name_product", "cost_product"],
            ),
            goal(
                &[("name_product", "canvas tote"), ("cost_product", "18")],
                &["amount_product"],
            ),
        ];

        GoalCorpus::new(goals).expect("demo corpus is non-empty")
    }
}

/// Errors raised when loading the catalog or the goal corpus.
#[derive(Debug, Clone)]
pub enum CorpusError {
    Io { path: String, source: String },
    Parse { source: String },
    Empty { what: String },
}

impl std::fmt::Display for CorpusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorpusError::Io { path, source } => {
                write!(f, "failed to read '{}': {}", path, source)
            }
            CorpusError::Parse { source } => {
                write!(f, "failed to parse JSON: {}", source)
            }
            CorpusError::Empty { what } => {
                write!(f, "{} must not be empty", what)
            }
        }
    }
}

impl std::error::Error for CorpusError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_demo_catalog_value_pool() {
        let catalog = Catalog::demo();
        assert_eq!(catalog.len(), 6);

        let names = catalog.slot_values("name_product").unwrap();
        assert!(names.contains(&"linen shirt".to_string()));
        // Sorted and deduplicated ("linen shirt" appears in two records).
        assert_eq!(
            names.iter().filter(|v| v.as_str() == "linen shirt").count(),
            1
        );
        let mut sorted = names.to_vec();
        sorted.sort();
        assert_eq!(names, sorted.as_slice());
    }

    #[test]
    fn test_catalog_rejects_empty() {
        assert!(Catalog::new(BTreeMap::new()).is_err());
    }

    #[test]
    fn test_catalog_from_json_str() {
        let json = r#"{
            "0": {"name_product": "linen shirt", "cost_product": "35"},
            "7": {"name_product": "denim jacket", "cost_product": "80"}
        }"#;
        let catalog = Catalog::from_json_str(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.get(7).unwrap().get("name_product").unwrap(),
            "denim jacket"
        );
    }

    #[test]
    fn test_catalog_rejects_bad_record_id() {
        let json = r#"{"abc": {"name_product": "x"}}"#;
        assert!(Catalog::from_json_str(json).is_err());
    }

    #[test]
    fn test_goal_corpus_from_json() {
        let json = r#"[
            {"intent": "request",
             "inform_slots": {"name_product": "linen shirt"},
             "request_slots": {"cost_product": "UNK"}}
        ]"#;
        let corpus = GoalCorpus::from_json_str(json).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(
            corpus.goals()[0].inform_slots.get("name_product").unwrap(),
            "linen shirt"
        );
    }

    #[test]
    fn test_goal_corpus_rejects_empty() {
        assert!(GoalCorpus::new(Vec::new()).is_err());
        assert!(GoalCorpus::from_json_str("[]").is_err());
    }

    #[test]
    fn test_goal_sampling_is_seed_deterministic() {
        let corpus = GoalCorpus::demo();

        let mut rng1 = ChaCha8Rng::seed_from_u64(7);
        let mut rng2 = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(corpus.sample(&mut rng1), corpus.sample(&mut rng2));
        }
    }
}
