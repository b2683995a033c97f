//! Per-run accumulation of field statistics.
//!
//! Folds the walker's leaf stream for every record in one ingestion run into
//! a per-path map of counts, type sets, and bounded samples. Pure in-memory
//! aggregation — persistence happens in the catalog merge layer.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::config::DiscoveryConfig;
use crate::models::TypeSet;
use crate::walker::{self, walk_record};

/// Statistics for one path within one run.
#[derive(Debug, Clone)]
pub struct FieldStat {
    /// Number of records in which the path appeared at least once.
    pub count: i64,
    pub types: TypeSet,
    /// Deduplicated by structural equality, first-seen order, capped.
    pub samples: Vec<Value>,
    pub is_nested: bool,
    pub parent_path: Option<String>,
}

/// Aggregated statistics for one discovery run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub fields: BTreeMap<String, FieldStat>,
    pub total_records: i64,
    pub truncated_branches: usize,
}

impl RunStats {
    /// Share of records containing the path. Defined as 0 for an empty run.
    pub fn frequency(&self, stat: &FieldStat) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            stat.count as f64 / self.total_records as f64
        }
    }
}

/// Walk and aggregate every record of one run.
pub fn aggregate_run(records: &[Value], cfg: &DiscoveryConfig) -> RunStats {
    let mut stats = RunStats {
        total_records: records.len() as i64,
        ..Default::default()
    };

    for record in records {
        let walked = walk_record(record, cfg.max_depth, cfg.array_sample);
        stats.truncated_branches += walked.truncated_branches;

        // A path counts once per record toward frequency, however many
        // array elements repeat it.
        let mut seen_in_record: BTreeSet<&str> = BTreeSet::new();

        for leaf in &walked.leaves {
            let stat = stats
                .fields
                .entry(leaf.path.clone())
                .or_insert_with(|| FieldStat {
                    count: 0,
                    types: TypeSet::default(),
                    samples: Vec::new(),
                    is_nested: walker::is_nested(&leaf.path),
                    parent_path: walker::parent_path(&leaf.path),
                });

            if seen_in_record.insert(leaf.path.as_str()) {
                stat.count += 1;
            }

            stat.types.insert(crate::models::TypeTag::of(&leaf.value));

            if stat.samples.len() < cfg.run_sample_cap && !stat.samples.contains(&leaf.value) {
                stat.samples.push(leaf.value.clone());
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TypeTag;
    use serde_json::json;

    fn cfg() -> DiscoveryConfig {
        DiscoveryConfig::default()
    }

    #[test]
    fn test_frequency_is_record_share() {
        let records = vec![
            json!({"a": 1, "b": "x"}),
            json!({"a": 2}),
            json!({"c": true}),
        ];
        let stats = aggregate_run(&records, &cfg());
        let a = &stats.fields["a"];
        assert_eq!(a.count, 2);
        let freq = stats.frequency(a);
        assert!((freq - 2.0 / 3.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&freq));
    }

    #[test]
    fn test_empty_run_frequency_is_zero() {
        let stats = aggregate_run(&[], &cfg());
        assert_eq!(stats.total_records, 0);
        let stat = FieldStat {
            count: 0,
            types: TypeSet::default(),
            samples: vec![],
            is_nested: false,
            parent_path: None,
        };
        assert_eq!(stats.frequency(&stat), 0.0);
    }

    #[test]
    fn test_array_repeats_count_once_per_record() {
        let records = vec![json!({"vals": [1, 2, 3]})];
        let stats = aggregate_run(&records, &cfg());
        let stat = &stats.fields["vals[*]"];
        assert_eq!(stat.count, 1);
        assert_eq!(stats.frequency(stat), 1.0);
        // All three sampled values are distinct, so all are kept.
        assert_eq!(stat.samples, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_samples_capped_and_deduplicated() {
        let records: Vec<Value> = (0..10).map(|i| json!({ "v": i % 7 })).collect();
        let stats = aggregate_run(&records, &cfg());
        let stat = &stats.fields["v"];
        assert_eq!(stat.samples.len(), 5);
        // First-seen order preserved.
        assert_eq!(
            stat.samples,
            vec![json!(0), json!(1), json!(2), json!(3), json!(4)]
        );
    }

    #[test]
    fn test_type_union_across_records() {
        let records = vec![json!({"v": 1}), json!({"v": "one"}), json!({"v": null})];
        let stats = aggregate_run(&records, &cfg());
        let types = stats.fields["v"].types;
        assert!(types.contains(TypeTag::Number));
        assert!(types.contains(TypeTag::String));
        assert!(types.contains(TypeTag::Null));
        assert!(!types.contains(TypeTag::Boolean));
    }

    #[test]
    fn test_nesting_metadata() {
        let records = vec![json!({"budget": {"total": 9}})];
        let stats = aggregate_run(&records, &cfg());
        let stat = &stats.fields["budget.total"];
        assert!(stat.is_nested);
        assert_eq!(stat.parent_path.as_deref(), Some("budget"));
    }
}
