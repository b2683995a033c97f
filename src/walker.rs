//! Bounded structural traversal of one record.
//!
//! Walks an arbitrary JSON-like record and produces one leaf observation per
//! terminal position. Object keys concatenate into a dotted path; arrays
//! collapse to a single `[*]` segment regardless of index, so two records
//! that differ only in array length produce the same path set.
//!
//! Only the first [`array sample`](crate::config::DiscoveryConfig::array_sample)
//! elements of any array are walked. This is a precision/cost tradeoff, not a
//! correctness guarantee: values past the sample window never influence type
//! sets or samples. Recursion depth is hard-capped; a branch that exceeds the
//! cap is truncated and counted rather than failing the walk, which defends
//! against pathological or adversarial payloads.
//!
//! The walker is a pure function of one record. It performs no I/O and never
//! fails for well-formed JSON values.

use serde_json::Value;

/// One leaf observation: a normalized path and the value found there.
#[derive(Debug, Clone)]
pub struct Leaf {
    pub path: String,
    pub value: Value,
}

/// All leaves of one record plus the number of truncated branches.
#[derive(Debug, Default)]
pub struct WalkedRecord {
    pub leaves: Vec<Leaf>,
    pub truncated_branches: usize,
}

/// Walk one record into its leaf observations.
pub fn walk_record(record: &Value, max_depth: usize, array_sample: usize) -> WalkedRecord {
    let mut out = WalkedRecord::default();
    walk(record, String::new(), 0, max_depth, array_sample, &mut out);
    out
}

fn walk(
    value: &Value,
    path: String,
    depth: usize,
    max_depth: usize,
    array_sample: usize,
    out: &mut WalkedRecord,
) {
    if depth >= max_depth {
        out.truncated_branches += 1;
        return;
    }

    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                walk(child, child_path, depth + 1, max_depth, array_sample, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            // Index-independent: every sampled element contributes to the
            // same `[*]` path.
            let child_path = format!("{}[*]", path);
            for item in items.iter().take(array_sample) {
                walk(
                    item,
                    child_path.clone(),
                    depth + 1,
                    max_depth,
                    array_sample,
                    out,
                );
            }
        }
        // Scalars, plus empty arrays/objects, which are themselves leaf
        // observations of type array/object.
        other => {
            let path = if path.is_empty() {
                "$".to_string()
            } else {
                path
            };
            out.leaves.push(Leaf {
                path,
                value: other.clone(),
            });
        }
    }
}

/// Whether a path points below the record's top level.
pub fn is_nested(path: &str) -> bool {
    path.contains('.') || path.contains("[*]")
}

/// The path one segment up, or `None` for top-level paths.
pub fn parent_path(path: &str) -> Option<String> {
    if let Some((parent, _)) = path.rsplit_once('.') {
        return Some(parent.to_string());
    }
    path.strip_suffix("[*]")
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    const DEPTH: usize = 32;
    const SAMPLE: usize = 3;

    fn paths(record: &Value) -> BTreeSet<String> {
        walk_record(record, DEPTH, SAMPLE)
            .leaves
            .into_iter()
            .map(|l| l.path)
            .collect()
    }

    #[test]
    fn test_nested_object_paths() {
        let record = json!({"budget": {"total": 100, "currency": "EUR"}, "name": "x"});
        let got = paths(&record);
        let want: BTreeSet<String> = ["budget.total", "budget.currency", "name"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_array_collapses_to_wildcard() {
        let record = json!({"lines": [{"cost": 1}, {"cost": 2}]});
        let got = paths(&record);
        assert_eq!(got.len(), 1);
        assert!(got.contains("lines[*].cost"));
    }

    #[test]
    fn test_array_sampling_cap() {
        let record = json!({"vals": [1, 2, 3, 4, 5, 6]});
        let walked = walk_record(&record, DEPTH, SAMPLE);
        // Only the first 3 elements are walked, all onto the same path.
        assert_eq!(walked.leaves.len(), 3);
        assert!(walked.leaves.iter().all(|l| l.path == "vals[*]"));
    }

    #[test]
    fn test_empty_containers_are_leaves() {
        let record = json!({"tags": [], "meta": {}});
        let walked = walk_record(&record, DEPTH, SAMPLE);
        let mut by_path: Vec<(String, Value)> = walked
            .leaves
            .into_iter()
            .map(|l| (l.path, l.value))
            .collect();
        by_path.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(by_path, vec![
            ("meta".to_string(), json!({})),
            ("tags".to_string(), json!([])),
        ]);
    }

    #[test]
    fn test_depth_cap_truncates_branch() {
        let mut record = json!(1);
        for _ in 0..40 {
            record = json!({ "n": record });
        }
        let walked = walk_record(&record, DEPTH, SAMPLE);
        assert!(walked.leaves.is_empty());
        assert_eq!(walked.truncated_branches, 1);
    }

    #[test]
    fn test_depth_cap_keeps_shallow_siblings() {
        let mut deep = json!(1);
        for _ in 0..40 {
            deep = json!({ "n": deep });
        }
        let record = json!({"shallow": true, "deep": deep});
        let walked = walk_record(&record, DEPTH, SAMPLE);
        assert_eq!(walked.leaves.len(), 1);
        assert_eq!(walked.leaves[0].path, "shallow");
        assert_eq!(walked.truncated_branches, 1);
    }

    #[test]
    fn test_shape_determinism() {
        let a = json!({"a": {"b": [1, 2]}, "c": "x"});
        let b = json!({"a": {"b": ["y"]}, "c": 42});
        assert_eq!(paths(&a), paths(&b));
    }

    #[test]
    fn test_scalar_root() {
        let walked = walk_record(&json!(7), DEPTH, SAMPLE);
        assert_eq!(walked.leaves.len(), 1);
        assert_eq!(walked.leaves[0].path, "$");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("a.b.c"), Some("a.b".to_string()));
        assert_eq!(parent_path("lines[*].cost"), Some("lines[*]".to_string()));
        assert_eq!(parent_path("lines[*]"), Some("lines".to_string()));
        assert_eq!(parent_path("name"), None);
        assert!(is_nested("lines[*]"));
        assert!(!is_nested("name"));
    }
}
