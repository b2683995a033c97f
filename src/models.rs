//! Core data models for the field discovery engine.
//!
//! These types represent discovered field paths, discovery run logs, and
//! extractor suggestions as they flow through the walk → aggregate → merge →
//! score → review pipeline.

use serde::Serialize;
use serde_json::Value;

/// Structural type of a leaf value observed at a field path.
///
/// Stored in SQLite as a bitmask (see [`TypeSet`]) so that merging the type
/// sets of concurrent discovery runs is a single `|` in the upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Null,
    Array,
    Object,
}

impl TypeTag {
    /// Classify a JSON value. Arrays and objects only reach this point when
    /// empty — non-empty containers are recursed into by the walker.
    pub fn of(value: &Value) -> TypeTag {
        match value {
            Value::String(_) => TypeTag::String,
            Value::Number(_) => TypeTag::Number,
            Value::Bool(_) => TypeTag::Boolean,
            Value::Null => TypeTag::Null,
            Value::Array(_) => TypeTag::Array,
            Value::Object(_) => TypeTag::Object,
        }
    }

    pub fn bit(self) -> i64 {
        match self {
            TypeTag::String => 1,
            TypeTag::Number => 2,
            TypeTag::Boolean => 4,
            TypeTag::Null => 8,
            TypeTag::Array => 16,
            TypeTag::Object => 32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
            TypeTag::Null => "null",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
        }
    }

    const ALL: [TypeTag; 6] = [
        TypeTag::String,
        TypeTag::Number,
        TypeTag::Boolean,
        TypeTag::Null,
        TypeTag::Array,
        TypeTag::Object,
    ];
}

/// Set of [`TypeTag`]s backed by a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeSet(i64);

impl TypeSet {
    pub fn insert(&mut self, tag: TypeTag) {
        self.0 |= tag.bit();
    }

    pub fn contains(self, tag: TypeTag) -> bool {
        self.0 & tag.bit() != 0
    }

    pub fn bits(self) -> i64 {
        self.0
    }

    /// Reconstruct a set from stored bits. Unknown bits are masked off.
    pub fn from_bits(bits: i64) -> TypeSet {
        TypeSet(bits & 0x3f)
    }

    /// Tags present in the set, in declaration order.
    pub fn tags(self) -> Vec<TypeTag> {
        TypeTag::ALL
            .iter()
            .copied()
            .filter(|t| self.contains(*t))
            .collect()
    }
}

/// Review status of a discovered field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    Discovered,
    Reviewed,
    Approved,
    Ignored,
}

impl FieldStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldStatus::Discovered => "discovered",
            FieldStatus::Reviewed => "reviewed",
            FieldStatus::Approved => "approved",
            FieldStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<FieldStatus> {
        match s {
            "discovered" => Some(FieldStatus::Discovered),
            "reviewed" => Some(FieldStatus::Reviewed),
            "approved" => Some(FieldStatus::Approved),
            "ignored" => Some(FieldStatus::Ignored),
            _ => None,
        }
    }
}

/// Review status of an extractor suggestion. `Pending` is the only
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
    Modified,
}

impl SuggestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Approved => "approved",
            SuggestionStatus::Rejected => "rejected",
            SuggestionStatus::Modified => "modified",
        }
    }

    pub fn parse(s: &str) -> Option<SuggestionStatus> {
        match s {
            "pending" => Some(SuggestionStatus::Pending),
            "approved" => Some(SuggestionStatus::Approved),
            "rejected" => Some(SuggestionStatus::Rejected),
            "modified" => Some(SuggestionStatus::Modified),
            _ => None,
        }
    }
}

/// How an extractor aggregates values pulled from matching records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Sum,
    Avg,
    First,
    Last,
    Concat,
    Unique,
    Count,
}

impl AggregationType {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Avg => "avg",
            AggregationType::First => "first",
            AggregationType::Last => "last",
            AggregationType::Concat => "concat",
            AggregationType::Unique => "unique",
            AggregationType::Count => "count",
        }
    }

    pub fn parse(s: &str) -> Option<AggregationType> {
        match s {
            "sum" => Some(AggregationType::Sum),
            "avg" => Some(AggregationType::Avg),
            "first" => Some(AggregationType::First),
            "last" => Some(AggregationType::Last),
            "concat" => Some(AggregationType::Concat),
            "unique" => Some(AggregationType::Unique),
            "count" => Some(AggregationType::Count),
            _ => None,
        }
    }
}

/// One row of the persistent field catalog: a distinct field path and its
/// cumulative statistics across all discovery runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    pub path: String,
    pub data_types: Vec<TypeTag>,
    pub samples: Vec<Value>,
    /// Records containing this path, summed over merged runs.
    pub match_count: i64,
    /// Records ingested in those runs; denominator of `frequency`.
    pub record_count: i64,
    pub frequency: f64,
    pub is_nested: bool,
    pub parent_path: Option<String>,
    /// Number of runs in which the path appeared at or above the
    /// persistence threshold.
    pub occurrence_count: i64,
    pub status: FieldStatus,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
}

/// Immutable log of one discovery run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRunLog {
    pub id: String,
    pub source_id: String,
    pub company_name: Option<String>,
    pub record_count: i64,
    pub fields_discovered: i64,
    pub new_fields: i64,
    pub updated_fields: i64,
    pub duration_ms: i64,
    pub summary: Value,
    pub created_at: i64,
}

/// A proposed extractor awaiting human review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorSuggestion {
    pub id: String,
    pub field_path: String,
    pub suggested_name: String,
    pub aggregation_type: AggregationType,
    /// Either the string `"always"` or a predicate object.
    pub conditions: Value,
    pub description: String,
    pub confidence: f64,
    pub is_new: bool,
    pub existing_match: Option<String>,
    pub status: SuggestionStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<i64>,
    pub source_run_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One field as submitted to the scoring collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSubmission {
    pub path: String,
    pub data_types: Vec<TypeTag>,
    pub frequency: f64,
    /// At most 3 sample values per field on the wire.
    pub samples: Vec<Value>,
    pub occurrence_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typeset_union_is_bitwise_or() {
        let mut a = TypeSet::default();
        a.insert(TypeTag::Number);
        let mut b = TypeSet::default();
        b.insert(TypeTag::String);
        let merged = TypeSet::from_bits(a.bits() | b.bits());
        assert!(merged.contains(TypeTag::Number));
        assert!(merged.contains(TypeTag::String));
        assert_eq!(merged.tags(), vec![TypeTag::String, TypeTag::Number]);
    }

    #[test]
    fn test_typeset_from_bits_masks_unknown() {
        let set = TypeSet::from_bits(0xff);
        assert_eq!(set.bits(), 0x3f);
    }

    #[test]
    fn test_status_roundtrip() {
        for s in ["discovered", "reviewed", "approved", "ignored"] {
            assert_eq!(FieldStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(FieldStatus::parse("bogus").is_none());
        for s in ["pending", "approved", "rejected", "modified"] {
            assert_eq!(SuggestionStatus::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_aggregation_parse() {
        assert_eq!(
            AggregationType::parse("unique"),
            Some(AggregationType::Unique)
        );
        assert!(AggregationType::parse("median").is_none());
    }
}
