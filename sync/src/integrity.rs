//! Required-field checks over a loaded dataset

use csvsync_core::Record;

use crate::error::SyncError;
use crate::target::FieldRule;

/// First row/field pair that failed the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Zero-based index of the data row
    pub row: usize,
    pub field: String,
}

impl From<Violation> for SyncError {
    fn from(violation: Violation) -> Self {
        SyncError::Integrity {
            row: violation.row,
            field: violation.field,
        }
    }
}

/// True when every required field of every row is present and non-empty
pub fn validate(dataset: &[Record], schema: &[FieldRule]) -> bool {
    find_violation(dataset, schema).is_none()
}

/// Locate the first required field that is missing or empty.
///
/// Rows are checked in order and fields in schema order. Optional fields are
/// never inspected.
pub fn find_violation(dataset: &[Record], schema: &[FieldRule]) -> Option<Violation> {
    dataset.iter().enumerate().find_map(|(row, record)| {
        schema
            .iter()
            .filter(|rule| rule.required)
            .find(|rule| record.get(&rule.name).map_or(true, |value| value.is_empty()))
            .map(|rule| Violation {
                row,
                field: rule.name.clone(),
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn schema() -> Vec<FieldRule> {
        vec![FieldRule::required("id"), FieldRule::optional("note")]
    }

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[rstest]
    #[case::required_empty(&[("id", ""), ("note", "x")], false)]
    #[case::optional_empty(&[("id", "5"), ("note", "")], true)]
    #[case::optional_absent(&[("id", "5")], true)]
    #[case::required_absent(&[("note", "x")], false)]
    #[case::extra_columns(&[("id", "5"), ("note", "x"), ("other", "")], true)]
    fn test_single_row(#[case] pairs: &[(&str, &str)], #[case] expected: bool) {
        assert_eq!(validate(&[row(pairs)], &schema()), expected);
    }

    #[test]
    fn test_empty_dataset_is_valid() {
        assert!(validate(&[], &schema()));
    }

    #[test]
    fn test_whitespace_counts_as_a_value() {
        assert!(validate(&[row(&[("id", " ")])], &schema()));
    }

    #[test]
    fn test_first_violation_is_reported() {
        let dataset = vec![
            row(&[("id", "1")]),
            row(&[("id", "2")]),
            row(&[("note", "missing id")]),
            row(&[("id", "")]),
        ];

        let violation = find_violation(&dataset, &schema()).unwrap();
        assert_eq!(violation, Violation { row: 2, field: "id".to_string() });

        let error = SyncError::from(violation);
        assert!(matches!(error, SyncError::Integrity { row: 2, .. }));
    }

    #[test]
    fn test_schema_order_decides_reported_field() {
        let schema = vec![FieldRule::required("cedula"), FieldRule::required("nombre")];
        let violation = find_violation(&[Record::new()], &schema).unwrap();
        assert_eq!(violation.field, "cedula");
    }
}
