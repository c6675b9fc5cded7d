//! Gateway status vocabulary -> internal transaction status.
//!
//! The mapping is a lookup table, not branching: adding a second gateway is a
//! matter of loading another table. Lookups are exact and case-sensitive, and any
//! status missing from the table maps to `pending`, never to `paid`.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::TransactionStatus;

/// Built-in table for the current gateway.
pub const DEFAULT_STATUS_TABLE: &[(&str, TransactionStatus)] = &[
    ("PENDING", TransactionStatus::Pending),
    ("AWAITING_RISK_ANALYSIS", TransactionStatus::Pending),
    ("RECEIVED", TransactionStatus::Paid),
    ("CONFIRMED", TransactionStatus::Paid),
    ("RECEIVED_IN_CASH", TransactionStatus::Paid),
    ("DUNNING_RECEIVED", TransactionStatus::Paid),
    ("OVERDUE", TransactionStatus::Overdue),
    ("REFUNDED", TransactionStatus::Refunded),
    ("REFUND_REQUESTED", TransactionStatus::Refunded),
    ("CHARGEBACK_REQUESTED", TransactionStatus::Disputed),
    ("CHARGEBACK_DISPUTE", TransactionStatus::Disputed),
    ("AWAITING_CHARGEBACK_REVERSAL", TransactionStatus::Disputed),
    ("DUNNING_REQUESTED", TransactionStatus::Failed),
];

#[derive(Error, Debug)]
pub enum StatusMapError {
    #[error("Failed to read status map {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid status map: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Status map is empty")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct StatusMapper {
    table: HashMap<String, TransactionStatus>,
}

impl Default for StatusMapper {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_STATUS_TABLE.iter().copied())
    }
}

impl StatusMapper {
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, TransactionStatus)>,
    {
        Self {
            table: pairs
                .into_iter()
                .map(|(gateway, internal)| (gateway.to_string(), internal))
                .collect(),
        }
    }

    /// Parses a JSON object of `"GATEWAY_STATUS": "internal_status"` pairs.
    pub fn from_json(raw: &str) -> Result<Self, StatusMapError> {
        let table: HashMap<String, TransactionStatus> = serde_json::from_str(raw)?;
        if table.is_empty() {
            return Err(StatusMapError::Empty);
        }
        Ok(Self { table })
    }

    pub fn from_file(path: &Path) -> Result<Self, StatusMapError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StatusMapError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Table from `path` when given, otherwise the built-in one.
    pub fn load(path: Option<&Path>) -> Result<Self, StatusMapError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn map(&self, gateway_status: &str) -> TransactionStatus {
        self.table
            .get(gateway_status)
            .copied()
            .unwrap_or(TransactionStatus::Pending)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_table() {
        let mapper = StatusMapper::default();
        let expectations = [
            ("PENDING", TransactionStatus::Pending),
            ("AWAITING_RISK_ANALYSIS", TransactionStatus::Pending),
            ("RECEIVED", TransactionStatus::Paid),
            ("CONFIRMED", TransactionStatus::Paid),
            ("RECEIVED_IN_CASH", TransactionStatus::Paid),
            ("DUNNING_RECEIVED", TransactionStatus::Paid),
            ("OVERDUE", TransactionStatus::Overdue),
            ("REFUNDED", TransactionStatus::Refunded),
            ("REFUND_REQUESTED", TransactionStatus::Refunded),
            ("CHARGEBACK_REQUESTED", TransactionStatus::Disputed),
            ("CHARGEBACK_DISPUTE", TransactionStatus::Disputed),
            ("AWAITING_CHARGEBACK_REVERSAL", TransactionStatus::Disputed),
            ("DUNNING_REQUESTED", TransactionStatus::Failed),
        ];
        for (gateway, expected) in expectations {
            assert_eq!(mapper.map(gateway), expected, "{gateway}");
        }
        assert_eq!(mapper.len(), expectations.len());
    }

    #[test]
    fn test_unknown_status_is_pending() {
        let mapper = StatusMapper::default();
        for input in ["", "confirmed", "PAID", "RECEIVED ", "💸", "DELETED"] {
            assert_eq!(mapper.map(input), TransactionStatus::Pending, "{input:?}");
        }
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let mapper = StatusMapper::default();
        let first: Vec<_> = DEFAULT_STATUS_TABLE.iter().map(|(s, _)| mapper.map(s)).collect();
        let second: Vec<_> = DEFAULT_STATUS_TABLE.iter().map(|(s, _)| mapper.map(s)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"settled": "paid", "late": "overdue"}}"#).unwrap();

        let mapper = StatusMapper::load(Some(file.path())).unwrap();
        assert_eq!(mapper.map("settled"), TransactionStatus::Paid);
        assert_eq!(mapper.map("late"), TransactionStatus::Overdue);
        assert_eq!(mapper.map("CONFIRMED"), TransactionStatus::Pending);
    }

    #[test]
    fn test_rejects_unknown_internal_status() {
        let result = StatusMapper::from_json(r#"{"CONFIRMED": "settled"}"#);
        assert!(matches!(result, Err(StatusMapError::Parse(_))));
    }

    #[test]
    fn test_rejects_empty_table() {
        assert!(matches!(StatusMapper::from_json("{}"), Err(StatusMapError::Empty)));
    }

    #[test]
    fn test_missing_file() {
        let result = StatusMapper::from_file(Path::new("/nonexistent/status-map.json"));
        assert!(matches!(result, Err(StatusMapError::Io { .. })));
    }
}
