use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::{Document, UniqueIndex};

/// Collection holding registered entries
pub const ENTRIES: &str = "entries";

/// Field that must be unique across `entries`
pub const DATA_STRING: &str = "dataString";

/// A registered entry as persisted in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    #[serde(rename = "dataString")]
    pub data_string: String,
    /// Persisted empty; kept for document shape compatibility
    #[serde(default)]
    pub date: String,
}

impl StoredEntry {
    pub fn new(data_string: impl Into<String>) -> Self {
        Self {
            data_string: data_string.into(),
            date: String::new(),
        }
    }

    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }

    /// Filter selecting entries with exactly this data string
    pub fn filter_by_data_string(data_string: &str) -> Document {
        let mut filter = Document::new();
        filter.insert(DATA_STRING.to_string(), Value::String(data_string.to_string()));
        filter
    }

    pub fn unique_indexes() -> Vec<UniqueIndex> {
        vec![UniqueIndex::new(ENTRIES, DATA_STRING)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_shape() {
        let doc = StoredEntry::new("abc").to_document();
        assert_eq!(Value::Object(doc), json!({"dataString": "abc", "date": ""}));
    }

    #[test]
    fn filter_only_names_data_string() {
        let filter = StoredEntry::filter_by_data_string("abc");
        assert_eq!(Value::Object(filter), json!({"dataString": "abc"}));
    }
}
