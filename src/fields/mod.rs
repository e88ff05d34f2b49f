//! Field collection, validation, and formatting.

pub mod format;
pub mod validators;

pub use validators::{FieldError, FieldValidator};

use serde::{Deserialize, Serialize};

/// Ordered field-name → value mapping accumulated during a conversation.
///
/// Insertion order is preserved so that summaries and downstream records
/// list fields in the order the user entered them. Setting an existing
/// name overwrites the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBag {
    entries: Vec<(String, String)>,
}

impl FieldBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a validated value, replacing an existing entry in place.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Field names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render as a JSON object for the downstream create call.
    pub fn to_record(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in self.iter() {
            map.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_preserves_insertion_order() {
        let mut bag = FieldBag::new();
        bag.set("full_name", "Tendai Moyo");
        bag.set("national_id", "63-123456-A-42");
        bag.set("phone", "+263771234567");

        assert_eq!(bag.names(), vec!["full_name", "national_id", "phone"]);
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut bag = FieldBag::new();
        bag.set("full_name", "Tendai Moyo");
        bag.set("phone", "+263771234567");
        bag.set("full_name", "Tendai M. Moyo");

        assert_eq!(bag.get("full_name"), Some("Tendai M. Moyo"));
        assert_eq!(bag.names(), vec!["full_name", "phone"]);
    }

    #[test]
    fn to_record_contains_every_field() {
        let mut bag = FieldBag::new();
        bag.set("company_name", "Acme Ltd");
        bag.set("share_capital", "1000");

        let record = bag.to_record();
        assert_eq!(record["company_name"], "Acme Ltd");
        assert_eq!(record["share_capital"], "1000");
        assert_eq!(record.as_object().unwrap().len(), 2);
    }

    #[test]
    fn clear_empties_the_bag() {
        let mut bag = FieldBag::new();
        bag.set("a", "1");
        bag.clear();
        assert!(bag.is_empty());
        assert_eq!(bag.get("a"), None);
    }
}
