//! Parser des messages Kyiv Digital : un objet JSON noyé dans du texte libre.
//!
//! ```text
//! OFF: {"power": false, "emergency": false, "time_to": 25, "group": "1.1", ...}
//! ON:  {"power": true,  "group": "6.1", ...}
//! ```

use crate::models::{AddressOutage, PowerState};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Champs retirés par défaut en plus de `group` (texte affiché, adresse)
pub const DEFAULT_STRIP_FIELDS: [&str; 2] = ["text", "address"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressOutageParser {
    excluded: BTreeSet<String>,
}

impl Default for AddressOutageParser {
    fn default() -> Self {
        Self::with_strip_fields(&DEFAULT_STRIP_FIELDS.map(String::from))
    }
}

impl AddressOutageParser {
    /// `group` est toujours retiré, il est déjà dans le topic
    pub fn with_strip_fields(fields: &[String]) -> Self {
        let mut excluded: BTreeSet<String> = fields.iter().cloned().collect();
        excluded.insert("group".to_string());
        Self { excluded }
    }

    pub fn excluded_fields(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }

    pub fn parse(&self, text: &str) -> Option<AddressOutage> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end <= start {
            return None;
        }

        let data: Map<String, Value> = match serde_json::from_str(&text[start..=end]) {
            Ok(Value::Object(map)) => map,
            _ => return None,
        };

        let group = group_code(data.get("group")?);
        let state = PowerState::from_power(data.get("power")?);

        let attributes = data
            .into_iter()
            .filter(|(key, _)| !self.excluded.contains(key))
            .collect();

        Some(AddressOutage { state, group, attributes })
    }
}

fn group_code(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
