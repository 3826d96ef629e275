//! Option value conversion, merging, and forgiving boolean parsing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flexible option value for daemon/wallet flags.
/// Supports bool, string, and number types for YAML flexibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean flag (true -> --flag, false -> omit)
    Bool(bool),
    /// String value (--flag=value)
    String(String),
    /// Numeric value (--flag=123)
    Number(i64),
}

/// Convert an option map to command-line arguments.
/// - Bool(true) -> --flag
/// - Bool(false) -> (omitted)
/// - String(s) -> --flag=s
/// - Number(n) -> --flag=n
pub fn options_to_args(options: &BTreeMap<String, OptionValue>) -> Vec<String> {
    options
        .iter()
        .filter_map(|(key, value)| match value {
            OptionValue::Bool(true) => Some(format!("--{}", key)),
            OptionValue::Bool(false) => None,
            OptionValue::String(s) => Some(format!("--{}={}", key, s)),
            OptionValue::Number(n) => Some(format!("--{}={}", key, n)),
        })
        .collect()
}

/// Merge two option maps, with overrides taking precedence over defaults.
pub fn merge_options(
    defaults: Option<&BTreeMap<String, OptionValue>>,
    overrides: Option<&BTreeMap<String, OptionValue>>,
) -> BTreeMap<String, OptionValue> {
    let mut merged = BTreeMap::new();

    if let Some(defs) = defaults {
        for (k, v) in defs {
            merged.insert(k.clone(), v.clone());
        }
    }

    if let Some(ovrs) = overrides {
        for (k, v) in ovrs {
            merged.insert(k.clone(), v.clone());
        }
    }

    merged
}

/// The one boolean parser for human-entered attribute values.
///
/// Accepts `true/false`, `1/0`, `yes/no`, `on/off` case-insensitively.
/// Anything else, including the empty string, is `false`. Every call site
/// that interprets a string attribute as a flag goes through here.
pub fn parse_flexible_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_literals() {
        for v in ["true", "TRUE", "True", "1", "yes", "YES", "on", "On", " true "] {
            assert!(parse_flexible_bool(v), "{} should parse true", v);
        }
    }

    #[test]
    fn test_falsy_literals() {
        for v in ["false", "FALSE", "0", "no", "NO", "off", "Off"] {
            assert!(!parse_flexible_bool(v), "{} should parse false", v);
        }
    }

    #[test]
    fn test_unrecognized_is_false() {
        for v in ["", "maybe", "2", "enabled", "null"] {
            assert!(!parse_flexible_bool(v), "{} should parse false", v);
        }
    }

    #[test]
    fn test_options_to_args() {
        let mut opts = BTreeMap::new();
        opts.insert("no-zmq".to_string(), OptionValue::Bool(true));
        opts.insert("offline".to_string(), OptionValue::Bool(false));
        opts.insert("log-level".to_string(), OptionValue::Number(1));
        opts.insert("db-sync-mode".to_string(), OptionValue::String("safe".to_string()));

        let args = options_to_args(&opts);
        assert_eq!(
            args,
            vec!["--db-sync-mode=safe", "--log-level=1", "--no-zmq"]
        );
    }

    #[test]
    fn test_merge_options_override_wins() {
        let mut defaults = BTreeMap::new();
        defaults.insert("log-level".to_string(), OptionValue::Number(1));
        defaults.insert("no-zmq".to_string(), OptionValue::Bool(true));
        let mut overrides = BTreeMap::new();
        overrides.insert("log-level".to_string(), OptionValue::Number(4));

        let merged = merge_options(Some(&defaults), Some(&overrides));
        assert_eq!(merged.get("log-level"), Some(&OptionValue::Number(4)));
        assert_eq!(merged.get("no-zmq"), Some(&OptionValue::Bool(true)));
    }
}
