//! Warns about unknown fields in the settings file

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate settings JSON and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    for path in find_unknown_keys(&value, &expected_settings_keys(), "") {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Paths like "process.stopTimeout" for keys not in `expected`.
fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(nested) = expected.nested.get(key.as_str()) {
            unknowns.extend(find_unknown_keys(child, nested, &path));
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }
}

fn expected_settings_keys() -> ExpectedKeys {
    let process_keys = ExpectedKeys::new(&["startGraceMs", "stopRetryMs", "stopTimeoutMs"]);

    ExpectedKeys::new(&[
        "deviceSetDir",
        "serverExecutable",
        "serverWorkingDir",
        "listenAddress",
        "allowRemoteWrite",
        "allowOverwrite",
        "logLevel",
    ])
    .with_nested("process", process_keys)
}
