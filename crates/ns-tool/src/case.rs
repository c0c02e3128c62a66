use std::collections::BTreeMap;

use ns_core::ConstantValue;
use serde::{Deserialize, Serialize};

pub const TESTCASE_SCHEMA_V1: &str = "ns-tool-case.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    #[serde(default = "default_entry_module")]
    pub entry_module: String,
    /// Subroutine to start; the module's first chapter when absent.
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_max_ticks")]
    pub max_ticks: usize,
    #[serde(default = "default_random_seed")]
    pub random_seed: u32,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub expected_events: Vec<ExpectedEvent>,
    /// Globals checked after the run ends.
    #[serde(default)]
    pub expected_globals: BTreeMap<String, ConstantValue>,
}

fn default_entry_module() -> String {
    "main.nss".to_string()
}

fn default_tick_ms() -> u64 {
    16
}

fn default_max_ticks() -> usize {
    5_000
}

fn default_random_seed() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TestAction {
    Choose { label: String },
    Advance,
}

impl TestAction {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Choose { .. } => "choose",
            Self::Advance => "advance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExpectedEvent {
    Dialogue {
        thread: String,
        name: String,
    },
    Text {
        thread: String,
        text: String,
    },
    /// A presentation request, rendered as one compact line.
    Host {
        call: String,
    },
    Select {
        thread: String,
        choices: Vec<String>,
    },
    WaitKey {
        thread: String,
    },
    Error {
        thread: String,
        code: String,
    },
    End,
}

#[cfg(test)]
mod case_tests {
    use super::*;

    #[test]
    fn test_action_kind_name_reports_expected_value() {
        assert_eq!(
            TestAction::Choose {
                label: "yes".to_string()
            }
            .kind_name(),
            "choose"
        );
        assert_eq!(TestAction::Advance.kind_name(), "advance");
    }

    #[test]
    fn testcase_deserialize_applies_defaults() {
        let parsed: TestCase = serde_json::from_str(
            r#"{
  "schemaVersion": "ns-tool-case.v1"
}"#,
        )
        .expect("testcase should deserialize");

        assert_eq!(parsed.schema_version, TESTCASE_SCHEMA_V1);
        assert_eq!(parsed.entry_module, "main.nss");
        assert_eq!(parsed.entry, None);
        assert_eq!(parsed.tick_ms, 16);
        assert_eq!(parsed.max_ticks, 5_000);
        assert_eq!(parsed.random_seed, 1);
        assert!(parsed.actions.is_empty());
        assert!(parsed.expected_events.is_empty());
        assert!(parsed.expected_globals.is_empty());
    }

    #[test]
    fn events_actions_and_globals_deserialize() {
        let parsed: TestCase = serde_json::from_str(
            r#"{
  "schemaVersion": "ns-tool-case.v1",
  "actions": [{"kind":"advance"},{"kind":"choose","label":"left"}],
  "expectedEvents": [
    {"kind":"dialogue","thread":"main","name":"text001"},
    {"kind":"text","thread":"main","text":"Hi"},
    {"kind":"host","call":"delete bg"},
    {"kind":"select","thread":"main","choices":["left","right"]},
    {"kind":"waitKey","thread":"main"},
    {"kind":"error","thread":"main","code":"VM_TRAP"},
    {"kind":"end"}
  ],
  "expectedGlobals": {"$way": {"kind":"numeric","value":1.0}}
}"#,
        )
        .expect("testcase should deserialize");

        assert_eq!(parsed.actions[0], TestAction::Advance);
        assert_eq!(parsed.expected_events.len(), 7);
        assert!(matches!(parsed.expected_events[4], ExpectedEvent::WaitKey { .. }));
        assert_eq!(
            parsed.expected_globals.get("$way"),
            Some(&ConstantValue::Numeric(1.0))
        );
    }
}
