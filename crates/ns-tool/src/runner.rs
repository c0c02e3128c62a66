use std::collections::BTreeMap;
use std::path::Path;

use ns_api::{create_vm, CreateVmOptions};
use ns_core::ConstantValue;
use ns_runtime::{ThreadState, VmOptions};
use tracing::debug;

use crate::source::{read_sources_from_dir, read_test_case};
use crate::{ExpectedEvent, NsToolError, RecordingHost, TestAction, TestCase};

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub observed_events: Vec<ExpectedEvent>,
    pub consumed_actions: usize,
    pub ticks: usize,
    pub globals: BTreeMap<String, ConstantValue>,
}

fn next_action<'a>(
    case: &'a TestCase,
    action_index: &mut usize,
    event_index: usize,
    expected_action_kind: &str,
) -> Result<&'a TestAction, NsToolError> {
    let action = case
        .actions
        .get(*action_index)
        .ok_or_else(|| NsToolError::MissingAction {
            event_index,
            expected_action_kind: expected_action_kind.to_string(),
        })?;
    if action.kind_name() != expected_action_kind {
        return Err(NsToolError::ActionKindMismatch {
            event_index,
            expected_action_kind: expected_action_kind.to_string(),
            actual_action_kind: action.kind_name().to_string(),
        });
    }
    *action_index += 1;
    Ok(action)
}

/// Runs the project in `demo_dir` tick by tick, answering every `select` and
/// every `WaitKey` with the next scripted action.
pub fn run_case(demo_dir: &Path, case: &TestCase) -> Result<RunReport, NsToolError> {
    let sources = read_sources_from_dir(demo_dir)?;
    let mut created = create_vm(CreateVmOptions {
        sources,
        vm: VmOptions {
            random_seed: Some(case.random_seed),
            ..VmOptions::default()
        },
        entry_module: Some(case.entry_module.clone()),
        entry: case.entry.clone(),
        ..CreateVmOptions::default()
    })?;
    let vm = &mut created.vm;
    let mut host = RecordingHost::default();
    let mut action_index = 0usize;

    for tick in 1..=case.max_ticks {
        vm.run_tick(&mut host)?;
        host.input.advance = false;

        for failure in vm.take_errors() {
            host.events.push(ExpectedEvent::Error {
                thread: failure.thread,
                code: failure.error.code,
            });
        }

        for (thread, choices) in host.take_offers() {
            host.events.push(ExpectedEvent::Select {
                thread: thread.clone(),
                choices: choices.clone(),
            });
            let event_index = host.events.len() - 1;
            if let TestAction::Choose { label } =
                next_action(case, &mut action_index, event_index, "choose")?
            {
                if !choices.contains(label) {
                    return Err(NsToolError::UnknownChoice {
                        event_index,
                        label: label.clone(),
                        offered: choices,
                    });
                }
                host.choose(&thread, label);
            }
        }

        let waiting: Vec<String> = vm
            .threads()
            .filter(|thread| matches!(thread.state, ThreadState::SuspendedForInput { .. }))
            .map(|thread| thread.name.clone())
            .collect();
        if !waiting.is_empty() {
            for thread in waiting {
                host.events.push(ExpectedEvent::WaitKey { thread });
            }
            let event_index = host.events.len() - 1;
            next_action(case, &mut action_index, event_index, "advance")?;
            host.input.advance = true;
        }

        if !vm.has_live_threads() {
            host.events.push(ExpectedEvent::End);
            if action_index != case.actions.len() {
                return Err(NsToolError::UnusedActions {
                    used: action_index,
                    total: case.actions.len(),
                });
            }
            debug!(ticks = tick, events = host.events.len(), "case finished");
            return Ok(RunReport {
                observed_events: host.events,
                consumed_actions: action_index,
                ticks: tick,
                globals: host.globals,
            });
        }
        host.now += case.tick_ms;
    }

    Err(NsToolError::GuardExceeded {
        max_ticks: case.max_ticks,
    })
}

pub fn assert_case(demo_dir: &Path, case_path: &Path) -> Result<(), NsToolError> {
    let case = read_test_case(case_path)?;
    let report = run_case(demo_dir, &case)?;

    if report.observed_events.len() != case.expected_events.len() {
        let observed = serde_json::to_string_pretty(&report.observed_events)
            .map_err(NsToolError::EventSerialize)?;
        return Err(NsToolError::EventCountMismatch {
            expected: case.expected_events.len(),
            actual: report.observed_events.len(),
            observed,
        });
    }

    for (index, (expected, actual)) in case
        .expected_events
        .iter()
        .zip(report.observed_events.iter())
        .enumerate()
    {
        if expected != actual {
            let expected = serde_json::to_string(expected).map_err(NsToolError::EventSerialize)?;
            let actual = serde_json::to_string(actual).map_err(NsToolError::EventSerialize)?;
            return Err(NsToolError::EventMismatch {
                index,
                expected,
                actual,
            });
        }
    }

    for (name, expected) in &case.expected_globals {
        let actual = report
            .globals
            .get(name)
            .cloned()
            .unwrap_or(ConstantValue::Null);
        if *expected != actual {
            return Err(NsToolError::GlobalMismatch {
                name: name.clone(),
                expected: serde_json::to_string(expected).map_err(NsToolError::EventSerialize)?,
                actual: serde_json::to_string(&actual).map_err(NsToolError::EventSerialize)?,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod runner_tests {
    use super::*;
    use crate::tool_test_support::{temp_dir, write_file};

    fn case(actions: Vec<TestAction>, expected_events: Vec<ExpectedEvent>) -> TestCase {
        serde_json::from_value::<TestCase>(serde_json::json!({
            "schemaVersion": crate::TESTCASE_SCHEMA_V1,
        }))
        .map(|base| TestCase {
            actions,
            expected_events,
            ..base
        })
        .expect("base case")
    }

    fn text(value: &str) -> ExpectedEvent {
        ExpectedEvent::Text {
            thread: "main".to_string(),
            text: value.to_string(),
        }
    }

    #[test]
    fn run_case_records_dialogue_and_host_calls() {
        let root = temp_dir("dialogue");
        write_file(
            &root.join("main.nss"),
            "chapter main {\nCreateColor(\"bg\", 0, 0, 0, 800, 600, Black);\n<PRE box00>\n[text001]\nHello\n</PRE>\nDelete(\"bg\");\n}",
        );

        let report = run_case(&root, &case(Vec::new(), Vec::new())).expect("run should pass");
        assert_eq!(
            report.observed_events,
            vec![
                ExpectedEvent::Host {
                    call: "color bg 000000ff".to_string()
                },
                ExpectedEvent::Dialogue {
                    thread: "main".to_string(),
                    name: "text001".to_string()
                },
                text("Hello"),
                ExpectedEvent::Host {
                    call: "delete bg".to_string()
                },
                ExpectedEvent::End,
            ]
        );
        assert_eq!(report.ticks, 1);
    }

    #[test]
    fn run_case_consumes_choose_and_advance_actions() {
        let root = temp_dir("actions");
        write_file(
            &root.join("main.nss"),
            "chapter main { WaitKey(); select { case left: $way = 1; case right: $way = 2; } }",
        );

        let report = run_case(
            &root,
            &case(
                vec![
                    TestAction::Advance,
                    TestAction::Choose {
                        label: "right".to_string(),
                    },
                ],
                Vec::new(),
            ),
        )
        .expect("run should pass");
        assert_eq!(report.consumed_actions, 2);
        assert_eq!(
            report.observed_events,
            vec![
                ExpectedEvent::WaitKey {
                    thread: "main".to_string()
                },
                ExpectedEvent::Select {
                    thread: "main".to_string(),
                    choices: vec!["left".to_string(), "right".to_string()]
                },
                ExpectedEvent::End,
            ]
        );
        assert_eq!(report.globals.get("$way"), Some(&ConstantValue::Numeric(2.0)));
    }

    #[test]
    fn run_case_reports_action_problems() {
        let root = temp_dir("action-errors");
        write_file(
            &root.join("main.nss"),
            "chapter main { select { case a: $x = 1; } }",
        );

        let error = run_case(&root, &case(Vec::new(), Vec::new())).expect_err("missing");
        assert!(matches!(error, NsToolError::MissingAction { .. }));

        let error =
            run_case(&root, &case(vec![TestAction::Advance], Vec::new())).expect_err("kind");
        assert!(matches!(error, NsToolError::ActionKindMismatch { .. }));

        let error = run_case(
            &root,
            &case(
                vec![TestAction::Choose {
                    label: "b".to_string(),
                }],
                Vec::new(),
            ),
        )
        .expect_err("unknown label");
        assert!(matches!(error, NsToolError::UnknownChoice { .. }));

        let plain = temp_dir("unused");
        write_file(&plain.join("main.nss"), "chapter main {}");
        let error =
            run_case(&plain, &case(vec![TestAction::Advance], Vec::new())).expect_err("unused");
        assert!(matches!(error, NsToolError::UnusedActions { used: 0, total: 1 }));
    }

    #[test]
    fn run_case_guards_against_endless_scripts() {
        let root = temp_dir("guard");
        write_file(&root.join("main.nss"), "chapter main { while (true) { Wait(10); } }");
        let mut endless = case(Vec::new(), Vec::new());
        endless.max_ticks = 20;
        let error = run_case(&root, &endless).expect_err("guard");
        assert!(matches!(error, NsToolError::GuardExceeded { max_ticks: 20 }));
    }

    #[test]
    fn run_case_records_thread_errors() {
        let root = temp_dir("trap");
        write_file(&root.join("main.nss"), "chapter main { Nope(); }");
        let report = run_case(&root, &case(Vec::new(), Vec::new())).expect("run");
        assert_eq!(
            report.observed_events,
            vec![
                ExpectedEvent::Error {
                    thread: "main".to_string(),
                    code: "VM_TRAP".to_string()
                },
                ExpectedEvent::End,
            ]
        );
    }

    #[test]
    fn assert_case_compares_events_and_globals() {
        let root = temp_dir("assert");
        write_file(&root.join("main.nss"), "chapter main { $n = 2 + 3; }");
        let case_path = root.join("testcase.json");
        write_file(
            &case_path,
            r#"{
  "schemaVersion":"ns-tool-case.v1",
  "expectedEvents":[{"kind":"end"}],
  "expectedGlobals":{"$n":{"kind":"numeric","value":5.0}}
}"#,
        );
        assert_case(&root, &case_path).expect("assert should pass");

        write_file(
            &case_path,
            r#"{
  "schemaVersion":"ns-tool-case.v1",
  "expectedEvents":[{"kind":"end"}],
  "expectedGlobals":{"$n":{"kind":"numeric","value":6.0}}
}"#,
        );
        let error = assert_case(&root, &case_path).expect_err("global mismatch");
        assert!(matches!(error, NsToolError::GlobalMismatch { .. }));

        write_file(
            &case_path,
            r#"{"schemaVersion":"ns-tool-case.v1","expectedEvents":[]}"#,
        );
        let error = assert_case(&root, &case_path).expect_err("count mismatch");
        assert!(matches!(error, NsToolError::EventCountMismatch { .. }));
    }
}
