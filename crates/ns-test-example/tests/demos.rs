use ns_test_example::{demo_dir, demo_names, testcase_path};

#[test]
fn every_demo_matches_its_testcase() {
    let names = demo_names();
    assert!(!names.is_empty(), "expected demos under demos/");

    let failures: Vec<String> = names
        .iter()
        .filter_map(|name| {
            ns_tool::assert_case(&demo_dir(name), &testcase_path(name))
                .err()
                .map(|error| format!("{}: {}", name, error))
        })
        .collect();
    assert!(failures.is_empty(), "demo failures:\n{}", failures.join("\n"));
}
