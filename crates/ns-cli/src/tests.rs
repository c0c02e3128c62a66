use super::*;
use crate::cli_test_support::*;
use crate::compile::module_output_path;
use crate::dump::render_dump;
use crate::player::play;
use ns_api::create_vm;
use ns_core::NsxModule;
use std::fs;
use std::path::Path;

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[test]
fn module_output_path_swaps_extension_and_keeps_folders() {
    let out = Path::new("/out");
    assert_eq!(
        module_output_path(out, "scenes/intro.nss"),
        Path::new("/out/scenes/intro.nsx")
    );
}

#[test]
fn compile_writes_one_module_per_source() {
    let root = scripts_dir(
        "compile",
        &[
            ("main.nss", "#include \"lib/util.nss\"\nchapter main { Helper(); }"),
            ("lib/util.nss", "function Helper() { Wait(10); }"),
        ],
    );
    let out = temp_path("compile-out");

    let code = run_cli_from_args([
        "nss",
        "compile",
        "--scripts-dir",
        &path_arg(&root),
        "--out-dir",
        &path_arg(&out),
    ]);
    assert_eq!(code, 0);

    let main = NsxModule::open(&out.join("main.nsx"), "main.nss").expect("main module");
    assert_eq!(main.imports(), ["lib/util.nss".to_string()]);
    assert!(main.find_subroutine("main").is_some());
    let util = NsxModule::open(&out.join("lib").join("util.nsx"), "lib/util.nss")
        .expect("util module");
    assert!(util.find_subroutine("Helper").is_some());
}

#[test]
fn compile_reports_errors_with_exit_code() {
    let root = scripts_dir("compile-broken", &[("main.nss", "chapter main { $a = ; }")]);
    let out = temp_path("compile-broken-out");
    let code = run_cli_from_args([
        "nss",
        "compile",
        "--scripts-dir",
        &path_arg(&root),
        "--out-dir",
        &path_arg(&out),
    ]);
    assert_eq!(code, 1);
    assert!(!out.join("main.nsx").exists());
}

#[test]
fn dump_renders_text_and_json() {
    let compiled = ns_compiler::compile_source("main.nss", "chapter main { Wait(250); }")
        .expect("compiles");
    let module = NsxModule::from_bytes(compiled.name, compiled.bytes).expect("loads");

    let text = render_dump(&module, false).expect("text dump");
    assert!(text.starts_with("module main.nss"));
    assert!(text.contains("chapter main()"));

    let json = render_dump(&module, true).expect("json dump");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(value["name"], "main.nss");
    assert_eq!(value["subroutines"][0]["kind"], "chapter");
    assert_eq!(value["subroutines"][0]["name"], "main");
    assert!(value["subroutines"][0]["code"]
        .as_array()
        .is_some_and(|code| !code.is_empty()));
}

#[test]
fn dump_of_missing_file_fails() {
    let missing = temp_path("missing.nsx");
    let code = run_cli_from_args(["nss", "dump", "--module", &path_arg(&missing)]);
    assert_eq!(code, 1);
}

#[test]
fn play_runs_dialogue_and_select_headlessly() {
    let sources = [(
        "main.nss".to_string(),
        "chapter main {\n<PRE box00>\n[text001]\nHello\n</PRE>\nWaitKey();\nselect { case left: $way = 1; case right: $way = 2; }\nWait(100);\n}"
            .to_string(),
    )]
    .into_iter()
    .collect();
    let mut created = create_vm(ns_api::CreateVmOptions {
        sources,
        ..ns_api::CreateVmOptions::default()
    })
    .expect("vm");
    let mut host = HeadlessHost::default();

    let report = play(&mut created.vm, &mut host, 100, 50).expect("play");
    assert!(report.finished);
    assert_eq!(
        report.lines,
        vec![
            "DIALOGUE:main:text001".to_string(),
            "TEXT_JSON:\"Hello\"".to_string(),
            "SELECT:main".to_string(),
            "CHOICE:main:left".to_string(),
        ]
    );
    assert!(report.ticks >= 3);
}

#[test]
fn play_stops_at_the_tick_limit() {
    let sources = [(
        "main.nss".to_string(),
        "chapter main { Wait(10000); }".to_string(),
    )]
    .into_iter()
    .collect();
    let mut created = create_vm(ns_api::CreateVmOptions {
        sources,
        ..ns_api::CreateVmOptions::default()
    })
    .expect("vm");
    let mut host = HeadlessHost::default();
    let report = play(&mut created.vm, &mut host, 5, 16).expect("play");
    assert!(!report.finished);
    assert_eq!(report.ticks, 5);
}

#[test]
fn play_reports_thread_errors() {
    let sources = [("main.nss".to_string(), "chapter main { Missing(); }".to_string())]
        .into_iter()
        .collect();
    let mut created = create_vm(ns_api::CreateVmOptions {
        sources,
        ..ns_api::CreateVmOptions::default()
    })
    .expect("vm");
    assert!(!created.diagnostics.is_empty());
    let mut host = HeadlessHost::default();
    let report = play(&mut created.vm, &mut host, 10, 16).expect("play");
    assert!(report.finished);
    assert!(report.lines[0].starts_with("THREAD_ERROR:main:VM_TRAP"));
}

#[test]
fn run_command_uses_scripts_dir() {
    let root = scripts_dir("run", &[("main.nss", "chapter main { $x = 1; }")]);
    let code = run_cli_from_args(["nss", "run", "--scripts-dir", &path_arg(&root), "--ticks", "3"]);
    assert_eq!(code, 0);
    let missing = temp_path("run-missing");
    let code = run_cli_from_args(["nss", "run", "--scripts-dir", &path_arg(&missing)]);
    assert_eq!(code, 1);
    fs::remove_dir_all(root).expect("cleanup");
}
