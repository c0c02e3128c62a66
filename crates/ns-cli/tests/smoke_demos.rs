use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn demos_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("demos")
}

fn demo_directories() -> Vec<PathBuf> {
    let mut directories = fs::read_dir(demos_root())
        .expect("demos root must exist")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    directories.sort();
    directories
}

#[test]
fn run_finishes_every_demo() {
    let bin = env!("CARGO_BIN_EXE_nss");
    let directories = demo_directories();
    assert!(!directories.is_empty(), "expected demos");

    for directory in directories {
        let output = Command::new(bin)
            .arg("run")
            .arg("--scripts-dir")
            .arg(&directory)
            .arg("--ticks")
            .arg("5000")
            .output()
            .expect("cli should execute");

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            panic!(
                "demo {} failed\nstdout:\n{}\nstderr:\n{}",
                directory.display(),
                stdout,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        assert!(
            stdout.contains("RESULT:OK"),
            "stdout missing RESULT:OK for {}",
            directory.display()
        );
        assert!(
            stdout.contains("EVENT:END"),
            "demo {} did not finish",
            directory.display()
        );
    }
}

#[test]
fn compile_then_dump_a_multi_module_demo() {
    let bin = env!("CARGO_BIN_EXE_nss");
    let out_dir = std::env::temp_dir().join(format!("nss-smoke-{}", std::process::id()));

    let output = Command::new(bin)
        .arg("compile")
        .arg("--scripts-dir")
        .arg(demos_root().join("06-modules"))
        .arg("--out-dir")
        .arg(&out_dir)
        .output()
        .expect("cli should execute");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stdout));
    assert!(out_dir.join("scenes").join("intro.nsx").is_file());
    assert!(out_dir.join("epilogue.nsx").is_file());

    let output = Command::new(bin)
        .arg("dump")
        .arg("--module")
        .arg(out_dir.join("main.nsx"))
        .arg("--json")
        .output()
        .expect("cli should execute");
    assert!(output.status.success());
    let dump: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("dump should be json");
    let imports = dump["imports"].as_array().expect("imports array");
    assert!(imports.iter().any(|name| name == "scenes/intro.nss"));
    assert!(imports.iter().any(|name| name == "epilogue.nss"));

    let output = Command::new(bin)
        .arg("dump")
        .arg("--module")
        .arg(out_dir.join("main.nsx"))
        .output()
        .expect("cli should execute");
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("chapter main()"));
    assert!(text.contains("CallFar"));
}
