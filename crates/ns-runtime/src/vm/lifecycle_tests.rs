use super::*;
use crate::host::ResumeToken;
use crate::test_support::{test_module, vm_from_sources, TestHost};
use crate::thread::ThreadState;
use ns_core::ConstantValue;

#[test]
fn create_thread_reports_missing_module_and_entry() {
    let mut vm = vm_from_sources(&[("main.nss", "chapter main {}")]);
    let error = vm
        .create_thread("main", "other.nss", "main")
        .expect_err("module is not loaded");
    assert_eq!(error.code, "VM_MODULE_NOT_LOADED");
    let error = vm
        .create_thread("main", "main.nss", "Missing")
        .expect_err("entry does not exist");
    assert_eq!(error.code, "VM_ENTRY_NOT_FOUND");
    assert!(!vm.has_live_threads());
}

#[test]
fn wait_of_one_second_resumes_exactly_at_the_deadline() {
    let mut vm = vm_from_sources(&[("test.nss", "function Test() { Wait(1000); }")]);
    let mut host = TestHost::default();
    vm.create_thread("main", "test.nss", "Test")
        .expect("thread should start");

    assert!(vm.run(&mut host, 100).expect("first tick"));
    assert_eq!(
        vm.thread("main").expect("thread is live").state,
        ThreadState::SuspendedUntil(1000)
    );

    host.now = 999;
    assert!(!vm.run(&mut host, 100).expect("still waiting"));
    assert!(vm.has_live_threads());

    host.now = 1000;
    assert!(vm.run(&mut host, 100).expect("deadline reached"));
    assert!(!vm.has_live_threads());
    assert!(vm.take_errors().is_empty());
}

#[test]
fn terminate_while_suspended_drops_the_thread() {
    let mut vm = vm_from_sources(&[("test.nss", "function Test() { Wait(1000); $after = 1; }")]);
    let mut host = TestHost::default();
    vm.create_thread("main", "test.nss", "Test")
        .expect("thread should start");
    vm.run(&mut host, 100).expect("first tick");

    vm.terminate_thread("main").expect("thread exists");
    assert!(!vm.has_live_threads());
    assert_eq!(vm.live_thread_count(), 0);

    host.now = 5000;
    assert!(!vm.run(&mut host, 100).expect("nothing to run"));
    assert_eq!(host.var("$after"), ConstantValue::Null);
    assert_eq!(
        vm.terminate_thread("main").expect_err("already gone").code,
        "VM_THREAD_NOT_FOUND"
    );
}

#[test]
fn same_name_replaces_the_running_thread() {
    let mut vm = vm_from_sources(&[("main.nss", "chapter main { Wait(10); }")]);
    let first = vm.create_thread("a", "main.nss", "main").expect("first");
    let second = vm.create_thread("a", "main.nss", "main").expect("second");
    assert_ne!(first, second);
    assert_eq!(vm.live_thread_count(), 1);
    assert_eq!(vm.thread("a").expect("live").id, second);
}

#[test]
fn host_suspension_holds_a_thread_until_resumed() {
    let mut vm = vm_from_sources(&[("main.nss", "chapter main { $ran = true; }")]);
    let mut host = TestHost::default();
    vm.create_thread("main", "main.nss", "main").expect("thread");
    vm.suspend_thread("main").expect("thread exists");

    assert!(!vm.run(&mut host, 100).expect("held"));
    assert_eq!(host.var("$ran"), ConstantValue::Null);

    vm.resume_thread("main").expect("thread exists");
    assert!(vm.run(&mut host, 100).expect("released"));
    assert_eq!(host.var("$ran"), ConstantValue::Boolean(true));
}

#[test]
fn pending_asset_load_waits_for_its_token() {
    let mut vm = vm_from_sources(&[(
        "main.nss",
        "chapter main { CreateTexture(\"bg\", 1, 0, 0, \"cg/bg.png\"); $loaded = true; }",
    )]);
    let mut host = TestHost::with_pending_loads();
    vm.create_thread("main", "main.nss", "main").expect("thread");

    vm.run(&mut host, 100).expect("first tick");
    assert_eq!(
        vm.thread("main").expect("live").state,
        ThreadState::AwaitingHost(ResumeToken(1))
    );
    assert!(!vm.run(&mut host, 100).expect("still loading"));

    assert!(!vm.resume(ResumeToken(7)));
    assert!(vm.resume(ResumeToken(1)));
    vm.run(&mut host, 100).expect("loaded");
    assert_eq!(host.var("$loaded"), ConstantValue::Boolean(true));
    assert_eq!(host.log, vec!["texture bg 0 0 cg/bg.png".to_string()]);
}

#[test]
fn terminated_threads_drop_their_resume_token() {
    let mut vm = vm_from_sources(&[(
        "main.nss",
        "chapter main { CreateSound(\"voice\", Voice, \"v/001.ogg\"); }",
    )]);
    let mut host = TestHost::with_pending_loads();
    vm.create_thread("main", "main.nss", "main").expect("thread");
    vm.run(&mut host, 100).expect("first tick");
    vm.terminate_thread("main").expect("thread exists");
    assert!(!vm.resume(ResumeToken(1)));
}

#[test]
fn zero_budget_is_rejected() {
    let mut vm = Vm::new(VmOptions::default());
    let mut host = TestHost::default();
    let error = vm.run(&mut host, 0).expect_err("budget must be positive");
    assert_eq!(error.code, "VM_INVALID_BUDGET");
}

#[test]
fn hand_built_module_runs_to_completion_in_one_tick() {
    let mut vm = Vm::new(VmOptions::default());
    let module = vm.add_module(
        std::sync::Arc::try_unwrap(test_module()).expect("test module has one owner"),
    );
    assert_eq!(vm.module("test.nss").map(|loaded| loaded.name()), Some(module.name()));
    let mut host = TestHost::default();
    vm.create_thread("helper", "test.nss", "Helper").expect("thread");
    assert_eq!(vm.live_thread_count(), 1);
    assert!(vm.run_tick(&mut host).expect("tick"));
    assert!(!vm.has_live_threads());
}
