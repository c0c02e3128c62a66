use ns_api::{create_vm, CreateVmOptions};
use ns_core::NsError;
use ns_runtime::{Vm, VmOptions};
use tracing::debug;

use crate::{load_sources, HeadlessHost, RunArgs};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlayReport {
    pub(crate) ticks: usize,
    pub(crate) finished: bool,
    pub(crate) lines: Vec<String>,
}

/// Drives `vm` for up to `max_ticks` ticks, advancing the host clock by
/// `tick_ms` after each one. Stops early once no thread is left.
pub(crate) fn play(
    vm: &mut Vm,
    host: &mut HeadlessHost,
    max_ticks: usize,
    tick_ms: u64,
) -> Result<PlayReport, NsError> {
    let mut lines = Vec::new();
    let mut ticks = 0;
    while ticks < max_ticks && vm.has_live_threads() {
        vm.run_tick(host)?;
        lines.extend(host.drain_output());
        for failure in vm.take_errors() {
            lines.push(format!("THREAD_ERROR:{}:{}", failure.thread, failure.error));
        }
        host.advance_clock(tick_ms);
        ticks += 1;
    }
    debug!(ticks, live = vm.live_thread_count(), "playback stopped");

    Ok(PlayReport {
        ticks,
        finished: !vm.has_live_threads(),
        lines,
    })
}

pub(crate) fn emit_report(report: &PlayReport) {
    println!("RESULT:OK");
    if report.finished {
        println!("EVENT:END");
    } else {
        println!("EVENT:TICK_LIMIT");
    }
    println!("TICKS:{}", report.ticks);
    for line in &report.lines {
        println!("{}", line);
    }
}

pub(crate) fn run_player(args: RunArgs) -> Result<i32, NsError> {
    let sources = load_sources(&args.scripts_dir)?;
    let mut created = create_vm(CreateVmOptions {
        sources,
        vm: VmOptions {
            random_seed: args.seed,
            ..VmOptions::default()
        },
        entry_module: args.module,
        entry: args.entry,
        ..CreateVmOptions::default()
    })?;
    for diagnostic in &created.diagnostics {
        println!("DIAGNOSTIC:{}", diagnostic);
    }

    let mut host = HeadlessHost::default();
    let report = play(&mut created.vm, &mut host, args.ticks, args.tick_ms)?;
    emit_report(&report);
    Ok(0)
}
