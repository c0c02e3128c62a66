use std::collections::BTreeMap;
use std::sync::Arc;

use ns_core::{NsError, NsxModule};

use crate::builtins::BuiltInRegistry;
use crate::rng::ScriptRng;
use crate::thread::ThreadContext;

mod callstack;
mod lifecycle;
mod step;

#[cfg(test)]
mod lifecycle_tests;

pub const DEFAULT_STEP_BUDGET: usize = 10_000;
pub const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmOptions {
    /// Seed for `Random`; `None` uses a fixed default so runs stay reproducible.
    pub random_seed: Option<u32>,
    /// Instructions a thread may execute per tick when `run_tick` is used.
    pub default_step_budget: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            random_seed: None,
            default_step_budget: DEFAULT_STEP_BUDGET,
        }
    }
}

/// A failure that terminated one thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadError {
    pub thread: String,
    pub error: NsError,
}

/// Cooperative scheduler over loaded NSX modules. Threads run in creation
/// order, one slice per `run` call.
#[derive(Debug)]
pub struct Vm {
    options: VmOptions,
    modules: BTreeMap<String, Arc<NsxModule>>,
    registry: BuiltInRegistry,
    threads: Vec<ThreadContext>,
    next_thread: u64,
    rng: ScriptRng,
    errors: Vec<ThreadError>,
}
