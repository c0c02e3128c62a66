use std::path::Path;
use std::sync::Arc;

use ns_core::{ConstantValue, NsError, NsxModule};
use tracing::{debug, trace};

use super::{ThreadError, Vm, VmOptions};
use crate::builtins::BuiltInRegistry;
use crate::host::ResumeToken;
use crate::rng::ScriptRng;
use crate::thread::{ThreadContext, ThreadId, ThreadState};

const DEFAULT_RANDOM_SEED: u32 = 0x4e53_5856;

fn thread_not_found(name: &str) -> NsError {
    NsError::new(
        "VM_THREAD_NOT_FOUND",
        format!("Thread \"{}\" does not exist.", name),
    )
}

impl Vm {
    pub fn new(options: VmOptions) -> Self {
        Self::with_registry(options, BuiltInRegistry::standard())
    }

    pub fn with_registry(options: VmOptions, registry: BuiltInRegistry) -> Self {
        Self {
            options,
            modules: Default::default(),
            registry,
            threads: Vec::new(),
            next_thread: 1,
            rng: ScriptRng::new(options.random_seed.unwrap_or(DEFAULT_RANDOM_SEED)),
            errors: Vec::new(),
        }
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn registry_mut(&mut self) -> &mut BuiltInRegistry {
        &mut self.registry
    }

    /// Registers a module under its own name, replacing any module with the
    /// same name. Threads already running keep their copy.
    pub fn add_module(&mut self, module: NsxModule) -> Arc<NsxModule> {
        let module = Arc::new(module);
        debug!(
            module = module.name(),
            subroutines = module.subroutine_count(),
            strings = module.string_count(),
            imports = module.imports().len(),
            "module loaded"
        );
        self.modules
            .insert(module.name().to_string(), Arc::clone(&module));
        module
    }

    pub fn load_module(
        &mut self,
        path: &Path,
        name: impl Into<String>,
    ) -> Result<Arc<NsxModule>, NsError> {
        let module = NsxModule::open(path, name)?;
        Ok(self.add_module(module))
    }

    pub fn module(&self, name: &str) -> Option<&Arc<NsxModule>> {
        self.modules.get(name)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Starts `entry` of `module` as a new thread. Parameters of the entry
    /// subroutine start out as null. A live thread with the same name is
    /// terminated and replaced.
    pub fn create_thread(
        &mut self,
        name: &str,
        module: &str,
        entry: &str,
    ) -> Result<ThreadId, NsError> {
        let Some(module) = self.modules.get(module).cloned() else {
            return Err(NsError::new(
                "VM_MODULE_NOT_LOADED",
                format!("Module \"{}\" is not loaded.", module),
            ));
        };
        let Some(subroutine) = module.find_subroutine(entry) else {
            return Err(NsError::new(
                "VM_ENTRY_NOT_FOUND",
                format!("\"{}\" is not defined in {}.", entry, module.name()),
            ));
        };
        self.spawn(name, module, subroutine)
    }

    pub(super) fn spawn(
        &mut self,
        name: &str,
        module: Arc<NsxModule>,
        subroutine: u16,
    ) -> Result<ThreadId, NsError> {
        let arity = module.parameter_names(subroutine)?.len();
        if let Some(existing) = self
            .threads
            .iter_mut()
            .find(|thread| thread.is_live() && thread.name == name)
        {
            debug!(thread = %existing.name, id = %existing.id, "thread replaced");
            existing.terminate();
        }

        let id = ThreadId(self.next_thread);
        self.next_thread += 1;
        debug!(
            thread = name,
            %id,
            module = module.name(),
            subroutine,
            "thread created"
        );
        self.threads.push(ThreadContext::new(
            id,
            name,
            module,
            subroutine,
            vec![ConstantValue::Null; arity],
        ));
        Ok(id)
    }

    fn live_thread_mut(&mut self, name: &str) -> Result<&mut ThreadContext, NsError> {
        self.threads
            .iter_mut()
            .find(|thread| thread.is_live() && thread.name == name)
            .ok_or_else(|| thread_not_found(name))
    }

    /// Holds a running thread until `resume_thread`. Threads already waiting
    /// on time, input or the host keep their current state.
    pub fn suspend_thread(&mut self, name: &str) -> Result<(), NsError> {
        let thread = self.live_thread_mut(name)?;
        if thread.state == ThreadState::Running {
            thread.state = ThreadState::SuspendedByHost;
            trace!(thread = name, "thread suspended by host");
        }
        Ok(())
    }

    pub fn resume_thread(&mut self, name: &str) -> Result<(), NsError> {
        let thread = self.live_thread_mut(name)?;
        if thread.state == ThreadState::SuspendedByHost {
            thread.state = ThreadState::Running;
            trace!(thread = name, "thread resumed by host");
        }
        Ok(())
    }

    pub fn terminate_thread(&mut self, name: &str) -> Result<(), NsError> {
        let thread = self.live_thread_mut(name)?;
        thread.terminate();
        debug!(thread = name, "thread terminated by host");
        Ok(())
    }

    /// Completes a pending host operation. Returns whether a thread was
    /// waiting on `token`.
    pub fn resume(&mut self, token: ResumeToken) -> bool {
        let mut resumed = false;
        for thread in &mut self.threads {
            if thread.state == ThreadState::AwaitingHost(token) {
                thread.state = ThreadState::Running;
                trace!(thread = %thread.name, token = token.0, "host operation completed");
                resumed = true;
            }
        }
        resumed
    }

    pub fn has_live_threads(&self) -> bool {
        self.threads.iter().any(ThreadContext::is_live)
    }

    pub fn live_thread_count(&self) -> usize {
        self.threads.iter().filter(|thread| thread.is_live()).count()
    }

    pub fn thread(&self, name: &str) -> Option<&ThreadContext> {
        self.threads
            .iter()
            .find(|thread| thread.is_live() && thread.name == name)
    }

    pub fn threads(&self) -> impl Iterator<Item = &ThreadContext> {
        self.threads.iter().filter(|thread| thread.is_live())
    }

    /// Errors that terminated threads since the last call.
    pub fn take_errors(&mut self) -> Vec<ThreadError> {
        std::mem::take(&mut self.errors)
    }
}
