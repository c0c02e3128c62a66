use std::collections::BTreeMap;

use ns_compiler::{
    compile_project_from_source_map, normalize_virtual_path, CompileOptions,
    CompileProjectResult, FileDiagnostic,
};
use ns_core::{NsError, NsxModule, SubroutineKind};
use ns_runtime::{Vm, VmOptions};
use tracing::info;

pub const DEFAULT_ENTRY_MODULE: &str = "main.nss";
pub const DEFAULT_ENTRY_THREAD: &str = "main";

#[derive(Debug, Clone, Default)]
pub struct CreateVmOptions {
    pub sources: BTreeMap<String, String>,
    pub compile: CompileOptions,
    pub vm: VmOptions,
    /// Module whose entry starts the first thread. Defaults to `main.nss`.
    pub entry_module: Option<String>,
    /// Subroutine to start. Defaults to the module's first chapter.
    pub entry: Option<String>,
}

pub struct CreatedVm {
    pub vm: Vm,
    pub entry_module: String,
    pub entry: String,
    /// Warnings and non-fatal errors reported while compiling.
    pub diagnostics: Vec<FileDiagnostic>,
}

pub fn compile_project(
    sources: &BTreeMap<String, String>,
    options: &CompileOptions,
) -> Result<CompileProjectResult, NsError> {
    compile_project_from_source_map(sources, options)
}

/// Compiles the project, loads every module into a new VM and starts the
/// entry subroutine as the `main` thread.
pub fn create_vm(options: CreateVmOptions) -> Result<CreatedVm, NsError> {
    let compiled = compile_project(&options.sources, &options.compile)?;
    let entry_module = resolve_entry_module(&compiled, options.entry_module)?;

    let mut vm = Vm::new(options.vm);
    for (name, module) in compiled.modules {
        vm.add_module(NsxModule::from_bytes(name, module.bytes)?);
    }

    let module = vm.module(&entry_module).cloned().ok_or_else(|| {
        NsError::new(
            "API_ENTRY_MODULE_NOT_FOUND",
            format!("Entry module \"{}\" was not compiled.", entry_module),
        )
    })?;
    let entry = match options.entry {
        Some(entry) => entry,
        None => first_chapter(&module).ok_or_else(|| {
            NsError::new(
                "API_ENTRY_CHAPTER_NOT_FOUND",
                format!("\"{}\" declares no chapter to start.", entry_module),
            )
        })?,
    };
    vm.create_thread(DEFAULT_ENTRY_THREAD, &entry_module, &entry)?;
    info!(module = %entry_module, %entry, "vm created");

    Ok(CreatedVm {
        vm,
        entry_module,
        entry,
        diagnostics: compiled.diagnostics,
    })
}

fn resolve_entry_module(
    compiled: &CompileProjectResult,
    explicit: Option<String>,
) -> Result<String, NsError> {
    if let Some(entry) = explicit {
        let entry = normalize_virtual_path(&entry);
        if !compiled.modules.contains_key(&entry) {
            return Err(NsError::new(
                "API_ENTRY_MODULE_NOT_FOUND",
                format!("Entry module \"{}\" is not part of the project.", entry),
            ));
        }
        return Ok(entry);
    }

    if compiled.modules.contains_key(DEFAULT_ENTRY_MODULE) {
        return Ok(DEFAULT_ENTRY_MODULE.to_string());
    }

    Err(NsError::new(
        "API_ENTRY_MAIN_NOT_FOUND",
        format!("Expected \"{}\" as default entry module.", DEFAULT_ENTRY_MODULE),
    ))
}

fn first_chapter(module: &NsxModule) -> Option<String> {
    (0..module.subroutine_count()).find_map(|index| {
        let rti = module.rti(index as u16).ok()?;
        (rti.kind == SubroutineKind::Chapter).then(|| rti.name.clone())
    })
}

#[cfg(test)]
mod api_tests {
    use super::*;
    use ns_runtime::ThreadState;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn create_vm_starts_first_chapter_of_main() {
        let created = create_vm(CreateVmOptions {
            sources: map(&[(
                "main.nss",
                "function Helper() {}\nchapter opening { Wait(100); }",
            )]),
            ..CreateVmOptions::default()
        })
        .expect("vm should build");
        assert_eq!(created.entry_module, "main.nss");
        assert_eq!(created.entry, "opening");
        assert!(created.diagnostics.is_empty());
        let thread = created.vm.thread(DEFAULT_ENTRY_THREAD).expect("main thread");
        assert_eq!(thread.state, ThreadState::Running);
    }

    #[test]
    fn explicit_entry_is_used() {
        let created = create_vm(CreateVmOptions {
            sources: map(&[
                ("main.nss", "chapter main {}"),
                ("./extra/other.nss", "function Start() {}"),
            ]),
            entry_module: Some("extra/other.nss".to_string()),
            entry: Some("Start".to_string()),
            ..CreateVmOptions::default()
        })
        .expect("vm should build");
        assert_eq!(created.entry_module, "extra/other.nss");
        assert_eq!(created.vm.module_names().count(), 2);
    }

    #[test]
    fn missing_entry_module_is_reported() {
        let error = create_vm(CreateVmOptions {
            sources: map(&[("other.nss", "chapter main {}")]),
            ..CreateVmOptions::default()
        })
        .err()
        .expect("no main.nss");
        assert_eq!(error.code, "API_ENTRY_MAIN_NOT_FOUND");

        let error = create_vm(CreateVmOptions {
            sources: map(&[("main.nss", "function F() {}")]),
            ..CreateVmOptions::default()
        })
        .err()
        .expect("no chapter");
        assert_eq!(error.code, "API_ENTRY_CHAPTER_NOT_FOUND");
    }
}
