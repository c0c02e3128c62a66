mod binder;
mod emitter;
mod include_graph;
mod pipeline;
mod source_parse;
mod symbol_table_builder;
mod symbols;

use std::collections::BTreeMap;

use ns_core::{Diagnostic, SubroutineDef};

pub use binder::{Binder, Bindings};
pub use emitter::emit_module;
pub use pipeline::{compile_project_from_source_map, compile_source};
pub use source_parse::{normalize_virtual_path, ParsedSource};
pub use symbol_table_builder::SymbolTableBuilder;
pub use symbols::{
    DialogueBlockSymbol, MemberEntry, ParameterSymbol, Scope, SourceFileSymbol, SubroutineSymbol,
    Symbol,
};

/// A diagnostic together with the project file it was raised in.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDiagnostic {
    pub file: String,
    pub diagnostic: Diagnostic,
}

impl std::fmt::Display for FileDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.file, self.diagnostic.span, self.diagnostic.code, self.diagnostic.message
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceEncoding {
    #[default]
    Utf8,
    ShiftJis,
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub encoding: SourceEncoding,
}

#[derive(Debug, Clone)]
pub struct CompiledModule {
    /// Module name; the normalized source path.
    pub name: String,
    pub subroutines: Vec<SubroutineDef>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct CompileProjectResult {
    pub modules: BTreeMap<String, CompiledModule>,
    pub diagnostics: Vec<FileDiagnostic>,
}

impl CompileProjectResult {
    pub fn errors(&self) -> impl Iterator<Item = &FileDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|entry| entry.diagnostic.is_error())
    }
}
