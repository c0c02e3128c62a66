use std::collections::{BTreeMap, HashMap};

use ns_core::{Diagnostic, SourceSpan, StaticSymbolTable, SubroutineKind};
use ns_parser::{
    is_sigiled_identifier, Block, DialogueBlock, DialoguePart, Expression, ExpressionKind,
    Member, NodeId, SourceFile, Statement, StatementKind,
};
use tracing::debug;

use crate::source_parse::{normalize_virtual_path, resolve_include_path};
use crate::symbols::{Scope, SourceFileSymbol, Symbol};
use crate::FileDiagnostic;

/// Result of binding one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings {
    /// `Symbol::SourceFile` for the bound file.
    pub source: Symbol,
    /// `Symbol::MergedSourceFile`: the file, then its includes breadth-first.
    pub merged: Symbol,
    pub references: HashMap<NodeId, Symbol>,
    /// Names that did not resolve, keyed by the referencing node.
    pub unresolved: HashMap<NodeId, String>,
}

impl Bindings {
    pub fn merged_files(&self) -> &[String] {
        match &self.merged {
            Symbol::MergedSourceFile(files) => files,
            _ => &[],
        }
    }

    pub fn reference(&self, node: NodeId) -> Option<&Symbol> {
        self.references.get(&node)
    }
}

/// Second pass: resolves every name used in member bodies.
pub struct Binder<'a> {
    statics: &'a StaticSymbolTable,
    tables: &'a BTreeMap<String, SourceFileSymbol>,
    diagnostics: Vec<FileDiagnostic>,
}

struct FileState<'s> {
    path: &'s str,
    merged: &'s [String],
    references: HashMap<NodeId, Symbol>,
    unresolved: HashMap<NodeId, String>,
}

impl<'a> Binder<'a> {
    pub fn new(
        statics: &'a StaticSymbolTable,
        tables: &'a BTreeMap<String, SourceFileSymbol>,
    ) -> Self {
        Self {
            statics,
            tables,
            diagnostics: Vec::new(),
        }
    }

    pub fn into_diagnostics(self) -> Vec<FileDiagnostic> {
        self.diagnostics
    }

    pub fn bind_file(&mut self, file: &SourceFile, merged: Vec<String>) -> Bindings {
        let path = file.path.as_str();
        let mut state = FileState {
            path,
            merged: &merged,
            references: HashMap::new(),
            unresolved: HashMap::new(),
        };

        let empty = Scope::default();
        let tables = self.tables;
        for member in &file.members {
            let scope = tables
                .get(path)
                .and_then(|table| table.scope(member.id()))
                .unwrap_or(&empty);
            match member {
                Member::Chapter(chapter) => self.bind_block(&chapter.body, scope, &mut state),
                Member::Scene(scene) => self.bind_block(&scene.body, scope, &mut state),
                Member::Function(function) => self.bind_block(&function.body, scope, &mut state),
                Member::DialogueBlock(block) => self.bind_dialogue(block, scope, &mut state),
            }
        }

        debug!(
            file = %path,
            references = state.references.len(),
            unresolved = state.unresolved.len(),
            "bound source file"
        );
        Bindings {
            source: Symbol::SourceFile(path.to_string()),
            references: state.references,
            unresolved: state.unresolved,
            merged: Symbol::MergedSourceFile(state.merged.to_vec()),
        }
    }

    fn bind_block(&mut self, block: &Block, scope: &Scope, state: &mut FileState<'_>) {
        for statement in &block.statements {
            self.bind_statement(statement, scope, state);
        }
    }

    fn bind_dialogue(&mut self, block: &DialogueBlock, scope: &Scope, state: &mut FileState<'_>) {
        for part in &block.parts {
            if let DialoguePart::Statements(body) = part {
                self.bind_block(body, scope, state);
            }
        }
    }

    fn bind_statement(&mut self, statement: &Statement, scope: &Scope, state: &mut FileState<'_>) {
        match &statement.kind {
            StatementKind::Block(block) => self.bind_block(block, scope, state),
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.bind_expression(condition, scope, state);
                self.bind_statement(then_branch, scope, state);
                if let Some(else_branch) = else_branch {
                    self.bind_statement(else_branch, scope, state);
                }
            }
            StatementKind::While { condition, body } => {
                self.bind_expression(condition, scope, state);
                self.bind_statement(body, scope, state);
            }
            StatementKind::Select { cases } => {
                for case in cases {
                    self.bind_statement(&case.body, scope, state);
                }
            }
            StatementKind::CallChapter { target } => {
                match self.resolve_chapter(target, state) {
                    Some(symbol) => {
                        state.references.insert(statement.id, symbol);
                    }
                    None => self.unresolved(
                        state,
                        statement.id,
                        target,
                        "BIND_UNRESOLVED_CHAPTER",
                        format!("No chapter found in \"{}\".", target),
                        statement.span,
                    ),
                }
            }
            StatementKind::CallScene { target } => match self.resolve_scene(target, state) {
                Some(symbol) => {
                    state.references.insert(statement.id, symbol);
                }
                None => self.unresolved(
                    state,
                    statement.id,
                    target,
                    "BIND_UNRESOLVED_SCENE",
                    format!("Scene \"{}\" not found.", target),
                    statement.span,
                ),
            },
            StatementKind::Return(Some(value)) | StatementKind::Expression(value) => {
                self.bind_expression(value, scope, state)
            }
            StatementKind::DialogueBlock(block) => self.bind_dialogue(block, scope, state),
            StatementKind::Return(None) | StatementKind::Break | StatementKind::Empty => {}
        }
    }

    fn bind_expression(&mut self, expression: &Expression, scope: &Scope, state: &mut FileState<'_>) {
        match &expression.kind {
            ExpressionKind::Literal(_) => {}
            ExpressionKind::Identifier(name) => {
                self.bind_identifier(expression.id, name, expression.span, scope, state);
            }
            ExpressionKind::Unary { operand, .. } => self.bind_expression(operand, scope, state),
            ExpressionKind::Binary { left, right, .. } => {
                self.bind_expression(left, scope, state);
                self.bind_expression(right, scope, state);
            }
            ExpressionKind::Assignment { target, value, .. } => {
                if let Some(name) = target.as_identifier() {
                    let bound = self.bind_identifier(target.id, name, target.span, scope, state);
                    if matches!(bound, Some(Symbol::EnumValue(_))) {
                        state.references.remove(&target.id);
                        state.unresolved.insert(target.id, name.to_string());
                        self.report(
                            state.path,
                            Diagnostic::error(
                                "BIND_INVALID_ASSIGNMENT",
                                format!("Cannot assign to constant \"{}\".", name),
                                target.span,
                            ),
                        );
                    }
                }
                if let Some(value) = value {
                    self.bind_expression(value, scope, state);
                }
            }
            ExpressionKind::Call { callee, arguments } => {
                for argument in arguments {
                    self.bind_expression(argument, scope, state);
                }
                match self.resolve_call(callee, state) {
                    Some(symbol) => {
                        state.references.insert(expression.id, symbol);
                    }
                    None => self.unresolved(
                        state,
                        expression.id,
                        callee,
                        "BIND_UNRESOLVED_CALL",
                        format!("Function \"{}\" is not defined.", callee),
                        expression.span,
                    ),
                }
            }
        }
    }

    fn bind_identifier(
        &mut self,
        node: NodeId,
        name: &str,
        span: SourceSpan,
        scope: &Scope,
        state: &mut FileState<'_>,
    ) -> Option<Symbol> {
        let symbol = if let Some(parameter) = scope.parameters.get(name) {
            Some(Symbol::Parameter(parameter.clone()))
        } else if is_sigiled_identifier(name) {
            Some(Symbol::GlobalVariable)
        } else {
            self.statics
                .constant(name)
                .map(|value| Symbol::EnumValue(value.clone()))
        };

        match &symbol {
            Some(symbol) => {
                state.references.insert(node, symbol.clone());
            }
            None => self.unresolved(
                state,
                node,
                name,
                "BIND_UNRESOLVED_IDENTIFIER",
                format!("Identifier \"{}\" is not defined.", name),
                span,
            ),
        }
        symbol
    }

    fn resolve_call(&self, callee: &str, state: &FileState<'_>) -> Option<Symbol> {
        if let Some(id) = self.statics.builtin(callee) {
            return Some(Symbol::BuiltInFunction(id));
        }
        self.find_in_merged(callee, SubroutineKind::Function, state)
    }

    fn resolve_chapter(&self, target: &str, state: &FileState<'_>) -> Option<Symbol> {
        let module = self.resolve_module(target, state)?;
        self.tables
            .get(&module)?
            .first_chapter()
            .map(|entry| entry.symbol.clone())
    }

    fn resolve_scene(&self, target: &str, state: &FileState<'_>) -> Option<Symbol> {
        let Some((module, scene)) = target.split_once("->") else {
            return self.find_in_merged(target, SubroutineKind::Scene, state);
        };
        let module = if module.trim() == "@" {
            state.path.to_string()
        } else {
            self.resolve_module(module.trim(), state)?
        };
        self.tables
            .get(&module)?
            .member(scene.trim())
            .filter(|entry| entry.kind == SubroutineKind::Scene)
            .map(|entry| entry.symbol.clone())
    }

    fn resolve_module(&self, target: &str, state: &FileState<'_>) -> Option<String> {
        let known: Vec<String> = self.tables.keys().cloned().collect();
        let resolved = resolve_include_path(state.path, target, &known);
        if self.tables.contains_key(&resolved) {
            return Some(resolved);
        }
        let normalized = normalize_virtual_path(target);
        self.tables.contains_key(&normalized).then_some(normalized)
    }

    fn find_in_merged(
        &self,
        name: &str,
        kind: SubroutineKind,
        state: &FileState<'_>,
    ) -> Option<Symbol> {
        state.merged.iter().find_map(|file| {
            self.tables
                .get(file)?
                .member(name)
                .filter(|entry| entry.kind == kind)
                .map(|entry| entry.symbol.clone())
        })
    }

    fn unresolved(
        &mut self,
        state: &mut FileState<'_>,
        node: NodeId,
        name: &str,
        code: &str,
        message: String,
        span: SourceSpan,
    ) {
        state.unresolved.insert(node, name.to_string());
        self.report(state.path, Diagnostic::warning(code, message, span));
    }

    fn report(&mut self, path: &str, diagnostic: Diagnostic) {
        self.diagnostics.push(FileDiagnostic {
            file: path.to_string(),
            diagnostic,
        });
    }
}

#[cfg(test)]
mod binder_tests {
    use super::*;
    use crate::include_graph::merged_file_order;
    use crate::source_parse::parse_sources;
    use crate::symbol_table_builder::SymbolTableBuilder;
    use ns_core::{ConstantValue, EnumConstant};

    struct Bound {
        sources: BTreeMap<String, crate::ParsedSource>,
        bindings: BTreeMap<String, Bindings>,
        diagnostics: Vec<FileDiagnostic>,
    }

    fn bind(files: &[(&str, &str)]) -> Bound {
        let map = files
            .iter()
            .map(|(path, text)| (path.to_string(), text.to_string()))
            .collect::<BTreeMap<_, _>>();
        let sources = parse_sources(&map, &mut Vec::new()).expect("sources should parse");
        let (tables, _) = SymbolTableBuilder::new().build(&sources);
        let statics = StaticSymbolTable::new();
        let mut binder = Binder::new(&statics, &tables);
        let mut bindings = BTreeMap::new();
        for (path, source) in &sources {
            let merged = merged_file_order(path, &sources);
            bindings.insert(path.clone(), binder.bind_file(&source.file, merged));
        }
        Bound {
            sources,
            bindings,
            diagnostics: binder.into_diagnostics(),
        }
    }

    fn codes(bound: &Bound) -> Vec<&str> {
        bound
            .diagnostics
            .iter()
            .map(|entry| entry.diagnostic.code.as_str())
            .collect()
    }

    fn symbols_of(bound: &Bound, path: &str) -> Vec<Symbol> {
        let bindings = &bound.bindings[path];
        let mut ids: Vec<&NodeId> = bindings.references.keys().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| bindings.references[id].clone())
            .collect()
    }

    #[test]
    fn parameters_shadow_globals_and_constants_resolve() {
        let bound = bind(&[(
            "main.nss",
            "function F($a) { $a = $b; Fade(\"x\", 1, 0, Linear, true); }",
        )]);
        assert!(bound.diagnostics.is_empty(), "{:?}", bound.diagnostics);
        let symbols = symbols_of(&bound, "main.nss");
        assert!(matches!(&symbols[0], Symbol::Parameter(p) if p.name == "$a" && p.index == 0));
        assert!(symbols.contains(&Symbol::GlobalVariable));
        assert!(symbols.contains(&Symbol::EnumValue(ConstantValue::EnumValue(
            EnumConstant::Linear
        ))));
        assert!(symbols
            .iter()
            .any(|symbol| matches!(symbol, Symbol::BuiltInFunction(id) if id.0 == 12)));
    }

    #[test]
    fn calls_resolve_through_includes_breadth_first() {
        let bound = bind(&[
            ("main.nss", "#include \"lib.nss\"\nchapter main { Helper(1); }"),
            ("lib.nss", "function Helper($x) { return $x; }"),
        ]);
        assert!(bound.diagnostics.is_empty(), "{:?}", bound.diagnostics);
        assert_eq!(bound.bindings["main.nss"].merged_files(), ["main.nss", "lib.nss"]);
        let call = symbols_of(&bound, "main.nss")
            .into_iter()
            .find_map(|symbol| match symbol {
                Symbol::Function(function) => Some(function),
                _ => None,
            })
            .expect("call should resolve to a function");
        assert_eq!(call.module, "lib.nss");
        assert_eq!(call.index, 0);
    }

    #[test]
    fn unresolved_names_are_recorded_not_fatal() {
        let bound = bind(&[("main.nss", "chapter main { Missing(x); call_scene \"@->nope\"; }")]);
        assert_eq!(
            codes(&bound),
            vec![
                "BIND_UNRESOLVED_IDENTIFIER",
                "BIND_UNRESOLVED_CALL",
                "BIND_UNRESOLVED_SCENE"
            ]
        );
        assert_eq!(bound.bindings["main.nss"].unresolved.len(), 3);
        assert!(!bound.diagnostics[0].diagnostic.is_error());
    }

    #[test]
    fn scene_and_chapter_targets_resolve_across_files() {
        let bound = bind(&[
            (
                "main.nss",
                "chapter main { call_chapter \"next.nss\"; call_scene \"next.nss->intro\"; call_scene \"@->local\"; }\nscene local {}",
            ),
            ("next.nss", "scene intro {}\nchapter second {}"),
        ]);
        assert!(bound.diagnostics.is_empty(), "{:?}", bound.diagnostics);
        let symbols = symbols_of(&bound, "main.nss");
        assert!(matches!(&symbols[0], Symbol::Chapter(c) if c.name == "second" && c.index == 1));
        assert!(matches!(&symbols[1], Symbol::Scene(s) if s.module == "next.nss" && s.name == "intro"));
        assert!(matches!(&symbols[2], Symbol::Scene(s) if s.module == "main.nss" && s.name == "local"));
        assert!(bound.sources.contains_key("next.nss"));
    }

    #[test]
    fn assigning_to_constant_is_rejected() {
        let bound = bind(&[("main.nss", "chapter main { Linear = 3; }")]);
        assert_eq!(codes(&bound), vec!["BIND_INVALID_ASSIGNMENT"]);
        assert_eq!(bound.bindings["main.nss"].unresolved.len(), 1);
    }
}
