use std::collections::BTreeMap;

use ns_core::{Diagnostic, SubroutineKind};
use ns_parser::{
    Block, DialogueBlock, DialoguePart, Member, NodeId, SourceFile, Statement, StatementKind,
};
use tracing::debug;

use crate::source_parse::ParsedSource;
use crate::symbols::{
    DialogueBlockSymbol, MemberEntry, ParameterSymbol, Scope, SourceFileSymbol, SubroutineSymbol,
    Symbol,
};
use crate::FileDiagnostic;

/// First pass: records every member of every file, plus the parameters and
/// dialogue blocks owned by each member body.
#[derive(Debug, Default)]
pub struct SymbolTableBuilder {
    diagnostics: Vec<FileDiagnostic>,
}

impl SymbolTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(
        mut self,
        sources: &BTreeMap<String, ParsedSource>,
    ) -> (BTreeMap<String, SourceFileSymbol>, Vec<FileDiagnostic>) {
        let mut tables = BTreeMap::new();
        for (path, source) in sources {
            let table = self.build_file(path, &source.file, &source.includes);
            debug!(file = %path, members = table.members.len(), "built symbol table");
            tables.insert(path.clone(), table);
        }
        (tables, self.diagnostics)
    }

    pub fn build_file(
        &mut self,
        path: &str,
        file: &SourceFile,
        includes: &[String],
    ) -> SourceFileSymbol {
        let mut table = SourceFileSymbol {
            path: path.to_string(),
            includes: includes.to_vec(),
            ..SourceFileSymbol::default()
        };

        for member in &file.members {
            let (name, kind, parameter_count) = match member {
                Member::Chapter(chapter) => (chapter.name.clone(), SubroutineKind::Chapter, 0),
                Member::Scene(scene) => (scene.name.clone(), SubroutineKind::Scene, 0),
                Member::Function(function) => (
                    function.name.clone(),
                    SubroutineKind::Function,
                    function.parameters.len(),
                ),
                Member::DialogueBlock(block) => (
                    block
                        .identifier
                        .clone()
                        .unwrap_or_else(|| format!("dialogue{}", table.members.len())),
                    SubroutineKind::DialogueBlock,
                    0,
                ),
            };

            if table.members.contains_key(&name) {
                self.report(
                    path,
                    Diagnostic::error(
                        "BIND_DUPLICATE_MEMBER",
                        format!("Member \"{}\" is already declared in this file.", name),
                        member.span(),
                    ),
                );
                continue;
            }

            let subroutine = SubroutineSymbol {
                module: path.to_string(),
                name: name.clone(),
                kind,
                index: table.members.len() as u16,
                parameter_count,
            };
            let mut scope = Scope::default();
            let symbol = match member {
                Member::Chapter(chapter) => {
                    self.collect_block(path, &chapter.body, &mut scope, &mut table);
                    Symbol::Chapter(subroutine)
                }
                Member::Scene(scene) => {
                    self.collect_block(path, &scene.body, &mut scope, &mut table);
                    Symbol::Scene(subroutine)
                }
                Member::Function(function) => {
                    for parameter in &function.parameters {
                        if scope.parameters.contains_key(&parameter.name) {
                            self.report(
                                path,
                                Diagnostic::error(
                                    "BIND_DUPLICATE_PARAMETER",
                                    format!("Parameter \"{}\" is declared twice.", parameter.name),
                                    parameter.span,
                                ),
                            );
                        }
                        let index = scope.parameters.len() as u16;
                        scope.parameters.insert(
                            parameter.name.clone(),
                            ParameterSymbol {
                                name: parameter.name.clone(),
                                index,
                            },
                        );
                    }
                    self.collect_block(path, &function.body, &mut scope, &mut table);
                    Symbol::Function(subroutine)
                }
                Member::DialogueBlock(block) => {
                    let symbol = DialogueBlockSymbol {
                        name: name.clone(),
                        box_name: block.box_name.clone(),
                        local_index: 0,
                        subroutine: Some(subroutine),
                    };
                    scope.dialogue_blocks.insert(name.clone(), symbol.clone());
                    self.collect_dialogue_parts(path, block, &mut scope, &mut table);
                    Symbol::DialogueBlock(symbol)
                }
            };

            table.declarations.insert(member.id(), symbol.clone());
            table.scopes.insert(member.id(), scope);
            table.members.insert(
                name,
                MemberEntry {
                    node: member.id(),
                    kind,
                    symbol,
                },
            );
        }

        table
    }

    fn collect_block(
        &mut self,
        path: &str,
        block: &Block,
        scope: &mut Scope,
        table: &mut SourceFileSymbol,
    ) {
        for statement in &block.statements {
            self.collect_statement(path, statement, scope, table);
        }
    }

    fn collect_statement(
        &mut self,
        path: &str,
        statement: &Statement,
        scope: &mut Scope,
        table: &mut SourceFileSymbol,
    ) {
        match &statement.kind {
            StatementKind::Block(block) => self.collect_block(path, block, scope, table),
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.collect_statement(path, then_branch, scope, table);
                if let Some(else_branch) = else_branch {
                    self.collect_statement(path, else_branch, scope, table);
                }
            }
            StatementKind::While { body, .. } => self.collect_statement(path, body, scope, table),
            StatementKind::Select { cases } => {
                for case in cases {
                    self.collect_statement(path, &case.body, scope, table);
                }
            }
            StatementKind::DialogueBlock(block) => {
                self.declare_inline_dialogue(path, block, scope, table);
                self.collect_dialogue_parts(path, block, scope, table);
            }
            StatementKind::CallChapter { .. }
            | StatementKind::CallScene { .. }
            | StatementKind::Return(_)
            | StatementKind::Break
            | StatementKind::Expression(_)
            | StatementKind::Empty => {}
        }
    }

    fn collect_dialogue_parts(
        &mut self,
        path: &str,
        block: &DialogueBlock,
        scope: &mut Scope,
        table: &mut SourceFileSymbol,
    ) {
        for part in &block.parts {
            if let DialoguePart::Statements(body) = part {
                self.collect_block(path, body, scope, table);
            }
        }
    }

    fn declare_inline_dialogue(
        &mut self,
        path: &str,
        block: &DialogueBlock,
        scope: &mut Scope,
        table: &mut SourceFileSymbol,
    ) {
        let local_index = scope.dialogue_blocks.len() as u16;
        let name = block
            .identifier
            .clone()
            .unwrap_or_else(|| format!("dialogue{}", local_index));
        let symbol = DialogueBlockSymbol {
            name: name.clone(),
            box_name: block.box_name.clone(),
            local_index,
            subroutine: None,
        };
        if scope.dialogue_blocks.contains_key(&name) {
            self.report(
                path,
                Diagnostic::warning(
                    "BIND_DUPLICATE_DIALOGUE",
                    format!("Dialogue block \"{}\" appears twice in one body.", name),
                    block.span,
                ),
            );
            // Keep the slot so later blocks keep their table positions.
            let unique = format!("{}#{}", name, local_index);
            scope.dialogue_blocks.insert(unique, symbol.clone());
        } else {
            scope.dialogue_blocks.insert(name, symbol.clone());
        }
        table.declarations.insert(block.id, Symbol::DialogueBlock(symbol));
    }

    fn report(&mut self, path: &str, diagnostic: Diagnostic) {
        self.diagnostics.push(FileDiagnostic {
            file: path.to_string(),
            diagnostic,
        });
    }
}

pub(crate) fn dialogue_symbol(table: &SourceFileSymbol, node: NodeId) -> Option<&DialogueBlockSymbol> {
    match table.declarations.get(&node) {
        Some(Symbol::DialogueBlock(symbol)) => Some(symbol),
        _ => None,
    }
}
