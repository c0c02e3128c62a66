use std::collections::HashMap;

use ns_core::{
    builtin_decl, BinaryOperator, ConstantValue, DialogueBlockDef, Diagnostic, Immediate,
    ModuleBuilder, NsError, Opcode, SourceSpan, SubroutineDef, SubroutineKind,
};
use ns_parser::{
    AssignmentOperator, Block, DialogueBlock, DialoguePart, Expression, ExpressionKind, Literal,
    Member, NodeId, SourceFile, Statement, StatementKind,
};
use tracing::{debug, trace};

use crate::binder::Bindings;
use crate::symbol_table_builder::dialogue_symbol;
use crate::symbols::{SourceFileSymbol, SubroutineSymbol, Symbol};
use crate::{CompiledModule, FileDiagnostic};

const JUMP_LEN: usize = 3;

/// Why a subroutine body could not be emitted. `Trap` failures turn the
/// subroutine into a runtime trap; `Fatal` ones abort the whole module.
enum EmitFailure {
    Trap(Diagnostic),
    Fatal(NsError),
}

impl From<NsError> for EmitFailure {
    fn from(error: NsError) -> Self {
        Self::Fatal(error)
    }
}

type EmitResult<T = ()> = Result<T, EmitFailure>;

fn trap(code: &str, message: impl Into<String>, span: SourceSpan) -> EmitFailure {
    EmitFailure::Trap(Diagnostic::error(code, message, span))
}

/// Lowers one bound source file into an NSX module.
pub fn emit_module(
    file: &SourceFile,
    table: &SourceFileSymbol,
    bindings: &Bindings,
    diagnostics: &mut Vec<FileDiagnostic>,
) -> Result<CompiledModule, NsError> {
    let path = table.path.as_str();
    let members_by_id: HashMap<NodeId, &Member> =
        file.members.iter().map(|member| (member.id(), member)).collect();

    let mut builder = ModuleBuilder::new();
    for (name, entry) in &table.members {
        let Some(member) = members_by_id.get(&entry.node) else {
            continue;
        };
        let outcome = {
            let mut emitter = SubroutineEmitter {
                builder: &mut builder,
                path,
                table,
                bindings,
                code: Vec::new(),
                dialogue_blocks: Vec::new(),
                loop_exits: Vec::new(),
            };
            emitter
                .emit_member(member)
                .map(|()| emitter.finish(entry.kind, name, member))
        };
        let def = match outcome {
            Ok(def) => def,
            Err(EmitFailure::Trap(diagnostic)) => {
                let def = trap_subroutine(&mut builder, table, entry.kind, name, member, &diagnostic)?;
                diagnostics.push(FileDiagnostic {
                    file: path.to_string(),
                    diagnostic,
                });
                def
            }
            Err(EmitFailure::Fatal(error)) => return Err(error),
        };
        trace!(module = %path, subroutine = %def.name, bytes = def.code.len(), "emitted subroutine");
        builder.push_subroutine(def)?;
    }

    let bytes = builder.write()?;
    debug!(module = %path, subroutines = builder.subroutines().len(), bytes = bytes.len(), "emitted module");
    Ok(CompiledModule {
        name: path.to_string(),
        subroutines: builder.subroutines().to_vec(),
        bytes,
    })
}

fn parameter_names(member: &Member) -> Vec<String> {
    match member {
        Member::Function(function) => function
            .parameters
            .iter()
            .map(|parameter| parameter.name.clone())
            .collect(),
        _ => Vec::new(),
    }
}

/// Replacement body for a subroutine that failed to emit: it raises the
/// diagnostic message when executed. Dialogue names stay addressable.
fn trap_subroutine(
    builder: &mut ModuleBuilder,
    table: &SourceFileSymbol,
    kind: SubroutineKind,
    name: &str,
    member: &Member,
    diagnostic: &Diagnostic,
) -> Result<SubroutineDef, NsError> {
    let message = builder.intern_string(&format!(
        "{} ({}:{})",
        diagnostic.message, table.path, diagnostic.span
    ))?;
    let mut code = Vec::new();
    Opcode::Trap(message).encode(&mut code);
    Opcode::Return.encode(&mut code);

    let mut dialogue: Vec<_> = table
        .scope(member.id())
        .map(|scope| scope.dialogue_blocks.values().collect())
        .unwrap_or_default();
    dialogue.sort_by_key(|symbol| symbol.local_index);
    Ok(SubroutineDef {
        kind,
        name: name.to_string(),
        parameters: parameter_names(member),
        dialogue_blocks: dialogue
            .into_iter()
            .map(|symbol| DialogueBlockDef {
                name: symbol.name.clone(),
                offset: 0,
            })
            .collect(),
        code,
    })
}

struct SubroutineEmitter<'e> {
    builder: &'e mut ModuleBuilder,
    path: &'e str,
    table: &'e SourceFileSymbol,
    bindings: &'e Bindings,
    code: Vec<u8>,
    dialogue_blocks: Vec<(u16, DialogueBlockDef)>,
    /// Pending `break` jumps, one list per enclosing loop or select.
    loop_exits: Vec<Vec<usize>>,
}

impl SubroutineEmitter<'_> {
    fn finish(mut self, kind: SubroutineKind, name: &str, member: &Member) -> SubroutineDef {
        self.dialogue_blocks.sort_by_key(|(index, _)| *index);
        SubroutineDef {
            kind,
            name: name.to_string(),
            parameters: parameter_names(member),
            dialogue_blocks: self.dialogue_blocks.into_iter().map(|(_, def)| def).collect(),
            code: self.code,
        }
    }

    fn emit_member(&mut self, member: &Member) -> EmitResult {
        match member {
            Member::Chapter(chapter) => self.emit_block(&chapter.body)?,
            Member::Scene(scene) => self.emit_block(&scene.body)?,
            Member::Function(function) => self.emit_block(&function.body)?,
            Member::DialogueBlock(block) => self.emit_dialogue(block)?,
        }
        self.op(Opcode::LoadImm(Immediate::Null));
        self.op(Opcode::Return);
        Ok(())
    }

    fn op(&mut self, opcode: Opcode) {
        opcode.encode(&mut self.code);
    }

    fn intern(&mut self, text: &str) -> EmitResult<u16> {
        Ok(self.builder.intern_string(text)?)
    }

    /// Emits a forward jump with a zero offset and returns its position.
    fn jump_placeholder(&mut self, make: fn(i16) -> Opcode) -> usize {
        let site = self.code.len();
        self.op(make(0));
        site
    }

    fn jump_offset(&self, site: usize, target: usize) -> EmitResult<i16> {
        let delta = target as i64 - (site + JUMP_LEN) as i64;
        i16::try_from(delta).map_err(|_| {
            trap(
                "EMIT_JUMP_OUT_OF_RANGE",
                format!("Jump distance {} does not fit in 16 bits.", delta),
                SourceSpan::synthetic(),
            )
        })
    }

    fn patch(&mut self, site: usize, target: usize) -> EmitResult {
        let offset = self.jump_offset(site, target)?;
        self.code[site + 1..site + JUMP_LEN].copy_from_slice(&offset.to_le_bytes());
        Ok(())
    }

    fn patch_here(&mut self, site: usize) -> EmitResult {
        self.patch(site, self.code.len())
    }

    fn jump_back(&mut self, target: usize) -> EmitResult {
        let offset = self.jump_offset(self.code.len(), target)?;
        self.op(Opcode::Jump(offset));
        Ok(())
    }

    fn reference(&self, node: NodeId, name: &str, span: SourceSpan) -> EmitResult<&Symbol> {
        match self.bindings.reference(node) {
            Some(symbol) => Ok(symbol),
            None => {
                let name = self
                    .bindings
                    .unresolved
                    .get(&node)
                    .map(String::as_str)
                    .unwrap_or(name);
                Err(trap(
                    "EMIT_UNRESOLVED_SYMBOL",
                    format!("Unresolved symbol \"{}\".", name),
                    span,
                ))
            }
        }
    }

    fn emit_block(&mut self, block: &Block) -> EmitResult {
        for statement in &block.statements {
            self.emit_statement(statement)?;
        }
        Ok(())
    }

    fn emit_statement(&mut self, statement: &Statement) -> EmitResult {
        match &statement.kind {
            StatementKind::Block(block) => self.emit_block(block)?,
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.emit_expression(condition)?;
                let to_else = self.jump_placeholder(Opcode::JumpIfFalse);
                self.emit_statement(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let to_end = self.jump_placeholder(Opcode::Jump);
                        self.patch_here(to_else)?;
                        self.emit_statement(else_branch)?;
                        self.patch_here(to_end)?;
                    }
                    None => self.patch_here(to_else)?,
                }
            }
            StatementKind::While { condition, body } => {
                let start = self.code.len();
                self.emit_expression(condition)?;
                let to_end = self.jump_placeholder(Opcode::JumpIfFalse);
                self.loop_exits.push(Vec::new());
                self.emit_statement(body)?;
                self.jump_back(start)?;
                self.patch_here(to_end)?;
                self.close_loop()?;
            }
            StatementKind::Select { cases } => {
                self.op(Opcode::SelectStart);
                let poll = self.code.len();
                self.loop_exits.push(Vec::new());
                for case in cases {
                    let label = self.intern(&case.label)?;
                    self.op(Opcode::IsPressed(label));
                    let to_next = self.jump_placeholder(Opcode::JumpIfFalse);
                    self.emit_statement(&case.body)?;
                    let to_end = self.jump_placeholder(Opcode::Jump);
                    if let Some(exits) = self.loop_exits.last_mut() {
                        exits.push(to_end);
                    }
                    self.patch_here(to_next)?;
                }
                self.op(Opcode::SelectEnd);
                self.jump_back(poll)?;
                self.close_loop()?;
            }
            StatementKind::CallChapter { target } | StatementKind::CallScene { target } => {
                let symbol = self.reference(statement.id, target, statement.span)?;
                let Some(subroutine) = symbol.as_subroutine().cloned() else {
                    return Err(trap(
                        "EMIT_UNRESOLVED_SYMBOL",
                        format!("\"{}\" is not callable.", target),
                        statement.span,
                    ));
                };
                self.emit_user_call(&subroutine, 0, statement.span)?;
                self.op(Opcode::Pop);
            }
            StatementKind::Return(value) => {
                match value {
                    Some(value) => self.emit_expression(value)?,
                    None => self.op(Opcode::LoadImm(Immediate::Null)),
                }
                self.op(Opcode::Return);
            }
            StatementKind::Break => {
                let site = self.jump_placeholder(Opcode::Jump);
                match self.loop_exits.last_mut() {
                    Some(exits) => exits.push(site),
                    None => {
                        return Err(trap(
                            "EMIT_BREAK_OUTSIDE_LOOP",
                            "'break' is only valid inside while or select.",
                            statement.span,
                        ))
                    }
                }
            }
            StatementKind::Expression(expression) => {
                self.emit_expression(expression)?;
                self.op(Opcode::Pop);
            }
            StatementKind::DialogueBlock(block) => self.emit_dialogue(block)?,
            StatementKind::Empty => {}
        }
        Ok(())
    }

    fn close_loop(&mut self) -> EmitResult {
        let exits = self.loop_exits.pop().unwrap_or_default();
        for site in exits {
            self.patch_here(site)?;
        }
        Ok(())
    }

    fn emit_dialogue(&mut self, block: &DialogueBlock) -> EmitResult {
        let Some(symbol) = dialogue_symbol(self.table, block.id).cloned() else {
            return Err(trap(
                "EMIT_UNRESOLVED_SYMBOL",
                "Dialogue block was not declared.",
                block.span,
            ));
        };
        let offset = u16::try_from(self.code.len()).map_err(|_| {
            trap(
                "EMIT_CODE_TOO_LARGE",
                format!("Dialogue block \"{}\" starts past 64 KiB of code.", symbol.name),
                block.span,
            )
        })?;
        self.dialogue_blocks.push((
            symbol.local_index,
            DialogueBlockDef {
                name: symbol.name.clone(),
                offset,
            },
        ));
        self.op(Opcode::BeginDialogue(symbol.local_index));
        for part in &block.parts {
            match part {
                DialoguePart::Markup(content) => {
                    let token = self.intern(&content.to_string())?;
                    self.op(Opcode::PresentText(token));
                }
                DialoguePart::Statements(body) => self.emit_block(body)?,
            }
        }
        Ok(())
    }

    fn emit_expression(&mut self, expression: &Expression) -> EmitResult {
        match &expression.kind {
            ExpressionKind::Literal(literal) => {
                let immediate = match literal {
                    Literal::Null => Immediate::Null,
                    Literal::Boolean(value) => Immediate::Boolean(*value),
                    Literal::Number(value) => match integral(*value) {
                        Some(value) => Immediate::Integer(value),
                        None => Immediate::Float(*value),
                    },
                    Literal::DeltaNumber(value) => match integral(*value) {
                        Some(value) => Immediate::DeltaInteger(value),
                        None => Immediate::DeltaFloat(*value),
                    },
                    Literal::String(text) => Immediate::String(self.intern(text)?),
                };
                self.op(Opcode::LoadImm(immediate));
            }
            ExpressionKind::Identifier(name) => {
                self.emit_load(expression.id, name, expression.span)?;
            }
            ExpressionKind::Unary { operator, operand } => {
                self.emit_expression(operand)?;
                self.op(Opcode::Unary(*operator));
            }
            ExpressionKind::Binary {
                operator: BinaryOperator::LogicalAnd,
                left,
                right,
            } => self.emit_logical(left, right, Opcode::JumpIfFalse, false)?,
            ExpressionKind::Binary {
                operator: BinaryOperator::LogicalOr,
                left,
                right,
            } => self.emit_logical(left, right, Opcode::JumpIfTrue, true)?,
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                self.emit_expression(left)?;
                self.emit_expression(right)?;
                self.op(Opcode::Binary(*operator));
            }
            ExpressionKind::Assignment {
                target,
                operator,
                value,
            } => self.emit_assignment(target, *operator, value.as_deref())?,
            ExpressionKind::Call { callee, arguments } => {
                let symbol = self.reference(expression.id, callee, expression.span)?.clone();
                match symbol {
                    Symbol::BuiltInFunction(id) => {
                        let accepted = builtin_decl(id)
                            .map(|decl| decl.accepts(arguments.len()))
                            .unwrap_or(false);
                        let argc = u8::try_from(arguments.len()).ok().filter(|_| accepted);
                        let Some(argc) = argc else {
                            return Err(trap(
                                "EMIT_ARGUMENT_COUNT",
                                format!(
                                    "Built-in \"{}\" does not take {} argument(s).",
                                    callee,
                                    arguments.len()
                                ),
                                expression.span,
                            ));
                        };
                        for argument in arguments {
                            self.emit_expression(argument)?;
                        }
                        self.op(Opcode::Dispatch {
                            builtin: id.0,
                            argc,
                        });
                    }
                    other => {
                        let Some(subroutine) = other.as_subroutine() else {
                            return Err(trap(
                                "EMIT_UNRESOLVED_SYMBOL",
                                format!("\"{}\" is not callable.", callee),
                                expression.span,
                            ));
                        };
                        for argument in arguments {
                            self.emit_expression(argument)?;
                        }
                        self.emit_user_call(subroutine, arguments.len(), expression.span)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `&&` and `||` evaluate the right side only when needed and always
    /// leave a boolean.
    fn emit_logical(
        &mut self,
        left: &Expression,
        right: &Expression,
        branch: fn(i16) -> Opcode,
        short_value: bool,
    ) -> EmitResult {
        self.emit_expression(left)?;
        let first = self.jump_placeholder(branch);
        self.emit_expression(right)?;
        let second = self.jump_placeholder(branch);
        self.op(Opcode::LoadImm(Immediate::Boolean(!short_value)));
        let to_end = self.jump_placeholder(Opcode::Jump);
        self.patch_here(first)?;
        self.patch_here(second)?;
        self.op(Opcode::LoadImm(Immediate::Boolean(short_value)));
        self.patch_here(to_end)
    }

    fn emit_user_call(
        &mut self,
        subroutine: &SubroutineSymbol,
        argc: usize,
        span: SourceSpan,
    ) -> EmitResult {
        if subroutine.parameter_count != argc {
            return Err(trap(
                "EMIT_ARGUMENT_COUNT",
                format!(
                    "\"{}\" expects {} argument(s), got {}.",
                    subroutine.name, subroutine.parameter_count, argc
                ),
                span,
            ));
        }
        if subroutine.module == self.path {
            self.op(Opcode::Call(subroutine.index));
        } else {
            let import = self.builder.add_import(&subroutine.module)?;
            self.op(Opcode::CallFar {
                import,
                subroutine: subroutine.index,
            });
        }
        Ok(())
    }

    fn emit_load(&mut self, node: NodeId, name: &str, span: SourceSpan) -> EmitResult {
        let opcode = match self.reference(node, name, span)?.clone() {
            Symbol::Parameter(parameter) => Opcode::LoadArg(parameter.index),
            Symbol::GlobalVariable => Opcode::LoadVar(self.intern(name)?),
            Symbol::EnumValue(ConstantValue::EnumValue(constant)) => {
                Opcode::LoadImm(Immediate::Enum(constant.id()))
            }
            Symbol::EnumValue(ConstantValue::BuiltInConstant(constant)) => {
                Opcode::LoadImm(Immediate::Constant(constant.id()))
            }
            _ => {
                return Err(trap(
                    "EMIT_UNRESOLVED_SYMBOL",
                    format!("\"{}\" is not a value.", name),
                    span,
                ))
            }
        };
        self.op(opcode);
        Ok(())
    }

    fn emit_assignment(
        &mut self,
        target: &Expression,
        operator: AssignmentOperator,
        value: Option<&Expression>,
    ) -> EmitResult {
        let name = target.as_identifier().unwrap_or_default();
        let store = match self.reference(target.id, name, target.span)?.clone() {
            Symbol::Parameter(parameter) => Opcode::StoreArg(parameter.index),
            Symbol::GlobalVariable => Opcode::StoreVar(self.intern(name)?),
            _ => {
                return Err(trap(
                    "EMIT_UNRESOLVED_SYMBOL",
                    format!("\"{}\" cannot be assigned.", name),
                    target.span,
                ))
            }
        };

        if let Some(arithmetic) = operator.binary() {
            self.emit_load(target.id, name, target.span)?;
            match value {
                Some(value) => self.emit_expression(value)?,
                None => self.op(Opcode::LoadImm(Immediate::Integer(1))),
            }
            self.op(Opcode::Binary(arithmetic));
        } else if let Some(value) = value {
            self.emit_expression(value)?;
        } else {
            self.op(Opcode::LoadImm(Immediate::Null));
        }
        self.op(Opcode::Dup);
        self.op(store);
        Ok(())
    }
}

fn integral(value: f64) -> Option<i32> {
    if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}
