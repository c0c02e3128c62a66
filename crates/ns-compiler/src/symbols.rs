use std::collections::HashMap;

use indexmap::IndexMap;
use ns_core::{BuiltInId, ConstantValue, SubroutineKind};
use ns_parser::NodeId;

/// What a name in the source resolved to. Compiler symbols live for one
/// compilation only; built-ins and constants come from the static table.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    SourceFile(String),
    MergedSourceFile(Vec<String>),
    Chapter(SubroutineSymbol),
    Scene(SubroutineSymbol),
    Function(SubroutineSymbol),
    DialogueBlock(DialogueBlockSymbol),
    Parameter(ParameterSymbol),
    BuiltInFunction(BuiltInId),
    GlobalVariable,
    EnumValue(ConstantValue),
}

impl Symbol {
    pub fn as_subroutine(&self) -> Option<&SubroutineSymbol> {
        match self {
            Self::Chapter(symbol) | Self::Scene(symbol) | Self::Function(symbol) => Some(symbol),
            Self::DialogueBlock(block) => block.subroutine.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineSymbol {
    /// Module that owns the subroutine (its source path).
    pub module: String,
    pub name: String,
    pub kind: SubroutineKind,
    /// Index into the owning module's subroutine table.
    pub index: u16,
    pub parameter_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueBlockSymbol {
    pub name: String,
    pub box_name: String,
    /// Position within the enclosing subroutine's dialogue table.
    pub local_index: u16,
    /// Set for top-level dialogue blocks, which compile to their own subroutine.
    pub subroutine: Option<SubroutineSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSymbol {
    pub name: String,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberEntry {
    pub node: NodeId,
    pub kind: SubroutineKind,
    pub symbol: Symbol,
}

/// Names local to one subroutine body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub parameters: IndexMap<String, ParameterSymbol>,
    pub dialogue_blocks: IndexMap<String, DialogueBlockSymbol>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFileSymbol {
    pub path: String,
    pub includes: Vec<String>,
    /// Members in declaration order; the position is the subroutine index.
    pub members: IndexMap<String, MemberEntry>,
    pub scopes: HashMap<NodeId, Scope>,
    /// Symbol declared by each member or inline dialogue block node.
    pub declarations: HashMap<NodeId, Symbol>,
}

impl SourceFileSymbol {
    pub fn member(&self, name: &str) -> Option<&MemberEntry> {
        self.members.get(name)
    }

    pub fn first_chapter(&self) -> Option<&MemberEntry> {
        self.members
            .values()
            .find(|entry| entry.kind == SubroutineKind::Chapter)
    }

    pub fn scope(&self, member: NodeId) -> Option<&Scope> {
        self.scopes.get(&member)
    }
}
