use std::collections::HashMap;

use crate::value::{ConstantValue, BUILTIN_CONSTANTS, ENUM_CONSTANTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuiltInId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Number,
    String,
    Bool,
    Enum,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub optional: bool,
}

const fn arg(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        optional: false,
    }
}

const fn opt(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        optional: true,
    }
}

/// Declarative signature of a host-implemented built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltInDecl {
    pub name: &'static str,
    pub params: &'static [ArgSpec],
    pub variadic: bool,
}

impl BuiltInDecl {
    const fn fixed(name: &'static str, params: &'static [ArgSpec]) -> Self {
        Self {
            name,
            params,
            variadic: false,
        }
    }

    const fn variadic(name: &'static str, params: &'static [ArgSpec]) -> Self {
        Self {
            name,
            params,
            variadic: true,
        }
    }

    pub fn min_args(&self) -> usize {
        self.params.iter().filter(|param| !param.optional).count()
    }

    pub fn max_args(&self) -> Option<usize> {
        if self.variadic {
            None
        } else {
            Some(self.params.len())
        }
    }

    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.min_args() && self.max_args().map_or(true, |max| argc <= max)
    }

    /// Optional parameters must trail required ones.
    pub fn is_well_formed(&self) -> bool {
        let first_optional = self.params.iter().position(|param| param.optional);
        match first_optional {
            Some(index) => self.params[index..].iter().all(|param| param.optional),
            None => true,
        }
    }
}

use ArgKind::{Any, Bool, Enum, Number, String as Str};

pub const BUILTIN_DECLS: &[BuiltInDecl] = &[
    BuiltInDecl::fixed("Wait", &[arg("duration", Number)]),
    BuiltInDecl::fixed("WaitKey", &[opt("timeout", Number)]),
    BuiltInDecl::fixed("CreateProcess", &[arg("name", Str), arg("function", Str)]),
    BuiltInDecl::fixed("Request", &[arg("name", Str), arg("action", Enum)]),
    BuiltInDecl::fixed("Delete", &[arg("name", Str)]),
    BuiltInDecl::fixed(
        "CreateColor",
        &[
            arg("name", Str),
            arg("priority", Number),
            arg("x", Any),
            arg("y", Any),
            arg("width", Number),
            arg("height", Number),
            arg("color", Any),
        ],
    ),
    BuiltInDecl::fixed(
        "CreateTexture",
        &[
            arg("name", Str),
            arg("priority", Number),
            arg("x", Any),
            arg("y", Any),
            arg("source", Str),
        ],
    ),
    BuiltInDecl::fixed(
        "CreateText",
        &[
            arg("name", Str),
            arg("priority", Number),
            arg("x", Any),
            arg("y", Any),
            arg("width", Any),
            arg("height", Any),
            arg("text", Any),
        ],
    ),
    BuiltInDecl::fixed(
        "CreateSound",
        &[arg("name", Str), arg("kind", Enum), arg("file", Str)],
    ),
    BuiltInDecl::fixed(
        "SetVolume",
        &[arg("name", Str), arg("duration", Number), arg("volume", Number)],
    ),
    BuiltInDecl::fixed("SetLoop", &[arg("name", Str), arg("looping", Bool)]),
    BuiltInDecl::fixed(
        "SetLoopPoint",
        &[arg("name", Str), arg("start", Number), arg("end", Number)],
    ),
    BuiltInDecl::fixed(
        "Fade",
        &[
            arg("name", Str),
            arg("duration", Number),
            arg("opacity", Number),
            opt("easing", Enum),
            opt("wait", Bool),
        ],
    ),
    BuiltInDecl::fixed(
        "Move",
        &[
            arg("name", Str),
            arg("duration", Number),
            arg("x", Any),
            arg("y", Any),
            opt("easing", Enum),
            opt("wait", Bool),
        ],
    ),
    BuiltInDecl::fixed(
        "Zoom",
        &[
            arg("name", Str),
            arg("duration", Number),
            arg("scale_x", Number),
            arg("scale_y", Number),
            opt("easing", Enum),
            opt("wait", Bool),
        ],
    ),
    BuiltInDecl::fixed(
        "DrawTransition",
        &[
            arg("name", Str),
            arg("duration", Number),
            arg("start", Number),
            arg("end", Number),
            arg("feather", Number),
            opt("easing", Enum),
            opt("mask", Str),
            opt("wait", Bool),
        ],
    ),
    BuiltInDecl::fixed("SetAlias", &[arg("name", Str), arg("alias", Str)]),
    BuiltInDecl::fixed("RemainTime", &[arg("name", Str)]),
    BuiltInDecl::fixed("PassageTime", &[arg("name", Str)]),
    BuiltInDecl::fixed("ImageHorizon", &[arg("name", Str)]),
    BuiltInDecl::fixed("ImageVertical", &[arg("name", Str)]),
    BuiltInDecl::fixed("Random", &[arg("max", Number)]),
    BuiltInDecl::variadic("String", &[arg("format", Str)]),
    BuiltInDecl::fixed("Time", &[]),
    BuiltInDecl::fixed("MouseClicked", &[]),
];

pub fn builtin_decl(id: BuiltInId) -> Option<&'static BuiltInDecl> {
    BUILTIN_DECLS.get(id.0 as usize)
}

/// Read-only name tables for built-in functions and constants, built once and
/// shared by reference between the binder and the VM.
#[derive(Debug, Clone)]
pub struct StaticSymbolTable {
    functions: HashMap<&'static str, BuiltInId>,
    constants: HashMap<&'static str, ConstantValue>,
}

impl StaticSymbolTable {
    pub fn new() -> Self {
        let functions = BUILTIN_DECLS
            .iter()
            .enumerate()
            .map(|(index, decl)| (decl.name, BuiltInId(index as u16)))
            .collect();

        let mut constants = HashMap::new();
        for (constant, name) in ENUM_CONSTANTS {
            constants.insert(name, ConstantValue::EnumValue(constant));
        }
        for (constant, name) in BUILTIN_CONSTANTS {
            constants.insert(name, ConstantValue::BuiltInConstant(constant));
        }

        Self {
            functions,
            constants,
        }
    }

    pub fn builtin(&self, name: &str) -> Option<BuiltInId> {
        self.functions.get(name).copied()
    }

    pub fn constant(&self, name: &str) -> Option<&ConstantValue> {
        self.constants.get(name)
    }

    pub fn builtin_count(&self) -> usize {
        self.functions.len()
    }
}

impl Default for StaticSymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod builtins_tests {
    use super::*;
    use crate::value::{BuiltInConstant, EnumConstant};

    #[test]
    fn declarations_have_unique_names_and_valid_shapes() {
        let table = StaticSymbolTable::new();
        assert_eq!(table.builtin_count(), BUILTIN_DECLS.len());
        assert!(BUILTIN_DECLS.iter().all(BuiltInDecl::is_well_formed));
    }

    #[test]
    fn lookup_returns_stable_ids() {
        let table = StaticSymbolTable::new();
        let wait = table.builtin("Wait").expect("Wait should exist");
        assert_eq!(builtin_decl(wait).map(|decl| decl.name), Some("Wait"));
        assert!(table.builtin("wait").is_none());
    }

    #[test]
    fn arity_accounts_for_optional_and_variadic_params() {
        let table = StaticSymbolTable::new();
        let fade = builtin_decl(table.builtin("Fade").expect("Fade")).expect("decl");
        assert_eq!(fade.min_args(), 3);
        assert!(fade.accepts(5));
        assert!(!fade.accepts(6));

        let string = builtin_decl(table.builtin("String").expect("String")).expect("decl");
        assert!(string.accepts(12));
        assert!(!string.accepts(0));
    }

    #[test]
    fn constants_cover_enums_and_builtin_constants() {
        let table = StaticSymbolTable::new();
        assert_eq!(
            table.constant("Axl2"),
            Some(&ConstantValue::EnumValue(EnumConstant::Axl2))
        );
        assert_eq!(
            table.constant("Black"),
            Some(&ConstantValue::BuiltInConstant(BuiltInConstant::Black))
        );
        assert!(table.constant("box01").is_none());
    }
}
