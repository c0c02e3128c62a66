use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ConstantValue {
    Null,
    Numeric(f64),
    DeltaNumeric(f64),
    String(String),
    Boolean(bool),
    EnumValue(EnumConstant),
    BuiltInConstant(BuiltInConstant),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("cannot convert {from} to {to}")]
    Conversion { from: &'static str, to: &'static str },
    #[error("operator {operator} is not defined for {left} and {right}")]
    Operator {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("division by zero")]
    DivisionByZero,
}

impl ConstantValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Numeric(_) => "numeric",
            Self::DeltaNumeric(_) => "delta",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::EnumValue(_) => "enum",
            Self::BuiltInConstant(_) => "constant",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_number(&self) -> Result<f64, ValueError> {
        match self {
            Self::Null => Ok(0.0),
            Self::Numeric(value) | Self::DeltaNumeric(value) => Ok(*value),
            Self::Boolean(value) => Ok(if *value { 1.0 } else { 0.0 }),
            Self::String(text) => text.trim().parse::<f64>().map_err(|_| self.conversion("numeric")),
            _ => Err(self.conversion("numeric")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Self::Null => Ok(false),
            Self::Numeric(value) | Self::DeltaNumeric(value) => Ok(*value != 0.0),
            Self::Boolean(value) => Ok(*value),
            Self::String(text) => match text.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.conversion("boolean")),
            },
            _ => Err(self.conversion("boolean")),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_easing(&self) -> Result<EasingFunction, ValueError> {
        match self {
            Self::Null => Ok(EasingFunction::Linear),
            Self::EnumValue(constant) => constant.easing().ok_or_else(|| self.conversion("easing")),
            _ => Err(self.conversion("easing")),
        }
    }

    pub fn as_entity_action(&self) -> Result<EntityAction, ValueError> {
        match self {
            Self::EnumValue(constant) => constant
                .entity_action()
                .ok_or_else(|| self.conversion("entity action")),
            _ => Err(self.conversion("entity action")),
        }
    }

    /// Text used when a value is concatenated or formatted into a string.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Numeric(value) => format_number(*value),
            Self::DeltaNumeric(value) => format!("@{}", format_number(*value)),
            Self::String(text) => text.clone(),
            Self::Boolean(value) => value.to_string(),
            Self::EnumValue(constant) => constant.name().to_string(),
            Self::BuiltInConstant(constant) => constant.name().to_string(),
        }
    }

    pub fn script_equals(&self, other: &ConstantValue) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::String(left), Self::String(right)) => left == right,
            (Self::EnumValue(left), Self::EnumValue(right)) => left == right,
            (Self::BuiltInConstant(left), Self::BuiltInConstant(right)) => left == right,
            (left, right) if left.is_numeric_like() && right.is_numeric_like() => {
                match (left.as_number(), right.as_number()) {
                    (Ok(left), Ok(right)) => left == right,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn is_numeric_like(&self) -> bool {
        matches!(
            self,
            Self::Numeric(_) | Self::DeltaNumeric(_) | Self::Boolean(_)
        )
    }

    fn conversion(&self, to: &'static str) -> ValueError {
        ValueError::Conversion {
            from: self.type_name(),
            to,
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::String(text) => write!(f, "\"{}\"", text),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LogicalAnd,
    LogicalOr,
}

const BINARY_OPERATORS: [BinaryOperator; 13] = [
    BinaryOperator::Add,
    BinaryOperator::Subtract,
    BinaryOperator::Multiply,
    BinaryOperator::Divide,
    BinaryOperator::Remainder,
    BinaryOperator::Equal,
    BinaryOperator::NotEqual,
    BinaryOperator::LessThan,
    BinaryOperator::LessThanOrEqual,
    BinaryOperator::GreaterThan,
    BinaryOperator::GreaterThanOrEqual,
    BinaryOperator::LogicalAnd,
    BinaryOperator::LogicalOr,
];

impl BinaryOperator {
    pub fn id(self) -> u8 {
        BINARY_OPERATORS
            .iter()
            .position(|op| *op == self)
            .map(|index| index as u8)
            .unwrap_or(u8::MAX)
    }

    pub fn from_id(id: u8) -> Option<Self> {
        BINARY_OPERATORS.get(id as usize).copied()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
        }
    }

    pub fn apply(
        self,
        left: &ConstantValue,
        right: &ConstantValue,
    ) -> Result<ConstantValue, ValueError> {
        use ConstantValue as V;
        match self {
            Self::Add => match (left, right) {
                (V::String(_), _) | (_, V::String(_)) => {
                    Ok(V::String(format!("{}{}", left.to_text(), right.to_text())))
                }
                _ => self.arithmetic(left, right, |a, b| Ok(a + b)),
            },
            Self::Subtract => self.arithmetic(left, right, |a, b| Ok(a - b)),
            Self::Multiply => self.arithmetic(left, right, |a, b| Ok(a * b)),
            Self::Divide => self.arithmetic(left, right, |a, b| {
                if b == 0.0 {
                    Err(ValueError::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            }),
            Self::Remainder => self.arithmetic(left, right, |a, b| {
                if b == 0.0 {
                    Err(ValueError::DivisionByZero)
                } else {
                    Ok(a % b)
                }
            }),
            Self::Equal => Ok(V::Boolean(left.script_equals(right))),
            Self::NotEqual => Ok(V::Boolean(!left.script_equals(right))),
            Self::LessThan => self.compare(left, right, |a, b| a < b),
            Self::LessThanOrEqual => self.compare(left, right, |a, b| a <= b),
            Self::GreaterThan => self.compare(left, right, |a, b| a > b),
            Self::GreaterThanOrEqual => self.compare(left, right, |a, b| a >= b),
            Self::LogicalAnd => Ok(V::Boolean(left.as_bool()? && right.as_bool()?)),
            Self::LogicalOr => Ok(V::Boolean(left.as_bool()? || right.as_bool()?)),
        }
    }

    fn arithmetic<F>(
        self,
        left: &ConstantValue,
        right: &ConstantValue,
        op: F,
    ) -> Result<ConstantValue, ValueError>
    where
        F: FnOnce(f64, f64) -> Result<f64, ValueError>,
    {
        let (a, b) = self.operands(left, right)?;
        let result = op(a, b)?;
        if matches!(left, ConstantValue::DeltaNumeric(_)) {
            Ok(ConstantValue::DeltaNumeric(result))
        } else {
            Ok(ConstantValue::Numeric(result))
        }
    }

    fn compare<F>(
        self,
        left: &ConstantValue,
        right: &ConstantValue,
        op: F,
    ) -> Result<ConstantValue, ValueError>
    where
        F: FnOnce(f64, f64) -> bool,
    {
        if let (ConstantValue::String(a), ConstantValue::String(b)) = (left, right) {
            let ordering = a.cmp(b);
            let (a, b) = (ordering as i8 as f64, 0.0);
            return Ok(ConstantValue::Boolean(op(a, b)));
        }
        let (a, b) = self.operands(left, right)?;
        Ok(ConstantValue::Boolean(op(a, b)))
    }

    fn operands(
        self,
        left: &ConstantValue,
        right: &ConstantValue,
    ) -> Result<(f64, f64), ValueError> {
        let mismatch = || ValueError::Operator {
            operator: self.symbol(),
            left: left.type_name(),
            right: right.type_name(),
        };
        let a = left.as_number().map_err(|_| mismatch())?;
        let b = right.as_number().map_err(|_| mismatch())?;
        Ok((a, b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Not,
}

impl UnaryOperator {
    pub fn id(self) -> u8 {
        match self {
            Self::Negate => 0,
            Self::Plus => 1,
            Self::Not => 2,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Negate),
            1 => Some(Self::Plus),
            2 => Some(Self::Not),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Negate => "-",
            Self::Plus => "+",
            Self::Not => "!",
        }
    }

    pub fn apply(self, operand: &ConstantValue) -> Result<ConstantValue, ValueError> {
        match (self, operand) {
            (Self::Not, value) => Ok(ConstantValue::Boolean(!value.as_bool()?)),
            (Self::Negate, ConstantValue::DeltaNumeric(value)) => {
                Ok(ConstantValue::DeltaNumeric(-value))
            }
            (Self::Plus, ConstantValue::DeltaNumeric(value)) => {
                Ok(ConstantValue::DeltaNumeric(*value))
            }
            (Self::Negate, value) => Ok(ConstantValue::Numeric(-value.as_number()?)),
            (Self::Plus, value) => Ok(ConstantValue::Numeric(value.as_number()?)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnumConstant {
    Linear,
    AxlAuto,
    Axl1,
    Axl2,
    Axl3,
    DxlAuto,
    Dxl1,
    Dxl2,
    Dxl3,
    Lock,
    UnLock,
    Play,
    Stop,
    Start,
    Disused,
    Erase,
    Enter,
    Leave,
    Pushed,
    Smoothing,
    Hide,
    Center,
    Middle,
    InBottom,
    OnTop,
    Left,
    Right,
    Top,
    Bottom,
    Se,
    Bgm,
    Voice,
}

pub const ENUM_CONSTANTS: [(EnumConstant, &str); 32] = [
    (EnumConstant::Linear, "Linear"),
    (EnumConstant::AxlAuto, "AxlAuto"),
    (EnumConstant::Axl1, "Axl1"),
    (EnumConstant::Axl2, "Axl2"),
    (EnumConstant::Axl3, "Axl3"),
    (EnumConstant::DxlAuto, "DxlAuto"),
    (EnumConstant::Dxl1, "Dxl1"),
    (EnumConstant::Dxl2, "Dxl2"),
    (EnumConstant::Dxl3, "Dxl3"),
    (EnumConstant::Lock, "Lock"),
    (EnumConstant::UnLock, "UnLock"),
    (EnumConstant::Play, "Play"),
    (EnumConstant::Stop, "Stop"),
    (EnumConstant::Start, "Start"),
    (EnumConstant::Disused, "Disused"),
    (EnumConstant::Erase, "Erase"),
    (EnumConstant::Enter, "Enter"),
    (EnumConstant::Leave, "Leave"),
    (EnumConstant::Pushed, "Pushed"),
    (EnumConstant::Smoothing, "Smoothing"),
    (EnumConstant::Hide, "Hide"),
    (EnumConstant::Center, "Center"),
    (EnumConstant::Middle, "Middle"),
    (EnumConstant::InBottom, "InBottom"),
    (EnumConstant::OnTop, "OnTop"),
    (EnumConstant::Left, "Left"),
    (EnumConstant::Right, "Right"),
    (EnumConstant::Top, "Top"),
    (EnumConstant::Bottom, "Bottom"),
    (EnumConstant::Se, "SE"),
    (EnumConstant::Bgm, "BGM"),
    (EnumConstant::Voice, "Voice"),
];

impl EnumConstant {
    pub fn id(self) -> u16 {
        ENUM_CONSTANTS
            .iter()
            .position(|(constant, _)| *constant == self)
            .map(|index| index as u16)
            .unwrap_or(u16::MAX)
    }

    pub fn from_id(id: u16) -> Option<Self> {
        ENUM_CONSTANTS.get(id as usize).map(|(constant, _)| *constant)
    }

    pub fn name(self) -> &'static str {
        ENUM_CONSTANTS
            .iter()
            .find(|(constant, _)| *constant == self)
            .map(|(_, name)| *name)
            .unwrap_or("?")
    }

    pub fn easing(self) -> Option<EasingFunction> {
        let easing = match self {
            Self::Linear => EasingFunction::Linear,
            Self::AxlAuto => EasingFunction::SineEaseIn,
            Self::Axl1 => EasingFunction::QuadraticEaseIn,
            Self::Axl2 => EasingFunction::CubicEaseIn,
            Self::Axl3 => EasingFunction::QuarticEaseIn,
            Self::DxlAuto => EasingFunction::SineEaseOut,
            Self::Dxl1 => EasingFunction::QuadraticEaseOut,
            Self::Dxl2 => EasingFunction::CubicEaseOut,
            Self::Dxl3 => EasingFunction::QuarticEaseOut,
            _ => return None,
        };
        Some(easing)
    }

    pub fn entity_action(self) -> Option<EntityAction> {
        let action = match self {
            Self::Lock => EntityAction::Lock,
            Self::UnLock => EntityAction::Unlock,
            Self::Play => EntityAction::Play,
            Self::Stop => EntityAction::Stop,
            Self::Start => EntityAction::Start,
            Self::Disused => EntityAction::Disused,
            Self::Erase => EntityAction::Erase,
            Self::Enter => EntityAction::Enter,
            Self::Leave => EntityAction::Leave,
            Self::Pushed => EntityAction::Pushed,
            Self::Smoothing => EntityAction::Smoothing,
            Self::Hide => EntityAction::Hide,
            _ => return None,
        };
        Some(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltInConstant {
    Black,
    White,
    Red,
    Green,
    Blue,
    Transparent,
    Infinite,
}

pub const BUILTIN_CONSTANTS: [(BuiltInConstant, &str); 7] = [
    (BuiltInConstant::Black, "Black"),
    (BuiltInConstant::White, "White"),
    (BuiltInConstant::Red, "Red"),
    (BuiltInConstant::Green, "Green"),
    (BuiltInConstant::Blue, "Blue"),
    (BuiltInConstant::Transparent, "Transparent"),
    (BuiltInConstant::Infinite, "Infinite"),
];

impl BuiltInConstant {
    pub fn id(self) -> u16 {
        BUILTIN_CONSTANTS
            .iter()
            .position(|(constant, _)| *constant == self)
            .map(|index| index as u16)
            .unwrap_or(u16::MAX)
    }

    pub fn from_id(id: u16) -> Option<Self> {
        BUILTIN_CONSTANTS.get(id as usize).map(|(constant, _)| *constant)
    }

    pub fn name(self) -> &'static str {
        BUILTIN_CONSTANTS
            .iter()
            .find(|(constant, _)| *constant == self)
            .map(|(_, name)| *name)
            .unwrap_or("?")
    }

    /// RGBA color, for the constants that name one.
    pub fn rgba(self) -> Option<u32> {
        match self {
            Self::Black => Some(0x0000_00ff),
            Self::White => Some(0xffff_ffff),
            Self::Red => Some(0xff00_00ff),
            Self::Green => Some(0x00ff_00ff),
            Self::Blue => Some(0x0000_ffff),
            Self::Transparent => Some(0),
            Self::Infinite => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EasingFunction {
    Linear,
    SineEaseIn,
    QuadraticEaseIn,
    CubicEaseIn,
    QuarticEaseIn,
    SineEaseOut,
    QuadraticEaseOut,
    CubicEaseOut,
    QuarticEaseOut,
}

impl EasingFunction {
    pub fn ease(self, progress: f64) -> f64 {
        let t = progress.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::SineEaseIn => 1.0 - (t * std::f64::consts::FRAC_PI_2).cos(),
            Self::QuadraticEaseIn => t.powi(2),
            Self::CubicEaseIn => t.powi(3),
            Self::QuarticEaseIn => t.powi(4),
            Self::SineEaseOut => (t * std::f64::consts::FRAC_PI_2).sin(),
            Self::QuadraticEaseOut => 1.0 - (1.0 - t).powi(2),
            Self::CubicEaseOut => 1.0 - (1.0 - t).powi(3),
            Self::QuarticEaseOut => 1.0 - (1.0 - t).powi(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityAction {
    Lock,
    Unlock,
    Play,
    Stop,
    Start,
    Disused,
    Erase,
    Enter,
    Leave,
    Pushed,
    Smoothing,
    Hide,
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn numeric_to_boolean_is_nonzero() {
        assert_eq!(ConstantValue::Numeric(0.0).as_bool(), Ok(false));
        assert_eq!(ConstantValue::Numeric(-3.0).as_bool(), Ok(true));
        assert_eq!(ConstantValue::Null.as_bool(), Ok(false));
        assert!(ConstantValue::EnumValue(EnumConstant::Lock).as_bool().is_err());
    }

    #[test]
    fn string_conversions_are_explicit() {
        assert_eq!(ConstantValue::String("12.5".to_string()).as_number(), Ok(12.5));
        let error = ConstantValue::String("abc".to_string())
            .as_number()
            .expect_err("non-numeric text should fail");
        assert_eq!(
            error,
            ValueError::Conversion {
                from: "string",
                to: "numeric"
            }
        );
    }

    #[test]
    fn add_concatenates_when_either_side_is_string() {
        let result = BinaryOperator::Add
            .apply(
                &ConstantValue::String("hp=".to_string()),
                &ConstantValue::Numeric(10.0),
            )
            .expect("add should pass");
        assert_eq!(result, ConstantValue::String("hp=10".to_string()));
    }

    #[test]
    fn delta_arithmetic_keeps_relative_flag() {
        let result = BinaryOperator::Multiply
            .apply(&ConstantValue::DeltaNumeric(5.0), &ConstantValue::Numeric(2.0))
            .expect("multiply should pass");
        assert_eq!(result, ConstantValue::DeltaNumeric(10.0));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let error = BinaryOperator::Divide
            .apply(&ConstantValue::Numeric(1.0), &ConstantValue::Numeric(0.0))
            .expect_err("division by zero should fail");
        assert_eq!(error, ValueError::DivisionByZero);
    }

    #[test]
    fn equality_is_defined_per_kind() {
        let eq = |a: ConstantValue, b: ConstantValue| a.script_equals(&b);
        assert!(eq(ConstantValue::Boolean(true), ConstantValue::Numeric(1.0)));
        assert!(eq(ConstantValue::Null, ConstantValue::Null));
        assert!(!eq(ConstantValue::Null, ConstantValue::Numeric(0.0)));
        assert!(!eq(
            ConstantValue::String("1".to_string()),
            ConstantValue::Numeric(1.0)
        ));
        assert!(eq(
            ConstantValue::EnumValue(EnumConstant::Axl1),
            ConstantValue::EnumValue(EnumConstant::Axl1)
        ));
    }

    #[test]
    fn comparing_enum_values_fails() {
        let error = BinaryOperator::LessThan
            .apply(
                &ConstantValue::EnumValue(EnumConstant::Lock),
                &ConstantValue::Numeric(1.0),
            )
            .expect_err("enum comparison should fail");
        assert!(matches!(error, ValueError::Operator { operator: "<", .. }));
    }

    #[test]
    fn operator_ids_round_trip() {
        for op in BINARY_OPERATORS {
            assert_eq!(BinaryOperator::from_id(op.id()), Some(op));
        }
        assert_eq!(BinaryOperator::from_id(200), None);
        assert_eq!(UnaryOperator::from_id(UnaryOperator::Not.id()), Some(UnaryOperator::Not));
    }

    #[test]
    fn enum_mapping_tables_cover_actions_and_easings() {
        assert_eq!(EnumConstant::UnLock.entity_action(), Some(EntityAction::Unlock));
        assert_eq!(EnumConstant::Dxl2.easing(), Some(EasingFunction::CubicEaseOut));
        assert_eq!(EnumConstant::Center.easing(), None);
        assert_eq!(EnumConstant::from_id(EnumConstant::Voice.id()), Some(EnumConstant::Voice));
        assert_eq!(EnumConstant::Bgm.name(), "BGM");
        assert_eq!(
            ConstantValue::Null.as_easing().expect("null easing"),
            EasingFunction::Linear
        );
    }

    #[test]
    fn easing_curves_hit_endpoints() {
        for easing in [
            EasingFunction::Linear,
            EasingFunction::SineEaseIn,
            EasingFunction::CubicEaseOut,
            EasingFunction::QuarticEaseIn,
        ] {
            assert!(easing.ease(0.0).abs() < 1e-9);
            assert!((easing.ease(1.0) - 1.0).abs() < 1e-9);
        }
        assert!(EasingFunction::QuadraticEaseIn.ease(0.5) < 0.5);
        assert!(EasingFunction::QuadraticEaseOut.ease(0.5) > 0.5);
    }

    #[test]
    fn to_text_formats_integral_numbers_without_fraction() {
        assert_eq!(ConstantValue::Numeric(42.0).to_text(), "42");
        assert_eq!(ConstantValue::Numeric(0.25).to_text(), "0.25");
        assert_eq!(ConstantValue::DeltaNumeric(100.0).to_text(), "@100");
        assert_eq!(BuiltInConstant::White.rgba(), Some(0xffff_ffff));
    }

    #[test]
    fn values_serialize_with_kind_tags() {
        let json = serde_json::to_string(&ConstantValue::Numeric(1.5)).expect("json");
        assert_eq!(json, r#"{"kind":"numeric","value":1.5}"#);
    }
}
