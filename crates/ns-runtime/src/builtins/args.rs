use ns_core::{ConstantValue, EnumConstant, NsError};

/// Arguments of one built-in call. The last syntactic argument is on top, so
/// implementations pop parameters in reverse declaration order. Omitted
/// optional parameters are present as `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentStack {
    builtin: &'static str,
    values: Vec<ConstantValue>,
}

impl ArgumentStack {
    pub fn new(builtin: &'static str, values: Vec<ConstantValue>) -> Self {
        Self { builtin, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn pop(&mut self) -> Result<ConstantValue, NsError> {
        self.values.pop().ok_or_else(|| {
            NsError::new(
                "VM_ARGUMENT_MISSING",
                format!("{} received too few arguments.", self.builtin),
            )
        })
    }

    /// Removes every remaining argument, in call order.
    pub fn drain(&mut self) -> Vec<ConstantValue> {
        std::mem::take(&mut self.values)
    }

    pub(crate) fn type_error(&self, expected: &str, found: &ConstantValue) -> NsError {
        NsError::new(
            "VM_ARGUMENT_TYPE",
            format!(
                "{} expected {} but got {} ({}).",
                self.builtin,
                expected,
                found.type_name(),
                found
            ),
        )
    }

    fn pop_nullable(&mut self) -> Option<ConstantValue> {
        match self.values.pop() {
            Some(ConstantValue::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    pub fn pop_number(&mut self) -> Result<f64, NsError> {
        match self.pop()? {
            ConstantValue::Numeric(value) | ConstantValue::DeltaNumeric(value) => Ok(value),
            other => Err(self.type_error("a number", &other)),
        }
    }

    pub fn pop_string(&mut self) -> Result<String, NsError> {
        match self.pop()? {
            ConstantValue::String(text) => Ok(text),
            other => Err(self.type_error("a string", &other)),
        }
    }

    pub fn pop_bool(&mut self) -> Result<bool, NsError> {
        match self.pop()? {
            ConstantValue::Boolean(value) => Ok(value),
            other => Err(self.type_error("a boolean", &other)),
        }
    }

    pub fn pop_enum(&mut self) -> Result<EnumConstant, NsError> {
        match self.pop()? {
            ConstantValue::EnumValue(constant) => Ok(constant),
            other => Err(self.type_error("an enum constant", &other)),
        }
    }

    pub fn pop_number_or(&mut self, default: f64) -> Result<f64, NsError> {
        match self.pop_nullable() {
            None => Ok(default),
            Some(ConstantValue::Numeric(value)) | Some(ConstantValue::DeltaNumeric(value)) => {
                Ok(value)
            }
            Some(other) => Err(self.type_error("a number or null", &other)),
        }
    }

    pub fn pop_string_opt(&mut self) -> Result<Option<String>, NsError> {
        match self.pop_nullable() {
            None => Ok(None),
            Some(ConstantValue::String(text)) => Ok(Some(text)),
            Some(other) => Err(self.type_error("a string or null", &other)),
        }
    }

    pub fn pop_bool_or(&mut self, default: bool) -> Result<bool, NsError> {
        match self.pop_nullable() {
            None => Ok(default),
            Some(ConstantValue::Boolean(value)) => Ok(value),
            Some(other) => Err(self.type_error("a boolean or null", &other)),
        }
    }

    pub fn pop_enum_opt(&mut self) -> Result<Option<EnumConstant>, NsError> {
        match self.pop_nullable() {
            None => Ok(None),
            Some(ConstantValue::EnumValue(constant)) => Ok(Some(constant)),
            Some(other) => Err(self.type_error("an enum constant or null", &other)),
        }
    }

    pub fn pop_coerced_number(&mut self) -> Result<f64, NsError> {
        let value = self.pop()?;
        value
            .as_number()
            .map_err(|_| self.type_error("something convertible to a number", &value))
    }

    pub fn pop_coerced_string(&mut self) -> Result<String, NsError> {
        Ok(self.pop()?.to_text())
    }

    pub fn pop_coerced_bool(&mut self) -> Result<bool, NsError> {
        let value = self.pop()?;
        value
            .as_bool()
            .map_err(|_| self.type_error("something convertible to a boolean", &value))
    }
}

#[cfg(test)]
mod args_tests {
    use super::*;

    fn stack(values: Vec<ConstantValue>) -> ArgumentStack {
        ArgumentStack::new("Test", values)
    }

    #[test]
    fn last_argument_is_on_top() {
        let mut args = stack(vec![
            ConstantValue::String("bg".to_string()),
            ConstantValue::Numeric(500.0),
        ]);
        assert_eq!(args.pop_number().expect("number on top"), 500.0);
        assert_eq!(args.pop_string().expect("string below"), "bg");
        assert!(args.is_empty());
        assert_eq!(args.pop().expect_err("empty").code, "VM_ARGUMENT_MISSING");
    }

    #[test]
    fn null_is_accepted_only_by_nullable_pops() {
        let mut args = stack(vec![ConstantValue::Null, ConstantValue::Null]);
        assert_eq!(args.pop_string_opt().expect("null allowed"), None);
        let error = args.pop_string().expect_err("null rejected");
        assert_eq!(error.code, "VM_ARGUMENT_TYPE");

        let mut args = stack(Vec::new());
        assert_eq!(args.pop_number_or(3.0).expect("missing uses default"), 3.0);
        assert!(args.pop_bool_or(true).expect("missing uses default"));
        assert_eq!(args.pop_enum_opt().expect("missing is none"), None);
    }

    #[test]
    fn exact_pops_reject_other_types() {
        let mut args = stack(vec![ConstantValue::String("12".to_string())]);
        let error = args.pop_number().expect_err("string is not a number");
        assert_eq!(error.code, "VM_ARGUMENT_TYPE");
        assert!(error.message.contains("Test expected a number"));
    }

    #[test]
    fn coercing_pops_convert() {
        let mut args = stack(vec![
            ConstantValue::Boolean(true),
            ConstantValue::Numeric(0.0),
            ConstantValue::String("12".to_string()),
        ]);
        assert_eq!(args.pop_coerced_number().expect("numeric string"), 12.0);
        assert!(!args.pop_coerced_bool().expect("zero is false"));
        assert_eq!(args.pop_coerced_string().expect("any value"), "true");

        let mut args = stack(vec![ConstantValue::EnumValue(EnumConstant::Linear)]);
        assert_eq!(
            args.pop_coerced_number().expect_err("enum has no number").code,
            "VM_ARGUMENT_TYPE"
        );
    }
}
