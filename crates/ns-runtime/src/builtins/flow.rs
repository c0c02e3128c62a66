use std::sync::{Arc, OnceLock};

use ns_core::{format_number, ConstantValue, NsError};
use regex::Regex;

use super::{millis, ArgumentStack, BuiltInContext, SpawnRequest};

pub(super) fn wait(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let duration = millis(args.pop_number()?);
    context.suspend_until(context.now.saturating_add(duration));
    Ok(ConstantValue::Null)
}

pub(super) fn wait_key(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let timeout = match args.pop()? {
        ConstantValue::Null => None,
        ConstantValue::Numeric(value) | ConstantValue::DeltaNumeric(value) => Some(millis(value)),
        other => return Err(args.type_error("a number or null", &other)),
    };
    context.suspend_for_input(timeout.map(|timeout| context.now.saturating_add(timeout)));
    Ok(ConstantValue::Null)
}

pub(super) fn create_process(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let function = args.pop_string()?;
    let name = args.pop_string()?;
    let Some(subroutine) = context.module.find_subroutine(&function) else {
        return Err(NsError::new(
            "VM_FUNCTION_NOT_FOUND",
            format!(
                "CreateProcess: \"{}\" is not defined in {}.",
                function,
                context.module.name()
            ),
        ));
    };
    context.spawn(SpawnRequest {
        name,
        module: Arc::clone(context.module),
        subroutine,
    });
    Ok(ConstantValue::Null)
}

pub(super) fn random(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let max = args.pop_coerced_number()?;
    let bound = if max.is_finite() && max >= 1.0 {
        max.min(u32::MAX as f64) as u32
    } else {
        0
    };
    Ok(ConstantValue::Numeric(f64::from(context.rng.below(bound))))
}

pub(super) fn time(
    context: &mut BuiltInContext<'_>,
    _args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    Ok(ConstantValue::Numeric(context.now as f64))
}

pub(super) fn mouse_clicked(
    context: &mut BuiltInContext<'_>,
    _args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    Ok(ConstantValue::Boolean(context.host.input().mouse_clicked))
}

fn directive_regex() -> &'static Regex {
    static DIRECTIVE: OnceLock<Regex> = OnceLock::new();
    DIRECTIVE.get_or_init(|| {
        Regex::new(r"%(-)?(0)?(\d+)?(?:\.(\d+))?([dsfxX%])").expect("format regex must compile")
    })
}

/// `String(format, args...)`: printf-style `%d %s %f %x` with optional flags,
/// width and precision. Surplus directives render as empty text.
pub(super) fn format_string(
    _context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let mut values = args.drain().into_iter();
    let format = match values.next() {
        Some(ConstantValue::String(format)) => format,
        Some(other) => other.to_text(),
        None => String::new(),
    };

    let mut out = String::new();
    let mut last = 0usize;
    for caps in directive_regex().captures_iter(&format) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&format[last..whole.start()]);
        last = whole.end();

        let conversion = caps.get(5).map(|m| m.as_str()).unwrap_or("s");
        if conversion == "%" {
            out.push('%');
            continue;
        }
        let value = values.next().unwrap_or(ConstantValue::Null);
        let left = caps.get(1).is_some();
        let zero = caps.get(2).is_some();
        let width = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(0);
        let precision = caps.get(4).and_then(|m| m.as_str().parse::<usize>().ok());

        let number = value.as_number().ok();
        let body = match (conversion, number) {
            ("d", Some(number)) => format!("{}", number.trunc() as i64),
            ("f", Some(number)) => format!("{:.*}", precision.unwrap_or(6), number),
            ("x", Some(number)) => format!("{:x}", number.trunc() as i64),
            ("X", Some(number)) => format!("{:X}", number.trunc() as i64),
            (_, Some(number)) if !matches!(value, ConstantValue::String(_)) && conversion != "s" => {
                format_number(number)
            }
            _ => value.to_text(),
        };
        out.push_str(&pad(&body, width, left, zero && conversion != "s"));
    }
    out.push_str(&format[last..]);
    Ok(ConstantValue::String(out))
}

fn pad(body: &str, width: usize, left: bool, zero: bool) -> String {
    let length = body.chars().count();
    if length >= width {
        return body.to_string();
    }
    let fill = width - length;
    if left {
        format!("{}{}", body, " ".repeat(fill))
    } else if zero {
        match body.strip_prefix('-') {
            Some(digits) => format!("-{}{}", "0".repeat(fill), digits),
            None => format!("{}{}", "0".repeat(fill), body),
        }
    } else {
        format!("{}{}", " ".repeat(fill), body)
    }
}

#[cfg(test)]
mod flow_tests {
    use super::*;

    #[test]
    fn padding_handles_sign_and_alignment() {
        assert_eq!(pad("-7", 4, false, true), "-007");
        assert_eq!(pad("ab", 4, true, false), "ab  ");
        assert_eq!(pad("ab", 4, false, false), "  ab");
        assert_eq!(pad("abcdef", 3, false, false), "abcdef");
    }
}
