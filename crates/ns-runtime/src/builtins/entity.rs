use ns_core::{ConstantValue, EasingFunction, NsError};

use super::{millis, ArgumentStack, BuiltInContext};
use crate::host::{
    ColorRequest, Coordinate, Extent, LoadStatus, TextRequest, TextureRequest, Transition,
};

fn pop_coordinate(args: &mut ArgumentStack) -> Result<Coordinate, NsError> {
    match args.pop()? {
        ConstantValue::Numeric(value) => Ok(Coordinate::Absolute(value)),
        ConstantValue::DeltaNumeric(value) => Ok(Coordinate::Relative(value)),
        ConstantValue::EnumValue(anchor) => Ok(Coordinate::Anchor(anchor)),
        other => Err(args.type_error("a coordinate", &other)),
    }
}

fn pop_extent(args: &mut ArgumentStack) -> Result<Extent, NsError> {
    match args.pop()? {
        ConstantValue::Numeric(value) => Ok(Extent::Fixed(value)),
        ConstantValue::Null
        | ConstantValue::BuiltInConstant(ns_core::BuiltInConstant::Infinite) => {
            Ok(Extent::Unbounded)
        }
        other => Err(args.type_error("a size or Infinite", &other)),
    }
}

fn pop_color(args: &mut ArgumentStack) -> Result<u32, NsError> {
    let value = args.pop()?;
    let rgba = match &value {
        ConstantValue::BuiltInConstant(constant) => constant.rgba(),
        ConstantValue::Numeric(rgb) if *rgb >= 0.0 && *rgb <= f64::from(0x00ff_ffff) => {
            Some(((*rgb as u32) << 8) | 0xff)
        }
        ConstantValue::String(text) => parse_hex_color(text),
        _ => None,
    };
    rgba.ok_or_else(|| args.type_error("a color", &value))
}

/// `#rrggbb` or `#rrggbbaa`.
fn parse_hex_color(text: &str) -> Option<u32> {
    let digits = text.strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    match digits.len() {
        6 => Some((value << 8) | 0xff),
        8 => Some(value),
        _ => None,
    }
}

pub(super) fn pop_easing(args: &mut ArgumentStack) -> Result<EasingFunction, NsError> {
    match args.pop_enum_opt()? {
        None => Ok(EasingFunction::Linear),
        Some(constant) => constant
            .easing()
            .ok_or_else(|| args.type_error("an easing", &ConstantValue::EnumValue(constant))),
    }
}

fn priority(value: f64) -> i32 {
    value.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

pub(super) fn request(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let constant = args.pop_enum()?;
    let Some(action) = constant.entity_action() else {
        return Err(args.type_error("an entity action", &ConstantValue::EnumValue(constant)));
    };
    let name = args.pop_string()?;
    for entity in context.entities("Request", &name) {
        context.host.request(&entity, action);
    }
    Ok(ConstantValue::Null)
}

pub(super) fn delete(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let name = args.pop_string()?;
    for entity in context.entities("Delete", &name) {
        context.host.delete(&entity);
    }
    Ok(ConstantValue::Null)
}

pub(super) fn create_color(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let rgba = pop_color(args)?;
    let height = args.pop_number()?;
    let width = args.pop_number()?;
    let y = pop_coordinate(args)?;
    let x = pop_coordinate(args)?;
    let priority = priority(args.pop_number()?);
    let name = args.pop_string()?;
    context.host.create_color(ColorRequest {
        name,
        priority,
        x,
        y,
        width,
        height,
        rgba,
    });
    Ok(ConstantValue::Null)
}

pub(super) fn create_texture(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let source = args.pop_string()?;
    let y = pop_coordinate(args)?;
    let x = pop_coordinate(args)?;
    let priority = priority(args.pop_number()?);
    let name = args.pop_string()?;
    let status = context.host.create_texture(TextureRequest {
        name,
        priority,
        x,
        y,
        source,
    });
    if let LoadStatus::Pending(token) = status {
        context.await_host(token);
    }
    Ok(ConstantValue::Null)
}

pub(super) fn create_text(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let text = args.pop_coerced_string()?;
    let height = pop_extent(args)?;
    let width = pop_extent(args)?;
    let y = pop_coordinate(args)?;
    let x = pop_coordinate(args)?;
    let priority = priority(args.pop_number()?);
    let name = args.pop_string()?;
    context.host.create_text(TextRequest {
        name,
        priority,
        x,
        y,
        width,
        height,
        text,
    });
    Ok(ConstantValue::Null)
}

pub(super) fn fade(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let wait = args.pop_bool_or(false)?;
    let easing = pop_easing(args)?;
    let opacity = args.pop_number()?;
    let duration = millis(args.pop_number()?);
    let name = args.pop_string()?;
    for entity in context.entities("Fade", &name) {
        context.host.fade(&entity, duration, opacity, easing);
    }
    if wait {
        context.suspend_until(context.now.saturating_add(duration));
    }
    Ok(ConstantValue::Null)
}

pub(super) fn move_entity(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let wait = args.pop_bool_or(false)?;
    let easing = pop_easing(args)?;
    let y = pop_coordinate(args)?;
    let x = pop_coordinate(args)?;
    let duration = millis(args.pop_number()?);
    let name = args.pop_string()?;
    for entity in context.entities("Move", &name) {
        context.host.move_to(&entity, duration, x, y, easing);
    }
    if wait {
        context.suspend_until(context.now.saturating_add(duration));
    }
    Ok(ConstantValue::Null)
}

pub(super) fn zoom(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let wait = args.pop_bool_or(false)?;
    let easing = pop_easing(args)?;
    let scale_y = args.pop_number()?;
    let scale_x = args.pop_number()?;
    let duration = millis(args.pop_number()?);
    let name = args.pop_string()?;
    for entity in context.entities("Zoom", &name) {
        context.host.zoom(&entity, duration, scale_x, scale_y, easing);
    }
    if wait {
        context.suspend_until(context.now.saturating_add(duration));
    }
    Ok(ConstantValue::Null)
}

/// Waits for the transition unless `wait` is explicitly false.
pub(super) fn draw_transition(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let wait = args.pop_bool_or(true)?;
    let mask = args.pop_string_opt()?;
    let easing = pop_easing(args)?;
    let feather = args.pop_number()?;
    let end = args.pop_number()?;
    let start = args.pop_number()?;
    let duration = millis(args.pop_number()?);
    let name = args.pop_string()?;
    for entity in context.entities("DrawTransition", &name) {
        context.host.transition(
            &entity,
            Transition {
                duration_ms: duration,
                start,
                end,
                feather,
                easing,
                mask: mask.clone(),
            },
        );
    }
    if wait {
        context.suspend_until(context.now.saturating_add(duration));
    }
    Ok(ConstantValue::Null)
}

pub(super) fn set_alias(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let alias = args.pop_string()?;
    let name = args.pop_string()?;
    context.host.set_alias(&name, &alias);
    Ok(ConstantValue::Null)
}

fn texture_size(
    context: &BuiltInContext<'_>,
    builtin: &str,
    name: &str,
) -> Option<(u32, u32)> {
    context
        .entities(builtin, name)
        .first()
        .and_then(|entity| context.host.texture_size(entity))
}

pub(super) fn image_horizon(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let name = args.pop_string()?;
    let width = texture_size(context, "ImageHorizon", &name).map_or(0, |(width, _)| width);
    Ok(ConstantValue::Numeric(f64::from(width)))
}

pub(super) fn image_vertical(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let name = args.pop_string()?;
    let height = texture_size(context, "ImageVertical", &name).map_or(0, |(_, height)| height);
    Ok(ConstantValue::Numeric(f64::from(height)))
}

#[cfg(test)]
mod entity_tests {
    use super::*;
    use ns_core::{BuiltInConstant, EnumConstant};

    #[test]
    fn coordinates_follow_literal_kind() {
        let mut args = ArgumentStack::new(
            "Move",
            vec![
                ConstantValue::Numeric(10.0),
                ConstantValue::DeltaNumeric(-5.0),
                ConstantValue::EnumValue(EnumConstant::Center),
            ],
        );
        assert_eq!(
            pop_coordinate(&mut args).expect("anchor"),
            Coordinate::Anchor(EnumConstant::Center)
        );
        assert_eq!(pop_coordinate(&mut args).expect("delta"), Coordinate::Relative(-5.0));
        assert_eq!(pop_coordinate(&mut args).expect("number"), Coordinate::Absolute(10.0));
    }

    #[test]
    fn colors_accept_constants_numbers_and_hex() {
        let mut args = ArgumentStack::new(
            "CreateColor",
            vec![
                ConstantValue::String("#10203040".to_string()),
                ConstantValue::String("#102030".to_string()),
                ConstantValue::Numeric(f64::from(0x00ff00)),
                ConstantValue::BuiltInConstant(BuiltInConstant::White),
            ],
        );
        assert_eq!(pop_color(&mut args).expect("constant"), 0xffff_ffff);
        assert_eq!(pop_color(&mut args).expect("number"), 0x00ff_00ff);
        assert_eq!(pop_color(&mut args).expect("hex"), 0x1020_30ff);
        assert_eq!(pop_color(&mut args).expect("hex with alpha"), 0x1020_3040);

        let mut args = ArgumentStack::new(
            "CreateColor",
            vec![ConstantValue::BuiltInConstant(BuiltInConstant::Infinite)],
        );
        assert_eq!(pop_color(&mut args).expect_err("no color").code, "VM_ARGUMENT_TYPE");
    }

    #[test]
    fn non_easing_enum_is_rejected() {
        let mut args =
            ArgumentStack::new("Fade", vec![ConstantValue::EnumValue(EnumConstant::Lock)]);
        assert_eq!(pop_easing(&mut args).expect_err("lock").code, "VM_ARGUMENT_TYPE");
        let mut args = ArgumentStack::new("Fade", vec![ConstantValue::Null]);
        assert_eq!(pop_easing(&mut args).expect("null"), EasingFunction::Linear);
    }

    #[test]
    fn infinite_extent_is_unbounded() {
        let mut args = ArgumentStack::new(
            "CreateText",
            vec![
                ConstantValue::Numeric(200.0),
                ConstantValue::BuiltInConstant(BuiltInConstant::Infinite),
            ],
        );
        assert_eq!(pop_extent(&mut args).expect("infinite"), Extent::Unbounded);
        assert_eq!(pop_extent(&mut args).expect("fixed"), Extent::Fixed(200.0));
    }
}
