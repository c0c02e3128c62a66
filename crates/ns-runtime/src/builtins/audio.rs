use ns_core::{ConstantValue, EnumConstant, NsError};

use super::{millis, ArgumentStack, BuiltInContext};
use crate::host::{LoadStatus, SoundKind, SoundRequest};

fn sound_kind(constant: EnumConstant) -> Option<SoundKind> {
    match constant {
        EnumConstant::Se => Some(SoundKind::Effect),
        EnumConstant::Bgm => Some(SoundKind::Music),
        EnumConstant::Voice => Some(SoundKind::Voice),
        _ => None,
    }
}

pub(super) fn create_sound(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let file = args.pop_string()?;
    let constant = args.pop_enum()?;
    let Some(kind) = sound_kind(constant) else {
        return Err(args.type_error("SE, BGM or Voice", &ConstantValue::EnumValue(constant)));
    };
    let name = args.pop_string()?;
    if let LoadStatus::Pending(token) = context.host.create_sound(SoundRequest { name, kind, file })
    {
        context.await_host(token);
    }
    Ok(ConstantValue::Null)
}

pub(super) fn set_volume(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let volume = args.pop_number()?;
    let duration = millis(args.pop_number()?);
    let name = args.pop_string()?;
    for entity in context.entities("SetVolume", &name) {
        context.host.set_volume(&entity, duration, volume);
    }
    Ok(ConstantValue::Null)
}

pub(super) fn set_loop(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let looping = args.pop_coerced_bool()?;
    let name = args.pop_string()?;
    for entity in context.entities("SetLoop", &name) {
        context.host.set_loop(&entity, looping);
    }
    Ok(ConstantValue::Null)
}

pub(super) fn set_loop_point(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let end = millis(args.pop_number()?);
    let start = millis(args.pop_number()?);
    let name = args.pop_string()?;
    if end != 0 && end < start {
        return Err(NsError::new(
            "VM_ARGUMENT_RANGE",
            format!("SetLoopPoint: end {} precedes start {}.", end, start),
        ));
    }
    for entity in context.entities("SetLoopPoint", &name) {
        context.host.set_loop_point(&entity, start, end);
    }
    Ok(ConstantValue::Null)
}

/// Milliseconds left to play; zero for unknown or finished sounds.
pub(super) fn remain_time(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let name = args.pop_string()?;
    let remaining = context
        .entities("RemainTime", &name)
        .first()
        .and_then(|entity| context.host.remaining_time(entity))
        .unwrap_or(0);
    Ok(ConstantValue::Numeric(remaining as f64))
}

pub(super) fn passage_time(
    context: &mut BuiltInContext<'_>,
    args: &mut ArgumentStack,
) -> Result<ConstantValue, NsError> {
    let name = args.pop_string()?;
    let elapsed = context
        .entities("PassageTime", &name)
        .first()
        .and_then(|entity| context.host.passage_time(entity))
        .unwrap_or(0);
    Ok(ConstantValue::Numeric(elapsed as f64))
}
