use std::collections::BTreeMap;
use std::sync::Arc;

use ns_core::{ConstantValue, NsError, NsxModule};
use tracing::trace;

use super::step::Flow;
use super::MAX_CALL_DEPTH;
use crate::thread::{Frame, ThreadContext};

/// Pushes a frame for `subroutine` of `module`, moving its arguments off the
/// operand stack.
pub(super) fn call(
    thread: &mut ThreadContext,
    module: &Arc<NsxModule>,
    subroutine: u16,
) -> Result<(), NsError> {
    if thread.frames.len() >= MAX_CALL_DEPTH {
        return Err(NsError::new(
            "VM_STACK_OVERFLOW",
            format!(
                "Thread {} exceeded {} nested calls.",
                thread.name, MAX_CALL_DEPTH
            ),
        ));
    }
    let arity = module.parameter_names(subroutine)?.len();
    let args = thread.pop_many(arity)?;
    trace!(
        thread = %thread.name,
        module = module.name(),
        subroutine,
        depth = thread.frames.len() + 1,
        "call"
    );
    thread.frames.push(Frame {
        module: Arc::clone(module),
        subroutine,
        ip: 0,
        args,
        stack_base: thread.stack.len(),
    });
    Ok(())
}

/// Calls into another module through the caller's import table.
pub(super) fn call_far(
    thread: &mut ThreadContext,
    modules: &BTreeMap<String, Arc<NsxModule>>,
    caller: &NsxModule,
    import: u16,
    subroutine: u16,
) -> Result<(), NsError> {
    let name = caller.import(import)?;
    let Some(target) = modules.get(name) else {
        return Err(NsError::new(
            "VM_MODULE_NOT_LOADED",
            format!("{} imports \"{}\", which is not loaded.", caller.name(), name),
        ));
    };
    call(thread, target, subroutine)
}

/// Leaves the current frame. The returned value is pushed for the caller;
/// leaving the outermost frame ends the thread.
pub(super) fn ret(thread: &mut ThreadContext) -> Result<Flow, NsError> {
    let base = thread
        .frames
        .last()
        .map(|frame| frame.stack_base)
        .unwrap_or(0);
    let value = if thread.stack.len() > base {
        thread.pop()?
    } else {
        ConstantValue::Null
    };
    thread.frames.pop();
    thread.stack.truncate(base);
    if thread.frames.is_empty() {
        thread.terminate();
        return Ok(Flow::Finished);
    }
    thread.stack.push(value);
    Ok(Flow::Continue)
}
