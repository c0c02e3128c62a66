use std::collections::BTreeMap;
use std::sync::Arc;

use ns_core::{
    BuiltInConstant, BuiltInId, ConstantValue, EnumConstant, Immediate, NsError, NsxModule,
    Opcode,
};
use tracing::{debug, error, trace};

use super::{ThreadError, Vm};
use crate::builtins::{BuiltInContext, BuiltInRegistry, SpawnRequest};
use crate::host::EngineHost;
use crate::rng::ScriptRng;
use crate::thread::{ThreadContext, ThreadState};

/// What the scheduler does after one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Flow {
    Continue,
    /// The thread gave up the rest of its slice.
    Yield,
    Finished,
}

/// Borrowed VM state an instruction may touch besides its own thread.
pub(super) struct StepEnv<'a> {
    pub(super) host: &'a mut dyn EngineHost,
    pub(super) modules: &'a BTreeMap<String, Arc<NsxModule>>,
    pub(super) registry: &'a BuiltInRegistry,
    pub(super) rng: &'a mut ScriptRng,
    pub(super) spawns: &'a mut Vec<SpawnRequest>,
    pub(super) now: u64,
}

fn bad_operand(what: &str, value: u16) -> NsError {
    NsError::new(
        "VM_BAD_OPERAND",
        format!("Instruction refers to {} {} which does not exist.", what, value),
    )
}

fn type_error(error: ns_core::ValueError) -> NsError {
    NsError::new("VM_TYPE_ERROR", error.to_string())
}

fn immediate_value(module: &NsxModule, immediate: Immediate) -> Result<ConstantValue, NsError> {
    Ok(match immediate {
        Immediate::Null => ConstantValue::Null,
        Immediate::Boolean(value) => ConstantValue::Boolean(value),
        Immediate::Integer(value) => ConstantValue::Numeric(f64::from(value)),
        Immediate::Float(value) => ConstantValue::Numeric(value),
        Immediate::DeltaInteger(value) => ConstantValue::DeltaNumeric(f64::from(value)),
        Immediate::DeltaFloat(value) => ConstantValue::DeltaNumeric(value),
        Immediate::String(token) => ConstantValue::String(
            module
                .string(token)
                .map_err(|_| bad_operand("string", token))?
                .to_string(),
        ),
        Immediate::Enum(id) => {
            ConstantValue::EnumValue(EnumConstant::from_id(id).ok_or_else(|| bad_operand("enum", id))?)
        }
        Immediate::Constant(id) => ConstantValue::BuiltInConstant(
            BuiltInConstant::from_id(id).ok_or_else(|| bad_operand("constant", id))?,
        ),
    })
}

fn jump_target(next: usize, offset: i16, code_len: usize) -> Result<usize, NsError> {
    let target = next as i64 + i64::from(offset);
    if target < 0 || target as usize > code_len {
        return Err(NsError::new(
            "VM_BAD_JUMP",
            format!("Jump from {} by {} leaves the subroutine.", next, offset),
        ));
    }
    Ok(target as usize)
}

impl Vm {
    /// Runs one tick with the configured default budget.
    pub fn run_tick(&mut self, host: &mut dyn EngineHost) -> Result<bool, NsError> {
        let budget = self.options.default_step_budget;
        self.run(host, budget)
    }

    /// Runs every ready thread once, each for at most `step_budget`
    /// instructions. Threads created during the tick start on the next one.
    pub fn run(&mut self, host: &mut dyn EngineHost, step_budget: usize) -> Result<bool, NsError> {
        if step_budget == 0 {
            return Err(NsError::new(
                "VM_INVALID_BUDGET",
                "Step budget must be at least one instruction.",
            ));
        }
        self.threads.retain(ThreadContext::is_live);

        let now = host.now_ms();
        let input = host.input();
        for thread in &mut self.threads {
            let wake = match thread.state {
                ThreadState::SuspendedUntil(deadline) => now >= deadline,
                ThreadState::SuspendedForInput { timeout_at } => {
                    input.advance || timeout_at.is_some_and(|deadline| now >= deadline)
                }
                _ => false,
            };
            if wake {
                trace!(thread = %thread.name, now, "thread woke");
                thread.state = ThreadState::Running;
            }
        }

        let mut executed_any = false;
        let scheduled = self.threads.len();
        for index in 0..scheduled {
            if self.threads[index].state != ThreadState::Running {
                continue;
            }
            let mut spawns = Vec::new();
            let executed = self.run_slice(index, host, now, step_budget, &mut spawns);
            executed_any |= executed > 0;
            for request in spawns {
                if let Err(error) = self.spawn(&request.name, request.module, request.subroutine) {
                    self.record_error(&request.name, error);
                }
            }
        }
        Ok(executed_any)
    }

    /// Executes one thread until it yields, finishes, fails or uses up the
    /// budget. Returns the number of instructions executed.
    fn run_slice(
        &mut self,
        index: usize,
        host: &mut dyn EngineHost,
        now: u64,
        budget: usize,
        spawns: &mut Vec<SpawnRequest>,
    ) -> usize {
        let Vm {
            threads,
            modules,
            registry,
            rng,
            errors,
            ..
        } = self;
        let thread = &mut threads[index];
        let mut env = StepEnv {
            host,
            modules,
            registry,
            rng,
            spawns,
            now,
        };

        let mut executed = 0usize;
        while executed < budget {
            executed += 1;
            match step(thread, &mut env) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Yield) => break,
                Ok(Flow::Finished) => {
                    debug!(thread = %thread.name, id = %thread.id, "thread finished");
                    break;
                }
                Err(failure) => {
                    error!(thread = %thread.name, code = %failure.code, "{}", failure.message);
                    errors.push(ThreadError {
                        thread: thread.name.clone(),
                        error: failure,
                    });
                    thread.terminate();
                    break;
                }
            }
        }
        executed
    }

    fn record_error(&mut self, thread: &str, failure: NsError) {
        error!(thread, code = %failure.code, "{}", failure.message);
        self.errors.push(ThreadError {
            thread: thread.to_string(),
            error: failure,
        });
    }
}

/// Executes the instruction at the current frame's instruction pointer.
pub(super) fn step(thread: &mut ThreadContext, env: &mut StepEnv<'_>) -> Result<Flow, NsError> {
    let Some(frame) = thread.frames.last() else {
        thread.terminate();
        return Ok(Flow::Finished);
    };
    let module = Arc::clone(&frame.module);
    let subroutine = frame.subroutine;
    let ip = frame.ip;

    let body = module.subroutine(subroutine)?;
    if ip >= body.code.len() {
        return Err(NsError::new(
            "VM_CODE_OVERRUN",
            format!(
                "{} ran past the end of subroutine {} in {}.",
                thread.name,
                subroutine,
                module.name()
            ),
        ));
    }
    let (opcode, length) = Opcode::decode(&body.code, ip)?;
    let next = ip + length;
    if let Some(frame) = thread.frames.last_mut() {
        frame.ip = next;
    }

    match opcode {
        Opcode::LoadImm(immediate) => {
            let value = immediate_value(&module, immediate)?;
            thread.stack.push(value);
        }
        Opcode::LoadArg(index) => {
            let value = thread
                .frames
                .last()
                .and_then(|frame| frame.args.get(index as usize))
                .cloned()
                .ok_or_else(|| bad_operand("argument", index))?;
            thread.stack.push(value);
        }
        Opcode::StoreArg(index) => {
            let value = thread.pop()?;
            let slot = thread
                .frames
                .last_mut()
                .and_then(|frame| frame.args.get_mut(index as usize))
                .ok_or_else(|| bad_operand("argument", index))?;
            *slot = value;
        }
        Opcode::LoadVar(token) => {
            let name = module.string(token).map_err(|_| bad_operand("string", token))?;
            let value = env.host.global(name).unwrap_or(ConstantValue::Null);
            thread.stack.push(value);
        }
        Opcode::StoreVar(token) => {
            let name = module.string(token).map_err(|_| bad_operand("string", token))?;
            let value = thread.pop()?;
            env.host.set_global(name, value);
        }
        Opcode::Binary(operator) => {
            let right = thread.pop()?;
            let left = thread.pop()?;
            thread
                .stack
                .push(operator.apply(&left, &right).map_err(type_error)?);
        }
        Opcode::Unary(operator) => {
            let operand = thread.pop()?;
            thread.stack.push(operator.apply(&operand).map_err(type_error)?);
        }
        Opcode::Jump(offset) => jump(thread, next, offset, body.code.len())?,
        Opcode::JumpIfTrue(offset) | Opcode::JumpIfFalse(offset) => {
            let condition = thread.pop()?.as_bool().map_err(type_error)?;
            if condition == matches!(opcode, Opcode::JumpIfTrue(_)) {
                jump(thread, next, offset, body.code.len())?;
            }
        }
        Opcode::Call(index) => super::callstack::call(thread, &module, index)?,
        Opcode::CallFar { import, subroutine } => {
            super::callstack::call_far(thread, env.modules, &module, import, subroutine)?
        }
        Opcode::Dispatch { builtin, argc } => return dispatch(thread, env, &module, builtin, argc),
        Opcode::PresentText(token) => {
            let text = module.string(token).map_err(|_| bad_operand("string", token))?;
            env.host.present_text(&thread.name, text);
        }
        Opcode::BeginDialogue(index) => {
            let rti = module.rti(subroutine)?;
            let name = rti
                .dialogue_blocks
                .get(index as usize)
                .cloned()
                .unwrap_or_else(|| rti.name.clone());
            env.host.begin_dialogue(&thread.name, &name);
            thread.dialogue = Some(name);
        }
        Opcode::SelectStart => env.host.begin_select(&thread.name),
        Opcode::IsPressed(token) => {
            let label = module.string(token).map_err(|_| bad_operand("string", token))?;
            let pressed = env.host.is_choice_pressed(&thread.name, label);
            thread.stack.push(ConstantValue::Boolean(pressed));
        }
        Opcode::SelectEnd => {
            trace!(thread = %thread.name, "waiting for a choice");
            return Ok(Flow::Yield);
        }
        Opcode::Pop => {
            thread.pop()?;
        }
        Opcode::Dup => {
            let value = thread.pop()?;
            thread.stack.push(value.clone());
            thread.stack.push(value);
        }
        Opcode::Trap(token) => {
            let message = module.string(token).map_err(|_| bad_operand("string", token))?;
            return Err(NsError::new("VM_TRAP", message));
        }
        Opcode::Return => return super::callstack::ret(thread),
    }
    Ok(Flow::Continue)
}

fn jump(thread: &mut ThreadContext, next: usize, offset: i16, code_len: usize) -> Result<(), NsError> {
    let target = jump_target(next, offset, code_len)?;
    if let Some(frame) = thread.frames.last_mut() {
        frame.ip = target;
    }
    Ok(())
}

fn dispatch(
    thread: &mut ThreadContext,
    env: &mut StepEnv<'_>,
    module: &Arc<NsxModule>,
    builtin: u16,
    argc: u8,
) -> Result<Flow, NsError> {
    let values = thread.pop_many(argc as usize)?;
    let (result, suspension) = {
        let mut context = BuiltInContext {
            host: &mut *env.host,
            thread: &thread.name,
            module,
            now: env.now,
            rng: &mut *env.rng,
            suspension: None,
            spawns: &mut *env.spawns,
        };
        let result = env.registry.invoke(BuiltInId(builtin), &mut context, values);
        (result, context.suspension)
    };
    thread.stack.push(result?);
    match suspension {
        Some(state) => {
            trace!(thread = %thread.name, ?state, "thread suspended");
            thread.state = state;
            Ok(Flow::Yield)
        }
        None => Ok(Flow::Continue),
    }
}

#[cfg(test)]
mod step_tests {
    use super::*;

    #[test]
    fn jump_targets_stay_inside_the_subroutine() {
        assert_eq!(jump_target(3, -3, 10).expect("back to start"), 0);
        assert_eq!(jump_target(3, 7, 10).expect("end is allowed"), 10);
        assert_eq!(jump_target(3, 8, 10).expect_err("past end").code, "VM_BAD_JUMP");
        assert_eq!(jump_target(3, -4, 10).expect_err("before start").code, "VM_BAD_JUMP");
    }
}
