use std::fmt;
use std::sync::Arc;

use ns_core::{ConstantValue, NsError, NsxModule};

use crate::host::ResumeToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    /// Resumes once the host clock reaches the deadline (milliseconds).
    SuspendedUntil(u64),
    /// Resumes on the next advance input, or at `timeout_at` if set.
    SuspendedForInput { timeout_at: Option<u64> },
    SuspendedByHost,
    AwaitingHost(ResumeToken),
    Terminated,
}

impl ThreadState {
    pub fn is_suspended(self) -> bool {
        !matches!(self, Self::Running | Self::Terminated)
    }
}

/// One activation of a subroutine.
#[derive(Debug, Clone)]
pub struct Frame {
    pub module: Arc<NsxModule>,
    pub subroutine: u16,
    pub ip: usize,
    pub args: Vec<ConstantValue>,
    /// Operand stack height when the frame was entered.
    pub stack_base: usize,
}

#[derive(Debug)]
pub struct ThreadContext {
    pub id: ThreadId,
    pub name: String,
    pub module: Arc<NsxModule>,
    pub frames: Vec<Frame>,
    pub stack: Vec<ConstantValue>,
    pub state: ThreadState,
    /// Name of the dialogue block most recently entered.
    pub dialogue: Option<String>,
}

impl ThreadContext {
    pub(crate) fn new(
        id: ThreadId,
        name: impl Into<String>,
        module: Arc<NsxModule>,
        entry: u16,
        args: Vec<ConstantValue>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            frames: vec![Frame {
                module: Arc::clone(&module),
                subroutine: entry,
                ip: 0,
                args,
                stack_base: 0,
            }],
            module,
            stack: Vec::new(),
            state: ThreadState::Running,
            dialogue: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state != ThreadState::Terminated
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn terminate(&mut self) {
        self.state = ThreadState::Terminated;
        self.frames.clear();
        self.stack.clear();
    }

    pub(crate) fn pop(&mut self) -> Result<ConstantValue, NsError> {
        let base = self.frames.last().map(|frame| frame.stack_base).unwrap_or(0);
        if self.stack.len() <= base {
            return Err(NsError::new(
                "VM_STACK_UNDERFLOW",
                format!("Thread {} popped an empty operand stack.", self.name),
            ));
        }
        self.stack.pop().ok_or_else(|| {
            NsError::new("VM_STACK_UNDERFLOW", "Operand stack is empty.")
        })
    }

    /// Pops `count` values, returned in push order.
    pub(crate) fn pop_many(&mut self, count: usize) -> Result<Vec<ConstantValue>, NsError> {
        let base = self.frames.last().map(|frame| frame.stack_base).unwrap_or(0);
        if self.stack.len() < base + count {
            return Err(NsError::new(
                "VM_STACK_UNDERFLOW",
                format!(
                    "Thread {} needs {} operand(s), has {}.",
                    self.name,
                    count,
                    self.stack.len().saturating_sub(base)
                ),
            ));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }
}
