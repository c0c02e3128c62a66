mod builtins;
mod host;
mod rng;
mod thread;
mod vm;

#[cfg(test)]
mod test_support;

pub use builtins::{
    ArgumentStack, BuiltInContext, BuiltInEntry, BuiltInFn, BuiltInRegistry, SpawnRequest,
};
pub use host::{
    ColorRequest, Coordinate, EngineHost, Extent, InputState, LoadStatus, ResumeToken, SoundKind,
    SoundRequest, TextRequest, TextureRequest, Transition,
};
pub use thread::{Frame, ThreadContext, ThreadId, ThreadState};
pub use vm::{ThreadError, Vm, VmOptions, DEFAULT_STEP_BUDGET, MAX_CALL_DEPTH};
