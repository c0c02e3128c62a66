mod args;
mod audio;
mod entity;
mod flow;

use std::sync::Arc;

use ns_core::{BuiltInDecl, BuiltInId, ConstantValue, NsError, NsxModule, BUILTIN_DECLS};
use tracing::{trace, warn};

use crate::host::{EngineHost, ResumeToken};
use crate::rng::ScriptRng;
use crate::thread::ThreadState;

pub use args::ArgumentStack;

pub type BuiltInFn =
    fn(&mut BuiltInContext<'_>, &mut ArgumentStack) -> Result<ConstantValue, NsError>;

/// A thread that a built-in asked to start once the current instruction ends.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub name: String,
    pub module: Arc<NsxModule>,
    pub subroutine: u16,
}

/// What a built-in can see and affect while it runs.
pub struct BuiltInContext<'a> {
    pub host: &'a mut dyn EngineHost,
    /// Name of the calling thread.
    pub thread: &'a str,
    /// Module of the calling frame.
    pub module: &'a Arc<NsxModule>,
    /// Host time sampled at the start of the tick.
    pub now: u64,
    pub(crate) rng: &'a mut ScriptRng,
    pub(crate) suspension: Option<ThreadState>,
    pub(crate) spawns: &'a mut Vec<SpawnRequest>,
}

impl BuiltInContext<'_> {
    pub fn suspend_until(&mut self, deadline: u64) {
        self.suspension = Some(ThreadState::SuspendedUntil(deadline));
    }

    pub fn suspend_for_input(&mut self, timeout_at: Option<u64>) {
        self.suspension = Some(ThreadState::SuspendedForInput { timeout_at });
    }

    pub fn await_host(&mut self, token: ResumeToken) {
        self.suspension = Some(ThreadState::AwaitingHost(token));
    }

    pub fn spawn(&mut self, request: SpawnRequest) {
        self.spawns.push(request);
    }

    /// Entities designated by `pattern`, warning when it matches nothing.
    pub fn entities(&self, builtin: &str, pattern: &str) -> Vec<String> {
        let entities = self.host.resolve_entities(pattern);
        if entities.is_empty() {
            warn!(thread = %self.thread, builtin, pattern, "request matched no entity");
        }
        entities
    }
}

#[derive(Clone, Copy)]
pub struct BuiltInEntry {
    pub decl: &'static BuiltInDecl,
    pub function: BuiltInFn,
}

impl std::fmt::Debug for BuiltInEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltInEntry")
            .field("name", &self.decl.name)
            .finish_non_exhaustive()
    }
}

/// Built-in implementations indexed by the id the compiler emitted.
#[derive(Debug, Clone)]
pub struct BuiltInRegistry {
    entries: Vec<Option<BuiltInEntry>>,
}

const STANDARD: &[(&str, BuiltInFn)] = &[
    ("Wait", flow::wait),
    ("WaitKey", flow::wait_key),
    ("CreateProcess", flow::create_process),
    ("Request", entity::request),
    ("Delete", entity::delete),
    ("CreateColor", entity::create_color),
    ("CreateTexture", entity::create_texture),
    ("CreateText", entity::create_text),
    ("CreateSound", audio::create_sound),
    ("SetVolume", audio::set_volume),
    ("SetLoop", audio::set_loop),
    ("SetLoopPoint", audio::set_loop_point),
    ("Fade", entity::fade),
    ("Move", entity::move_entity),
    ("Zoom", entity::zoom),
    ("DrawTransition", entity::draw_transition),
    ("SetAlias", entity::set_alias),
    ("RemainTime", audio::remain_time),
    ("PassageTime", audio::passage_time),
    ("ImageHorizon", entity::image_horizon),
    ("ImageVertical", entity::image_vertical),
    ("Random", flow::random),
    ("String", flow::format_string),
    ("Time", flow::time),
    ("MouseClicked", flow::mouse_clicked),
];

impl BuiltInRegistry {
    pub fn empty() -> Self {
        Self {
            entries: vec![None; BUILTIN_DECLS.len()],
        }
    }

    /// Registry with every built-in the language declares.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for (name, function) in STANDARD {
            if let Err(error) = registry.register(name, *function) {
                warn!(%error, "built-in left unregistered");
            }
        }
        registry
    }

    pub fn register(&mut self, name: &str, function: BuiltInFn) -> Result<BuiltInId, NsError> {
        let Some(index) = BUILTIN_DECLS.iter().position(|decl| decl.name == name) else {
            return Err(NsError::new(
                "VM_BUILTIN_UNDECLARED",
                format!("Built-in \"{}\" has no declaration.", name),
            ));
        };
        let decl = &BUILTIN_DECLS[index];
        if cfg!(debug_assertions) && !decl.is_well_formed() {
            return Err(NsError::new(
                "VM_BUILTIN_SIGNATURE",
                format!("Built-in \"{}\" has a malformed signature.", name),
            ));
        }
        self.entries[index] = Some(BuiltInEntry { decl, function });
        Ok(BuiltInId(index as u16))
    }

    pub fn get(&self, id: BuiltInId) -> Option<&BuiltInEntry> {
        self.entries.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn registered_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn invoke(
        &self,
        id: BuiltInId,
        context: &mut BuiltInContext<'_>,
        mut values: Vec<ConstantValue>,
    ) -> Result<ConstantValue, NsError> {
        let entry = self.get(id).ok_or_else(|| {
            NsError::new(
                "VM_UNKNOWN_BUILTIN",
                format!("Built-in id {} is not registered.", id.0),
            )
        })?;
        let decl = entry.decl;
        if !decl.accepts(values.len()) {
            return Err(NsError::new(
                "VM_ARGUMENT_COUNT",
                format!("{} does not take {} argument(s).", decl.name, values.len()),
            ));
        }
        if !decl.variadic {
            values.resize(decl.params.len(), ConstantValue::Null);
        }
        trace!(thread = %context.thread, builtin = decl.name, argc = values.len(), "dispatch");
        let mut args = ArgumentStack::new(decl.name, values);
        (entry.function)(context, &mut args)
    }
}

impl Default for BuiltInRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Milliseconds from a script number; negative and NaN durations are zero.
pub(crate) fn millis(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod builtins_tests {
    use super::*;
    use crate::test_support::{test_module, TestHost};

    struct Harness {
        host: TestHost,
        module: Arc<NsxModule>,
        rng: ScriptRng,
        spawns: Vec<SpawnRequest>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                host: TestHost::default(),
                module: test_module(),
                rng: ScriptRng::new(1),
                spawns: Vec::new(),
            }
        }

        fn call(
            &mut self,
            name: &str,
            values: Vec<ConstantValue>,
        ) -> (Result<ConstantValue, NsError>, Option<ThreadState>) {
            let registry = BuiltInRegistry::standard();
            let id = BuiltInId(
                BUILTIN_DECLS
                    .iter()
                    .position(|decl| decl.name == name)
                    .expect("declared built-in") as u16,
            );
            let mut context = BuiltInContext {
                host: &mut self.host,
                thread: "main",
                module: &self.module,
                now: 100,
                rng: &mut self.rng,
                suspension: None,
                spawns: &mut self.spawns,
            };
            let result = registry.invoke(id, &mut context, values);
            (result, context.suspension)
        }
    }

    fn text(value: &str) -> ConstantValue {
        ConstantValue::String(value.to_string())
    }

    fn number(value: f64) -> ConstantValue {
        ConstantValue::Numeric(value)
    }

    #[test]
    fn every_declaration_has_an_implementation() {
        let registry = BuiltInRegistry::standard();
        assert_eq!(registry.registered_count(), BUILTIN_DECLS.len());
    }

    #[test]
    fn unknown_names_are_rejected() {
        let mut registry = BuiltInRegistry::empty();
        let error = registry
            .register("Teleport", flow::time)
            .expect_err("undeclared built-in");
        assert_eq!(error.code, "VM_BUILTIN_UNDECLARED");
        assert!(registry.get(BuiltInId(0)).is_none());
    }

    #[test]
    fn wait_suspends_until_deadline() {
        let mut harness = Harness::new();
        let (result, suspension) = harness.call("Wait", vec![number(1000.0)]);
        assert_eq!(result.expect("wait should succeed"), ConstantValue::Null);
        assert_eq!(suspension, Some(ThreadState::SuspendedUntil(1100)));
    }

    #[test]
    fn omitted_optional_arguments_are_padded() {
        let mut harness = Harness::new();
        let (result, suspension) =
            harness.call("Fade", vec![text("bg"), number(300.0), number(0.0)]);
        result.expect("fade without easing should succeed");
        assert_eq!(suspension, None);
        assert_eq!(harness.host.log, vec!["fade bg 300 0 Linear".to_string()]);

        let (_, suspension) = harness.call(
            "Fade",
            vec![
                text("bg"),
                number(300.0),
                number(1000.0),
                ConstantValue::EnumValue(ns_core::EnumConstant::Dxl1),
                ConstantValue::Boolean(true),
            ],
        );
        assert_eq!(suspension, Some(ThreadState::SuspendedUntil(400)));
    }

    #[test]
    fn wrong_argument_type_is_reported() {
        let mut harness = Harness::new();
        let (result, _) = harness.call("Wait", vec![text("soon")]);
        assert_eq!(result.expect_err("string duration").code, "VM_ARGUMENT_TYPE");
        let (result, _) = harness.call("Delete", Vec::new());
        assert_eq!(result.expect_err("missing name").code, "VM_ARGUMENT_COUNT");
    }

    #[test]
    fn pending_texture_awaits_host() {
        let mut harness = Harness::new();
        harness.host.pending_loads = true;
        let (result, suspension) = harness.call(
            "CreateTexture",
            vec![text("bg"), number(10.0), number(0.0), number(0.0), text("cg/bg01.png")],
        );
        result.expect("texture should be requested");
        assert!(matches!(suspension, Some(ThreadState::AwaitingHost(_))));
    }

    #[test]
    fn create_process_resolves_function_in_caller_module() {
        let mut harness = Harness::new();
        let (result, _) = harness.call("CreateProcess", vec![text("worker"), text("Helper")]);
        result.expect("process should spawn");
        assert_eq!(harness.spawns.len(), 1);
        assert_eq!(harness.spawns[0].name, "worker");
        assert_eq!(harness.spawns[0].subroutine, 1);

        let (result, _) = harness.call("CreateProcess", vec![text("x"), text("Missing")]);
        assert_eq!(result.expect_err("unknown function").code, "VM_FUNCTION_NOT_FOUND");
    }

    #[test]
    fn string_formats_printf_style() {
        let mut harness = Harness::new();
        let (result, _) = harness.call(
            "String",
            vec![text("%s has %03d hp (%d%%)"), text("aya"), number(7.0), number(50.0)],
        );
        assert_eq!(result.expect("format"), text("aya has 007 hp (50%)"));
    }
}
