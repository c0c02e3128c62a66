use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use ns_core::{
    format_number, ConstantValue, EasingFunction, EntityAction, Immediate, ModuleBuilder,
    NsxModule, Opcode, SubroutineDef, SubroutineKind,
};

use crate::host::{
    ColorRequest, Coordinate, EngineHost, InputState, LoadStatus, ResumeToken, SoundRequest,
    TextRequest, TextureRequest, Transition,
};
use crate::vm::{Vm, VmOptions};

/// Host that records every request as one log line.
#[derive(Debug, Default)]
pub(crate) struct TestHost {
    pub log: Vec<String>,
    pub pending_loads: bool,
    pub now: u64,
    pub input: InputState,
    pub globals: HashMap<String, ConstantValue>,
    /// Labels the player picks as soon as they are offered.
    pub choices: HashSet<String>,
    pub next_token: u64,
}

fn coordinate(value: Coordinate) -> String {
    match value {
        Coordinate::Absolute(value) => format_number(value),
        Coordinate::Relative(value) => format!("@{}", format_number(value)),
        Coordinate::Anchor(anchor) => anchor.name().to_string(),
    }
}

impl TestHost {
    /// Host whose texture and sound loads stay pending until resumed.
    pub(crate) fn with_pending_loads() -> Self {
        Self {
            pending_loads: true,
            ..Self::default()
        }
    }

    fn load(&mut self) -> LoadStatus {
        if self.pending_loads {
            self.next_token += 1;
            LoadStatus::Pending(ResumeToken(self.next_token))
        } else {
            LoadStatus::Ready
        }
    }

    pub(crate) fn var(&self, name: &str) -> ConstantValue {
        self.globals.get(name).cloned().unwrap_or(ConstantValue::Null)
    }
}

impl EngineHost for TestHost {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn input(&self) -> InputState {
        self.input
    }

    fn create_color(&mut self, request: ColorRequest) {
        self.log.push(format!("color {} {:08x}", request.name, request.rgba));
    }

    fn create_texture(&mut self, request: TextureRequest) -> LoadStatus {
        self.log.push(format!(
            "texture {} {} {} {}",
            request.name,
            coordinate(request.x),
            coordinate(request.y),
            request.source
        ));
        self.load()
    }

    fn create_text(&mut self, request: TextRequest) {
        self.log.push(format!("text {} {}", request.name, request.text));
    }

    fn create_sound(&mut self, request: SoundRequest) -> LoadStatus {
        self.log
            .push(format!("sound {} {:?} {}", request.name, request.kind, request.file));
        self.load()
    }

    fn delete(&mut self, entity: &str) {
        self.log.push(format!("delete {}", entity));
    }

    fn request(&mut self, entity: &str, action: EntityAction) {
        self.log.push(format!("request {} {:?}", entity, action));
    }

    fn set_alias(&mut self, entity: &str, alias: &str) {
        self.log.push(format!("alias {} {}", entity, alias));
    }

    fn fade(&mut self, entity: &str, duration_ms: u64, opacity: f64, easing: EasingFunction) {
        self.log.push(format!(
            "fade {} {} {} {:?}",
            entity,
            duration_ms,
            format_number(opacity),
            easing
        ));
    }

    fn move_to(
        &mut self,
        entity: &str,
        duration_ms: u64,
        x: Coordinate,
        y: Coordinate,
        easing: EasingFunction,
    ) {
        self.log.push(format!(
            "move {} {} {} {} {:?}",
            entity,
            duration_ms,
            coordinate(x),
            coordinate(y),
            easing
        ));
    }

    fn zoom(
        &mut self,
        entity: &str,
        duration_ms: u64,
        scale_x: f64,
        scale_y: f64,
        easing: EasingFunction,
    ) {
        self.log.push(format!(
            "zoom {} {} {} {} {:?}",
            entity,
            duration_ms,
            format_number(scale_x),
            format_number(scale_y),
            easing
        ));
    }

    fn transition(&mut self, entity: &str, transition: Transition) {
        self.log
            .push(format!("transition {} {}", entity, transition.duration_ms));
    }

    fn set_volume(&mut self, entity: &str, duration_ms: u64, volume: f64) {
        self.log.push(format!(
            "volume {} {} {}",
            entity,
            duration_ms,
            format_number(volume)
        ));
    }

    fn set_loop(&mut self, entity: &str, looping: bool) {
        self.log.push(format!("loop {} {}", entity, looping));
    }

    fn set_loop_point(&mut self, entity: &str, start_ms: u64, end_ms: u64) {
        self.log
            .push(format!("loop-point {} {} {}", entity, start_ms, end_ms));
    }

    fn begin_dialogue(&mut self, thread: &str, name: &str) {
        self.log.push(format!("dialogue {} {}", thread, name));
    }

    fn present_text(&mut self, thread: &str, text: &str) {
        self.log.push(format!("say {} {}", thread, text.trim()));
    }

    fn begin_select(&mut self, thread: &str) {
        self.log.push(format!("select {}", thread));
    }

    fn is_choice_pressed(&mut self, _thread: &str, label: &str) -> bool {
        self.choices.contains(label)
    }

    fn global(&self, name: &str) -> Option<ConstantValue> {
        self.globals.get(name).cloned()
    }

    fn set_global(&mut self, name: &str, value: ConstantValue) {
        self.globals.insert(name.to_string(), value);
    }
}

fn returns_null() -> Vec<u8> {
    let mut code = Vec::new();
    Opcode::LoadImm(Immediate::Null).encode(&mut code);
    Opcode::Return.encode(&mut code);
    code
}

/// Module with a `main` chapter (index 0) and a `Helper` function (index 1),
/// both returning immediately.
pub(crate) fn test_module() -> Arc<NsxModule> {
    let mut builder = ModuleBuilder::new();
    for (kind, name) in [
        (SubroutineKind::Chapter, "main"),
        (SubroutineKind::Function, "Helper"),
    ] {
        builder
            .push_subroutine(SubroutineDef {
                kind,
                name: name.to_string(),
                parameters: Vec::new(),
                dialogue_blocks: Vec::new(),
                code: returns_null(),
            })
            .expect("test subroutine");
    }
    let bytes = builder.write().expect("test module bytes");
    Arc::new(NsxModule::from_bytes("test.nss", bytes).expect("test module"))
}

/// Compiles `files` as one project and loads every module into a fresh VM.
pub(crate) fn vm_from_sources(files: &[(&str, &str)]) -> Vm {
    let map: BTreeMap<String, String> = files
        .iter()
        .map(|(path, text)| (path.to_string(), text.to_string()))
        .collect();
    let compiled =
        ns_compiler::compile_project_from_source_map(&map, &ns_compiler::CompileOptions::default())
            .expect("project should compile");
    let mut vm = Vm::new(VmOptions {
        random_seed: Some(1),
        ..VmOptions::default()
    });
    for (name, module) in compiled.modules {
        vm.add_module(NsxModule::from_bytes(name, module.bytes).expect("module should load"));
    }
    vm
}
