use std::collections::{HashMap, HashSet};

use ns_core::{ConstantValue, EasingFunction, EntityAction};
use ns_runtime::{
    ColorRequest, Coordinate, EngineHost, InputState, LoadStatus, SoundRequest, TextRequest,
    TextureRequest, Transition,
};
use tracing::{debug, info};

use crate::json_string;

/// Host without a screen: presentation requests are logged through `tracing`
/// and the player's side of the story is written to `output` as protocol
/// lines. Every wait for input is answered immediately and every `select`
/// takes its first case.
#[derive(Debug, Default)]
pub(crate) struct HeadlessHost {
    pub(crate) now: u64,
    pub(crate) output: Vec<String>,
    globals: HashMap<String, ConstantValue>,
    selecting: HashSet<String>,
}

impl HeadlessHost {
    pub(crate) fn advance_clock(&mut self, tick_ms: u64) {
        self.now += tick_ms;
    }

    pub(crate) fn drain_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}

impl EngineHost for HeadlessHost {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn input(&self) -> InputState {
        InputState {
            advance: true,
            mouse_clicked: false,
        }
    }

    fn create_color(&mut self, request: ColorRequest) {
        info!(entity = %request.name, rgba = request.rgba, "create color");
    }

    fn create_texture(&mut self, request: TextureRequest) -> LoadStatus {
        info!(entity = %request.name, source = %request.source, "create texture");
        LoadStatus::Ready
    }

    fn create_text(&mut self, request: TextRequest) {
        info!(entity = %request.name, text = %request.text, "create text");
    }

    fn create_sound(&mut self, request: SoundRequest) -> LoadStatus {
        info!(entity = %request.name, kind = ?request.kind, file = %request.file, "create sound");
        LoadStatus::Ready
    }

    fn delete(&mut self, entity: &str) {
        info!(entity, "delete");
    }

    fn request(&mut self, entity: &str, action: EntityAction) {
        info!(entity, ?action, "request");
    }

    fn set_alias(&mut self, entity: &str, alias: &str) {
        info!(entity, alias, "set alias");
    }

    fn fade(&mut self, entity: &str, duration_ms: u64, opacity: f64, easing: EasingFunction) {
        info!(entity, duration_ms, opacity, ?easing, "fade");
    }

    fn move_to(
        &mut self,
        entity: &str,
        duration_ms: u64,
        x: Coordinate,
        y: Coordinate,
        easing: EasingFunction,
    ) {
        info!(entity, duration_ms, ?x, ?y, ?easing, "move");
    }

    fn zoom(
        &mut self,
        entity: &str,
        duration_ms: u64,
        scale_x: f64,
        scale_y: f64,
        easing: EasingFunction,
    ) {
        info!(entity, duration_ms, scale_x, scale_y, ?easing, "zoom");
    }

    fn transition(&mut self, entity: &str, transition: Transition) {
        info!(entity, duration_ms = transition.duration_ms, mask = ?transition.mask, "transition");
    }

    fn set_volume(&mut self, entity: &str, duration_ms: u64, volume: f64) {
        info!(entity, duration_ms, volume, "set volume");
    }

    fn set_loop(&mut self, entity: &str, looping: bool) {
        info!(entity, looping, "set loop");
    }

    fn set_loop_point(&mut self, entity: &str, start_ms: u64, end_ms: u64) {
        info!(entity, start_ms, end_ms, "set loop point");
    }

    fn begin_dialogue(&mut self, thread: &str, name: &str) {
        self.output.push(format!("DIALOGUE:{}:{}", thread, name));
    }

    fn present_text(&mut self, thread: &str, text: &str) {
        debug!(thread, "present text");
        self.output
            .push(format!("TEXT_JSON:{}", json_string(text.trim())));
    }

    fn begin_select(&mut self, thread: &str) {
        self.selecting.insert(thread.to_string());
        self.output.push(format!("SELECT:{}", thread));
    }

    fn is_choice_pressed(&mut self, thread: &str, label: &str) -> bool {
        if !self.selecting.remove(thread) {
            return false;
        }
        self.output.push(format!("CHOICE:{}:{}", thread, label));
        true
    }

    fn global(&self, name: &str) -> Option<ConstantValue> {
        self.globals.get(name).cloned()
    }

    fn set_global(&mut self, name: &str, value: ConstantValue) {
        self.globals.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod headless_host_tests {
    use super::*;

    #[test]
    fn select_takes_the_first_offered_case() {
        let mut host = HeadlessHost::default();
        assert!(!host.is_choice_pressed("main", "yes"));
        host.begin_select("main");
        assert!(host.is_choice_pressed("main", "yes"));
        assert!(!host.is_choice_pressed("main", "no"));
        assert_eq!(
            host.drain_output(),
            vec!["SELECT:main".to_string(), "CHOICE:main:yes".to_string()]
        );
        assert!(host.output.is_empty());
    }

    #[test]
    fn text_is_trimmed_and_json_encoded() {
        let mut host = HeadlessHost::default();
        host.present_text("main", "\n Hello \"you\"\n");
        assert_eq!(host.output, vec!["TEXT_JSON:\"Hello \\\"you\\\"\"".to_string()]);
    }

    #[test]
    fn globals_and_clock_are_kept() {
        let mut host = HeadlessHost::default();
        host.set_global("$a", ConstantValue::Numeric(1.0));
        assert_eq!(host.global("$a"), Some(ConstantValue::Numeric(1.0)));
        assert_eq!(host.global("$b"), None);
        host.advance_clock(16);
        host.advance_clock(16);
        assert_eq!(host.now_ms(), 32);
    }
}
