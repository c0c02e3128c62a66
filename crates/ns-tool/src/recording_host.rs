use std::collections::{BTreeMap, BTreeSet, HashMap};

use ns_core::{format_number, ConstantValue, EasingFunction, EntityAction};
use ns_runtime::{
    ColorRequest, Coordinate, EngineHost, InputState, LoadStatus, SoundRequest, TextRequest,
    TextureRequest, Transition,
};

use crate::ExpectedEvent;

/// Host that turns every request into an `ExpectedEvent` so a run can be
/// compared against a testcase. It keeps a registry of live entities and
/// aliases to expand `*` patterns.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub now: u64,
    pub input: InputState,
    pub events: Vec<ExpectedEvent>,
    pub globals: BTreeMap<String, ConstantValue>,
    entities: BTreeSet<String>,
    aliases: HashMap<String, String>,
    offers: Vec<(String, Vec<String>)>,
    chosen: HashMap<String, String>,
}

fn coordinate(value: Coordinate) -> String {
    match value {
        Coordinate::Absolute(value) => format_number(value),
        Coordinate::Relative(value) => format!("@{}", format_number(value)),
        Coordinate::Anchor(anchor) => anchor.name().to_string(),
    }
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return false;
    };
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    for (index, part) in parts.iter().enumerate() {
        if index + 1 == parts.len() {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.is_empty()
}

impl RecordingHost {
    fn call(&mut self, call: String) {
        self.events.push(ExpectedEvent::Host { call });
    }

    fn register(&mut self, name: &str) {
        self.entities.insert(name.to_string());
    }

    /// Selects offered since the last call, with the labels polled for each.
    pub fn take_offers(&mut self) -> Vec<(String, Vec<String>)> {
        std::mem::take(&mut self.offers)
    }

    /// Makes `label` the pressed choice the next time `thread` polls it.
    pub fn choose(&mut self, thread: &str, label: &str) {
        self.chosen.insert(thread.to_string(), label.to_string());
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(String::as_str)
    }
}

impl EngineHost for RecordingHost {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn input(&self) -> InputState {
        self.input
    }

    fn resolve_entities(&self, pattern: &str) -> Vec<String> {
        if let Some(target) = self.aliases.get(pattern) {
            return vec![target.clone()];
        }
        if !pattern.contains('*') {
            return vec![pattern.to_string()];
        }
        self.entities
            .iter()
            .filter(|name| wildcard_match(pattern, name))
            .cloned()
            .collect()
    }

    fn create_color(&mut self, request: ColorRequest) {
        self.register(&request.name);
        self.call(format!("color {} {:08x}", request.name, request.rgba));
    }

    fn create_texture(&mut self, request: TextureRequest) -> LoadStatus {
        self.register(&request.name);
        self.call(format!(
            "texture {} {} {} {}",
            request.name,
            coordinate(request.x),
            coordinate(request.y),
            request.source
        ));
        LoadStatus::Ready
    }

    fn create_text(&mut self, request: TextRequest) {
        self.register(&request.name);
        self.call(format!("text {} {}", request.name, request.text));
    }

    fn create_sound(&mut self, request: SoundRequest) -> LoadStatus {
        self.register(&request.name);
        self.call(format!(
            "sound {} {:?} {}",
            request.name, request.kind, request.file
        ));
        LoadStatus::Ready
    }

    fn delete(&mut self, entity: &str) {
        self.entities.remove(entity);
        self.aliases.retain(|_, target| target != entity);
        self.call(format!("delete {}", entity));
    }

    fn request(&mut self, entity: &str, action: EntityAction) {
        self.call(format!("request {} {:?}", entity, action));
    }

    fn set_alias(&mut self, entity: &str, alias: &str) {
        self.aliases.insert(alias.to_string(), entity.to_string());
        self.call(format!("alias {} {}", entity, alias));
    }

    fn fade(&mut self, entity: &str, duration_ms: u64, opacity: f64, _easing: EasingFunction) {
        self.call(format!(
            "fade {} {} {}",
            entity,
            duration_ms,
            format_number(opacity)
        ));
    }

    fn move_to(
        &mut self,
        entity: &str,
        duration_ms: u64,
        x: Coordinate,
        y: Coordinate,
        _easing: EasingFunction,
    ) {
        self.call(format!(
            "move {} {} {} {}",
            entity,
            duration_ms,
            coordinate(x),
            coordinate(y)
        ));
    }

    fn zoom(
        &mut self,
        entity: &str,
        duration_ms: u64,
        scale_x: f64,
        scale_y: f64,
        _easing: EasingFunction,
    ) {
        self.call(format!(
            "zoom {} {} {} {}",
            entity,
            duration_ms,
            format_number(scale_x),
            format_number(scale_y)
        ));
    }

    fn transition(&mut self, entity: &str, transition: Transition) {
        self.call(format!("transition {} {}", entity, transition.duration_ms));
    }

    fn set_volume(&mut self, entity: &str, duration_ms: u64, volume: f64) {
        self.call(format!(
            "volume {} {} {}",
            entity,
            duration_ms,
            format_number(volume)
        ));
    }

    fn set_loop(&mut self, entity: &str, looping: bool) {
        self.call(format!("loop {} {}", entity, looping));
    }

    fn set_loop_point(&mut self, entity: &str, start_ms: u64, end_ms: u64) {
        self.call(format!("loopPoint {} {} {}", entity, start_ms, end_ms));
    }

    fn begin_dialogue(&mut self, thread: &str, name: &str) {
        self.events.push(ExpectedEvent::Dialogue {
            thread: thread.to_string(),
            name: name.to_string(),
        });
    }

    fn present_text(&mut self, thread: &str, text: &str) {
        self.events.push(ExpectedEvent::Text {
            thread: thread.to_string(),
            text: text.trim().to_string(),
        });
    }

    fn begin_select(&mut self, thread: &str) {
        self.offers.push((thread.to_string(), Vec::new()));
    }

    fn is_choice_pressed(&mut self, thread: &str, label: &str) -> bool {
        if self.chosen.get(thread).map(String::as_str) == Some(label) {
            self.chosen.remove(thread);
            return true;
        }
        if let Some((_, labels)) = self
            .offers
            .iter_mut()
            .rev()
            .find(|(offered_to, _)| offered_to == thread)
        {
            if !labels.iter().any(|known| known == label) {
                labels.push(label.to_string());
            }
        }
        false
    }

    fn global(&self, name: &str) -> Option<ConstantValue> {
        self.globals.get(name).cloned()
    }

    fn set_global(&mut self, name: &str, value: ConstantValue) {
        self.globals.insert(name.to_string(), value);
    }
}
