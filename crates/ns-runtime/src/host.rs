use ns_core::{ConstantValue, EasingFunction, EntityAction, EnumConstant};

/// Handle returned by the host for an operation that completes later. The
/// thread waiting on it stays suspended until `Vm::resume` is called with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResumeToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Ready,
    Pending(ResumeToken),
}

/// Input sampled by the host for the current tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    /// The player asked to advance (click, enter, ...).
    pub advance: bool,
    pub mouse_clicked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coordinate {
    Absolute(f64),
    /// Offset from the entity's current position (delta literal `@n`).
    Relative(f64),
    /// Alignment keyword such as `Center` or `InBottom`.
    Anchor(EnumConstant),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extent {
    Fixed(f64),
    /// `Infinite`: the host picks the size from the content.
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    Effect,
    Music,
    Voice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorRequest {
    pub name: String,
    pub priority: i32,
    pub x: Coordinate,
    pub y: Coordinate,
    pub width: f64,
    pub height: f64,
    pub rgba: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureRequest {
    pub name: String,
    pub priority: i32,
    pub x: Coordinate,
    pub y: Coordinate,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub name: String,
    pub priority: i32,
    pub x: Coordinate,
    pub y: Coordinate,
    pub width: Extent,
    pub height: Extent,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundRequest {
    pub name: String,
    pub kind: SoundKind,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub duration_ms: u64,
    pub start: f64,
    pub end: f64,
    pub feather: f64,
    pub easing: EasingFunction,
    pub mask: Option<String>,
}

/// Everything the VM needs from the presentation layer. Entity operations
/// receive concrete names; wildcard and alias patterns are expanded through
/// `resolve_entities` before they are called.
pub trait EngineHost {
    fn now_ms(&self) -> u64;

    fn input(&self) -> InputState;

    /// Expands a name that may contain `*` wildcards or an alias into the
    /// entities it currently designates.
    fn resolve_entities(&self, pattern: &str) -> Vec<String> {
        vec![pattern.to_string()]
    }

    fn create_color(&mut self, request: ColorRequest);

    fn create_texture(&mut self, request: TextureRequest) -> LoadStatus;

    fn create_text(&mut self, request: TextRequest);

    fn create_sound(&mut self, request: SoundRequest) -> LoadStatus;

    fn delete(&mut self, entity: &str);

    fn request(&mut self, entity: &str, action: EntityAction);

    fn set_alias(&mut self, entity: &str, alias: &str);

    fn fade(&mut self, entity: &str, duration_ms: u64, opacity: f64, easing: EasingFunction);

    fn move_to(
        &mut self,
        entity: &str,
        duration_ms: u64,
        x: Coordinate,
        y: Coordinate,
        easing: EasingFunction,
    );

    fn zoom(
        &mut self,
        entity: &str,
        duration_ms: u64,
        scale_x: f64,
        scale_y: f64,
        easing: EasingFunction,
    );

    fn transition(&mut self, entity: &str, transition: Transition);

    fn set_volume(&mut self, entity: &str, duration_ms: u64, volume: f64);

    fn set_loop(&mut self, entity: &str, looping: bool);

    fn set_loop_point(&mut self, entity: &str, start_ms: u64, end_ms: u64);

    fn remaining_time(&self, _entity: &str) -> Option<u64> {
        None
    }

    fn passage_time(&self, _entity: &str) -> Option<u64> {
        None
    }

    fn texture_size(&self, _entity: &str) -> Option<(u32, u32)> {
        None
    }

    fn begin_dialogue(&mut self, thread: &str, name: &str);

    fn present_text(&mut self, thread: &str, text: &str);

    fn begin_select(&mut self, thread: &str);

    /// Offers `label` as a choice and reports whether the player picked it.
    fn is_choice_pressed(&mut self, thread: &str, label: &str) -> bool;

    fn global(&self, name: &str) -> Option<ConstantValue>;

    fn set_global(&mut self, name: &str, value: ConstantValue);
}
