//! The step model: typed, ordered, mutable automation steps as edited in a
//! visual session.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AutomationError;

/// Parameter set of a step: names declared by the kind, values as loose
/// JSON so a document survives round-trips with unknown values intact.
pub type Params = BTreeMap<String, Value>;

/// Every action a workflow step can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ClickImage,
    WaitImage,
    LongPress,
    MouseDrag,
    InputText,
    WaitTime,
    OpenUrl,
    OpenApp,
    Paste,
    ClipboardSet,
    OcrRegion,
    PressKey,
    Notify,
    LoopStart,
    LoopEnd,
}

impl StepKind {
    pub const ALL: [StepKind; 15] = [
        StepKind::ClickImage,
        StepKind::WaitImage,
        StepKind::LongPress,
        StepKind::MouseDrag,
        StepKind::InputText,
        StepKind::WaitTime,
        StepKind::OpenUrl,
        StepKind::OpenApp,
        StepKind::Paste,
        StepKind::ClipboardSet,
        StepKind::OcrRegion,
        StepKind::PressKey,
        StepKind::Notify,
        StepKind::LoopStart,
        StepKind::LoopEnd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StepKind::ClickImage => "click_image",
            StepKind::WaitImage => "wait_image",
            StepKind::LongPress => "long_press",
            StepKind::MouseDrag => "mouse_drag",
            StepKind::InputText => "input_text",
            StepKind::WaitTime => "wait_time",
            StepKind::OpenUrl => "open_url",
            StepKind::OpenApp => "open_app",
            StepKind::Paste => "paste",
            StepKind::ClipboardSet => "clipboard_set",
            StepKind::OcrRegion => "ocr_region",
            StepKind::PressKey => "press_key",
            StepKind::Notify => "notify",
            StepKind::LoopStart => "loop_start",
            StepKind::LoopEnd => "loop_end",
        }
    }

    /// Human label for list panels and logs.
    pub fn label(self) -> &'static str {
        match self {
            StepKind::ClickImage => "Click image",
            StepKind::WaitImage => "Wait for image",
            StepKind::LongPress => "Long press",
            StepKind::MouseDrag => "Mouse drag",
            StepKind::InputText => "Input text",
            StepKind::WaitTime => "Wait",
            StepKind::OpenUrl => "Open URL",
            StepKind::OpenApp => "Open application",
            StepKind::Paste => "Paste",
            StepKind::ClipboardSet => "Set clipboard",
            StepKind::OcrRegion => "OCR region",
            StepKind::PressKey => "Press key",
            StepKind::Notify => "Push notification",
            StepKind::LoopStart => "Loop start",
            StepKind::LoopEnd => "Loop end",
        }
    }

    /// The exact parameter names this kind declares.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            StepKind::ClickImage | StepKind::WaitImage => {
                &["image_path", "confidence", "timeout"]
            }
            StepKind::LongPress => &["duration", "x", "y"],
            StepKind::MouseDrag => &["start_x", "start_y", "end_x", "end_y", "duration"],
            StepKind::InputText => &["text", "clear_first"],
            StepKind::WaitTime => &["seconds"],
            StepKind::OpenUrl => &["url"],
            StepKind::OpenApp => &["app_path"],
            StepKind::Paste => &[],
            StepKind::ClipboardSet => &["content"],
            StepKind::OcrRegion => &["x1", "y1", "x2", "y2", "var_name"],
            StepKind::PressKey => &["key", "modifiers"],
            StepKind::Notify => &["title", "content"],
            StepKind::LoopStart => &["loop_count"],
            StepKind::LoopEnd => &[],
        }
    }

    /// Fresh parameter map holding every declared name at its default.
    pub fn default_params(self) -> Params {
        self.param_names()
            .iter()
            .map(|&name| (name.to_string(), default_value(name)))
            .collect()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StepKind {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| AutomationError::UnknownStepKind(s.to_string()))
    }
}

fn default_value(name: &str) -> Value {
    match name {
        "confidence" => json!(0.8),
        "timeout" => json!(30),
        "clear_first" => json!(true),
        "seconds" => json!(3),
        "url" => json!("https://"),
        "var_name" => json!("result"),
        "x" | "y" | "x1" | "y1" | "start_x" | "start_y" => json!(0),
        "x2" => json!(200),
        "y2" | "end_x" | "end_y" => json!(100),
        "key" => json!("enter"),
        "duration" => json!(1.0),
        "title" => json!("Notification"),
        "loop_count" => json!(3),
        // image_path, text, app_path, content, modifiers
        _ => json!(""),
    }
}

/// Opaque unique step token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(Uuid);

impl StepId {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default = "new_step_id")]
    pub id: StepId,
    pub kind: StepKind,
    #[serde(default)]
    pub params: Params,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn new_step_id() -> StepId {
    StepId::fresh()
}

impl Step {
    /// A new step of `kind` with every declared parameter at its default.
    pub fn new(kind: StepKind) -> Self {
        Self {
            id: StepId::fresh(),
            kind,
            params: kind.default_params(),
            enabled: true,
        }
    }
}

pub enum MoveDirection {
    Up,
    Down,
}

type Observer = Box<dyn FnMut()>;

/// Ordered, mutable step collection for one editing session.
///
/// Single-threaded by design; there is exactly one observer slot and the
/// last registration wins, which is what the editing surface relies on
/// when a document is reloaded.
#[derive(Default)]
pub struct StepSequence {
    steps: Vec<Step>,
    observer: Option<Observer>,
}

impl fmt::Debug for StepSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSequence")
            .field("steps", &self.steps)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl StepSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the change observer, replacing any previous registration.
    pub fn set_observer(&mut self, observer: impl FnMut() + 'static) {
        self.observer = Some(Box::new(observer));
    }

    fn notify(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer();
        }
    }

    pub fn add(&mut self, kind: StepKind) -> StepId {
        let step = Step::new(kind);
        let id = step.id;
        self.steps.push(step);
        self.notify();
        id
    }

    pub fn remove(&mut self, id: StepId) {
        let before = self.steps.len();
        self.steps.retain(|s| s.id != id);
        if self.steps.len() != before {
            self.notify();
        }
    }

    /// Swaps the step with its neighbor; a no-op at either boundary.
    pub fn move_step(&mut self, id: StepId, direction: MoveDirection) {
        let Some(index) = self.steps.iter().position(|s| s.id == id) else {
            return;
        };
        let target = match direction {
            MoveDirection::Up if index > 0 => index - 1,
            MoveDirection::Down if index + 1 < self.steps.len() => index + 1,
            _ => return,
        };
        self.steps.swap(index, target);
        self.notify();
    }

    /// Merges `partial` into the step's params. Names the kind does not
    /// declare are dropped with a warning, preserving the invariant that a
    /// step holds exactly its declared parameters.
    pub fn update(&mut self, id: StepId, partial: impl IntoIterator<Item = (String, Value)>) {
        let Some(step) = self.steps.iter_mut().find(|s| s.id == id) else {
            return;
        };
        let declared = step.kind.param_names();
        let mut changed = false;
        for (name, value) in partial {
            if declared.contains(&name.as_str()) {
                step.params.insert(name, value);
                changed = true;
            } else {
                warn!(kind = %step.kind, param = %name, "ignoring undeclared parameter");
            }
        }
        if changed {
            self.notify();
        }
    }

    pub fn toggle(&mut self, id: StepId) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == id) {
            step.enabled = !step.enabled;
            self.notify();
        }
    }

    /// Appends a copy of the step (fresh id) at the end of the sequence.
    pub fn duplicate(&mut self, id: StepId) -> Option<StepId> {
        let source = self.steps.iter().find(|s| s.id == id)?.clone();
        let copy = Step {
            id: StepId::fresh(),
            ..source
        };
        let new_id = copy.id;
        self.steps.push(copy);
        self.notify();
        Some(new_id)
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The ordered snapshot the compiler reads.
    pub fn snapshot(&self) -> Vec<Step> {
        self.steps.clone()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replaces the whole sequence, e.g. after loading a document.
    pub fn load(&mut self, steps: Vec<Step>) {
        self.steps = steps;
        self.notify();
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn add_initializes_declared_defaults() {
        let mut seq = StepSequence::new();
        let id = seq.add(StepKind::ClickImage);
        let step = seq.get(id).unwrap();
        assert_eq!(step.params.len(), 3);
        assert_eq!(step.params["confidence"], json!(0.8));
        assert_eq!(step.params["timeout"], json!(30));
        assert_eq!(step.params["image_path"], json!(""));
        assert!(step.enabled);
    }

    #[test]
    fn add_then_remove_restores_prior_state() {
        let mut seq = StepSequence::new();
        seq.add(StepKind::OpenUrl);
        let before = seq.snapshot();
        let id = seq.add(StepKind::WaitTime);
        seq.remove(id);
        assert_eq!(seq.snapshot(), before);
    }

    #[test]
    fn move_is_noop_at_boundaries() {
        let mut seq = StepSequence::new();
        let first = seq.add(StepKind::OpenUrl);
        let last = seq.add(StepKind::WaitTime);
        let before = seq.snapshot();
        seq.move_step(first, MoveDirection::Up);
        seq.move_step(last, MoveDirection::Down);
        assert_eq!(seq.snapshot(), before);

        seq.move_step(last, MoveDirection::Up);
        assert_eq!(seq.steps()[0].id, last);
        assert_eq!(seq.steps()[1].id, first);
    }

    #[test]
    fn update_touches_only_named_params() {
        let mut seq = StepSequence::new();
        let id = seq.add(StepKind::ClickImage);
        seq.update(id, [("timeout".to_string(), json!(5))]);
        let step = seq.get(id).unwrap();
        assert_eq!(step.params["timeout"], json!(5));
        assert_eq!(step.params["confidence"], json!(0.8));
    }

    #[test]
    fn update_drops_undeclared_params() {
        let mut seq = StepSequence::new();
        let id = seq.add(StepKind::Paste);
        seq.update(id, [("surprise".to_string(), json!("x"))]);
        assert!(seq.get(id).unwrap().params.is_empty());
    }

    #[test]
    fn toggle_flips_enabled() {
        let mut seq = StepSequence::new();
        let id = seq.add(StepKind::Paste);
        seq.toggle(id);
        assert!(!seq.get(id).unwrap().enabled);
        seq.toggle(id);
        assert!(seq.get(id).unwrap().enabled);
    }

    #[test]
    fn duplicate_copies_params_with_fresh_id() {
        let mut seq = StepSequence::new();
        let id = seq.add(StepKind::WaitTime);
        seq.update(id, [("seconds".to_string(), json!(9))]);
        let copy = seq.duplicate(id).unwrap();
        assert_ne!(copy, id);
        assert_eq!(seq.get(copy).unwrap().params["seconds"], json!(9));
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn every_mutation_notifies_and_last_observer_wins() {
        let mut seq = StepSequence::new();
        let stale = Rc::new(Cell::new(0));
        let live = Rc::new(Cell::new(0));

        let counter = stale.clone();
        seq.set_observer(move || counter.set(counter.get() + 1));
        let counter = live.clone();
        seq.set_observer(move || counter.set(counter.get() + 1));

        let id = seq.add(StepKind::OpenUrl);
        seq.update(id, [("url".to_string(), json!("https://example.com"))]);
        seq.toggle(id);
        seq.remove(id);

        assert_eq!(stale.get(), 0, "replaced observer must not fire");
        assert_eq!(live.get(), 4);
    }

    #[test]
    fn unknown_kind_name_is_rejected() {
        assert!("teleport".parse::<StepKind>().is_err());
        assert_eq!("loop_start".parse::<StepKind>().unwrap(), StepKind::LoopStart);
    }
}
