//! Executes a compiled program against a live session.
//!
//! Recognition misses are warn-and-continue: a `click_image` that never
//! finds its reference does not stop the remaining steps. Only backend
//! faults (input synthesis broken, interrupted run) abort execution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument, warn};

use super::compile::{Instruction, Op, Program};
use super::step::{Params, StepKind};
use crate::backend::KeySpec;
use crate::errors::AutomationError;
use crate::types::{Point, Region};
use crate::Session;

/// Named artifacts produced by earlier steps and consumed by later ones:
/// an OCR result, the captured reward code. Orchestrator-scoped, transient.
#[derive(Debug, Default, Clone)]
pub struct RunState {
    values: HashMap<String, String>,
}

impl RunState {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Replaces every `{name}` placeholder with the stored value; unknown
    /// names are left as-is.
    pub fn substitute(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, value) in &self.values {
            out = out.replace(&format!("{{{name}}}"), value);
        }
        out
    }
}

struct LoopFrame {
    body_start: usize,
    remaining: u64,
}

/// Interprets a [`Program`] one instruction at a time against the session
/// services.
pub struct Runner<'a> {
    session: &'a Session,
    pub state: RunState,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<'a> Runner<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            state: RunState::default(),
            interrupt: None,
        }
    }

    /// Attach a coarse interrupt flag, checked between instructions.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    #[instrument(level = "info", skip(self, program))]
    pub fn run(&mut self, program: &Program) -> Result<(), AutomationError> {
        let instructions = &program.instructions;
        let mut frames: Vec<LoopFrame> = Vec::new();
        let mut index = 0usize;

        while index < instructions.len() {
            if let Some(flag) = &self.interrupt {
                if flag.load(Ordering::Relaxed) {
                    return Err(AutomationError::Interrupted);
                }
            }
            let instr = &instructions[index];
            match &instr.op {
                Op::EnterLoop { count } => {
                    if *count == 0 {
                        index = skip_loop_body(instructions, index);
                        continue;
                    }
                    frames.push(LoopFrame {
                        body_start: index + 1,
                        remaining: *count,
                    });
                }
                Op::ExitLoop => {
                    // Compilation guarantees every ExitLoop closes an open
                    // EnterLoop.
                    if let Some(frame) = frames.last_mut() {
                        frame.remaining -= 1;
                        if frame.remaining > 0 {
                            index = frame.body_start;
                            continue;
                        }
                        frames.pop();
                    }
                }
                Op::Invoke { kind, params } => {
                    info!(position = instr.position, step = %kind, "executing step");
                    let done = self.invoke(*kind, params)?;
                    if !done {
                        warn!(position = instr.position, step = %kind, "step reported failure, continuing");
                    }
                }
            }
            index += 1;
        }
        Ok(())
    }

    /// Runs one invocation. `Ok(false)` is a recognition miss or another
    /// recoverable outcome.
    fn invoke(&mut self, kind: StepKind, params: &Params) -> Result<bool, AutomationError> {
        match kind {
            StepKind::ClickImage => {
                let image = str_param(params, "image_path");
                let found = self
                    .session
                    .locator(PathBuf::from(image))
                    .confidence(f32_param(params, "confidence", 0.8))
                    .wait_for(Some(secs(params, "timeout", 30.0)));
                match found {
                    Some(m) => {
                        let (x, y) = m.location;
                        self.session
                            .pointer()
                            .click(Some(Point::new(x as i32, y as i32)))?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            StepKind::WaitImage => {
                let image = str_param(params, "image_path");
                let found = self
                    .session
                    .locator(PathBuf::from(image))
                    .confidence(f32_param(params, "confidence", 0.8))
                    .wait_for(Some(secs(params, "timeout", 30.0)));
                Ok(found.is_some())
            }
            StepKind::LongPress => {
                let x = i32_param(params, "x", 0);
                let y = i32_param(params, "y", 0);
                // (0, 0) means "where the pointer already is".
                let target = (x != 0 || y != 0).then_some(Point::new(x, y));
                self.session
                    .pointer()
                    .long_press(target, secs(params, "duration", 1.0))?;
                Ok(true)
            }
            StepKind::MouseDrag => {
                let from = Point::new(
                    i32_param(params, "start_x", 0),
                    i32_param(params, "start_y", 0),
                );
                let to = Point::new(
                    i32_param(params, "end_x", 100),
                    i32_param(params, "end_y", 100),
                );
                self.session
                    .pointer()
                    .drag(from, to, secs(params, "duration", 1.0))?;
                Ok(true)
            }
            StepKind::InputText => {
                if bool_param(params, "clear_first", true) {
                    self.session
                        .input()
                        .hotkey(&[KeySpec::Control], KeySpec::Char('a'))?;
                }
                // Entered through the clipboard so non-ASCII text
                // survives; direct synthesis is the fallback when the
                // clipboard is unavailable.
                let text = self.state.substitute(&str_param(params, "text"));
                match self.session.clipboard().write_text(&text) {
                    Ok(()) => {
                        self.session
                            .input()
                            .hotkey(&[KeySpec::Control], KeySpec::Char('v'))?;
                    }
                    Err(e) => {
                        warn!(error = %e, "clipboard unavailable, typing text directly");
                        self.session.input().type_text(&text)?;
                    }
                }
                thread::sleep(Duration::from_millis(200));
                Ok(true)
            }
            StepKind::WaitTime => {
                thread::sleep(secs(params, "seconds", 3.0));
                Ok(true)
            }
            StepKind::OpenUrl => {
                self.session.open_url(&str_param(params, "url"))?;
                thread::sleep(Duration::from_secs(3));
                Ok(true)
            }
            StepKind::OpenApp => {
                let path = PathBuf::from(str_param(params, "app_path"));
                self.session.open_app(&path)?;
                thread::sleep(Duration::from_secs(2));
                Ok(true)
            }
            StepKind::Paste => {
                self.session
                    .input()
                    .hotkey(&[KeySpec::Control], KeySpec::Char('v'))?;
                thread::sleep(Duration::from_millis(300));
                Ok(true)
            }
            StepKind::ClipboardSet => {
                let content = self.state.substitute(&str_param(params, "content"));
                self.session.clipboard().write_text(&content)?;
                Ok(true)
            }
            StepKind::OcrRegion => {
                let region = Region::from_corners(
                    i32_param(params, "x1", 0),
                    i32_param(params, "y1", 0),
                    i32_param(params, "x2", 200),
                    i32_param(params, "y2", 100),
                );
                let var = str_param(params, "var_name");
                let var = if var.is_empty() { "result".into() } else { var };
                match self.session.read_region_text(region) {
                    Some(text) => {
                        info!(var = %var, text = %text, "OCR result stored");
                        self.state.set(var, text);
                        Ok(true)
                    }
                    None => {
                        self.state.set(var, "");
                        Ok(false)
                    }
                }
            }
            StepKind::PressKey => {
                let key: KeySpec = str_param(params, "key").parse()?;
                let modifiers = parse_modifiers(&str_param(params, "modifiers"))?;
                if modifiers.is_empty() {
                    self.session.input().key_tap(key)?;
                } else {
                    self.session.input().hotkey(&modifiers, key)?;
                }
                Ok(true)
            }
            StepKind::Notify => {
                let title = self.state.substitute(&str_param(params, "title"));
                let content = self.state.substitute(&str_param(params, "content"));
                self.session.notify(&title, &content);
                Ok(true)
            }
            // Loop markers never reach invoke; the interpreter consumes
            // them above.
            StepKind::LoopStart | StepKind::LoopEnd => Ok(true),
        }
    }
}

/// Index just past the ExitLoop matching the EnterLoop at `enter`.
fn skip_loop_body(instructions: &[Instruction], enter: usize) -> usize {
    let mut level = 0usize;
    for (offset, instr) in instructions[enter..].iter().enumerate() {
        match instr.op {
            Op::EnterLoop { .. } => level += 1,
            Op::ExitLoop => {
                level -= 1;
                if level == 0 {
                    return enter + offset + 1;
                }
            }
            Op::Invoke { .. } => {}
        }
    }
    instructions.len()
}

fn str_param(params: &Params, name: &str) -> String {
    match params.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn f32_param(params: &Params, name: &str, default: f32) -> f32 {
    params
        .get(name)
        .and_then(|v| v.as_f64())
        .map(|v| v as f32)
        .unwrap_or(default)
}

fn i32_param(params: &Params, name: &str, default: i32) -> i32 {
    params
        .get(name)
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .unwrap_or(default)
}

fn bool_param(params: &Params, name: &str, default: bool) -> bool {
    params.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn secs(params: &Params, name: &str, default: f64) -> Duration {
    let value = params.get(name).and_then(|v| v.as_f64()).unwrap_or(default);
    Duration::from_secs_f64(value.max(0.0))
}

/// Parses a comma- or plus-separated modifier list ("ctrl,shift").
fn parse_modifiers(spec: &str) -> Result<Vec<KeySpec>, AutomationError> {
    spec.replace('+', ",")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitution_replaces_known_names_only() {
        let mut state = RunState::default();
        state.set("code", "X7K9-AB12");
        assert_eq!(
            state.substitute("Code: {code}, raw: {missing}"),
            "Code: X7K9-AB12, raw: {missing}"
        );
    }

    #[test]
    fn modifier_lists_parse_both_separators() {
        let mods = parse_modifiers("ctrl+shift").unwrap();
        assert_eq!(mods, vec![KeySpec::Control, KeySpec::Shift]);
        let mods = parse_modifiers(" ctrl , alt ").unwrap();
        assert_eq!(mods, vec![KeySpec::Control, KeySpec::Alt]);
        assert!(parse_modifiers("").unwrap().is_empty());
    }

    #[test]
    fn numeric_params_fall_back_to_defaults() {
        let params: Params = [("timeout".to_string(), json!("soon"))].into_iter().collect();
        assert_eq!(secs(&params, "timeout", 30.0), Duration::from_secs(30));
        assert_eq!(i32_param(&params, "x", 7), 7);
    }
}
