//! Lowers an ordered step snapshot into an executable program.
//!
//! Compilation builds typed instruction nodes carrying an explicit nesting
//! depth, and a separate emitter renders them as script text. Keeping the
//! two apart makes the depth-tracking algorithm testable without parsing
//! any output.

use thiserror::Error;
use tracing::warn;

use super::step::{Params, Step, StepKind};

pub const DEFAULT_LOOP_COUNT: u64 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    /// A `loop_start` with no matching `loop_end`. Left open, it would
    /// silently pull every subsequent step into the loop body, so it is
    /// rejected instead of clamped.
    #[error("loop opened at step {position} is never closed")]
    UnclosedLoop { position: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    EnterLoop { count: u64 },
    ExitLoop,
    Invoke { kind: StepKind, params: Params },
}

/// One node of the compiled program. `position` is the 1-based index among
/// enabled steps; disabled steps are invisible to the program. `depth`
/// starts at 1 and reflects loop nesting at emission time.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub position: usize,
    pub depth: usize,
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

/// Compiles a step snapshot. Pure: the same snapshot always produces the
/// same program.
///
/// Loop handling: `loop_start` opens a block at the current depth and
/// descends; `loop_end` closes the innermost open block. A dangling
/// `loop_end` with nothing open is dropped with a warning (depth clamps at
/// 1); an unterminated `loop_start` is a compile error.
pub fn compile(steps: &[Step]) -> Result<Program, CompileError> {
    let mut instructions = Vec::new();
    let mut depth = 1usize;
    let mut open_loops: Vec<usize> = Vec::new();
    let mut position = 0usize;

    for step in steps.iter().filter(|s| s.enabled) {
        position += 1;
        match step.kind {
            StepKind::LoopStart => {
                let count = step
                    .params
                    .get("loop_count")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(DEFAULT_LOOP_COUNT);
                instructions.push(Instruction {
                    position,
                    depth,
                    op: Op::EnterLoop { count },
                });
                open_loops.push(position);
                depth += 1;
            }
            StepKind::LoopEnd => {
                if open_loops.pop().is_some() {
                    depth = depth.saturating_sub(1).max(1);
                    instructions.push(Instruction {
                        position,
                        depth,
                        op: Op::ExitLoop,
                    });
                } else {
                    warn!(position, "loop_end without an open loop, dropping it");
                }
            }
            kind => {
                instructions.push(Instruction {
                    position,
                    depth,
                    op: Op::Invoke {
                        kind,
                        params: step.params.clone(),
                    },
                });
            }
        }
    }

    if let Some(position) = open_loops.pop() {
        return Err(CompileError::UnclosedLoop { position });
    }
    Ok(Program { instructions })
}

impl Program {
    /// Renders the program as indented script text, four spaces per
    /// nesting level.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for instr in &self.instructions {
            let indent = "    ".repeat(instr.depth - 1);
            match &instr.op {
                Op::EnterLoop { count } => {
                    out.push_str(&format!("{indent}repeat {count} times {{\n"));
                }
                Op::ExitLoop => {
                    out.push_str(&format!("{indent}}}\n"));
                }
                Op::Invoke { kind, params } => {
                    out.push_str(&format!("{indent}{kind}"));
                    for (name, value) in params {
                        out.push_str(&format!(" {name}={value}"));
                    }
                    out.push('\n');
                }
            }
        }
        out
    }
}
