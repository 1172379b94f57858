//! Declarative step workflows: the editable step model, the compiler that
//! lowers a snapshot into an executable program, the interpreter that runs
//! it, and JSON persistence.

pub mod compile;
pub mod file;
pub mod run;
pub mod step;

pub use compile::{compile, CompileError, Instruction, Op, Program};
pub use file::{WorkflowFile, WorkflowSettings};
pub use run::{RunState, Runner};
pub use step::{MoveDirection, Params, Step, StepId, StepKind, StepSequence};
