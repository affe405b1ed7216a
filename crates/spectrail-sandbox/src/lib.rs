//! Filesystem and process sandboxing primitives: path containment, output truncation,
//! and child-process execution. No knowledge of tools, the LLM, or persistence lives here.

pub mod output_bounder;
pub mod path_guard;
pub mod process_runner;

pub use output_bounder::{bound_bytes, bound_text, Bounded};
pub use path_guard::PathGuard;
pub use process_runner::{ProcessOutput, ProcessRunner};
