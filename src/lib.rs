// Parsing
mod lexer;
mod parser;
pub use parser::{assemble, AsmParser};
mod air;
pub use air::{Air, Field, Patch};
mod span;

// Shared encoding
pub mod isa;

// Running
mod runtime;
pub use runtime::{DebugSink, Exit, RunState, Step, Terminal, MEMORY_END, RAM_SIZE, ROM_SIZE};
pub mod screen;
pub mod output;

mod error;
pub use error::{AsmError, Fault, ImageError};

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
