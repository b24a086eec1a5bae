// Assembling
pub mod catalog;
mod parser;
pub use parser::{parse_line, statements, Arg, Operand, Statement};
mod air;
pub use air::{first_pass, Air, AirStmt};
mod assembler;
pub use assembler::{assemble, second_pass, Assembly, Listing};
mod image;
pub use image::{Image, ImageError, IMAGE_MAX, NO_MEMORY};

mod symbol;
pub use symbol::{Register, Span, SrcOffset, SymbolTable};
mod error;
pub use error::{AsmError, AsmErrorKind};

// Running
mod runtime;
pub use runtime::{
    run, Effect, FaultKind, FinalState, Flags, NoSupervisor, RunState, RuntimeFault, Status,
    Supervisor, TraceEntry, MEMORY_MAX, STACK_EMPTY,
};
mod output;
pub use output::Output;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;

/// Instructions executed before a run is abandoned, unless configured otherwise.
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;
