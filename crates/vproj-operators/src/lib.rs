#![forbid(unsafe_code)]
//! vproj-operators: the projection operator and the pieces it is built from.
//!
//! Design intent:
//! - Keep this crate pure and synchronous (no async).
//! - All output buffers MUST come from a `ColumnAllocator` (see `vproj-mem`).
//! - Expression compilation is injectable (`codegen::ProjectorCompiler`);
//!   the default interprets typed expressions through boxed closures.

pub mod codegen;
pub mod events;
pub mod project;
pub mod source;
pub mod traits;

pub use codegen::{
    CachingCompiler, CompileError, ExecutableProjector, InterpretedCompiler, ProjectorCompiler,
    WriteInstruction, WritePlan,
};
pub use events::{EventSink, NoopSink, ProjectEvent, RecordingSink, TracingSink};
pub use project::setup::{CompiledProjection, OutputSlot, SchemaCompiler};
pub use project::{ProjectContext, ProjectOperator, ProjectStats, TransferBinding};
pub use source::MemorySource;
pub use traits::{BatchSource, EntryError, IterOutcome, OpError};
