//! Script parsing, the replay oracle, the latching layer, and the process
//! supervisor behind the `grader` binary, split out as a library so both
//! `src/main.rs` and `tests/` can drive them directly.

pub mod error;
pub mod latch;
pub mod oracle;
pub mod script;
pub mod supervisor;

pub mod prelude {
    pub use crate::error::{OracleError, ScriptError, SupervisorError};
    pub use crate::latch::LatchLayer;
    pub use crate::oracle::{Frame, Oracle, Priority, TimestampKind};
    pub use crate::script::{parse, validate, Directive, Script, ScriptLine};
}
