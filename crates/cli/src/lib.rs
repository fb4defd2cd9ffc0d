//! Host side of the reconcile engine: package I/O, engine configuration and
//! the built-in functions.

pub mod functions;
pub mod io;

pub use functions::FunctionKind;
