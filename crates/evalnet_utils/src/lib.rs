//! Diagnostics rendering, logging setup and name suggestions shared by the
//! evalnet crates.

pub mod errors;
pub mod logger;
pub mod suggest;

pub use errors::{Diagnostic, DiagnosticSeverity, render_diagnostics};
