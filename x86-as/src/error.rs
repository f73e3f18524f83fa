//! Per-node diagnostics the driver reports while it runs. Grounded on
//! `x86-ops::error::CodecError`'s split between structural errors (returned,
//! never swallowed) and match failure (silent `Option`); generalised here to
//! the driver's own structural conditions from the base spec's error
//! taxonomy (`"Size changed"`, `"Error processing"`, duplicate labels,
//! malformed line shape).
//!
//! None of these abort `process_nodes` -- per the base spec, "all error
//! reporting is diagnostic; the engine does not abort" -- so every variant
//! here is collected into a `Vec<AssembleError>` and returned alongside the
//! best-effort assembled bytes, never as an `Err` that short-circuits.

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AssembleError {
    #[error("line {line_nr}: label {name:?} is already defined")]
    DuplicateLabel { name: String, line_nr: usize },

    #[error("line {line_nr}: more than one ':' in a single line")]
    MultipleColons { line_nr: usize },

    #[error("node {index} (line {line_nr}): Error processing")]
    ArithmeticError { index: usize, line_nr: usize },

    #[error("node {index} (line {line_nr}): Size changed")]
    SizeChanged { index: usize, line_nr: usize },

    #[error("node {index} (line {line_nr}): no instruction template matched {text:?}")]
    NoTemplateMatch {
        index: usize,
        line_nr: usize,
        text: String,
    },
}
