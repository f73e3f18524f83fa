//! Structural error types. Grounded on how the teacher's `X86MachineFromStrError`
//! implements `std::error::Error` by hand; generalised here with `thiserror`,
//! the way `fuel-asm`/`wasmtime` express library error enums across the pack.
//!
//! These cover the "structural errors" row of the error taxonomy -- caller
//! mistakes, not template mismatches. A template simply failing to match a
//! line of assembly, or a single numeric literal failing to parse during one
//! template attempt, is match-failure data (`Option`), never one of these.

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error loading instruction templates: {0}")]
    Io(#[from] std::io::Error),

    #[error("hex string has odd length ({0} characters)")]
    OddLengthHex(usize),

    #[error("hex string is empty")]
    EmptyHex,

    #[error("invalid hex digit {0:?}")]
    InvalidHexDigit(char),
}
