//! Table-driven x86 instruction encoder/decoder.
//!
//! [`Codec`] owns a list of [`template::Template`]s parsed from a text
//! resource (one instruction form per line) and tries them in order to turn
//! assembly text into bytes and back. The [`register`] module is the
//! process-wide register catalogue everything else is built on.

pub mod codec;
pub mod directive;
pub mod error;
pub mod numeric;
pub mod operand;
pub mod register;
pub mod template;

pub use codec::{from_hex, split_top_level_commas, to_hex, Codec, Instruction};
pub use error::CodecError;
pub use numeric::parse_integer;
pub use operand::{MemExpr, Operand, OperandSlot};
pub use register::{Register, Width};
pub use template::Template;
