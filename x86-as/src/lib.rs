//! A two-pass, label-resolving program assembler driver built on
//! [`x86_ops`]. [`Assembler`] consumes multi-line assembly text, classifies
//! each line into a [`node::ProgramNode`], and resolves labels and integer
//! arithmetic in operand text before handing each instruction to the
//! underlying [`x86_ops::Codec`].
//!
//! For a single line of assembly, skip this crate entirely and call
//! [`x86_ops::Codec::assemble`] directly -- the classifier and two-pass
//! driver here exist only for the label/arithmetic-resolution problem that
//! shows up once instructions start referencing each other's positions.

pub mod assembler;
pub mod error;
pub mod expr;
pub mod labels;
pub mod node;

pub use assembler::Assembler;
pub use error::AssembleError;
pub use node::ProgramNode;
