//! The program assembler's node list: a tagged union of what one line of
//! input can become, per the base spec's data model. Grounded on the
//! teacher's own preference for sum types over runtime-type tests (see the
//! base spec's design notes, which call this out explicitly): `ProgramNode`
//! is matched on with `match`, not downcast.

/// One entry in the assembled program, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramNode {
    /// A symbolic offset defined at the current position in the output
    /// stream -- resolved against `positions[i]` during processing.
    Label { name: String, line_nr: usize },

    /// A label bound to a fixed absolute address instead of a stream
    /// position. The base spec's line grammar has no textual syntax for
    /// this -- see `DESIGN.md` -- so it is created only through
    /// [`crate::Assembler::bind_address`].
    Address { name: String, value: i64 },

    /// One assembly statement (or one expanded `db`/`dw`/`dd`/`dq` value).
    Instruction {
        text: String,
        line_nr: usize,
        encoded_bytes: Option<Vec<u8>>,
        processed: bool,
    },

    /// Reserved: a `#`-prefixed line. Not evaluated by this crate -- see
    /// the base spec's open question 2 -- it is a no-op that contributes no
    /// bytes.
    Macro { text: String, line_nr: usize },
}

impl ProgramNode {
    pub fn line_nr(&self) -> usize {
        match self {
            ProgramNode::Label { line_nr, .. } => *line_nr,
            ProgramNode::Address { .. } => 0,
            ProgramNode::Instruction { line_nr, .. } => *line_nr,
            ProgramNode::Macro { line_nr, .. } => *line_nr,
        }
    }

    /// `encoded_bytes.len()` once processed; otherwise the conservative
    /// four-byte estimate used only by the first sizing pass. Labels,
    /// addresses, and macros never contribute bytes of their own.
    pub fn size(&self) -> usize {
        match self {
            ProgramNode::Label { .. } | ProgramNode::Address { .. } | ProgramNode::Macro { .. } => 0,
            ProgramNode::Instruction {
                encoded_bytes,
                processed,
                ..
            } => {
                if *processed {
                    encoded_bytes.as_ref().map_or(0, Vec::len)
                } else {
                    4
                }
            }
        }
    }

    pub fn as_instruction_text(&self) -> Option<&str> {
        match self {
            ProgramNode::Instruction { text, .. } => Some(text),
            _ => None,
        }
    }
}
