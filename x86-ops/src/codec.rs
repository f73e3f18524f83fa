//! The top-level entry point: a loaded list of templates, tried in order,
//! plus the hex convenience wrappers.
//!
//! Grounded on `arch-ops::x86::insn::X86Encoder`/`X86InsnReader`, which walk
//! a static opcode table to encode/decode one instruction at a time; this
//! version walks a runtime-loaded template list instead.

use log::{debug, trace};

use crate::error::CodecError;
use crate::template::Template;

const DEFAULT_TEMPLATES: &str = include_str!("../resources/instructions.tbl");

/// One successfully matched and encoded instruction.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub text: String,
    pub bytes: Vec<u8>,
}

/// A loaded, immutable list of instruction templates and the encode/decode
/// operations built on top of it.
#[derive(Debug, Clone)]
pub struct Codec {
    templates: Vec<Template>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// Loads the templates bundled with the library.
    pub fn new() -> Codec {
        Codec {
            templates: load_templates(DEFAULT_TEMPLATES),
        }
    }

    /// Replaces the template list with the contents of a file on disk.
    pub fn parse_file(path: &str) -> Result<Codec, CodecError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Codec {
            templates: load_templates(&text),
        })
    }

    /// Tries every template in strict mode first, keeping the shortest
    /// encoding; falls back to the first lazy match if no template matches
    /// strictly.
    pub fn assemble_smallest(&self, text: &str) -> Option<Instruction> {
        let (mnemonic, operands) = tokenize(text)?;

        let strict_best = self
            .templates
            .iter()
            .filter_map(|t| t.try_match(&mnemonic, &operands, true).and_then(|ops| t.encode(&ops)))
            .min_by_key(Vec::len);

        let bytes = strict_best.or_else(|| self.assemble_lazy_bytes(&mnemonic, &operands))?;
        Some(Instruction {
            text: text.to_string(),
            bytes,
        })
    }

    /// Returns the first lazily matching template's encoding.
    pub fn assemble_lazy(&self, text: &str) -> Option<Instruction> {
        let (mnemonic, operands) = tokenize(text)?;
        let bytes = self.assemble_lazy_bytes(&mnemonic, &operands)?;
        Some(Instruction {
            text: text.to_string(),
            bytes,
        })
    }

    fn assemble_lazy_bytes(&self, mnemonic: &str, operands: &[&str]) -> Option<Vec<u8>> {
        self.templates
            .iter()
            .find_map(|t| t.try_match(mnemonic, operands, false).and_then(|ops| t.encode(&ops)))
    }

    /// `assemble_smallest`, unwrapped to bytes; `None` is flattened to an
    /// empty vector only by callers that have already decided a match must
    /// exist -- the program assembler instead treats a `None` as its own
    /// match-failure diagnostic.
    pub fn assemble(&self, text: &str) -> Option<Vec<u8>> {
        self.assemble_smallest(text).map(|insn| insn.bytes)
    }

    pub fn assemble_hex(&self, text: &str) -> Option<String> {
        Some(to_hex(&self.assemble(text)?))
    }

    /// Tries every template in insertion order, returning the first one
    /// whose descriptor matches a prefix of `bytes`.
    pub fn disassemble(&self, bytes: &[u8]) -> Option<String> {
        self.templates.iter().find_map(|t| {
            let (operands, _consumed) = t.decode(bytes)?;
            Some(t.format(&operands))
        })
    }

    pub fn disassemble_hex(&self, hex: &str) -> Result<Option<String>, CodecError> {
        Ok(self.disassemble(&from_hex(hex)?))
    }
}

fn load_templates(text: &str) -> Vec<Template> {
    let templates: Vec<Template> = text.lines().filter_map(Template::parse).collect();
    debug!("loaded {} instruction templates", templates.len());
    templates
}

/// Lowercases, splits mnemonic from operand list on the first space, then
/// splits operands on top-level commas (commas inside `[...]` don't count).
fn tokenize(text: &str) -> Option<(String, Vec<&str>)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let lower_start = text.find(|c: char| !c.is_whitespace())?;
    let rest = &text[lower_start..];
    let (mnemonic, operand_text) = match rest.split_once(char::is_whitespace) {
        Some((m, o)) => (m, o.trim()),
        None => (rest, ""),
    };

    let operands = if operand_text.is_empty() {
        Vec::new()
    } else {
        split_top_level_commas(operand_text)
    };

    trace!("tokenised {:?} as {} / {:?}", text, mnemonic, operands);
    Some((mnemonic.to_ascii_lowercase(), operands))
}

/// Splits on commas that aren't nested inside `[...]`. Exposed for the
/// program assembler, which needs the same rule to split `db`/`dw`/`dd`/`dq`
/// value lists.
pub fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn from_hex(hex: &str) -> Result<Vec<u8>, CodecError> {
    if hex.is_empty() {
        return Err(CodecError::EmptyHex);
    }
    if hex.len() % 2 != 0 {
        return Err(CodecError::OddLengthHex(hex.len()));
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let digits: Vec<char> = hex.chars().collect();
    for pair in digits.chunks(2) {
        let hi = pair[0].to_digit(16).ok_or(CodecError::InvalidHexDigit(pair[0]))?;
        let lo = pair[1].to_digit(16).ok_or(CodecError::InvalidHexDigit(pair[1]))?;
        bytes.push(((hi << 4) | lo) as u8);
    }
    Ok(bytes)
}
