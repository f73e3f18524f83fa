//! One parsed line of the instruction table: a mnemonic, an operand
//! pattern, and the opcode descriptor that encodes/decodes it.
//!
//! Grounded on `arch-ops::x86::insn::X86Opcode`, which pairs a mnemonic with
//! a fixed operand-type table and opcode bytes; here the operand pattern and
//! opcode bytes are themselves read from a template line instead of declared
//! in a macro invocation.

use crate::directive::{self, decode_modrm, encode_modrm, EmitDirective, RegSource};
use crate::operand::{match_operand, MemExpr, Operand, OperandSlot};
use crate::register::{self, Width};

/// One template: `mnemonic operand_pattern ; opcode_descriptor`.
#[derive(Debug, Clone)]
pub struct Template {
    pub mnemonic: String,
    pub pattern: Vec<OperandSlot>,
    directives: Vec<EmitDirective>,
}

impl Template {
    /// Parses one line of the table. Blank lines and `#`-comments are the
    /// caller's concern (see `Codec::load`); a malformed or comment-shaped
    /// line simply yields `None` here.
    pub fn parse(line: &str) -> Option<Template> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (body, descriptor_text) = line.split_once(';')?;
        let mut words = body.split_whitespace();
        let mnemonic = words.next()?.to_ascii_lowercase();
        let pattern: Vec<OperandSlot> = words
            .map(|w| OperandSlot::parse(w))
            .collect::<Option<_>>()?;
        let directives = directive::parse_descriptor(descriptor_text.trim(), &pattern)?;
        Some(Template {
            mnemonic,
            pattern,
            directives,
        })
    }

    /// Tries to match `mnemonic` and `operands` (already split on top-level
    /// commas) against this template's pattern. `strict` rejects an
    /// immediate/relative value that would fit a narrower slot than the one
    /// declared, so that a smaller template gets first refusal.
    pub fn try_match(&self, mnemonic: &str, operands: &[&str], strict: bool) -> Option<Vec<Operand>> {
        if self.mnemonic != mnemonic || self.pattern.len() != operands.len() {
            return None;
        }
        let matched: Vec<Operand> = self
            .pattern
            .iter()
            .zip(operands)
            .map(|(slot, token)| match_operand(*slot, token))
            .collect::<Option<_>>()?;

        if strict {
            for (slot, operand) in self.pattern.iter().zip(&matched) {
                if narrower_slot_would_fit(*slot, *operand) {
                    return None;
                }
            }
        }

        Some(matched)
    }

    /// Runs the opcode descriptor forward over already-matched operands.
    pub fn encode(&self, operands: &[Operand]) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        for directive in &self.directives {
            match *directive {
                EmitDirective::Byte(b) => out.push(b),
                EmitDirective::PlusR(slot) => {
                    let reg = operands[slot].as_reg()?;
                    let last = out.last_mut()?;
                    *last |= reg.enc & 0b111;
                }
                EmitDirective::ModRm { reg, rm_slot } => {
                    let reg_field = match reg {
                        RegSource::Digit(d) => d,
                        RegSource::Slot(slot) => operands[slot].as_reg()?.enc,
                    };
                    out.extend(encode_modrm(reg_field, operands[rm_slot])?);
                }
                EmitDirective::Imm { width, slot } => {
                    let Operand::Imm(_, value) = operands[slot] else {
                        return None;
                    };
                    out.extend_from_slice(&le_bytes(value, width));
                }
                EmitDirective::Rel { width, slot } => {
                    let Operand::Rel(_, value) = operands[slot] else {
                        return None;
                    };
                    out.extend_from_slice(&le_bytes(value as i128, width));
                }
            }
        }
        Some(out)
    }

    /// Runs the opcode descriptor backward over raw bytes, reconstructing
    /// operands slot by slot. Returns the operands and the number of bytes
    /// consumed.
    pub fn decode(&self, bytes: &[u8]) -> Option<(Vec<Operand>, usize)> {
        let mut operands: Vec<Option<Operand>> = vec![None; self.pattern.len()];
        let mut pos = 0usize;
        let mut last_byte: u8 = 0;

        for directive in &self.directives {
            match *directive {
                EmitDirective::Byte(b) => {
                    if *bytes.get(pos)? != b {
                        return None;
                    }
                    last_byte = b;
                    pos += 1;
                }
                EmitDirective::PlusR(slot) => {
                    let width = register_slot_width(self.pattern[slot])?;
                    let enc = last_byte & 0b111;
                    operands[slot] = Some(Operand::Reg(register::by_encoding(enc, width)?));
                }
                EmitDirective::ModRm { reg, rm_slot } => {
                    let width = rm_slot_width(self.pattern[rm_slot])?;
                    let (reg_field, operand, consumed) = decode_modrm(&bytes[pos..], width)?;
                    pos += consumed;
                    match reg {
                        RegSource::Digit(d) => {
                            if reg_field != d {
                                return None;
                            }
                        }
                        RegSource::Slot(reg_slot) => {
                            let reg_width = register_slot_width(self.pattern[reg_slot])?;
                            operands[reg_slot] =
                                Some(Operand::Reg(register::by_encoding(reg_field, reg_width)?));
                        }
                    }
                    operands[rm_slot] = Some(operand);
                }
                EmitDirective::Imm { width, slot } => {
                    let raw = bytes.get(pos..pos + width.bytes())?;
                    pos += width.bytes();
                    operands[slot] = Some(Operand::Imm(width, unsigned_le(raw)));
                }
                EmitDirective::Rel { width, slot } => {
                    let raw = bytes.get(pos..pos + width.bytes())?;
                    pos += width.bytes();
                    operands[slot] = Some(Operand::Rel(width, unsigned_le(raw) as i64));
                }
            }
        }

        // Slots not touched by any directive (plain register/memory operands
        // matched structurally through ModR/M `rm`) are already filled; any
        // `Literal` slot just echoes the template's fixed register.
        for (slot, operand) in operands.iter_mut().enumerate() {
            if operand.is_none() {
                if let OperandSlot::Literal(reg) = self.pattern[slot] {
                    *operand = Some(Operand::Reg(reg));
                }
            }
        }

        let operands: Vec<Operand> = operands.into_iter().collect::<Option<_>>()?;
        Some((operands, pos))
    }

    /// Formats `mnemonic operand, operand` for a decoded operand list, using
    /// the register catalogue's width names for memory operands and hex for
    /// immediates/displacements.
    pub fn format(&self, operands: &[Operand]) -> String {
        let rendered: Vec<String> = operands.iter().map(format_operand).collect();
        if rendered.is_empty() {
            self.mnemonic.clone()
        } else {
            format!("{} {}", self.mnemonic, rendered.join(", "))
        }
    }
}

fn register_slot_width(slot: OperandSlot) -> Option<Width> {
    match slot {
        OperandSlot::Reg(w) | OperandSlot::RegOrMem(w) => Some(w),
        OperandSlot::Literal(r) => Some(r.width),
        _ => None,
    }
}

fn rm_slot_width(slot: OperandSlot) -> Option<Width> {
    match slot {
        OperandSlot::Reg(w) | OperandSlot::Mem(w) | OperandSlot::RegOrMem(w) => Some(w),
        OperandSlot::Literal(r) => Some(r.width),
        _ => None,
    }
}

fn unsigned_le(bytes: &[u8]) -> i128 {
    let mut value: i128 = 0;
    for &b in bytes.iter().rev() {
        value = (value << 8) | b as i128;
    }
    value
}

fn le_bytes(value: i128, width: Width) -> Vec<u8> {
    value.to_le_bytes()[..width.bytes()].to_vec()
}

/// Used by strict matching: true if `operand` would also fit a slot one
/// size down from `slot`, meaning a smaller template should get first crack.
fn narrower_slot_would_fit(slot: OperandSlot, operand: Operand) -> bool {
    use crate::numeric::fits_in_bits;
    let (value, width) = match (slot, operand) {
        (OperandSlot::Imm(w), Operand::Imm(_, v)) => (v, w),
        (OperandSlot::Rel(w), Operand::Rel(_, v)) => (v as i128, w),
        _ => return false,
    };
    match width {
        Width::Word => fits_in_bits(value, Width::Byte.bits()),
        Width::Dword => fits_in_bits(value, Width::Word.bits()),
        Width::Qword => fits_in_bits(value, Width::Dword.bits()),
        Width::Byte => false,
    }
}

fn format_operand(operand: &Operand) -> String {
    match *operand {
        Operand::Reg(reg) => reg.name.to_string(),
        Operand::Imm(_, value) => format!("0x{:x}", value),
        Operand::Rel(_, value) => format!("0x{:x}", value),
        Operand::Mem(width, mem) => format!("{} [{}]", width.name(), format_mem(mem)),
    }
}

fn format_mem(mem: MemExpr) -> String {
    match mem {
        MemExpr::Reg(reg) => reg.name.to_string(),
        MemExpr::RegDisp(reg, disp) if disp >= 0 => format!("{}+0x{:x}", reg.name, disp),
        MemExpr::RegDisp(reg, disp) => format!("{}-0x{:x}", reg.name, -disp),
        MemExpr::Abs(disp) => format!("0x{:x}", disp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::regs;

    #[test]
    fn parses_a_template_line() {
        let t = Template::parse("nop ; 90").unwrap();
        assert_eq!(t.mnemonic, "nop");
        assert!(t.pattern.is_empty());
    }

    #[test]
    fn encodes_nop() {
        let t = Template::parse("nop ; 90").unwrap();
        let operands = t.try_match("nop", &[], false).unwrap();
        assert_eq!(t.encode(&operands).unwrap(), vec![0x90]);
    }

    #[test]
    fn encodes_mov_register_immediate_with_plus_r() {
        let t = Template::parse("mov r32 imm32 ; b8 +r id").unwrap();
        let operands = t.try_match("mov", &["eax", "0x11223344"], false).unwrap();
        assert_eq!(
            t.encode(&operands).unwrap(),
            vec![0xb8, 0x44, 0x33, 0x22, 0x11]
        );
    }

    #[test]
    fn encodes_and_decodes_xchg_absolute_memory() {
        let t = Template::parse("xchg m32 r32 ; 87 /r").unwrap();
        let operands = t.try_match("xchg", &["[123]", "eax"], false).unwrap();
        let bytes = t.encode(&operands).unwrap();
        assert_eq!(bytes, vec![0x87, 0x05, 0x7b, 0x00, 0x00, 0x00]);

        let (decoded, consumed) = t.decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded[1], Operand::Reg(regs::Eax));
        assert_eq!(
            decoded[0],
            Operand::Mem(Width::Dword, MemExpr::Abs(123))
        );
    }

    #[test]
    fn decodes_and_formats_mov_byte_memory_immediate() {
        let t = Template::parse("mov m8 imm8 ; c6 /0 ib").unwrap();
        let operands = t
            .try_match("mov", &["byte [eax+0x48]", "0x69"], false)
            .unwrap();
        let bytes = t.encode(&operands).unwrap();

        let (decoded, consumed) = t.decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(t.format(&decoded), "mov byte [eax+0x48], 0x69");
    }

    #[test]
    fn strict_matching_rejects_narrower_fitting_immediate() {
        let t = Template::parse("mov r32 imm32 ; b8 +r id").unwrap();
        assert!(t.try_match("mov", &["eax", "5"], true).is_none());
        assert!(t.try_match("mov", &["eax", "5"], false).is_some());
    }
}
