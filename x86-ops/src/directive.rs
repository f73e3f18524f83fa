//! Emit-directives: the ordered list an `Instruction` template runs to turn
//! matched operands into bytes, and runs in reverse to turn bytes back into
//! operands.
//!
//! Grounded on `arch-ops::x86::insn`'s per-opcode `&'static [X86OperandType]`
//! table paired with a fixed opcode row -- generalised here into directives
//! parsed at runtime from the table file instead of declared at compile time
//! by a macro, per this crate's text-format template grammar.

use crate::operand::{MemExpr, Operand, OperandSlot};
use crate::register::{self, Register, Width};

/// Where a ModR/M byte's `reg` field value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegSource {
    /// A fixed digit, from a `/digit` directive.
    Digit(u8),
    /// The encoding of the register matched at this operand slot.
    Slot(usize),
}

/// One step of an opcode descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitDirective {
    /// A fixed opcode byte.
    Byte(u8),
    /// `+r`: OR the low three bits of the register at this slot into the
    /// byte emitted immediately before this directive.
    PlusR(usize),
    /// `/digit` or `/r`: a ModR/M byte, its `reg` field from `reg`, its
    /// `mod`/`rm` fields from the register-or-memory operand at `rm_slot`.
    ModRm { reg: RegSource, rm_slot: usize },
    /// `ib`/`iw`/`id`/`iq`: a little-endian immediate of the given width,
    /// read from the operand at `slot`.
    Imm { width: Width, slot: usize },
    /// `cb`/`cw`/`cd`: a little-endian signed displacement.
    Rel { width: Width, slot: usize },
}

/// Tracks which operand-pattern slots have already been claimed by a
/// directive while parsing one opcode descriptor left to right, so that
/// `/r` and `+r` can each claim "the next slot of the right kind" exactly
/// once, in pattern order.
#[derive(Default)]
pub struct SlotCursor {
    next_reg_mem: usize,
    next_imm: usize,
    next_rel: usize,
}

fn is_pure_register(slot: OperandSlot) -> bool {
    matches!(slot, OperandSlot::Reg(_) | OperandSlot::Literal(_))
}

impl SlotCursor {
    /// Claims the next register-or-memory-kind slot (`Reg`, `Literal`,
    /// `Mem`, or `RegOrMem`) at or after the cursor -- used by `/digit`,
    /// whose single operand supplies only `mod`/`rm`.
    pub fn claim_reg_mem(&mut self, pattern: &[OperandSlot]) -> Option<usize> {
        let idx = (self.next_reg_mem..pattern.len())
            .find(|&i| pattern[i].needs_modrm() || matches!(pattern[i], OperandSlot::Literal(_)))?;
        self.next_reg_mem = idx + 1;
        Some(idx)
    }

    /// Claims the next variable register slot (`Reg`, never `Literal` or
    /// bare `Mem`) -- used by `+r`, which ORs a *matched* register's
    /// encoding into the preceding byte. A `Literal` slot's encoding is
    /// already fixed, so it's never a `+r` target.
    pub fn claim_register_slot(&mut self, pattern: &[OperandSlot]) -> Option<usize> {
        let idx = (self.next_reg_mem..pattern.len()).find(|&i| matches!(pattern[i], OperandSlot::Reg(_)))?;
        self.next_reg_mem = idx + 1;
        Some(idx)
    }

    /// Claims the two slots a `/r` directive needs: the next two unclaimed
    /// register-or-memory-kind slots, in pattern order. Whichever of the
    /// pair is a plain register (`Reg`/`Literal`) supplies the ModR/M `reg`
    /// field; the other supplies `mod`/`rm`. If both are plain registers,
    /// the earlier one in pattern order is `reg` (so e.g. `mov r32, r32`
    /// reads as dest-then-source). Two bare `Mem` slots can't both be
    /// claimed this way -- one side must be able to hold a register.
    pub fn claim_modrm_pair(&mut self, pattern: &[OperandSlot]) -> Option<(usize, usize)> {
        let first = self.claim_reg_mem(pattern)?;
        let second = self.claim_reg_mem(pattern)?;
        match (is_pure_register(pattern[first]), is_pure_register(pattern[second])) {
            (true, _) => Some((first, second)),
            (false, true) => Some((second, first)),
            (false, false) => None,
        }
    }

    pub fn claim_imm(&mut self, pattern: &[OperandSlot]) -> Option<usize> {
        let idx = (self.next_imm..pattern.len()).find(|&i| matches!(pattern[i], OperandSlot::Imm(_)))?;
        self.next_imm = idx + 1;
        Some(idx)
    }

    pub fn claim_rel(&mut self, pattern: &[OperandSlot]) -> Option<usize> {
        let idx = (self.next_rel..pattern.len()).find(|&i| matches!(pattern[i], OperandSlot::Rel(_)))?;
        self.next_rel = idx + 1;
        Some(idx)
    }
}

/// Parses one opcode descriptor (the text after `;` in a template line)
/// against the already-parsed operand pattern, assigning slot indices to
/// `/r`, `/digit`, `+r`, `ib`/`iw`/`id`/`iq`, and `cb`/`cw`/`cd` in pattern
/// order as each directive is encountered.
pub fn parse_descriptor(text: &str, pattern: &[OperandSlot]) -> Option<Vec<EmitDirective>> {
    let mut cursor = SlotCursor::default();
    let mut directives = Vec::new();

    for token in text.split_whitespace() {
        let directive = if let Some(digit) = token.strip_prefix('/') {
            if digit == "r" {
                let (reg_slot, rm_slot) = cursor.claim_modrm_pair(pattern)?;
                EmitDirective::ModRm {
                    reg: RegSource::Slot(reg_slot),
                    rm_slot,
                }
            } else {
                let digit: u8 = digit.parse().ok()?;
                let rm_slot = cursor.claim_reg_mem(pattern)?;
                EmitDirective::ModRm {
                    reg: RegSource::Digit(digit),
                    rm_slot,
                }
            }
        } else if token == "+r" {
            EmitDirective::PlusR(cursor.claim_register_slot(pattern)?)
        } else if let Some(width) = imm_width(token) {
            EmitDirective::Imm {
                width,
                slot: cursor.claim_imm(pattern)?,
            }
        } else if let Some(width) = rel_width(token) {
            EmitDirective::Rel {
                width,
                slot: cursor.claim_rel(pattern)?,
            }
        } else {
            EmitDirective::Byte(u8::from_str_radix(token, 16).ok()?)
        };
        directives.push(directive);
    }

    Some(directives)
}

fn imm_width(token: &str) -> Option<Width> {
    Some(match token {
        "ib" => Width::Byte,
        "iw" => Width::Word,
        "id" => Width::Dword,
        "iq" => Width::Qword,
        _ => return None,
    })
}

fn rel_width(token: &str) -> Option<Width> {
    Some(match token {
        "cb" => Width::Byte,
        "cw" => Width::Word,
        "cd" => Width::Dword,
        _ => return None,
    })
}

/// Encodes the ModR/M byte (and SIB/displacement, if needed) for one
/// register-or-memory operand, per §4.3's addressing rules.
pub fn encode_modrm(reg_field: u8, operand: Operand) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(6);
    match operand {
        Operand::Reg(reg) => {
            out.push(modrm_byte(0b11, reg_field, reg.enc));
        }
        Operand::Mem(_, MemExpr::Abs(disp)) => {
            out.push(modrm_byte(0b00, reg_field, 0b101));
            out.extend_from_slice(&(disp as i32).to_le_bytes());
        }
        Operand::Mem(_, MemExpr::Reg(base)) if base.enc == 0b101 => {
            // `[ebp]` has no mod=00 form; represent as disp8=0.
            out.push(modrm_byte(0b01, reg_field, base.enc));
            push_sib_if_needed(&mut out, base);
            out.push(0);
        }
        Operand::Mem(_, MemExpr::Reg(base)) => {
            out.push(modrm_byte(0b00, reg_field, base.enc));
            push_sib_if_needed(&mut out, base);
        }
        Operand::Mem(_, MemExpr::RegDisp(base, disp)) => {
            if let Ok(disp8) = i8::try_from(disp) {
                out.push(modrm_byte(0b01, reg_field, base.enc));
                push_sib_if_needed(&mut out, base);
                out.push(disp8 as u8);
            } else {
                out.push(modrm_byte(0b10, reg_field, base.enc));
                push_sib_if_needed(&mut out, base);
                out.extend_from_slice(&(disp as i32).to_le_bytes());
            }
        }
        Operand::Imm(..) | Operand::Rel(..) => return None,
    }
    Some(out)
}

/// `esp`/`rsp` as a ModR/M base always needs a SIB byte with no index and
/// itself as base (`0x24`); this is the one structural case this codec
/// fills in for the caller rather than leaving to the template's fixed bytes.
fn push_sib_if_needed(out: &mut Vec<u8>, base: Register) {
    if base.enc == 0b100 {
        out.push(0x24);
    }
}

fn modrm_byte(md: u8, reg: u8, rm: u8) -> u8 {
    (md << 6) | ((reg & 0b111) << 3) | (rm & 0b111)
}

/// Reads a ModR/M byte (and SIB/displacement, if present) for a register-
/// or-memory operand of the stated `width`. Returns `(reg_field, operand,
/// bytes_consumed)`.
pub fn decode_modrm(bytes: &[u8], width: Width) -> Option<(u8, Operand, usize)> {
    let byte = *bytes.first()?;
    let md = byte >> 6;
    let reg_field = (byte >> 3) & 0b111;
    let rm = byte & 0b111;
    let mut pos = 1usize;

    if md == 0b11 {
        let reg = register::by_encoding(rm, width)?;
        return Some((reg_field, Operand::Reg(reg), pos));
    }

    if rm == 0b100 {
        // SIB byte with no index, base = esp, per `push_sib_if_needed`.
        pos += 1;
    }

    if md == 0b00 && rm == 0b101 {
        let disp = i32::from_le_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?);
        pos += 4;
        return Some((reg_field, Operand::Mem(width, MemExpr::Abs(disp as i64)), pos));
    }

    let base_enc = if rm == 0b100 { 0b100 } else { rm };
    let base = register::by_encoding(base_enc, Width::Dword)?;

    let mem = match md {
        0b00 => MemExpr::Reg(base),
        0b01 => {
            let disp = *bytes.get(pos)? as i8;
            pos += 1;
            MemExpr::RegDisp(base, disp as i64)
        }
        0b10 => {
            let disp = i32::from_le_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?);
            pos += 4;
            MemExpr::RegDisp(base, disp as i64)
        }
        _ => unreachable!("mod=11 handled above"),
    };

    Some((reg_field, Operand::Mem(width, mem), pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::regs;

    #[test]
    fn encodes_register_direct_operand() {
        let bytes = encode_modrm(0, Operand::Reg(regs::Eax)).unwrap();
        assert_eq!(bytes, vec![0b11_000_000]);
    }

    #[test]
    fn encodes_absolute_memory_operand() {
        let bytes = encode_modrm(0, Operand::Mem(Width::Dword, MemExpr::Abs(0x7b))).unwrap();
        assert_eq!(bytes, vec![0b00_000_101, 0x7b, 0, 0, 0]);
    }

    #[test]
    fn encodes_ebp_base_as_disp8_zero() {
        let bytes = encode_modrm(0, Operand::Mem(Width::Dword, MemExpr::Reg(regs::Ebp))).unwrap();
        assert_eq!(bytes, vec![0b01_000_101, 0]);
    }

    #[test]
    fn encodes_esp_base_with_sib() {
        let bytes = encode_modrm(0, Operand::Mem(Width::Dword, MemExpr::Reg(regs::Esp))).unwrap();
        assert_eq!(bytes, vec![0b00_000_100, 0x24]);
    }

    #[test]
    fn round_trips_reg_disp8_through_modrm() {
        let operand = Operand::Mem(Width::Dword, MemExpr::RegDisp(regs::Eax, 0x48));
        let bytes = encode_modrm(0, operand).unwrap();
        let (reg_field, decoded, consumed) = decode_modrm(&bytes, Width::Dword).unwrap();
        assert_eq!(reg_field, 0);
        assert_eq!(decoded, operand);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn parses_modrm_and_immediate_descriptor() {
        let pattern = vec![OperandSlot::RegOrMem(Width::Dword), OperandSlot::Imm(Width::Byte)];
        let directives = parse_descriptor("83 /0 ib", &pattern).unwrap();
        assert_eq!(
            directives,
            vec![
                EmitDirective::Byte(0x83),
                EmitDirective::ModRm {
                    reg: RegSource::Digit(0),
                    rm_slot: 0
                },
                EmitDirective::Imm {
                    width: Width::Byte,
                    slot: 1
                },
            ]
        );
    }

    #[test]
    fn parses_plus_r_descriptor() {
        let pattern = vec![OperandSlot::Reg(Width::Dword)];
        let directives = parse_descriptor("b8 +r", &pattern).unwrap();
        assert_eq!(
            directives,
            vec![EmitDirective::Byte(0xb8), EmitDirective::PlusR(0)]
        );
    }

    #[test]
    fn slash_r_finds_the_register_slot_regardless_of_its_position() {
        // `xchg m32, r32 ; 87 /r` -- the register operand comes second in
        // the pattern but must still supply the ModR/M `reg` field.
        let pattern = vec![OperandSlot::Mem(Width::Dword), OperandSlot::Reg(Width::Dword)];
        let directives = parse_descriptor("87 /r", &pattern).unwrap();
        assert_eq!(
            directives,
            vec![
                EmitDirective::Byte(0x87),
                EmitDirective::ModRm {
                    reg: RegSource::Slot(1),
                    rm_slot: 0
                },
            ]
        );
    }
}
