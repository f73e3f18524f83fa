//! Operand slots (the shape a template declares) and operands (the value a
//! line of assembly actually supplies), plus the matcher that tries to read
//! one token stream as the other.
//!
//! Grounded on `arch-ops::x86::insn::X86OperandType` for the slot/value split,
//! generalised from its closed compile-time enum into values built while
//! parsing a template line, per this crate's text-format table.

use crate::numeric::{fits_in_bits, parse_integer};
use crate::register::{self, Register, Width};

/// The shape one operand position in a template declares it will accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSlot {
    /// `rW` -- any register of the given width, value supplies the encoding.
    Reg(Width),
    /// A hardcoded register name appearing literally in the pattern, e.g.
    /// the `eax` in `xchg rmW, eax` -- must match that exact register.
    Literal(Register),
    /// `mW` -- a memory operand of the given width.
    Mem(Width),
    /// `rmW` -- either a register or a memory operand of the given width.
    RegOrMem(Width),
    /// `immW` -- an immediate literal that fits in `W` bits.
    Imm(Width),
    /// `relW` -- a signed displacement, for branch targets.
    Rel(Width),
}

impl OperandSlot {
    /// Parses one whitespace-delimited pattern token, e.g. `"r32"`, `"rm8"`,
    /// `"imm16"`, `"rel32"`, or a bare register name used as a literal.
    pub fn parse(token: &str) -> Option<OperandSlot> {
        if let Some(rest) = token.strip_prefix("rm") {
            return Some(OperandSlot::RegOrMem(parse_width(rest)?));
        }
        if let Some(rest) = token.strip_prefix('r') {
            if let Ok(bits) = rest.parse::<u32>() {
                return Some(OperandSlot::Reg(Width::from_bits(bits)?));
            }
        }
        if let Some(rest) = token.strip_prefix('m') {
            if let Ok(bits) = rest.parse::<u32>() {
                return Some(OperandSlot::Mem(Width::from_bits(bits)?));
            }
        }
        if let Some(rest) = token.strip_prefix("imm") {
            return Some(OperandSlot::Imm(parse_width(rest)?));
        }
        if let Some(rest) = token.strip_prefix("rel") {
            return Some(OperandSlot::Rel(parse_width(rest)?));
        }
        register::by_name(token).map(OperandSlot::Literal)
    }

    /// Whether this slot ever needs a ModR/M byte to encode.
    pub fn needs_modrm(self) -> bool {
        matches!(
            self,
            OperandSlot::Reg(_) | OperandSlot::Mem(_) | OperandSlot::RegOrMem(_)
        )
    }
}

fn parse_width(digits: &str) -> Option<Width> {
    Width::from_bits(digits.parse().ok()?)
}

/// A memory operand's addressing mode, already reduced to base register (if
/// any), displacement, and whether the displacement is an absolute address
/// with no base register at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemExpr {
    /// `[reg]`
    Reg(Register),
    /// `[reg+disp]` or `[reg-disp]`
    RegDisp(Register, i64),
    /// `[disp]` with no base register -- a bare absolute address.
    Abs(i64),
}

impl MemExpr {
    pub fn base(self) -> Option<Register> {
        match self {
            MemExpr::Reg(r) | MemExpr::RegDisp(r, _) => Some(r),
            MemExpr::Abs(_) => None,
        }
    }

    pub fn disp(self) -> i64 {
        match self {
            MemExpr::Reg(_) => 0,
            MemExpr::RegDisp(_, d) => d,
            MemExpr::Abs(d) => d,
        }
    }
}

/// One operand as it appears, already matched, in a line of assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Register),
    Mem(Width, MemExpr),
    Imm(Width, i128),
    Rel(Width, i64),
}

impl Operand {
    pub fn as_reg(self) -> Option<Register> {
        match self {
            Operand::Reg(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_mem(self) -> Option<MemExpr> {
        match self {
            Operand::Mem(_, m) => Some(m),
            _ => None,
        }
    }
}

/// Tries to read `token` as the value an `OperandSlot` asks for. A width
/// keyword on a memory operand (`byte [eax]`) is checked if present; its
/// absence is not a mismatch -- the slot's width always wins, matching the
/// assembler's own treatment of a dereference with no explicit size.
pub fn match_operand(slot: OperandSlot, token: &str) -> Option<Operand> {
    let token = token.trim();
    match slot {
        OperandSlot::Literal(reg) => {
            let found = register::by_name(token)?;
            (found.name == reg.name).then_some(Operand::Reg(reg))
        }
        OperandSlot::Reg(width) => {
            let reg = register::by_name(token)?;
            (reg.width == width).then_some(Operand::Reg(reg))
        }
        OperandSlot::Mem(width) => match_mem(token, width),
        OperandSlot::RegOrMem(width) => {
            if let Some(reg) = register::by_name(token) {
                return (reg.width == width).then_some(Operand::Reg(reg));
            }
            match_mem(token, width)
        }
        OperandSlot::Imm(width) => {
            let value = parse_integer(token)?;
            fits_in_bits(value, width.bits()).then_some(Operand::Imm(width, value))
        }
        OperandSlot::Rel(width) => {
            let value = parse_integer(token)?;
            let value = i64::try_from(value).ok()?;
            fits_in_bits(value as i128, width.bits()).then_some(Operand::Rel(width, value))
        }
    }
}

/// Parses `[reg]`, `[reg+disp]`, `[reg-disp]`, or `[disp]`, with an optional
/// leading width keyword (`byte`, `word`, `dword`, `qword`) that, if present,
/// must agree with `width`.
fn match_mem(token: &str, width: Width) -> Option<Operand> {
    let token = token.trim();
    let (prefix, bracketed) = token.split_once('[')?;
    let prefix = prefix.trim();
    if !prefix.is_empty() {
        let keyword_width = match prefix {
            "byte" => Width::Byte,
            "word" => Width::Word,
            "dword" => Width::Dword,
            "qword" => Width::Qword,
            _ => return None,
        };
        if keyword_width != width {
            return None;
        }
    }
    let inner = bracketed.strip_suffix(']')?.trim();

    let (sign_pos, sign) = inner
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '+' || c == '-')
        .map(|(i, c)| (Some(i), c))
        .unwrap_or((None, '+'));

    let expr = if let Some(pos) = sign_pos {
        let base = register::by_name(inner[..pos].trim())?;
        (base.width == Width::Dword).then_some(())?;
        let disp = parse_integer(inner[pos + 1..].trim())?;
        let disp = i64::try_from(disp).ok()?;
        MemExpr::RegDisp(base, if sign == '-' { -disp } else { disp })
    } else if let Some(base) = register::by_name(inner) {
        (base.width == Width::Dword).then_some(())?;
        MemExpr::Reg(base)
    } else {
        let disp = parse_integer(inner)?;
        MemExpr::Abs(i64::try_from(disp).ok()?)
    };

    Some(Operand::Mem(width, expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::regs;

    #[test]
    fn parses_every_slot_kind() {
        assert_eq!(OperandSlot::parse("r32"), Some(OperandSlot::Reg(Width::Dword)));
        assert_eq!(OperandSlot::parse("rm8"), Some(OperandSlot::RegOrMem(Width::Byte)));
        assert_eq!(OperandSlot::parse("m16"), Some(OperandSlot::Mem(Width::Word)));
        assert_eq!(OperandSlot::parse("imm32"), Some(OperandSlot::Imm(Width::Dword)));
        assert_eq!(OperandSlot::parse("rel8"), Some(OperandSlot::Rel(Width::Byte)));
        assert_eq!(OperandSlot::parse("eax"), Some(OperandSlot::Literal(regs::Eax)));
    }

    #[test]
    fn matches_register_operand() {
        let op = match_operand(OperandSlot::Reg(Width::Dword), "eax").unwrap();
        assert_eq!(op, Operand::Reg(regs::Eax));
    }

    #[test]
    fn matches_literal_register_slot_only_against_that_register() {
        assert!(match_operand(OperandSlot::Literal(regs::Eax), "eax").is_some());
        assert!(match_operand(OperandSlot::Literal(regs::Eax), "ecx").is_none());
    }

    #[test]
    fn matches_memory_operand_with_and_without_width_keyword() {
        let with_kw = match_operand(OperandSlot::Mem(Width::Dword), "dword [eax+4]").unwrap();
        let without_kw = match_operand(OperandSlot::Mem(Width::Dword), "[eax+4]").unwrap();
        assert_eq!(with_kw, without_kw);
        assert_eq!(
            with_kw,
            Operand::Mem(Width::Dword, MemExpr::RegDisp(regs::Eax, 4))
        );
    }

    #[test]
    fn matches_absolute_memory_operand() {
        let op = match_operand(OperandSlot::Mem(Width::Dword), "[123]").unwrap();
        assert_eq!(op, Operand::Mem(Width::Dword, MemExpr::Abs(123)));
    }

    #[test]
    fn rejects_mismatched_width_keyword() {
        assert!(match_operand(OperandSlot::Mem(Width::Dword), "byte [eax]").is_none());
    }

    #[test]
    fn matches_immediate_within_width_and_rejects_overflow() {
        assert_eq!(
            match_operand(OperandSlot::Imm(Width::Byte), "127"),
            Some(Operand::Imm(Width::Byte, 127))
        );
        assert!(match_operand(OperandSlot::Imm(Width::Byte), "1000").is_none());
    }

    #[test]
    fn regormem_slot_accepts_either_shape() {
        assert!(match_operand(OperandSlot::RegOrMem(Width::Dword), "eax").is_some());
        assert!(match_operand(OperandSlot::RegOrMem(Width::Dword), "[eax]").is_some());
        assert!(match_operand(OperandSlot::RegOrMem(Width::Dword), "ax").is_none());
    }

    #[test]
    fn matches_relative_operand_within_width_and_rejects_overflow() {
        assert_eq!(
            match_operand(OperandSlot::Rel(Width::Byte), "127"),
            Some(Operand::Rel(Width::Byte, 127))
        );
        assert!(match_operand(OperandSlot::Rel(Width::Byte), "-200").is_none());
    }

    #[test]
    fn rejects_memory_base_register_of_the_wrong_width() {
        assert!(match_operand(OperandSlot::Mem(Width::Dword), "[al+4]").is_none());
        assert!(match_operand(OperandSlot::Mem(Width::Dword), "[rsp+4]").is_none());
        assert!(match_operand(OperandSlot::Mem(Width::Dword), "[ax]").is_none());
    }
}
