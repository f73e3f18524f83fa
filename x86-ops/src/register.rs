//! The register catalogue: a fixed, process-wide table of the general-purpose
//! registers this codec knows about, grounded on the way `arch-ops::x86` builds
//! its `X86REGISTERS` class table with `lazy_static`.

use std::collections::HashMap;
use std::fmt;

/// Operand width in bits. Matches the four slot widths the template grammar
/// recognises (`r8`/`r16`/`r32`/`r64`, `m8`/.../`m64`, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    Byte,
    Word,
    Dword,
    Qword,
}

impl Width {
    pub const fn bits(self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
            Width::Dword => 32,
            Width::Qword => 64,
        }
    }

    pub const fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    pub fn from_bits(bits: u32) -> Option<Width> {
        match bits {
            8 => Some(Width::Byte),
            16 => Some(Width::Word),
            32 => Some(Width::Dword),
            64 => Some(Width::Qword),
            _ => None,
        }
    }

    /// The name the disassembler prints in front of a memory operand, e.g.
    /// `byte [eax]`. Free-standing widths that aren't one of the four slot
    /// widths print as `"UNKNOWN"`.
    pub fn name(self) -> &'static str {
        match self {
            Width::Byte => "byte",
            Width::Word => "word",
            Width::Dword => "dword",
            Width::Qword => "qword",
        }
    }
}

/// Prints `"UNKNOWN"` for any bit width that isn't 8/16/32/64, matching
/// `width_name` from the data model.
pub fn width_name(bits: u32) -> &'static str {
    match Width::from_bits(bits) {
        Some(w) => w.name(),
        None => "UNKNOWN",
    }
}

/// One general-purpose register: a lowercase name, a width, and a 3-bit
/// encoding nibble. `(width, enc)` is unique across the whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub name: &'static str,
    pub width: Width,
    pub enc: u8,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

macro_rules! define_registers {
    ($($name:ident, $text:literal, $width:ident, $enc:literal);* $(;)?) => {
        #[allow(non_upper_case_globals)]
        pub mod regs {
            use super::{Register, Width};
            $(
                pub const $name: Register = Register { name: $text, width: Width::$width, enc: $enc };
            )*
        }

        const ALL_REGISTERS: &[Register] = &[
            $(regs::$name,)*
        ];
    };
}

// Four widths times eight encodings: the same 32-entry layout the base
// spec's data model calls for (enc 0..7 within each width).
define_registers! {
    Al, "al", Byte, 0;
    Cl, "cl", Byte, 1;
    Dl, "dl", Byte, 2;
    Bl, "bl", Byte, 3;
    Ah, "ah", Byte, 4;
    Ch, "ch", Byte, 5;
    Dh, "dh", Byte, 6;
    Bh, "bh", Byte, 7;

    Ax, "ax", Word, 0;
    Cx, "cx", Word, 1;
    Dx, "dx", Word, 2;
    Bx, "bx", Word, 3;
    Sp, "sp", Word, 4;
    Bp, "bp", Word, 5;
    Si, "si", Word, 6;
    Di, "di", Word, 7;

    Eax, "eax", Dword, 0;
    Ecx, "ecx", Dword, 1;
    Edx, "edx", Dword, 2;
    Ebx, "ebx", Dword, 3;
    Esp, "esp", Dword, 4;
    Ebp, "ebp", Dword, 5;
    Esi, "esi", Dword, 6;
    Edi, "edi", Dword, 7;

    Rax, "rax", Qword, 0;
    Rcx, "rcx", Qword, 1;
    Rdx, "rdx", Qword, 2;
    Rbx, "rbx", Qword, 3;
    Rsp, "rsp", Qword, 4;
    Rbp, "rbp", Qword, 5;
    Rsi, "rsi", Qword, 6;
    Rdi, "rdi", Qword, 7;
}

lazy_static::lazy_static! {
    static ref BY_NAME: HashMap<&'static str, Register> = {
        let mut map = HashMap::with_capacity(ALL_REGISTERS.len());
        for reg in ALL_REGISTERS {
            map.insert(reg.name, *reg);
        }
        map
    };

    static ref BY_WIDTH: HashMap<Width, Vec<Register>> = {
        let mut map: HashMap<Width, Vec<Register>> = HashMap::new();
        for reg in ALL_REGISTERS {
            map.entry(reg.width).or_default().push(*reg);
        }
        map
    };
}

/// Case-insensitive lookup by register name, e.g. `"EAX"` and `"eax"` both
/// resolve to the same entry.
pub fn by_name(name: &str) -> Option<Register> {
    BY_NAME.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Lookup by encoding nibble and width; the inverse of `(reg.enc, reg.width)`.
pub fn by_encoding(enc: u8, width: Width) -> Option<Register> {
    BY_WIDTH
        .get(&width)?
        .iter()
        .find(|r| r.enc == enc)
        .copied()
}

/// All registers of a given width, in encoding order.
pub fn by_width(width: Width) -> &'static [Register] {
    BY_WIDTH.get(&width).map(Vec::as_slice).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_register_through_encoding_and_width() {
        for reg in ALL_REGISTERS {
            assert_eq!(by_encoding(reg.enc, reg.width), Some(*reg));
        }
    }

    #[test]
    fn by_name_is_case_insensitive() {
        assert_eq!(by_name("EAX"), by_name("eax"));
        assert_eq!(by_name("Eax").unwrap().enc, 0);
    }

    #[test]
    fn by_name_rejects_unknown_registers() {
        assert_eq!(by_name("zmm31"), None);
    }

    #[test]
    fn by_width_has_eight_entries_per_width() {
        assert_eq!(by_width(Width::Byte).len(), 8);
        assert_eq!(by_width(Width::Qword).len(), 8);
    }

    #[test]
    fn width_name_falls_back_to_unknown() {
        assert_eq!(width_name(32), "dword");
        assert_eq!(width_name(128), "UNKNOWN");
    }
}
