//! Label substitution (base spec §4.7): replacing whole-word references to a
//! label name, inside one instruction's text, with the hex literal the
//! codec's operand matcher can then parse.

/// One label's resolved value, as seen by the node that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelTarget {
    /// An offset-label: its position in the output stream, not yet
    /// shifted by `code_base`.
    Offset(i64),
    /// An address-label: a fixed value, already absolute.
    Fixed(i64),
}

/// Whether an instruction's mnemonic treats its label operand as a signed
/// displacement from the next instruction (jumps and `call`) rather than an
/// absolute address.
pub fn is_relative_mnemonic(text: &str) -> bool {
    let mnemonic = text.trim().split_whitespace().next().unwrap_or("");
    let mnemonic = mnemonic.to_ascii_lowercase();
    mnemonic.starts_with('j') || mnemonic == "call"
}

/// Substitutes every whole-word occurrence of `name` in `text` with the
/// value `name` resolves to, following §4.7:
///
/// - relative instructions get a signed displacement from the byte after
///   this instruction, truncated to 8/16/32 bits by magnitude (a fixed
///   label instead substitutes a `dword [0x..]` absolute reference, since a
///   relative jump to a truly fixed address isn't expressible as a simple
///   displacement literal);
/// - every other instruction gets an absolute value (`target + code_base`
///   for an offset label, or the fixed address verbatim).
///
/// `this_position` and `this_size` describe the referencing instruction's
/// own position and (possibly estimated) size, needed for the relative
/// displacement calculation.
pub fn substitute(
    text: &str,
    name: &str,
    target: LabelTarget,
    is_relative: bool,
    this_position: i64,
    this_size: i64,
    code_base: i64,
) -> String {
    let replacement = if is_relative {
        match target {
            LabelTarget::Fixed(addr) => format!("dword [0x{addr:x}]"),
            LabelTarget::Offset(pos) => {
                let value = pos - (this_position + this_size);
                format_rel(value)
            }
        }
    } else {
        let value = match target {
            LabelTarget::Fixed(addr) => addr,
            LabelTarget::Offset(pos) => pos + code_base,
        };
        format_hex(value)
    };

    replace_whole_word(text, name, &replacement)
}

/// Truncates a relative displacement to 8/16/32 bits by magnitude alone,
/// per §4.7 and the base spec's first open question: negative values are
/// bucketed by how negative they are; non-negative values are kept at
/// their natural (untruncated) width, mirroring the source this was
/// distilled from rather than truncating those too. See `DESIGN.md`.
fn format_rel(value: i64) -> String {
    if value < -32767 {
        format_hex32(value)
    } else if value < -127 {
        format_hex16(value)
    } else if value < 0 {
        format_hex8(value)
    } else {
        format_hex(value)
    }
}

fn format_hex(value: i64) -> String {
    if value < 0 {
        format!("-0x{:x}", -value)
    } else {
        format!("0x{value:x}")
    }
}

fn format_hex8(value: i64) -> String {
    format!("-0x{:x}", -value & 0xff)
}

fn format_hex16(value: i64) -> String {
    format!("-0x{:x}", -value & 0xffff)
}

fn format_hex32(value: i64) -> String {
    format!("-0x{:x}", (-(value as i128)) & 0xffff_ffff)
}

/// Replaces whole-word occurrences of `name` in `text`: the characters
/// immediately before and after a match must not be alphanumeric, `_`,
/// `$`, or `.`, so `foo` is substituted in `jmp foo` but left alone inside
/// `foobar` or `xfoo`.
pub fn replace_whole_word(text: &str, name: &str, replacement: &str) -> String {
    if name.is_empty() {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    let needle: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i..].starts_with(needle.as_slice())
            && is_word_boundary(chars.get(i.wrapping_sub(1)).copied())
            && is_word_boundary(chars.get(i + needle.len()).copied())
        {
            out.push_str(replacement);
            i += needle.len();
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn is_word_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => !(c.is_alphanumeric() || c == '_' || c == '$' || c == '.'),
    }
}

/// Whether `text` contains at least one whole-word occurrence of `name`,
/// by the same boundary rule [`replace_whole_word`] uses.
pub fn contains_whole_word(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let chars: Vec<char> = text.chars().collect();
    let needle: Vec<char> = name.chars().collect();
    (0..chars.len()).any(|i| {
        chars[i..].starts_with(needle.as_slice())
            && is_word_boundary(chars.get(i.wrapping_sub(1)).copied())
            && is_word_boundary(chars.get(i + needle.len()).copied())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_whole_words() {
        assert_eq!(replace_whole_word("jmp foo", "foo", "0x10"), "jmp 0x10");
        assert_eq!(replace_whole_word("jmp foobar", "foo", "0x10"), "jmp foobar");
        assert_eq!(replace_whole_word("jmp xfoo", "foo", "0x10"), "jmp xfoo");
    }

    #[test]
    fn relative_mnemonic_detection() {
        assert!(is_relative_mnemonic("jmp L"));
        assert!(is_relative_mnemonic("je L"));
        assert!(is_relative_mnemonic("call L"));
        assert!(!is_relative_mnemonic("mov eax, L"));
    }

    #[test]
    fn short_backward_jump_substitutes_a_negative_rel8() {
        let text = substitute("jmp L", "L", LabelTarget::Offset(0), true, 0, 2, 0);
        assert_eq!(text, "jmp -0x2");
    }

    #[test]
    fn absolute_reference_adds_code_base() {
        let text = substitute("mov eax, L", "L", LabelTarget::Offset(0x10), false, 0, 5, 0x401000);
        assert_eq!(text, "mov eax, 0x401010");
    }

    #[test]
    fn fixed_label_relative_reference_uses_dword_indirect() {
        let text = substitute("jmp L", "L", LabelTarget::Fixed(0x500), true, 0, 2, 0);
        assert_eq!(text, "jmp dword [0x500]");
    }

    #[test]
    fn large_negative_displacement_widens_to_32_bits() {
        let text = substitute("jmp L", "L", LabelTarget::Offset(0), true, 40000, 2, 0);
        assert_eq!(text, "jmp -0x9c42");
    }
}
