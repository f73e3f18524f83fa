//! The text-to-text integer expression evaluator (base spec §4.6).
//!
//! This is deliberately not a tokeniser-plus-AST like the teacher's own
//! `expr::parse_expression` (`lc-as::expr`) -- the base spec calls for
//! something much smaller: two left-to-right sweeps over a mutable string
//! buffer, multiplicative operators first, then additive ones, replacing
//! each matched `operand op operand` span with the decimal form of the
//! result and restarting the sweep. No parentheses, no operator stack.
//!
//! Operand literals reuse [`x86_ops::parse_integer`], so the four bases
//! (`0x..`, `..h`, `..b`, `..o`, bare digits) stay in lockstep with the
//! codec's own operand matcher.

use x86_ops::parse_integer;

/// Why a sweep gave up: either it found an arithmetic-shaped site it could
/// not evaluate (division by zero), or there is nothing left to do. Only
/// [`Error::DivisionByZero`] should ever actually occur in well-formed input
/// reaching this evaluator, since a site whose operands don't both parse as
/// integers is treated as "not an arithmetic site" rather than a failure --
/// see the module-level open question recorded in `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    DivisionByZero,
}

/// Runs both sweeps over `text` and returns the fully reduced buffer, or
/// `Err` if a division/modulus by zero was encountered. On error the caller
/// is expected to keep the original text unchanged and log `"Error
/// processing"`, per §7 -- this function never returns a partially reduced
/// buffer.
pub fn evaluate(text: &str) -> Result<String, Error> {
    let mut buf = text.to_string();
    sweep(&mut buf, &['*', '/', '%'])?;
    sweep(&mut buf, &['+', '-'])?;
    Ok(buf)
}

fn is_literal_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Repeatedly scans `buf` left to right for an operator in `ops` flanked by
/// two integer-literal operands, replacing the first one found with its
/// decimal value and restarting, until a full scan makes no replacement.
fn sweep(buf: &mut String, ops: &[char]) -> Result<(), Error> {
    loop {
        match find_and_apply_once(buf, ops)? {
            true => continue,
            false => return Ok(()),
        }
    }
}

fn find_and_apply_once(buf: &mut String, ops: &[char]) -> Result<bool, Error> {
    let chars: Vec<char> = buf.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if !ops.contains(&c) {
            continue;
        }

        let Some(site) = locate_site(&chars, i) else {
            continue;
        };

        let left_text: String = chars[site.left_start..site.op].iter().collect();
        let right_text: String = chars[site.op + 1..site.right_end].iter().collect();

        let (Some(lhs), Some(rhs)) = (parse_integer(&left_text), parse_integer(&right_text)) else {
            // Not an arithmetic site after all -- e.g. a bare register name
            // such as `eax` sitting next to a `-` that belongs to a memory
            // displacement already handled upstream. Keep scanning.
            continue;
        };

        let result = match c {
            '+' => lhs + rhs,
            '-' => lhs - rhs,
            '*' => lhs * rhs,
            '/' => {
                if rhs == 0 {
                    return Err(Error::DivisionByZero);
                }
                lhs / rhs
            }
            '%' => {
                if rhs == 0 {
                    return Err(Error::DivisionByZero);
                }
                lhs % rhs
            }
            _ => unreachable!("c is one of `ops`"),
        };

        let prefix: String = chars[..site.left_start].iter().collect();
        let suffix: String = chars[site.right_end..].iter().collect();
        *buf = format!("{prefix}{result}{suffix}");
        return Ok(true);
    }

    Ok(false)
}

struct Site {
    left_start: usize,
    op: usize,
    right_end: usize,
}

/// Given an operator at `op`, finds the maximal literal run to its left and
/// to its right (each optionally carrying one leading sign character,
/// accepted "immediately adjacent to the operator position" per §4.6),
/// returning `None` if either side has no adjoining literal characters at
/// all.
fn locate_site(chars: &[char], op: usize) -> Option<Site> {
    let mut left = op;
    while left > 0 && is_literal_char(chars[left - 1]) {
        left -= 1;
    }
    if left == op {
        return None;
    }
    if left > 0 && is_sign(chars[left - 1]) && (left < 2 || !is_literal_char(chars[left - 2])) {
        left -= 1;
    }

    let mut right = op + 1;
    if right < chars.len() && is_sign(chars[right]) {
        right += 1;
    }
    let right_lit_start = right;
    while right < chars.len() && is_literal_char(chars[right]) {
        right += 1;
    }
    if right == right_lit_start {
        return None;
    }

    Some(Site {
        left_start: left,
        op,
        right_end: right,
    })
}

fn is_sign(c: char) -> bool {
    c == '+' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_multiplicative_before_additive() {
        assert_eq!(evaluate("mov eax, 2*3+0x10").unwrap(), "mov eax, 22");
    }

    #[test]
    fn evaluates_all_five_operators() {
        assert_eq!(evaluate("10+3").unwrap(), "13");
        assert_eq!(evaluate("10-3").unwrap(), "7");
        assert_eq!(evaluate("10*3").unwrap(), "30");
        assert_eq!(evaluate("10/3").unwrap(), "3");
        assert_eq!(evaluate("10%3").unwrap(), "1");
    }

    #[test]
    fn parses_all_four_literal_bases_as_operands() {
        assert_eq!(evaluate("0x10+1").unwrap(), "17");
        assert_eq!(evaluate("10h+1").unwrap(), "17");
        assert_eq!(evaluate("1010b+1").unwrap(), "11");
        assert_eq!(evaluate("17o+1").unwrap(), "16");
    }

    #[test]
    fn truncated_division_semantics() {
        assert_eq!(evaluate("-7/2").unwrap(), "-3");
        assert_eq!(evaluate("-7%2").unwrap(), "-1");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(evaluate("10/0"), Err(Error::DivisionByZero));
        assert_eq!(evaluate("10%0"), Err(Error::DivisionByZero));
    }

    #[test]
    fn leaves_non_arithmetic_operand_text_untouched() {
        assert_eq!(evaluate("mov eax, ebx").unwrap(), "mov eax, ebx");
        assert_eq!(
            evaluate("mov byte [eax-0x4], 0x69").unwrap(),
            "mov byte [eax-0x4], 0x69"
        );
    }

    #[test]
    fn restarts_the_sweep_after_each_replacement() {
        assert_eq!(evaluate("1+2+3+4").unwrap(), "10");
        assert_eq!(evaluate("2*3*4").unwrap(), "24");
    }
}
