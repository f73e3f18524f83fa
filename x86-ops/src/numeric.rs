//! Integer literal parsing shared by the operand matcher (§4.3) and, via this
//! crate's public re-export, the program assembler's expression evaluator
//! (§4.6) -- both recognise the same four bases.

/// Parses one maximal integer literal token in one of the four bases the
/// spec recognises:
///
/// | Syntax | Base |
/// |---|---|
/// | `0x...` prefix, or `...h` suffix | 16 |
/// | `...b` suffix | 2 |
/// | `...o` suffix | 8 |
/// | otherwise digits only | 10 |
///
/// A leading `+`/`-` is accepted as a sign. Returns `None` if the token isn't
/// a well-formed literal in any of these bases -- this is match-failure data,
/// not an error.
pub fn parse_integer(token: &str) -> Option<i128> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let (neg, token) = match token.as_bytes()[0] {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };
    if token.is_empty() {
        return None;
    }

    let magnitude = if let Some(rest) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        i128::from_str_radix(rest, 16).ok()?
    } else if let Some(rest) = token
        .strip_suffix('h')
        .or_else(|| token.strip_suffix('H'))
    {
        i128::from_str_radix(rest, 16).ok()?
    } else if let Some(rest) = token
        .strip_suffix('b')
        .or_else(|| token.strip_suffix('B'))
    {
        i128::from_str_radix(rest, 2).ok()?
    } else if let Some(rest) = token
        .strip_suffix('o')
        .or_else(|| token.strip_suffix('O'))
    {
        i128::from_str_radix(rest, 8).ok()?
    } else if token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse::<i128>().ok()?
    } else {
        return None;
    };

    Some(if neg { -magnitude } else { magnitude })
}

/// Whether `value` fits in a two's-complement field of `bits` width,
/// accepting either the signed or the unsigned interpretation -- the rule
/// `immW`/`relW` matching uses to decide whether a literal "fits".
pub fn fits_in_bits(value: i128, bits: u32) -> bool {
    if bits >= 128 {
        return true;
    }
    let signed_min = -(1i128 << (bits - 1));
    let signed_max = (1i128 << (bits - 1)) - 1;
    let unsigned_max = (1i128 << bits) - 1;
    (signed_min..=signed_max).contains(&value) || (0..=unsigned_max).contains(&value)
}
