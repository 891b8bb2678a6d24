//! Numeric token scanner shared by the file and buffer backings.
//!
//! Only two token shapes exist: a signed decimal integer (`%d`) and a decimal
//! floating-point number (`%f`). Leading ASCII whitespace is skipped, then the
//! longest prefix matching the requested shape is taken. Nothing past that
//! prefix is looked at, so `"12abc"` scans as the integer `12`.

use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;

/// Kind of numeric token requested from [`crate::Stream::scan_token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Signed 32-bit decimal integer (`%d`).
    Int,
    /// 32-bit float (`%f`).
    Float,
}

/// A parsed numeric token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Int(i32),
    Float(f32),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int => f.write_str("integer"),
            TokenKind::Float => f.write_str("float"),
        }
    }
}

impl FromStr for TokenKind {
    type Err = StreamError;

    /// Accepts the two scanf-style formats used by RAW parsers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "%d" => Ok(TokenKind::Int),
            "%f" => Ok(TokenKind::Float),
            other => Err(StreamError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// C `isspace` in the "C" locale.
#[inline]
pub(crate) fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Number of leading whitespace bytes in `bytes`.
pub(crate) fn skip_space(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|&&b| is_space(b)).count()
}

fn digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn sign(bytes: &[u8]) -> usize {
    usize::from(matches!(bytes.first(), Some(b'+' | b'-')))
}

/// Length of the integer literal at the start of `bytes`, or 0.
fn int_len(bytes: &[u8]) -> usize {
    let s = sign(bytes);
    match digits(&bytes[s..]) {
        0 => 0,
        d => s + d,
    }
}

/// Length of the float literal at the start of `bytes`, or 0.
fn float_len(bytes: &[u8]) -> usize {
    let mut len = sign(bytes);
    let whole = digits(&bytes[len..]);
    len += whole;

    let mut frac = 0;
    if bytes.get(len) == Some(&b'.') {
        frac = digits(&bytes[len + 1..]);
        if whole > 0 || frac > 0 {
            len += 1 + frac;
        }
    }
    if whole == 0 && frac == 0 {
        return 0;
    }

    // The exponent only counts when at least one digit follows it.
    if matches!(bytes.get(len), Some(b'e' | b'E')) {
        let exp_start = len + 1;
        let exp_sign = sign(&bytes[exp_start..]);
        let exp_digits = digits(&bytes[exp_start + exp_sign..]);
        if exp_digits > 0 {
            len = exp_start + exp_sign + exp_digits;
        }
    }
    len
}

/// Scans one token of `kind` from the start of `bytes`.
///
/// Returns the token and the number of bytes it spans, leading whitespace
/// included. `None` when no literal of the requested kind starts there or the
/// value does not fit the target type.
pub fn scan(bytes: &[u8], kind: TokenKind) -> Option<(Token, usize)> {
    let start = skip_space(bytes);
    let rest = &bytes[start..];
    let len = match kind {
        TokenKind::Int => int_len(rest),
        TokenKind::Float => float_len(rest),
    };
    if len == 0 {
        return None;
    }

    // The literal is pure ASCII by construction.
    let text = std::str::from_utf8(&rest[..len]).ok()?;
    let token = match kind {
        TokenKind::Int => Token::Int(text.parse().ok()?),
        TokenKind::Float => Token::Float(text.parse().ok()?),
    };
    Some((token, start + len))
}
