//! Double-quoted string literals with standard escapes.
//!
//! Shared by the assembler (constant parsing), the disassembler (constant
//! rendering) and value repr. Quoting and unquoting round-trip exactly.

/// Quotes a string: printable characters pass through, specials and control
/// characters are escaped.
pub(crate) fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quotes raw bytes: printable ASCII passes through, everything else becomes
/// a `\xNN` escape.
pub(crate) fn quote_bytes(b: &[u8]) -> String {
    let mut out = String::with_capacity(b.len() + 2);
    out.push('"');
    for &byte in b {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }
    out.push('"');
    out
}

/// Parses a double-quoted literal into raw bytes.
///
/// Recognised escapes: `\" \' \\ \n \t \r \0 \xNN \uNNNN \UNNNNNNNN`.
/// Fails on a missing quote, a trailing backslash, an unknown escape or a
/// malformed hex escape.
pub(crate) fn unquote(s: &str) -> Result<Vec<u8>, String> {
    let inner = s
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .filter(|_| s.len() >= 2)
        .ok_or_else(|| format!("not a double-quoted string: {s}"))?;

    let mut out = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '"' {
            return Err("unescaped quote inside string".to_owned());
        }
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let esc = chars.next().ok_or_else(|| "trailing backslash".to_owned())?;
        match esc {
            '"' => out.push(b'"'),
            '\'' => out.push(b'\''),
            '\\' => out.push(b'\\'),
            'n' => out.push(b'\n'),
            't' => out.push(b'\t'),
            'r' => out.push(b'\r'),
            '0' => out.push(0),
            'x' => out.push(hex_digits(&mut chars, 2)? as u8),
            'u' => push_char(&mut out, hex_digits(&mut chars, 4)?)?,
            'U' => push_char(&mut out, hex_digits(&mut chars, 8)?)?,
            other => return Err(format!("unknown escape \\{other}")),
        }
    }
    Ok(out)
}

fn hex_digits(chars: &mut std::str::Chars<'_>, n: usize) -> Result<u32, String> {
    let mut v: u32 = 0;
    for _ in 0..n {
        let c = chars.next().ok_or_else(|| "truncated hex escape".to_owned())?;
        let d = c.to_digit(16).ok_or_else(|| format!("bad hex digit {c:?}"))?;
        v = (v << 4) | d;
    }
    Ok(v)
}

fn push_char(out: &mut Vec<u8>, code: u32) -> Result<(), String> {
    let c = char::from_u32(code).ok_or_else(|| format!("invalid code point \\u{code:x}"))?;
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_roundtrip() {
        for s in ["", "abc", "a\"b", "tab\there", "line\nbreak", "uni\u{00e9}"] {
            let quoted = quote_str(s);
            assert_eq!(unquote(&quoted).unwrap(), s.as_bytes());
        }
    }

    #[test]
    fn bytes_roundtrip() {
        let b: Vec<u8> = vec![0, 1, b'a', 0x7f, 0x80, 0xff];
        let quoted = quote_bytes(&b);
        assert_eq!(unquote(&quoted).unwrap(), b);
    }

    #[test]
    fn rejects_malformed() {
        assert!(unquote("\"a'").is_err());
        assert!(unquote("\"\\x0\"").is_err());
        assert!(unquote("\"\\q\"").is_err());
        assert!(unquote("abc").is_err());
    }
}
