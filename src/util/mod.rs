#![allow(clippy::module_name_repetitions)]
//! Small utilities: stable hashing, column fitting, output excerpts, epoch time.

pub mod exec;

use std::time::{Duration, SystemTime};

/// Simple stable 64-bit FNV-1a hash over byte chunks; returns 16-hex lowercase id.
pub fn fnv1a_hex<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = &'a [u8]>,
{
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 1099511628211;
    let mut h: u64 = FNV_OFFSET;
    for chunk in chunks {
        for b in chunk {
            h ^= *b as u64;
            h = h.wrapping_mul(FNV_PRIME);
        }
        // Chunk separator so ["ab","c"] and ["a","bc"] differ.
        h ^= 0xff;
        h = h.wrapping_mul(FNV_PRIME);
    }
    format!("{:016x}", h)
}

pub fn secs_since_epoch(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

/// Visible width in terminal columns (one per char; the table never holds wide glyphs
/// other than single-column spinner/arrow symbols).
pub fn display_width(s: &str) -> usize {
    s.chars().count()
}

/// Fit a string to exactly `width` columns (truncate with '…' or pad with spaces).
pub fn fit(s: &str, width: usize) -> String {
    let len = display_width(s);
    if len == width {
        return s.to_string();
    }
    if len < width {
        let mut out = String::with_capacity(s.len() + width - len);
        out.push_str(s);
        out.extend(std::iter::repeat(' ').take(width - len));
        return out;
    }
    if width == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(width - 1).collect();
    out.push('…');
    out
}

/// Center `s` within `width` columns; never truncates.
pub fn center(s: &str, width: usize) -> String {
    let len = display_width(s);
    if len >= width {
        return s.to_string();
    }
    let pad = width - len;
    let left = pad / 2;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(pad - left))
}

/// Short, single-line excerpt of process output for failure details.
/// Prefers the first line mentioning `error`/`fatal`/`CONFLICT`, else the first non-empty line.
pub fn excerpt(output: &str, max_chars: usize) -> String {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let preferred = output.lines().map(str::trim).find(|l| {
        let lower = l.to_ascii_lowercase();
        lower.starts_with("error") || lower.starts_with("fatal") || l.starts_with("CONFLICT")
    });
    let line = preferred.or_else(|| lines.next()).unwrap_or("");
    if display_width(line) <= max_chars {
        line.to_string()
    } else {
        let mut s: String = line.chars().take(max_chars.saturating_sub(1)).collect();
        s.push('…');
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv_is_stable_and_chunk_sensitive() {
        let a = fnv1a_hex([b"ab".as_slice(), b"c".as_slice()]);
        let b = fnv1a_hex([b"a".as_slice(), b"bc".as_slice()]);
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert_eq!(a, fnv1a_hex([b"ab".as_slice(), b"c".as_slice()]));
    }

    #[test]
    fn test_fit_pads_and_truncates() {
        assert_eq!(fit("ab", 4), "ab  ");
        assert_eq!(fit("abcdef", 4), "abc…");
        assert_eq!(fit("abcd", 4), "abcd");
        assert_eq!(center("x", 5), "  x  ");
    }

    #[test]
    fn test_excerpt_prefers_fatal_line() {
        let out = "hint: something\nfatal: not a git repository\nmore";
        assert_eq!(excerpt(out, 160), "fatal: not a git repository");
        assert_eq!(excerpt("\n\n  first  \nsecond", 160), "first");
        assert_eq!(excerpt("abcdefgh", 5), "abcd…");
        assert_eq!(excerpt("", 5), "");
    }
}
