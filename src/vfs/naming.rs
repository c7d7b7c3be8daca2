//! Short name derivation: fixed-width `base~N` names with numeric
//! disambiguators.
//!
//! Names are always rendered from scratch for a given `N`: the suffix takes
//! as many bytes as `N` has digits and the base is cut to fit the rest.

use crate::config::entry_layout::{E5_ESCAPE, EXT_SIZE, NAME_SIZE, SUFFIX_MARKER};
use crate::config::MAX_DISAMBIGUATOR;
use crate::error::{Error, Result};

/// A rendered, collision-free short name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortName {
    pub name: [u8; NAME_SIZE],
    pub name_len: u32,
    pub extension: [u8; EXT_SIZE],
    pub index: u32,
}

/// Encode an extension into its fixed field.
pub fn encode_extension(extension: &str) -> Result<[u8; EXT_SIZE]> {
    let bytes = extension.as_bytes();
    if bytes.len() > EXT_SIZE {
        return Err(Error::InvalidName(format!(
            "extension '{}' longer than {} bytes",
            extension, EXT_SIZE
        )));
    }
    if bytes.contains(&0) {
        return Err(Error::InvalidName("extension contains NUL".to_string()));
    }
    let mut field = [0u8; EXT_SIZE];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Check a base name can be stored.
pub fn validate_base(base: &str) -> Result<()> {
    if base.is_empty() {
        return Err(Error::InvalidName("empty file name".to_string()));
    }
    if base.as_bytes().contains(&0) {
        return Err(Error::InvalidName(format!("'{}' contains NUL", base)));
    }
    // 0x05 is the on-disk stand-in for a leading 0xE5.
    if base.as_bytes()[0] == E5_ESCAPE {
        return Err(Error::InvalidName(format!("'{}' starts with 0x05", base)));
    }
    Ok(())
}

fn digit_count(mut n: u32) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Largest prefix of `bytes` no longer than `max` that does not split a
/// UTF-8 sequence.
fn truncate_at_boundary(bytes: &[u8], max: usize) -> &[u8] {
    if bytes.len() <= max {
        return bytes;
    }
    let mut end = max;
    while end > 0 && bytes[end] & 0xC0 == 0x80 {
        end -= 1;
    }
    &bytes[..end]
}

/// Render `base~n` into the name field. Returns the field and the length of
/// the (possibly truncated) base.
pub fn render(base: &[u8], n: u32) -> ([u8; NAME_SIZE], u32) {
    let suffix = format!("~{}", n);
    let room = NAME_SIZE - suffix.len();
    let base = truncate_at_boundary(base, room);

    let mut field = [b' '; NAME_SIZE];
    field[..base.len()].copy_from_slice(base);
    field[base.len()..base.len() + suffix.len()].copy_from_slice(suffix.as_bytes());
    (field, base.len() as u32)
}

/// Pick the lowest disambiguator starting at `first` whose rendered name is
/// not taken.
pub fn assign<F>(base: &[u8], extension: [u8; EXT_SIZE], first: u32, mut exists: F) -> Result<ShortName>
where
    F: FnMut(&[u8; NAME_SIZE], &[u8; EXT_SIZE]) -> Result<bool>,
{
    let mut n = first.max(1);
    while n <= MAX_DISAMBIGUATOR {
        let (name, name_len) = render(base, n);
        if !exists(&name, &extension)? {
            return Ok(ShortName {
                name,
                name_len,
                extension,
                index: n,
            });
        }
        n += 1;
    }
    Err(Error::DuplicateNameExhausted(
        String::from_utf8_lossy(base).into_owned(),
    ))
}

/// Renumber a name that collides, starting just past its current
/// disambiguator.
pub fn reassign<F>(
    base: &[u8],
    current: &[u8],
    extension: [u8; EXT_SIZE],
    exists: F,
) -> Result<ShortName>
where
    F: FnMut(&[u8; NAME_SIZE], &[u8; EXT_SIZE]) -> Result<bool>,
{
    let next = extract_index(current).unwrap_or(0).saturating_add(1);
    assign(base, extension, next, exists)
}

/// Parse the disambiguator from a rendered name (`report~12` -> 12).
pub fn extract_index(name: &[u8]) -> Option<u32> {
    let end = name
        .iter()
        .rposition(|&b| b != b' ')
        .map(|p| p + 1)
        .unwrap_or(0);
    let name = &name[..end];
    let marker = name.iter().rposition(|&b| b == SUFFIX_MARKER)?;
    let digits = &name[marker + 1..];
    if digits.is_empty() || digits.len() > digit_count(u32::MAX) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn trimmed(field: &[u8; NAME_SIZE]) -> String {
        String::from_utf8_lossy(field).trim_end().to_string()
    }

    #[test]
    fn test_render_short_base() {
        let (field, len) = render(b"report", 1);
        assert_eq!(trimmed(&field), "report~1");
        assert_eq!(len, 6);
        assert_eq!(field[NAME_SIZE - 1], b' ');
    }

    #[test]
    fn test_render_truncates_long_base() {
        let base = vec![b'x'; 60];
        let (field, len) = render(&base, 7);
        assert_eq!(len as usize, NAME_SIZE - 2);
        assert_eq!(&field[NAME_SIZE - 2..], b"~7");

        // One more digit eats one more base byte.
        let (field, len) = render(&base, 10);
        assert_eq!(len as usize, NAME_SIZE - 3);
        assert_eq!(&field[NAME_SIZE - 3..], b"~10");

        // Back to one digit: recomputed from scratch, not shifted.
        let (field, len) = render(&base, 9);
        assert_eq!(len as usize, NAME_SIZE - 2);
        assert_eq!(&field[NAME_SIZE - 2..], b"~9");
    }

    #[test]
    fn test_render_respects_utf8_boundaries() {
        // 30 two-byte characters; the 45 bytes left next to "~10" end mid-character.
        let base = "é".repeat(30);
        let (field, len) = render(base.as_bytes(), 10);
        assert_eq!(len % 2, 0);
        assert!(std::str::from_utf8(&field[..len as usize]).is_ok());
    }

    #[test]
    fn test_assign_skips_taken_names() {
        let ext = encode_extension("txt").unwrap();
        let mut taken = HashSet::new();
        for i in 1..=3 {
            taken.insert(render(b"a", i).0);
        }

        let short = assign(b"a", ext, 1, |name, _| Ok(taken.contains(name))).unwrap();
        assert_eq!(short.index, 4);
        assert_eq!(trimmed(&short.name), "a~4");
    }

    #[test]
    fn test_assign_exhaustion() {
        let ext = encode_extension("").unwrap();
        let result = assign(b"a", ext, MAX_DISAMBIGUATOR, |_, _| Ok(true));
        assert!(matches!(result, Err(Error::DuplicateNameExhausted(_))));
    }

    #[test]
    fn test_reassign_skips_past_current_index() {
        let (current, _) = render(b"a", 1);
        let taken: HashSet<[u8; NAME_SIZE]> = [render(b"a", 1).0, render(b"a", 2).0].into();
        let short = reassign(b"a", &current, *b"txt\0", |n, _| Ok(taken.contains(n))).unwrap();
        assert_eq!(short.index, 3);
        assert_eq!(trimmed(&short.name), "a~3");
    }

    #[test]
    fn test_extract_index() {
        assert_eq!(extract_index(&render(b"report", 12).0), Some(12));
        assert_eq!(extract_index(b"a~b~3   "), Some(3));
        assert_eq!(extract_index(b"plain"), None);
        assert_eq!(extract_index(b"broken~"), None);
        assert_eq!(extract_index(b"broken~x1"), None);
    }

    #[test]
    fn test_extension_rules() {
        assert_eq!(encode_extension("txt").unwrap(), *b"txt\0");
        assert_eq!(encode_extension("jpeg").unwrap(), *b"jpeg");
        assert_eq!(encode_extension("").unwrap(), [0u8; 4]);
        assert!(matches!(
            encode_extension("tar.gz"),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn test_validate_base() {
        assert!(validate_base("report").is_ok());
        assert!(validate_base("").is_err());
        assert!(validate_base("a\0b").is_err());
        assert!(matches!(validate_base("\u{5}x"), Err(Error::InvalidName(_))));
        assert!(validate_base("x\u{5}").is_ok());
    }
}
