//! Generated row and column labels
//!
//! Labels are bijective base-26 letter sequences: rows use lowercase
//! (`a`, `b`, ..., `z`, `aa`, ...) and columns use uppercase (`A`, ..., `Z`,
//! `AA`, ...). Tiles may override any label; the generated form is what
//! shorthand references decode.

/// Which axis a label belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Lowercase letters
    Row,
    /// Uppercase letters
    Column,
}

impl Axis {
    fn base(self) -> u8 {
        match self {
            Axis::Row => b'a',
            Axis::Column => b'A',
        }
    }
}

/// Convert a 0-based index to its generated label (`0 -> a`, `26 -> aa`)
pub fn index_to_label(index: u32, axis: Axis) -> String {
    let mut result = Vec::new();
    let mut n = index as u64 + 1; // 1-based for calculation

    while n > 0 {
        n -= 1;
        result.push((n % 26) as u8 + axis.base());
        n /= 26;
    }

    result.reverse();
    // Only ASCII letters were pushed
    String::from_utf8(result).unwrap_or_default()
}

/// Convert a generated label back to its 0-based index
///
/// Returns `None` when the text is empty, mixes case, contains anything but
/// ASCII letters, or overflows `u32`.
pub fn label_to_index(label: &str, axis: Axis) -> Option<u32> {
    if label.is_empty() {
        return None;
    }

    let mut index: u64 = 0;
    for b in label.bytes() {
        let digit = match axis {
            Axis::Row if b.is_ascii_lowercase() => b - b'a',
            Axis::Column if b.is_ascii_uppercase() => b - b'A',
            _ => return None,
        };
        index = index * 26 + digit as u64 + 1;
        if index > u32::MAX as u64 + 1 {
            return None;
        }
    }

    u32::try_from(index - 1).ok()
}
