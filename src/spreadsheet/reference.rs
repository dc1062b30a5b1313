//! A1-style cell references

/// Worksheet limits of the Office Open XML format (`XFD1048576`)
pub(crate) const MAX_ROWS: usize = 1_048_576;
pub(crate) const MAX_COLS: usize = 16_384;

/// Converts zero-based `(row, col)` indexes into a reference such as `"B3"`.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    let mut letters = Vec::new();
    let mut col = col + 1;
    while col > 0 {
        col -= 1;
        letters.push(b'A' + (col % 26) as u8);
        col /= 26;
    }
    letters.reverse();
    format!("{}{}", String::from_utf8_lossy(&letters), row + 1)
}

/// Parses a reference such as `"AA10"` into zero-based `(row, col)` indexes.
/// Absolute markers (`$B$3`) are accepted; anything else, including positions
/// past `XFD1048576`, yields `None`.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let col = letters
        .bytes()
        .try_fold(0usize, |col, letter| {
            col.checked_mul(26)?
                .checked_add((letter.to_ascii_uppercase() - b'A') as usize + 1)
                .filter(|col| *col <= MAX_COLS)
        })?;
    let row = digits.parse::<usize>().ok()?;
    (1..=MAX_ROWS).contains(&row).then(|| (row - 1, col - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_references() {
        assert_eq!(index_to_reference(0, 0), "A1");
        assert_eq!(index_to_reference(2, 25), "Z3");
        assert_eq!(index_to_reference(9, 26), "AA10");
        assert_eq!(index_to_reference(0, 701), "ZZ1");
        assert_eq!(index_to_reference(0, 702), "AAA1");
    }

    #[test]
    fn parses_references() {
        assert_eq!(reference_to_index("A1"), Some((0, 0)));
        assert_eq!(reference_to_index("aa10"), Some((9, 26)));
        assert_eq!(reference_to_index("$ZZ$1"), Some((0, 701)));
        assert_eq!(reference_to_index("A0"), None);
        assert_eq!(reference_to_index("12"), None);
        assert_eq!(reference_to_index("A1B"), None);
    }

    #[test]
    fn rejects_positions_past_the_last_cell() {
        assert_eq!(reference_to_index("XFD1048576"), Some((1_048_575, 16_383)));
        assert_eq!(reference_to_index("XFE1"), None);
        assert_eq!(reference_to_index("A1048577"), None);
        assert_eq!(reference_to_index("ZZZZZZZZZZZZZ2"), None);
        assert_eq!(reference_to_index("A99999999999999999999999"), None);
    }
}
