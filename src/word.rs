//! Finite words over an alphabet.
//!
//! All learners in this crate work with finite words only, so a word is a
//! plain `Vec` of symbols. Prefix and suffix relations are by structural
//! equality.

use std::fmt::Debug;

use itertools::Itertools;

/// A finite word: an ordered sequence of alphabet symbols.
pub type Word<S> = Vec<S>;

/// Concatenates the given word parts into a fresh word.
pub fn concat<S: Copy>(parts: &[&[S]]) -> Word<S> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

/// Renders a word for log output, using `ε` for the empty word.
pub fn show<S: Debug>(word: &[S]) -> String {
    if word.is_empty() {
        "ε".to_string()
    } else {
        word.iter().map(|sym| format!("{sym:?}")).join("")
    }
}

/// Iterates over all prefixes of `word`, from the empty word to `word` itself.
pub fn prefixes<S>(word: &[S]) -> impl Iterator<Item = &[S]> {
    (0..=word.len()).map(move |i| &word[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_and_show() {
        let w = concat(&[&['a', 'b'], &[], &['c']]);
        assert_eq!(w, vec!['a', 'b', 'c']);
        assert_eq!(show(&w), "'a''b''c'");
        assert_eq!(show::<char>(&[]), "ε");
    }

    #[test]
    fn prefixes_are_ordered_by_length() {
        let collected = prefixes(&[1, 2]).collect::<Vec<_>>();
        assert_eq!(collected, vec![&[] as &[i32], &[1], &[1, 2]]);
    }
}
