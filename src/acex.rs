//! Abstract counterexamples and flip-point search.
//!
//! A counterexample word is analyzed through a boolean *effect* function
//! over positions `0..size`: `effect(i)` encodes whether replacing the
//! hypothesis-state access prefix at position `i` still agrees with the SUL.
//! By construction `effect(0) != effect(size - 1)`, so somewhere the effect
//! flips; the flip index is where hypothesis and SUL diverge and drives the
//! refinement of every learner in this crate.
//!
//! When several flip points exist, each search method returns the first flip
//! its own probe order encounters. This is observable in the shape of the
//! refined hypothesis and is intentional per-method behavior.

/// A fixed-size, lazily evaluated boolean sequence. Evaluating an index
/// typically costs a membership query, so implementations memoize.
pub trait Acex {
    fn size(&self) -> usize;

    fn effect(&mut self, index: usize) -> bool;
}

/// An [`Acex`] backed by a probe function, memoizing each evaluated index.
pub struct CachedAcex<F> {
    probe: F,
    memo: Vec<Option<bool>>,
}

impl<F: FnMut(usize) -> bool> CachedAcex<F> {
    pub fn new(size: usize, probe: F) -> Self {
        Self {
            probe,
            memo: vec![None; size],
        }
    }
}

impl<F: FnMut(usize) -> bool> Acex for CachedAcex<F> {
    fn size(&self) -> usize {
        self.memo.len()
    }

    fn effect(&mut self, index: usize) -> bool {
        *self.memo[index].get_or_insert_with(|| (self.probe)(index))
    }
}

/// The search method used to locate the effect flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CexSearch {
    /// Left-to-right scan; the first flip wins. Linear in the size.
    Linear,
    /// Rivest-Schapire bisection; logarithmic number of probes.
    #[default]
    Binary,
    /// Doubling probe offsets followed by bisection of the last interval;
    /// biases cost toward flips close to the front.
    Exponential,
}

/// Returns `n` such that `acex.effect(n) != acex.effect(n + 1)`.
///
/// Requires `effect(0) != effect(size - 1)`; a violation means the caller
/// passed something that is not a counterexample and is reported as a bug.
pub fn find_flip(acex: &mut impl Acex, search: CexSearch) -> usize {
    let size = acex.size();
    assert!(size >= 2, "BUG: abstract counterexample of size {size}");
    let first = acex.effect(0);
    match search {
        CexSearch::Linear => {
            for i in 1..size {
                if acex.effect(i) != first {
                    return i - 1;
                }
            }
            panic!("BUG: abstract counterexample without a flip");
        }
        CexSearch::Binary => {
            assert!(
                acex.effect(size - 1) != first,
                "BUG: abstract counterexample without a flip"
            );
            bisect(acex, 0, size - 1)
        }
        CexSearch::Exponential => {
            let mut low = 0;
            let mut offset = 1;
            loop {
                let probe = (low + offset).min(size - 1);
                if acex.effect(probe) != first {
                    return bisect(acex, low, probe);
                }
                assert!(probe < size - 1, "BUG: abstract counterexample without a flip");
                low = probe;
                offset *= 2;
            }
        }
    }
}

/// Bisects within `[low, high]` where `effect(low) != effect(high)`.
fn bisect(acex: &mut impl Acex, mut low: usize, mut high: usize) -> usize {
    let reference = acex.effect(low);
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if acex.effect(mid) == reference {
            low = mid;
        } else {
            high = mid;
        }
    }
    low
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acex_from(bits: &[bool]) -> CachedAcex<impl FnMut(usize) -> bool + '_> {
        CachedAcex::new(bits.len(), move |i| bits[i])
    }

    fn assert_is_flip(bits: &[bool], n: usize) {
        assert!(n + 1 < bits.len());
        assert_ne!(bits[n], bits[n + 1], "index {n} is not a flip in {bits:?}");
    }

    #[test]
    fn all_methods_satisfy_the_postcondition() {
        let patterns: &[&[bool]] = &[
            &[true, false],
            &[true, true, false],
            &[true, false, false, false, false],
            &[true, true, true, true, false],
            &[true, false, true, false],
            &[true, true, false, true, false, false],
        ];
        for bits in patterns {
            for search in [CexSearch::Linear, CexSearch::Binary, CexSearch::Exponential] {
                let n = find_flip(&mut acex_from(bits), search);
                assert_is_flip(bits, n);
            }
        }
    }

    #[test]
    fn unique_flip_point_is_agreed_upon() {
        let bits = [true, true, true, false, false];
        for search in [CexSearch::Linear, CexSearch::Binary, CexSearch::Exponential] {
            assert_eq!(find_flip(&mut acex_from(&bits), search), 2);
        }
    }

    #[test]
    fn tie_breaking_is_per_method() {
        // flips at 0, 1, 2 and 3; each method keeps its own probe order
        let bits = [true, false, true, false, false];
        assert_eq!(find_flip(&mut acex_from(&bits), CexSearch::Linear), 0);
        assert_eq!(find_flip(&mut acex_from(&bits), CexSearch::Binary), 2);
        assert_eq!(find_flip(&mut acex_from(&bits), CexSearch::Exponential), 0);
    }

    #[test]
    fn probes_are_memoized() {
        let mut calls = 0usize;
        let mut acex = CachedAcex::new(8, |i| {
            calls += 1;
            i < 4
        });
        let n = find_flip(&mut acex, CexSearch::Binary);
        assert_eq!(n, 3);
        assert_eq!(acex.effect(n), true);
        assert_eq!(acex.effect(n + 1), false);
        drop(acex);
        assert!(calls <= 5);
    }
}
