//! The generic learner control loop.
//!
//! Every learning algorithm only supplies hypothesis construction and
//! refinement; the fixpoint of building, querying the oracle and refining is
//! shared. The trait stays object-safe (the loop itself is `Self: Sized`) so
//! the procedural learner can box heterogeneous sub-learners.

use tracing::{debug, info};

use crate::alphabet::Symbol;
use crate::oracle::Oracle;
use crate::word::show;

/// Guards against a diverging refinement loop; hitting it is always a bug in
/// either the learner or a non-minimal oracle.
const ROUND_THRESHOLD: usize = if cfg!(debug_assertions) { 500 } else { 200_000 };

pub trait Learner<S: Symbol> {
    type Hypothesis;

    /// Maps hypothesis states back to the access words that discovered them;
    /// `Vec<Word<S>>` indexed by state id for the flat learners, a
    /// per-procedure table for the procedural one.
    type StateMap;

    /// Builds an immutable hypothesis snapshot from the current internal
    /// data structure, together with the state-to-prefix map.
    fn build_hypothesis(&mut self) -> (Self::Hypothesis, Self::StateMap);

    /// Incorporates a counterexample into the internal data structure.
    /// `hypothesis` and `state_to_prefix` must be the result of the latest
    /// [`Learner::build_hypothesis`] call.
    fn refine_hypothesis(
        &mut self,
        cex: &[S],
        hypothesis: &Self::Hypothesis,
        state_to_prefix: &Self::StateMap,
    );

    /// Grows the alphabet mid-learning.
    fn add_alphabet_symbol(&mut self, sym: S);

    /// Runs the learning loop: build a hypothesis, ask the oracle, refine on
    /// the counterexample, repeat. Returns once the oracle is satisfied, or
    /// after `max_rounds` refinements with the current (then possibly
    /// non-equivalent) hypothesis.
    fn infer<O>(&mut self, oracle: &mut O, max_rounds: Option<usize>) -> Self::Hypothesis
    where
        Self: Sized,
        O: Oracle<S, Hypothesis = Self::Hypothesis>,
    {
        let start = std::time::Instant::now();
        let mut round = 0usize;
        loop {
            let (hypothesis, state_to_prefix) = self.build_hypothesis();
            let Some(cex) = oracle.find_cex(&hypothesis) else {
                info!(
                    "learning finished after {round} refinement rounds in {}ms",
                    start.elapsed().as_millis()
                );
                return hypothesis;
            };
            round += 1;
            debug!("round {round}: refining on counterexample {}", show(&cex));
            self.refine_hypothesis(&cex, &hypothesis, &state_to_prefix);
            if max_rounds.is_some_and(|max| round >= max) {
                info!("stopping after reaching the round cap of {round}");
                return self.build_hypothesis().0;
            }
            assert!(round < ROUND_THRESHOLD, "BUG: refinement loop does not converge");
        }
    }
}
