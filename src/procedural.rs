//! Learning systems of procedural automata.
//!
//! Each procedure of an [`Spa`] is learned by its own flat DFA learner over
//! the local alphabet. The local learners never see the target directly:
//! their queries are embedded into global words by the shared
//! [`AtrManager`], so a query for procedure `F` reaches an invocation of
//! `F`, completes every nested call with a terminating sequence and drives
//! the outer procedures to acceptance afterwards.
//!
//! Counterexamples are global words. A positive one (accepted by the target,
//! rejected by the hypothesis) is first scanned for new procedures and
//! shorter sequences; then, in both directions, the word is localized
//! through a [`ReturnIndicesAcex`] over the positions of its matching
//! return symbols, probing invocations innermost-first until one is found
//! whose projected body the responsible local learner misjudges.

pub mod atr;

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::acex::{find_flip, Acex, CexSearch};
use crate::alphabet::{SpaAlphabet, Symbol};
use crate::automaton::{Dfa, Spa};
use crate::kearns_vazirani::KearnsVazirani;
use crate::learner::Learner;
use crate::lsharp::LSharp;
use crate::lstar::LStar;
use crate::math;
use crate::sul::{CachedSul, Sul};
use crate::word::{show, Word};

pub use atr::AtrManager;

/// A [`Sul`] for a single procedure, answering local queries through the
/// globally shared target and sequence manager.
pub struct ProcedureSul<S: Symbol, U: Sul<Symbol = S, Output = bool>> {
    sul: Rc<RefCell<CachedSul<U>>>,
    atr: Rc<RefCell<AtrManager<S>>>,
    proc: S,
}

impl<S: Symbol, U: Sul<Symbol = S, Output = bool>> ProcedureSul<S, U> {
    fn query_local(&mut self, local: &[S]) -> bool {
        let embedded = self
            .atr
            .borrow()
            .embed(self.proc, local)
            .expect("BUG: procedure queried before its sequences are known");
        self.sul.borrow_mut().query(&embedded)
    }
}

impl<S: Symbol, U: Sul<Symbol = S, Output = bool>> Sul for ProcedureSul<S, U> {
    type Symbol = S;
    type Output = bool;

    fn query_last(&mut self, word: &[S]) -> bool {
        self.query_local(word)
    }

    fn query_empty(&mut self) -> bool {
        self.query_local(&[])
    }
}

/// Which flat algorithm learns the individual procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcedureLearnerKind {
    LStar,
    #[default]
    KearnsVazirani,
    LSharp,
}

type LocalLearner<S> = Box<dyn Learner<S, Hypothesis = Dfa<S>, StateMap = Vec<Word<S>>>>;

/// An [`Acex`] over the completed invocations of a global counterexample,
/// ordered by the positions of their matching return symbols. `effect(i)`
/// holds while the first `i` invocations are judged correctly by their
/// local hypotheses, so the effect is monotone and the flip names the
/// innermost misjudged invocation.
struct ReturnIndicesAcex<S: Symbol, U: Sul<Symbol = S, Output = bool>> {
    sul: Rc<RefCell<CachedSul<U>>>,
    // per invocation: procedure, projected body, local hypothesis verdict
    // and the embedded membership query deciding the true verdict
    probes: Vec<(S, Word<S>, bool, Word<S>)>,
    memo: Vec<Option<bool>>,
}

impl<S: Symbol, U: Sul<Symbol = S, Output = bool>> ReturnIndicesAcex<S, U> {
    fn agree(&mut self, index: usize) -> bool {
        let probes = &self.probes;
        let sul = &self.sul;
        *self.memo[index].get_or_insert_with(|| {
            let (_, _, predicted, embedded) = &probes[index];
            *predicted == sul.borrow_mut().query(embedded)
        })
    }
}

impl<S: Symbol, U: Sul<Symbol = S, Output = bool>> Acex for ReturnIndicesAcex<S, U> {
    fn size(&self) -> usize {
        self.probes.len() + 1
    }

    fn effect(&mut self, index: usize) -> bool {
        (0..index).all(|j| self.agree(j))
    }
}

/// An implementation of the SPA learning algorithm.
pub struct ProceduralLearner<S: Symbol, U: Sul<Symbol = S, Output = bool>> {
    sul: Rc<RefCell<CachedSul<U>>>,
    atr: Rc<RefCell<AtrManager<S>>>,
    kind: ProcedureLearnerKind,
    cex_search: CexSearch,
    learners: math::Map<S, LocalLearner<S>>,
}

impl<S, U> ProceduralLearner<S, U>
where
    S: Symbol + 'static,
    U: Sul<Symbol = S, Output = bool> + 'static,
{
    pub fn new(
        alphabet: SpaAlphabet<S>,
        sul: U,
        kind: ProcedureLearnerKind,
        cex_search: CexSearch,
    ) -> Self {
        Self {
            sul: Rc::new(RefCell::new(CachedSul::new(sul))),
            atr: Rc::new(RefCell::new(AtrManager::new(alphabet))),
            kind,
            cex_search,
            learners: math::Map::default(),
        }
    }

    fn make_learner(&self, proc: S) -> LocalLearner<S> {
        let alphabet = self.atr.borrow().alphabet().local();
        let sul = ProcedureSul {
            sul: Rc::clone(&self.sul),
            atr: Rc::clone(&self.atr),
            proc,
        };
        match self.kind {
            ProcedureLearnerKind::LStar => Box::new(LStar::<S, Dfa<S>, _>::new(
                alphabet,
                sul,
                Some(self.cex_search),
            )),
            ProcedureLearnerKind::KearnsVazirani => {
                Box::new(KearnsVazirani::new(alphabet, sul, self.cex_search))
            }
            ProcedureLearnerKind::LSharp => Box::new(LSharp::new(alphabet, sul, self.cex_search)),
        }
    }

    /// Keeps terminating sequences and procedural hypotheses in agreement:
    /// shrink the sequences against the current hypotheses, then make every
    /// hypothesis accept the projection of its own terminating sequence.
    /// Each projection is a word the target is known to terminate on, so a
    /// rejecting hypothesis has a ready-made local counterexample.
    fn enforce_ts_conformance(&mut self) {
        loop {
            let mut procs: math::Map<S, Dfa<S>> = math::Map::default();
            for (&proc, learner) in self.learners.iter_mut() {
                procs.insert(proc, learner.build_hypothesis().0);
            }
            self.atr.borrow_mut().minify_all(&procs);

            let mut changed = false;
            for (&proc, dfa) in &procs {
                let Some(terminating) = self.atr.borrow().terminating(proc).cloned() else {
                    continue;
                };
                let local = self.atr.borrow().project(&terminating);
                if !dfa.accepts(&local) {
                    debug!(
                        "hypothesis of {proc:?} rejects its terminating sequence {}",
                        show(&local)
                    );
                    let learner = self
                        .learners
                        .get_mut(&proc)
                        .expect("BUG: hypothesis without a learner");
                    let (hypothesis, prefixes) = learner.build_hypothesis();
                    learner.refine_hypothesis(&local, &hypothesis, &prefixes);
                    changed = true;
                }
            }
            if !changed {
                return;
            }
        }
    }
}

impl<S, U> Learner<S> for ProceduralLearner<S, U>
where
    S: Symbol + 'static,
    U: Sul<Symbol = S, Output = bool> + 'static,
{
    type Hypothesis = Spa<S>;
    type StateMap = math::Map<S, Vec<Word<S>>>;

    fn build_hypothesis(&mut self) -> (Spa<S>, math::Map<S, Vec<Word<S>>>) {
        let mut procs = math::Map::default();
        let mut maps = math::Map::default();
        for (&proc, learner) in self.learners.iter_mut() {
            let (dfa, prefixes) = learner.build_hypothesis();
            procs.insert(proc, dfa);
            maps.insert(proc, prefixes);
        }
        let alphabet = self.atr.borrow().alphabet().clone();
        (Spa::from_parts(alphabet, procs), maps)
    }

    fn refine_hypothesis(
        &mut self,
        cex: &[S],
        _hypothesis: &Spa<S>,
        _state_maps: &math::Map<S, Vec<Word<S>>>,
    ) {
        let positive = self.sul.borrow_mut().query(cex);
        if positive {
            let discovered = self.atr.borrow_mut().scan_positive_cex(cex);
            for proc in discovered {
                let learner = self.make_learner(proc);
                self.learners.insert(proc, learner);
            }
        }
        self.enforce_ts_conformance();

        // probe the completed invocations, innermost return first, for one
        // whose projected body the responsible local learner misjudges
        let invocations = self.atr.borrow().invocations(cex);
        let mut probes = Vec::new();
        for (proc, start, ret) in invocations {
            let Some(learner) = self.learners.get_mut(&proc) else {
                continue;
            };
            let local = self.atr.borrow().project(&cex[start..ret]);
            let (dfa, _) = learner.build_hypothesis();
            let embedded = self
                .atr
                .borrow()
                .embed(proc, &local)
                .expect("BUG: a scanned procedure has all sequences");
            let predicted = dfa.accepts(&local);
            probes.push((proc, local, predicted, embedded));
        }
        let mut acex = ReturnIndicesAcex {
            sul: Rc::clone(&self.sul),
            memo: vec![None; probes.len()],
            probes,
        };
        if acex.size() < 2 || acex.effect(acex.size() - 1) {
            // no invocation disagrees: this round's progress was the
            // discovery of procedures or shorter sequences
            return;
        }
        let flip = find_flip(&mut acex, CexSearch::Linear);
        let (proc, local, _, _) = acex.probes[flip].clone();
        trace!("local counterexample {} for {proc:?}", show(&local));
        let learner = self
            .learners
            .get_mut(&proc)
            .expect("BUG: probed procedure without a learner");
        let (dfa, prefixes) = learner.build_hypothesis();
        learner.refine_hypothesis(&local, &dfa, &prefixes);
        self.enforce_ts_conformance();
    }

    fn add_alphabet_symbol(&mut self, sym: S) {
        self.atr.borrow_mut().add_internal(sym);
        for learner in self.learners.values_mut() {
            learner.add_alphabet_symbol(sym);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::SpaAlphabet;
    use crate::oracle::BreadthFirstOracle;
    use crate::sul::FnSul;

    /// Two procedures: `F` accepts `a*` with at most one nested call (to
    /// itself or to `G`), `G` accepts exactly `b`.
    fn reference() -> Spa<char> {
        let alphabet = SpaAlphabet::new(['a', 'b'], ['F', 'G'], 'r');
        let mut f = Dfa::new();
        let f0 = f.add_state(true);
        let f1 = f.add_state(true);
        let fsink = f.add_state(false);
        f.add_transition(f0, 'a', f0);
        f.add_transition(f0, 'b', fsink);
        f.add_transition(f0, 'F', f1);
        f.add_transition(f0, 'G', f1);
        f.add_transition(f1, 'a', f1);
        f.add_transition(f1, 'b', fsink);
        f.add_transition(f1, 'F', fsink);
        f.add_transition(f1, 'G', fsink);
        for sym in ['a', 'b', 'F', 'G'] {
            f.add_transition(fsink, sym, fsink);
        }
        let mut g = Dfa::new();
        let g0 = g.add_state(false);
        let g1 = g.add_state(true);
        let gsink = g.add_state(false);
        g.add_transition(g0, 'b', g1);
        for sym in ['a', 'F', 'G'] {
            g.add_transition(g0, sym, gsink);
        }
        for sym in ['a', 'b', 'F', 'G'] {
            g.add_transition(g1, sym, gsink);
            g.add_transition(gsink, sym, gsink);
        }
        let mut procs = math::Map::default();
        procs.insert('F', f);
        procs.insert('G', g);
        Spa::from_parts(alphabet, procs)
    }

    #[test_log::test]
    fn learns_a_system_of_two_procedures() {
        let target = reference();
        let simulated = target.clone();
        let alphabet = SpaAlphabet::new(['a', 'b'], ['F', 'G'], 'r');
        let mut learner = ProceduralLearner::new(
            alphabet,
            FnSul::new(move |word: &[char]| simulated.accepts(word)),
            ProcedureLearnerKind::KearnsVazirani,
            CexSearch::Binary,
        );
        let checker = target.clone();
        let mut oracle = BreadthFirstOracle::new(
            FnSul::new(move |word: &[char]| checker.accepts(word)),
            ['a', 'b', 'F', 'G', 'r'],
            7,
        );
        let spa = learner.infer(&mut oracle, None);
        assert!(spa.accepts(&['F', 'r']));
        assert!(spa.accepts(&['F', 'a', 'F', 'r', 'a', 'r']));
        assert!(spa.accepts(&['G', 'b', 'r']));
        assert!(spa.accepts(&['F', 'G', 'b', 'r', 'r']));
        assert!(!spa.accepts(&[]));
        assert!(!spa.accepts(&['F']));
        assert!(!spa.accepts(&['F', 'b', 'r']));
        assert!(!spa.accepts(&['G', 'r']));
        assert_eq!(target.find_separating_word(&spa, 7), Ok(None));
    }

    #[test_log::test]
    fn every_flat_backend_learns_the_same_system() {
        for kind in [
            ProcedureLearnerKind::LStar,
            ProcedureLearnerKind::KearnsVazirani,
            ProcedureLearnerKind::LSharp,
        ] {
            let target = reference();
            let simulated = target.clone();
            let alphabet = SpaAlphabet::new(['a', 'b'], ['F', 'G'], 'r');
            let mut learner = ProceduralLearner::new(
                alphabet,
                FnSul::new(move |word: &[char]| simulated.accepts(word)),
                kind,
                CexSearch::Binary,
            );
            let checker = target.clone();
            let mut oracle = BreadthFirstOracle::new(
                FnSul::new(move |word: &[char]| checker.accepts(word)),
                ['a', 'b', 'F', 'G', 'r'],
                6,
            );
            let spa = learner.infer(&mut oracle, None);
            assert_eq!(target.find_separating_word(&spa, 6), Ok(None), "{kind:?}");
        }
    }

    #[test_log::test]
    fn discovery_precedes_local_learning() {
        let target = reference();
        let simulated = target.clone();
        let alphabet = SpaAlphabet::new(['a', 'b'], ['F', 'G'], 'r');
        let mut learner = ProceduralLearner::new(
            alphabet,
            FnSul::new(move |word: &[char]| simulated.accepts(word)),
            ProcedureLearnerKind::default(),
            CexSearch::Linear,
        );
        // before any counterexample the hypothesis knows no procedures
        let (empty, _) = learner.build_hypothesis();
        assert_eq!(empty.size(), 0);
        assert!(!empty.accepts(&['F', 'r']));

        let (hypothesis, maps) = learner.build_hypothesis();
        learner.refine_hypothesis(&['F', 'r'], &hypothesis, &maps);
        let (next, _) = learner.build_hypothesis();
        assert!(next.proc('F').is_some());
    }
}
