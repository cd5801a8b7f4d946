//! The Kearns-Vazirani learner, organized around a discrimination tree.
//!
//! Inner nodes carry a separator suffix, leaves carry the access word of a
//! hypothesis state. Sifting a word through the tree answers "which state
//! does this word reach": at each inner node the target is queried with the
//! word extended by the node's suffix and the walk descends into the child
//! for that outcome. A counterexample splits exactly one leaf into an inner
//! node with two leaves, so every refinement adds exactly one state.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::acex::{find_flip, CachedAcex, CexSearch};
use crate::alphabet::{Alphabet, Symbol};
use crate::automaton::{Moore, StateId};
use crate::learner::Learner;
use crate::math;
use crate::sul::{CachedSul, Sul};
use crate::word::{self, show, Word};
use crate::Observation;

#[derive(Debug, Clone)]
enum DtNode<S: Symbol, O: Observation> {
    Leaf {
        access: Word<S>,
    },
    Inner {
        suffix: Word<S>,
        children: math::Map<O, DtNode<S, O>>,
    },
}

impl<S: Symbol, O: Observation> DtNode<S, O> {
    fn find_leaf_mut(&mut self, access: &[S]) -> Option<&mut Self> {
        if matches!(self, DtNode::Leaf { access: leaf } if leaf.as_slice() == access) {
            return Some(self);
        }
        match self {
            DtNode::Leaf { .. } => None,
            DtNode::Inner { children, .. } => children
                .values_mut()
                .find_map(|child| child.find_leaf_mut(access)),
        }
    }
}

/// An implementation of the Kearns-Vazirani algorithm.
pub struct KearnsVazirani<S: Symbol, U: Sul<Symbol = S>> {
    alphabet: Alphabet<S>,
    sul: CachedSul<U>,
    cex_search: CexSearch,
    root: DtNode<S, U::Output>,
    // the hypothesis read off the current tree; cleared whenever the tree
    // changes, so rebuilding without a refinement in between is free
    cache: Option<(Moore<S, U::Output>, Vec<Word<S>>)>,
}

impl<S, U> KearnsVazirani<S, U>
where
    S: Symbol,
    U: Sul<Symbol = S>,
{
    pub fn new(alphabet: Alphabet<S>, sul: U, cex_search: CexSearch) -> Self {
        Self {
            alphabet,
            sul: CachedSul::new(sul),
            cex_search,
            root: DtNode::Leaf { access: Vec::new() },
            cache: None,
        }
    }

    /// Descends through the tree to the access word of the state that
    /// `word` reaches. An outcome without a child means `word` behaves
    /// unlike any known state, so a fresh leaf (and thereby state) is
    /// created for it on the spot.
    fn sift(&mut self, word: &[S]) -> Word<S> {
        let mut node = &mut self.root;
        let sul = &mut self.sul;
        loop {
            match node {
                DtNode::Leaf { access } => return access.clone(),
                DtNode::Inner { suffix, children } => {
                    let outcome = sul.query(&word::concat(&[word, suffix]));
                    node = children.entry(outcome).or_insert_with(|| {
                        trace!("sifting {} opened a fresh leaf", show(word));
                        DtNode::Leaf {
                            access: word.to_vec(),
                        }
                    });
                }
            }
        }
    }

    /// Replaces the leaf holding `old_access` by an inner node labelled
    /// `suffix` whose two children are the old leaf and a new one for
    /// `new_access`.
    fn split_leaf(&mut self, old_access: &[S], new_access: Word<S>, suffix: Word<S>) {
        let old_outcome = self.sul.query(&word::concat(&[old_access, &suffix]));
        let new_outcome = self.sul.query(&word::concat(&[&new_access, &suffix]));
        assert!(
            old_outcome != new_outcome,
            "BUG: suffix {} does not separate {} from {}",
            show(&suffix),
            show(old_access),
            show(&new_access)
        );
        let leaf = self
            .root
            .find_leaf_mut(old_access)
            .expect("BUG: split target is not a leaf of the tree");
        let mut children = math::Map::default();
        children.insert(
            old_outcome,
            DtNode::Leaf {
                access: old_access.to_vec(),
            },
        );
        children.insert(new_outcome, DtNode::Leaf { access: new_access });
        *leaf = DtNode::Inner { suffix, children };
    }
}

impl<S, U> Learner<S> for KearnsVazirani<S, U>
where
    S: Symbol,
    U: Sul<Symbol = S>,
{
    type Hypothesis = Moore<S, U::Output>;
    type StateMap = Vec<Word<S>>;

    /// Reads the hypothesis off the tree with a breadth-first closure: sift
    /// the empty word, then sift every one-symbol extension of each
    /// discovered state until no access word is new.
    fn build_hypothesis(&mut self) -> (Moore<S, U::Output>, Vec<Word<S>>) {
        if let Some((hypothesis, prefixes)) = &self.cache {
            return (hypothesis.clone(), prefixes.clone());
        }

        let symbols: Vec<S> = self.alphabet.universe().collect();
        let mut states: math::Bijection<Word<S>, StateId> = math::Bijection::new();
        let mut transitions: Vec<math::Map<S, StateId>> = Vec::new();
        let initial = self.sift(&[]);
        states.insert(initial.clone(), 0);
        transitions.push(math::Map::default());
        let mut queue = VecDeque::from([initial]);
        while let Some(access) = queue.pop_front() {
            let state = *states
                .get_by_left(&access)
                .expect("BUG: dequeued an unregistered state");
            for &sym in &symbols {
                let target_access = self.sift(&word::concat(&[&access, &[sym]]));
                let target = match states.get_by_left(&target_access) {
                    Some(&id) => id,
                    None => {
                        let id = states.len() as StateId;
                        states.insert(target_access.clone(), id);
                        transitions.push(math::Map::default());
                        queue.push_back(target_access);
                        id
                    }
                };
                transitions[state as usize].insert(sym, target);
            }
        }

        let mut prefixes = vec![Vec::new(); states.len()];
        for (access, &id) in states.iter() {
            prefixes[id as usize] = access.clone();
        }
        let mut hypothesis = Moore::new();
        for access in &prefixes {
            let output = self.sul.query(access);
            hypothesis.add_state(output);
        }
        for (state, row) in transitions.into_iter().enumerate() {
            for (sym, target) in row {
                hypothesis.add_transition(state as StateId, sym, target);
            }
        }
        debug!("discrimination tree yields {} states", prefixes.len());
        self.cache = Some((hypothesis.clone(), prefixes.clone()));
        (hypothesis, prefixes)
    }

    fn refine_hypothesis(
        &mut self,
        cex: &[S],
        hypothesis: &Moore<S, U::Output>,
        state_to_prefix: &Vec<Word<S>>,
    ) {
        let expected = self.sul.query(cex);
        let size = cex.len() + 1;
        let sul = &mut self.sul;
        let mut acex = CachedAcex::new(size, |i| {
            let state = hypothesis.state_after(&cex[..i]);
            let mut replaced = state_to_prefix[state as usize].clone();
            replaced.extend_from_slice(&cex[i..]);
            sul.query(&replaced) == expected
        });
        let flip = find_flip(&mut acex, self.cex_search);

        // the state reached one symbol past the flip conflates two
        // behaviors; its leaf is split by the remaining suffix
        let source = hypothesis.state_after(&cex[..flip]);
        let conflated = hypothesis.state_after(&cex[..=flip]);
        let new_access =
            word::concat(&[&state_to_prefix[source as usize], &cex[flip..=flip]]);
        let suffix = cex[flip + 1..].to_vec();
        debug!(
            "splitting state {conflated} with access {} and suffix {}",
            show(&new_access),
            show(&suffix)
        );
        self.split_leaf(&state_to_prefix[conflated as usize], new_access, suffix);
        self.cache = None;
    }

    fn add_alphabet_symbol(&mut self, sym: S) {
        self.alphabet.push(sym);
        self.cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{BreadthFirstOracle, Oracle};
    use crate::sul::FnSul;

    fn ones_mod_four(word: &[char]) -> bool {
        word.iter().filter(|&&sym| sym == '1').count() % 4 == 3
    }

    #[test_log::test]
    fn kearns_vazirani_learns_mod_four_counter() {
        let alphabet = Alphabet::new(['0', '1']);
        let mut learner =
            KearnsVazirani::new(alphabet, FnSul::new(ones_mod_four), CexSearch::Binary);
        let mut oracle = BreadthFirstOracle::new(FnSul::new(ones_mod_four), ['0', '1'], 8);
        let dfa = learner.infer(&mut oracle, None);
        assert_eq!(dfa.size(), 4);
        assert!(dfa.accepts(&['1', '1', '1']));
        assert!(!dfa.accepts(&['0', '1', '1']));
        assert!(dfa.accepts(&['1', '0', '1', '0', '1', '1', '1', '1', '1']));
    }

    #[test_log::test]
    fn rebuilding_without_refinement_is_free() {
        let alphabet = Alphabet::new(['0', '1']);
        let mut learner =
            KearnsVazirani::new(alphabet, FnSul::new(ones_mod_four), CexSearch::Binary);
        let (first, _) = learner.build_hypothesis();
        let queries = learner.sul.distinct_queries();
        let (second, _) = learner.build_hypothesis();
        assert_eq!(learner.sul.distinct_queries(), queries);
        assert_eq!(first.find_separating_word(&second), None);
    }

    #[test_log::test]
    fn each_refinement_adds_exactly_one_state() {
        let target = |word: &[char]| word.len() % 3 == 1;
        let alphabet = Alphabet::new(['a']);
        let mut learner = KearnsVazirani::new(alphabet, FnSul::new(target), CexSearch::Linear);
        let mut oracle = BreadthFirstOracle::new(FnSul::new(target), ['a'], 6);
        let mut sizes = vec![learner.build_hypothesis().0.size()];
        loop {
            let (hypothesis, prefixes) = learner.build_hypothesis();
            let Some(cex) = oracle.find_cex(&hypothesis) else {
                break;
            };
            learner.refine_hypothesis(&cex, &hypothesis, &prefixes);
            sizes.push(learner.build_hypothesis().0.size());
        }
        assert!(sizes.windows(2).all(|pair| pair[1] == pair[0] + 1));
        assert_eq!(*sizes.last().unwrap(), 3);
    }
}
