//! Discrimination-tree learning of single-entry visibly pushdown automata.
//!
//! Hypothesis states are module locations of a [`Vpa`], reached by
//! well-matched access words. Because a location's behavior depends on the
//! surrounding stack, plain suffixes cannot tell locations apart; inner
//! nodes therefore carry a full context pair `(u, v)` and sifting a
//! well-matched word `w` queries `u w v`.
//!
//! Location discovery runs to a fixpoint: besides internal successors, every
//! pair of known locations combined with every call/return pair may reach a
//! new location, which makes hypothesis construction quadratic in the number
//! of locations.

use tracing::{debug, trace};

use crate::acex::{find_flip, CachedAcex, CexSearch};
use crate::alphabet::{Symbol, SymbolKind, VpaAlphabet};
use crate::automaton::{StateId, Vpa, VpaConf};
use crate::learner::Learner;
use crate::math;
use crate::sul::{CachedSul, Sul};
use crate::word::{self, show, Word};

#[derive(Debug, Clone)]
enum VpaDtNode<S: Symbol> {
    Leaf {
        access: Word<S>,
    },
    Inner {
        context: (Word<S>, Word<S>),
        children: math::Map<bool, VpaDtNode<S>>,
    },
}

impl<S: Symbol> VpaDtNode<S> {
    fn find_leaf_mut(&mut self, access: &[S]) -> Option<&mut Self> {
        if matches!(self, VpaDtNode::Leaf { access: leaf } if leaf.as_slice() == access) {
            return Some(self);
        }
        match self {
            VpaDtNode::Leaf { .. } => None,
            VpaDtNode::Inner { children, .. } => children
                .values_mut()
                .find_map(|child| child.find_leaf_mut(access)),
        }
    }
}

/// Concatenates the access words of a stack's saved locations with their call
/// symbols, the word that rebuilds the stack from the initial configuration.
fn flatten_stack<S: Symbol>(prefixes: &[Word<S>], stack: &[(StateId, S)]) -> Word<S> {
    let mut out = Vec::new();
    for &(saved, call) in stack {
        out.extend_from_slice(&prefixes[saved as usize]);
        out.push(call);
    }
    out
}

/// The Kearns-Vazirani algorithm lifted to visibly pushdown languages.
pub struct KearnsVaziraniVpa<S: Symbol, U: Sul<Symbol = S, Output = bool>> {
    alphabet: VpaAlphabet<S>,
    sul: CachedSul<U>,
    cex_search: CexSearch,
    root: VpaDtNode<S>,
    cache: Option<(Vpa<S>, Vec<Word<S>>)>,
}

impl<S, U> KearnsVaziraniVpa<S, U>
where
    S: Symbol,
    U: Sul<Symbol = S, Output = bool>,
{
    pub fn new(alphabet: VpaAlphabet<S>, sul: U, cex_search: CexSearch) -> Self {
        Self {
            alphabet,
            sul: CachedSul::new(sul),
            cex_search,
            root: VpaDtNode::Leaf { access: Vec::new() },
            cache: None,
        }
    }

    /// Sifts a well-matched word to the access word of its location,
    /// creating a fresh leaf when it matches no known one.
    fn sift(&mut self, word: &[S]) -> Word<S> {
        let mut node = &mut self.root;
        let sul = &mut self.sul;
        loop {
            match node {
                VpaDtNode::Leaf { access } => return access.clone(),
                VpaDtNode::Inner { context, children } => {
                    let outcome = sul.query(&word::concat(&[&context.0, word, &context.1]));
                    node = children.entry(outcome).or_insert_with(|| {
                        trace!("sifting {} opened a fresh leaf", show(word));
                        VpaDtNode::Leaf {
                            access: word.to_vec(),
                        }
                    });
                }
            }
        }
    }

    fn split_leaf(&mut self, old_access: &[S], new_access: Word<S>, context: (Word<S>, Word<S>)) {
        let embed = |w: &[S]| word::concat(&[&context.0, w, &context.1]);
        let old_outcome = self.sul.query(&embed(old_access));
        let new_outcome = self.sul.query(&embed(&new_access));
        assert!(
            old_outcome != new_outcome,
            "BUG: context ({}, {}) does not separate {} from {}",
            show(&context.0),
            show(&context.1),
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
            VpaDtNode::Leaf {
                access: old_access.to_vec(),
            },
        );
        children.insert(new_outcome, VpaDtNode::Leaf { access: new_access });
        *leaf = VpaDtNode::Inner { context, children };
    }

    /// Sifts internal successors and, for every pair of locations, every
    /// call/return combination, until no new location shows up.
    fn discover_locations(&mut self) -> Vec<Word<S>> {
        let internals: Vec<S> = self.alphabet.internals().collect();
        let calls: Vec<S> = self.alphabet.calls().collect();
        let returns: Vec<S> = self.alphabet.returns().collect();

        let mut accesses = vec![self.sift(&[])];
        loop {
            let before = accesses.len();
            let mut i = 0;
            while i < accesses.len() {
                for &x in &internals {
                    let target = self.sift(&word::concat(&[&accesses[i], &[x]]));
                    if !accesses.contains(&target) {
                        accesses.push(target);
                    }
                }
                i += 1;
            }
            let mut i = 0;
            while i < accesses.len() {
                let mut j = 0;
                while j < accesses.len() {
                    for &c in &calls {
                        for &r in &returns {
                            let word =
                                word::concat(&[&accesses[j], &[c], &accesses[i], &[r]]);
                            let target = self.sift(&word);
                            if !accesses.contains(&target) {
                                accesses.push(target);
                            }
                        }
                    }
                    j += 1;
                }
                i += 1;
            }
            if accesses.len() == before {
                return accesses;
            }
        }
    }
}

impl<S, U> Learner<S> for KearnsVaziraniVpa<S, U>
where
    S: Symbol,
    U: Sul<Symbol = S, Output = bool>,
{
    type Hypothesis = Vpa<S>;
    type StateMap = Vec<Word<S>>;

    fn build_hypothesis(&mut self) -> (Vpa<S>, Vec<Word<S>>) {
        if let Some((hypothesis, prefixes)) = &self.cache {
            return (hypothesis.clone(), prefixes.clone());
        }

        let accesses = self.discover_locations();
        let index: math::Map<Word<S>, StateId> = accesses
            .iter()
            .enumerate()
            .map(|(i, access)| (access.clone(), i as StateId))
            .collect();
        let internals: Vec<S> = self.alphabet.internals().collect();
        let calls: Vec<S> = self.alphabet.calls().collect();
        let returns: Vec<S> = self.alphabet.returns().collect();

        let mut vpa = Vpa::new(self.alphabet.clone());
        for access in &accesses {
            let accepting = self.sul.query(access);
            vpa.add_state(accepting);
        }
        for (state, access) in accesses.iter().enumerate() {
            for &x in &internals {
                let target = self.sift(&word::concat(&[access, &[x]]));
                vpa.set_internal(state as StateId, x, index[&target]);
            }
        }
        for (state, access) in accesses.iter().enumerate() {
            for (saved, saved_access) in accesses.iter().enumerate() {
                for &c in &calls {
                    for &r in &returns {
                        let word = word::concat(&[saved_access, &[c], access, &[r]]);
                        let target = self.sift(&word);
                        vpa.set_return(state as StateId, r, saved as StateId, c, index[&target]);
                    }
                }
            }
        }
        debug!("discrimination tree yields {} locations", accesses.len());
        self.cache = Some((vpa.clone(), accesses.clone()));
        (vpa, accesses)
    }

    fn refine_hypothesis(&mut self, cex: &[S], hypothesis: &Vpa<S>, prefixes: &Vec<Word<S>>) {
        let expected = self.sul.query(cex);
        let mut confs = Vec::with_capacity(cex.len() + 1);
        let mut conf = hypothesis.initial_conf();
        confs.push(conf.clone());
        for &sym in cex {
            conf = hypothesis
                .step(conf, sym)
                .expect("BUG: a genuine counterexample cannot hit the hypothesis sink");
            confs.push(conf.clone());
        }

        let sul = &mut self.sul;
        let mut acex = CachedAcex::new(cex.len() + 1, |i| {
            let VpaConf { state, stack } = &confs[i];
            let mut replaced = flatten_stack(prefixes, stack);
            replaced.extend_from_slice(&prefixes[*state as usize]);
            replaced.extend_from_slice(&cex[i..]);
            sul.query(&replaced) == expected
        });
        let flip = find_flip(&mut acex, self.cex_search);

        // reading a call symbol appends to both the stack flattening and the
        // access word without consulting any transition, so the effect is
        // unchanged across it and the flip lands on an internal or return
        let sym = cex[flip];
        let new_access = match self.alphabet.classify(sym) {
            SymbolKind::Call => panic!("BUG: counterexample effect flipped at a call symbol"),
            SymbolKind::Internal => {
                word::concat(&[&prefixes[confs[flip].state as usize], &[sym]])
            }
            SymbolKind::Return => {
                let source = &confs[flip];
                let &(saved, call) = source
                    .stack
                    .last()
                    .expect("BUG: return step off an empty stack");
                word::concat(&[
                    &prefixes[saved as usize],
                    &[call],
                    &prefixes[source.state as usize],
                    &[sym],
                ])
            }
        };
        let conflated = &confs[flip + 1];
        let context = (
            flatten_stack(prefixes, &conflated.stack),
            cex[flip + 1..].to_vec(),
        );
        debug!(
            "splitting location {} with access {}",
            conflated.state,
            show(&new_access)
        );
        self.split_leaf(&prefixes[conflated.state as usize], new_access, context);
        self.cache = None;
    }

    fn add_alphabet_symbol(&mut self, sym: S) {
        self.alphabet.push_internal(sym);
        self.cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{BreadthFirstOracle, Oracle};
    use crate::sul::FnSul;

    /// `expr := term ('+' term)*`, `term := '1' | '(' expr ')'`.
    fn arith(word: &[char]) -> bool {
        fn expr(w: &[char], i: usize) -> Option<usize> {
            let mut i = term(w, i)?;
            while w.get(i) == Some(&'+') {
                i = term(w, i + 1)?;
            }
            Some(i)
        }
        fn term(w: &[char], i: usize) -> Option<usize> {
            match w.get(i) {
                Some('1') => Some(i + 1),
                Some('(') => {
                    let j = expr(w, i + 1)?;
                    (w.get(j) == Some(&')')).then(|| j + 1)
                }
                _ => None,
            }
        }
        expr(word, 0) == Some(word.len())
    }

    #[test_log::test]
    fn learns_arithmetic_expressions() {
        let alphabet = VpaAlphabet::new(['1', '+'], ['('], [')']);
        let mut learner = KearnsVaziraniVpa::new(alphabet, FnSul::new(arith), CexSearch::Binary);
        let mut oracle =
            BreadthFirstOracle::new(FnSul::new(arith), ['1', '+', '(', ')'], 7);
        let vpa = learner.infer(&mut oracle, None);
        assert!(vpa.accepts(&['1']));
        assert!(vpa.accepts(&['1', '+', '1']));
        assert!(vpa.accepts(&['(', '1', ')', '+', '1']));
        assert!(vpa.accepts(&['(', '(', '1', ')', ')']));
        assert!(!vpa.accepts(&[]));
        assert!(!vpa.accepts(&['(']));
        assert!(!vpa.accepts(&['+']));
        assert!(!vpa.accepts(&['1', '+']));
        assert!(!vpa.accepts(&['(', '1']));
    }

    #[test_log::test]
    fn learns_nested_wrapping() {
        // well-matched words whose matched core is a single '1'
        let wrapped = |word: &[char]| {
            let mut word = word;
            while word.len() >= 3 && word[0] == '(' && word[word.len() - 1] == ')' {
                word = &word[1..word.len() - 1];
            }
            word == ['1']
        };
        let alphabet = VpaAlphabet::new(['1'], ['('], [')']);
        let mut learner =
            KearnsVaziraniVpa::new(alphabet, FnSul::new(wrapped), CexSearch::Exponential);
        let mut oracle = BreadthFirstOracle::new(FnSul::new(wrapped), ['1', '(', ')'], 7);
        let vpa = learner.infer(&mut oracle, None);
        assert!(vpa.accepts(&['1']));
        assert!(vpa.accepts(&['(', '(', '1', ')', ')']));
        assert!(!vpa.accepts(&['(', '1', ')', '(', '1', ')']));
        assert!(!vpa.accepts(&['(', ')']));
    }

    #[test_log::test]
    fn every_refinement_grows_the_hypothesis() {
        let alphabet = VpaAlphabet::new(['1', '+'], ['('], [')']);
        let mut learner = KearnsVaziraniVpa::new(alphabet, FnSul::new(arith), CexSearch::Linear);
        let mut oracle =
            BreadthFirstOracle::new(FnSul::new(arith), ['1', '+', '(', ')'], 6);
        let mut last_size = learner.build_hypothesis().0.size();
        loop {
            let (hypothesis, prefixes) = learner.build_hypothesis();
            let Some(cex) = oracle.find_cex(&hypothesis) else {
                break;
            };
            learner.refine_hypothesis(&cex, &hypothesis, &prefixes);
            let size = learner.build_hypothesis().0.size();
            assert!(size > last_size);
            last_size = size;
        }
        assert!(last_size >= 2);
    }
}
