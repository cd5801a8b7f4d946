//! The system under learning (SUL): the black box answering membership
//! queries.
//!
//! All learners consume a SUL through [`Sul::query_last`] (the output after
//! the last symbol of a non-empty word) and, for Moore-like targets,
//! [`Sul::query_empty`]. Implementations must be deterministic for a fixed
//! word; there are no retries anywhere in the crate.

use std::marker::PhantomData;

use crate::alphabet::Symbol;
use crate::math;
use crate::word::Word;
use crate::Observation;

pub trait Sul {
    type Symbol: Symbol;
    type Output: Observation;

    /// Called before a learning session, for session-based targets.
    fn setup(&mut self) {}

    /// Called after a learning session.
    fn shutdown(&mut self) {}

    /// The output after feeding one more symbol, for step-based targets
    /// that keep state between calls. Word-based SULs reject the call here,
    /// at the boundary.
    fn step(&mut self, _symbol: Self::Symbol) -> Self::Output {
        panic!("incremental steps require a step-based SUL")
    }

    /// The output the SUL produces after reading `word`. `word` must be
    /// non-empty.
    fn query_last(&mut self, word: &[Self::Symbol]) -> Self::Output;

    /// The output for the empty word. Only Moore-like targets have one;
    /// querying it on anything else is a usage error rejected here, at the
    /// SUL boundary.
    fn query_empty(&mut self) -> Self::Output {
        panic!("empty-word queries require a Moore-like SUL")
    }

    /// Dispatches to [`Sul::query_empty`] or [`Sul::query_last`].
    fn query(&mut self, word: &[Self::Symbol]) -> Self::Output {
        if word.is_empty() {
            self.query_empty()
        } else {
            self.query_last(word)
        }
    }
}

/// A Moore-like SUL backed by a function over whole words, the simplest way
/// to wrap a black-box program (e.g. a parser) for learning.
pub struct FnSul<S, O, F> {
    fun: F,
    _marker: PhantomData<(S, O)>,
}

impl<S, O, F: FnMut(&[S]) -> O> FnSul<S, O, F> {
    pub fn new(fun: F) -> Self {
        Self {
            fun,
            _marker: PhantomData,
        }
    }
}

impl<S: Symbol, O: Observation, F: FnMut(&[S]) -> O> Sul for FnSul<S, O, F> {
    type Symbol = S;
    type Output = O;

    fn query_last(&mut self, word: &[S]) -> O {
        assert!(!word.is_empty(), "query_last requires a non-empty word");
        (self.fun)(word)
    }

    fn query_empty(&mut self) -> O {
        (self.fun)(&[])
    }
}

/// Memoizes the answers of the wrapped SUL. Queries are deterministic, so
/// the cache is never invalidated; every learner wraps its SUL in one of
/// these so repeated probing of the same word costs a single query.
pub struct CachedSul<U: Sul> {
    inner: U,
    cache: math::Map<Word<U::Symbol>, U::Output>,
    empty: Option<U::Output>,
}

impl<U: Sul> CachedSul<U> {
    pub fn new(inner: U) -> Self {
        Self {
            inner,
            cache: math::Map::default(),
            empty: None,
        }
    }

    /// Number of distinct words forwarded to the underlying SUL.
    pub fn distinct_queries(&self) -> usize {
        self.cache.len() + usize::from(self.empty.is_some())
    }
}

impl<U: Sul> Sul for CachedSul<U> {
    type Symbol = U::Symbol;
    type Output = U::Output;

    fn setup(&mut self) {
        self.inner.setup()
    }

    fn shutdown(&mut self) {
        self.inner.shutdown()
    }

    // steps are stateful and bypass the cache
    fn step(&mut self, symbol: U::Symbol) -> U::Output {
        self.inner.step(symbol)
    }

    fn query_last(&mut self, word: &[U::Symbol]) -> U::Output {
        if let Some(out) = self.cache.get(word) {
            return out.clone();
        }
        let out = self.inner.query_last(word);
        self.cache.insert(word.to_vec(), out.clone());
        out
    }

    fn query_empty(&mut self) -> U::Output {
        if let Some(out) = &self.empty {
            return out.clone();
        }
        let out = self.inner.query_empty();
        self.empty = Some(out.clone());
        out
    }
}
