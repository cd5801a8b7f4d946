/// Configuration errors. These are raised immediately and are always caller
/// mistakes; logic errors inside the learners themselves are reported through
/// `BUG:`-prefixed panics instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Two automata of different kinds were compared.
    #[error("cannot compare automata of different kinds: {left} vs {right}")]
    KindMismatch {
        left: &'static str,
        right: &'static str,
    },
    /// Two automata over different alphabets were compared.
    #[error("cannot compare automata over different alphabets")]
    AlphabetMismatch,
}
