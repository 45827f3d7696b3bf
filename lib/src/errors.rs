use thiserror::Error;

/// Errors returned while building, resolving or compiling patterns, and by
/// matching functions that receive invalid arguments.
///
/// Every variant describes a configuration problem detected before any
/// matching takes place. A subject that doesn't match a pattern is not an
/// error, it is reported through [`crate::MatchResult::matched`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A range literal doesn't consist of exactly two characters.
    #[error("a range must have exactly two characters: `{range}`")]
    InvalidRange { range: String },

    /// A rule reference or a rule definition uses an empty name.
    #[error("rule names must not be empty")]
    EmptyRuleName,

    /// A grammar was built without rules.
    #[error("a grammar must have at least one rule")]
    EmptyGrammar,

    /// The body of an unbounded repetition may match the empty string.
    #[error("loop body may accept the empty string")]
    NullableLoopBody,

    /// A lookbehind pattern doesn't have a fixed, non-zero length.
    #[error("lookbehind pattern must have a fixed length")]
    VariableLengthLookbehind,

    /// A lookbehind pattern contains actions.
    #[error("lookbehind pattern can not contain actions")]
    LookbehindWithActions,

    /// A rule reference doesn't match any rule in the enclosing grammar, or
    /// is used outside of any grammar.
    #[error("rule `{name}` is undefined")]
    UndefinedRule { name: String },

    /// Two rules in the same grammar have the same name.
    #[error("rule `{name}` is defined more than once")]
    DuplicateRule { name: String },

    /// A rule may call itself without consuming any input.
    #[error("rule `{name}` may be left recursive")]
    LeftRecursiveRule { name: String },

    /// A rule contains a repetition whose body may match the empty string.
    #[error("empty loop in rule `{name}`")]
    EmptyLoopInRule { name: String },

    /// The grammar has more rules than allowed.
    #[error("too many rules in grammar (max: {max})")]
    TooManyRules { max: usize },

    /// Exact repetitions must be repeated at least once.
    #[error("repetition count must be greater than zero, got {count}")]
    InvalidRepetitionCount { count: i32 },

    /// The starting offset passed to a match function is past the end of the
    /// subject.
    #[error("offset {offset} is out of bounds (subject length: {len})")]
    InvalidOffset { offset: usize, len: usize },

    /// The compiled program is too large.
    #[error("pattern too large")]
    TooLarge,
}
