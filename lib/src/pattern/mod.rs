/*! Pattern values and the combinators that build them.

A [`Pattern`] is an immutable value. Combining patterns never modifies the
operands, the result shares the operands' trees, so any pattern can be used
as a sub-expression of as many other patterns as needed.

```
use pegvm::Pattern;

let digit = Pattern::range(&["09"]).unwrap();
let number = digit.repeat(1).unwrap();
let sum = number.then(&Pattern::ch('+')).then(&number);

let matcher = sum.compile().unwrap();

assert!(matcher.try_match("12+34").matched());
assert!(!matcher.try_match("12-34").matched());
```

Patterns may reference rules by name with [`Pattern::rule_ref`]. Such
references are open until the pattern becomes part of a grammar built with
[`Pattern::grammar`], which binds every reference to the rule with the same
name. The names referenced by a pattern are kept in a list, open calls in
the tree store indexes into that list. When two patterns with different
lists are combined the lists are concatenated, and the indexes in the second
operand are shifted by the length of the first list, so that every index
still addresses the same name.
 */

use std::sync::Arc;

use crate::captures::Action;
use crate::charset::CharSet;
use crate::compiler::Compiler;
use crate::errors::Error;
use crate::vm::Matcher;

use node::{Call, Node};

#[cfg(feature = "ascii-tree")]
mod ascii_tree;
pub(crate) mod grammar;
pub(crate) mod node;


/// A parsing expression.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub(crate) root: Arc<Node>,
    /// Names of the rules referenced by open calls in `root`.
    pub(crate) refs: Vec<String>,
}

/// A named pattern used for building grammars with [`Pattern::grammar`].
#[derive(Clone, Debug)]
pub struct Rule {
    pub(crate) name: String,
    pub(crate) pattern: Pattern,
}

impl Rule {
    /// Creates a rule named `name`.
    pub fn new<N: Into<String>>(name: N, pattern: Pattern) -> Self {
        Self { name: name.into(), pattern }
    }

    /// Name of the rule.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Body of the rule.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

impl Pattern {
    fn new(root: Node) -> Self {
        Self { root: Arc::new(root), refs: Vec::new() }
    }

    fn with_refs(root: Node, refs: Vec<String>) -> Self {
        Self { root: Arc::new(root), refs }
    }

    /// Pattern that matches the empty string. It never fails.
    pub fn succeed() -> Self {
        Self::new(Node::True)
    }

    /// Pattern that never matches.
    pub fn fail() -> Self {
        Self::new(Node::False)
    }

    /// Matches the string `text` literally. An empty string is equivalent
    /// to [`Pattern::succeed`].
    pub fn str(text: &str) -> Self {
        let mut chars = text.chars().rev();

        let Some(last) = chars.next() else {
            return Self::succeed();
        };

        let root = chars.fold(Arc::new(Node::Char(last)), |rest, c| {
            Arc::new(Node::Seq(Arc::new(Node::Char(c)), rest))
        });

        Self { root, refs: Vec::new() }
    }

    /// Matches the character `c`.
    pub fn ch(c: char) -> Self {
        Self::new(Node::Char(c))
    }

    /// Matches any `n` characters if `n` is positive. If `n` is negative
    /// the pattern succeeds only if less than `-n` characters remain, and
    /// it consumes nothing. `n(0)` always succeeds.
    pub fn n(n: i32) -> Self {
        let any = Arc::new(Node::Any);
        let mut root = any.clone();

        for _ in 1..n.unsigned_abs() {
            root = Arc::new(Node::Seq(any.clone(), root));
        }

        match n {
            0 => Self::succeed(),
            n if n > 0 => Self { root, refs: Vec::new() },
            _ => Self::new(Node::Not(root)),
        }
    }

    /// Matches any character in the given ranges. Each range is a string
    /// with exactly two characters, the first and the last characters in
    /// the range (e.g. `"az"`). A range where the first character is greater
    /// than the last one is empty. With no ranges the pattern never
    /// matches.
    pub fn range(ranges: &[&str]) -> Result<Self, Error> {
        let mut set = CharSet::new();

        for range in ranges {
            let mut chars = range.chars();
            match (chars.next(), chars.next(), chars.next()) {
                (Some(first), Some(last), None) => {
                    set.insert_range(first as u32, last as u32)
                }
                _ => {
                    return Err(Error::InvalidRange {
                        range: range.to_string(),
                    })
                }
            }
        }

        Ok(Self::from_set(set))
    }

    /// Matches any of the characters in `chars`. With an empty string the
    /// pattern never matches.
    pub fn set(chars: &str) -> Self {
        Self::from_set(CharSet::from_chars(chars))
    }

    /// Matches any character in `set`.
    pub fn from_set(set: CharSet) -> Self {
        if set.len() == 1 {
            if let Some(c) = set.first().and_then(char::from_u32) {
                return Self::ch(c);
            }
        }
        if set.is_full() {
            return Self::new(Node::Any);
        }
        Self::new(Node::Set(set))
    }

    /// Positive lookahead. Succeeds if this pattern matches at the current
    /// position, but doesn't consume any input.
    pub fn test(&self) -> Self {
        Self::with_refs(Node::And(self.root.clone()), self.refs.clone())
    }

    /// Negative lookahead. Succeeds if this pattern doesn't match at the
    /// current position, never consumes input.
    pub fn test_not(&self) -> Self {
        Self::with_refs(Node::Not(self.root.clone()), self.refs.clone())
    }

    /// Lookbehind. Succeeds if this pattern matches the input that precedes
    /// the current position.
    ///
    /// The pattern must always match a fixed, non-zero number of characters
    /// and can't contain actions.
    pub fn behind(&self) -> Result<Self, Error> {
        let width = match self.root.fixed_length(&[]) {
            Some(width) if width > 0 => width,
            _ => return Err(Error::VariableLengthLookbehind),
        };

        if self.root.has_actions(&[]) {
            return Err(Error::LookbehindWithActions);
        }

        Ok(Self::with_refs(
            Node::Behind(width, self.root.clone()),
            self.refs.clone(),
        ))
    }

    /// Ordered choice. Matches this pattern, or `other` if this pattern
    /// fails.
    ///
    /// The choice between two character classes is their union.
    pub fn choice(&self, other: &Pattern) -> Self {
        if let (Some(mut set), Some(other_set)) =
            (self.root.class(), other.root.class())
        {
            set.union_with(&other_set);
            return Self::from_set(set);
        }

        if self.root.is_no_fail(&[]) || matches!(*other.root, Node::False) {
            return self.clone();
        }

        if matches!(*self.root, Node::False) {
            return other.clone();
        }

        let (refs, shift) = merge_refs(&self.refs, &other.refs);

        Self::with_refs(
            Node::Choice(
                self.root.clone(),
                Node::shift_open_calls(&other.root, shift),
            ),
            refs,
        )
    }

    /// Same as [`Pattern::choice`].
    #[inline]
    pub fn or(&self, other: &Pattern) -> Self {
        self.choice(other)
    }

    /// Ordered choice between all the given patterns. With no patterns the
    /// result never matches.
    pub fn choice_all(patterns: &[Pattern]) -> Self {
        patterns
            .iter()
            .fold(None, |acc: Option<Pattern>, p| match acc {
                None => Some(p.clone()),
                Some(acc) => Some(acc.choice(p)),
            })
            .unwrap_or_else(Self::fail)
    }

    /// Matches this pattern if `other` doesn't match at the same position.
    /// Equivalent to `other.test_not().then(self)`.
    ///
    /// The difference between two character classes is computed as a set
    /// difference.
    pub fn diff(&self, other: &Pattern) -> Self {
        if let (Some(mut set), Some(other_set)) =
            (self.root.class(), other.root.class())
        {
            set.difference_with(&other_set);
            return Self::from_set(set);
        }

        let (refs, shift) = merge_refs(&self.refs, &other.refs);

        Self::with_refs(
            Node::Seq(
                Arc::new(Node::Not(Node::shift_open_calls(
                    &other.root,
                    shift,
                ))),
                self.root.clone(),
            ),
            refs,
        )
    }

    /// Sequence. Matches this pattern followed by `other`.
    pub fn seq(&self, other: &Pattern) -> Self {
        if matches!(*self.root, Node::False)
            || matches!(*other.root, Node::True)
        {
            return self.clone();
        }

        if matches!(*self.root, Node::True) {
            return other.clone();
        }

        let (refs, shift) = merge_refs(&self.refs, &other.refs);

        Self::with_refs(
            Node::Seq(
                self.root.clone(),
                Node::shift_open_calls(&other.root, shift),
            ),
            refs,
        )
    }

    /// Same as [`Pattern::seq`].
    #[inline]
    pub fn then(&self, other: &Pattern) -> Self {
        self.seq(other)
    }

    /// Sequence of all the given patterns. With no patterns the result
    /// matches the empty string.
    pub fn seq_all(patterns: &[Pattern]) -> Self {
        patterns
            .iter()
            .fold(None, |acc: Option<Pattern>, p| match acc {
                None => Some(p.clone()),
                Some(acc) => Some(acc.seq(p)),
            })
            .unwrap_or_else(Self::succeed)
    }

    /// Repetition.
    ///
    /// With `n >= 0` matches this pattern at least `n` times, as many times
    /// as possible. This pattern can't match the empty string in that case,
    /// as the repetition would never end.
    ///
    /// With `n < 0` matches this pattern at most `-n` times.
    pub fn repeat(&self, n: i32) -> Result<Self, Error> {
        if n >= 0 {
            if self.root.is_nullable(&[]) {
                return Err(Error::NullableLoopBody);
            }

            let mut root = Arc::new(Node::Repeat(self.root.clone()));
            for _ in 0..n {
                root = Arc::new(Node::Seq(self.root.clone(), root));
            }

            return Ok(Self { root, refs: self.refs.clone() });
        }

        let empty = Arc::new(Node::True);
        let mut root = self.root.clone();

        for _ in 1..n.unsigned_abs() {
            root = Arc::new(Node::Seq(
                self.root.clone(),
                Arc::new(Node::Choice(root, empty.clone())),
            ));
        }

        Ok(Self::with_refs(Node::Choice(root, empty), self.refs.clone()))
    }

    /// Matches this pattern exactly `n` times.
    ///
    /// The pattern is unrolled `n` times unless `use_grammar` is true. In
    /// that case the result is a grammar with two rules, one of them calls
    /// the other `n` times. That's preferable when this pattern is large.
    pub fn times(&self, n: i32, use_grammar: bool) -> Result<Self, Error> {
        if n <= 0 {
            return Err(Error::InvalidRepetitionCount { count: n });
        }

        if n == 1 {
            return Ok(self.clone());
        }

        if !use_grammar {
            if self.root.is_nullable(&[]) {
                return Err(Error::NullableLoopBody);
            }

            let mut root = self.root.clone();
            for _ in 1..n {
                root = Arc::new(Node::Seq(self.root.clone(), root));
            }

            return Ok(Self { root, refs: self.refs.clone() });
        }

        let call = Self::rule_ref("p")?;
        let calls = (1..n).fold(call.clone(), |calls, _| calls.seq(&call));

        Self::grammar([Rule::new("c", calls), Rule::new("p", self.clone())])
    }

    /// Invokes `action` every time this pattern matches.
    ///
    /// See [`Action`] for details about when actions are invoked.
    pub fn action(&self, action: Arc<dyn Action>) -> Self {
        Self::with_refs(
            Node::Action(action, self.root.clone()),
            self.refs.clone(),
        )
    }

    /// Same as [`Pattern::action`], but receives a closure.
    pub fn action_fn<F>(&self, f: F) -> Self
    where
        F: Fn(&[char], usize, usize) -> Option<usize> + Send + Sync + 'static,
    {
        self.action(Arc::new(f))
    }

    /// Calls the rule named `name`. The reference is resolved when the
    /// pattern becomes part of a grammar that defines the rule.
    pub fn rule_ref(name: &str) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::EmptyRuleName);
        }
        Ok(Self::with_refs(Node::Call(Call::Open(0)), vec![name.to_string()]))
    }

    /// Builds a grammar. The first rule is the entry point.
    ///
    /// Every rule reference in the rules must name one of the rules, and the
    /// grammar must not contain left recursive rules or loops over patterns
    /// that can match the empty string.
    pub fn grammar<I>(rules: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Rule>,
    {
        let grammar = grammar::build(rules.into_iter().collect())?;
        Ok(Self::new(Node::Grammar(Arc::new(grammar))))
    }

    /// Returns true if the pattern can match without consuming input.
    pub fn is_nullable(&self) -> bool {
        self.root.is_nullable(&[])
    }

    /// Returns true if the pattern matches every subject.
    pub fn is_no_fail(&self) -> bool {
        self.root.is_no_fail(&[])
    }

    /// Returns true if a failure of the pattern can be decided by looking
    /// only at the next character.
    pub fn is_head_fail(&self) -> bool {
        self.root.is_head_fail(&[])
    }

    /// Number of characters consumed by the pattern every time it matches,
    /// or `None` if the number varies.
    pub fn fixed_length(&self) -> Option<usize> {
        self.root.fixed_length(&[])
    }

    /// Names of the rules referenced by the pattern and not yet resolved.
    pub fn refs(&self) -> &[String] {
        self.refs.as_slice()
    }

    /// Compiles the pattern with the default options.
    pub fn compile(&self) -> Result<Matcher, Error> {
        Compiler::new().compile(self)
    }
}

/// Merges the lists of rules referenced by two patterns.
///
/// Returns the merged list and the amount that must be added to the indexes
/// of open calls in the second pattern.
fn merge_refs(first: &[String], second: &[String]) -> (Vec<String>, usize) {
    if first.is_empty() {
        return (second.to_vec(), 0);
    }

    if second.is_empty() || first == second {
        return (first.to_vec(), 0);
    }

    let mut refs = Vec::with_capacity(first.len() + second.len());
    refs.extend_from_slice(first);
    refs.extend_from_slice(second);

    (refs, first.len())
}
