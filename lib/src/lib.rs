/*! A Parsing Expression Grammar engine.

Patterns are built by combining simpler patterns: literal strings, character
classes, sequences, ordered choices, repetitions, lookahead and lookbehind
assertions and grammars with recursive rules. A [`Pattern`] is compiled by
the [`Compiler`] into a program for a backtracking virtual machine, the
resulting [`Matcher`] matches the pattern against any number of subjects.

Matching is anchored at the start of the subject (or at the given offset),
and offsets count characters, not bytes.

# Example

```rust
use pegvm::{Pattern, Rule};

// A balanced parenthesis expression: "(" (not_paren / &"(" parens)* ")"
let not_paren = Pattern::n(1).diff(&Pattern::set("()"));
let body = not_paren
    .or(&Pattern::ch('(').test().then(&Pattern::rule_ref("parens").unwrap()));

let parens = Pattern::grammar([Rule::new(
    "parens",
    Pattern::seq_all(&[
        Pattern::ch('('),
        body.repeat(0).unwrap(),
        Pattern::ch(')'),
    ]),
)])
.unwrap();

let matcher = parens.compile().unwrap();

assert_eq!(matcher.try_match("(a(b)c)d").end(), 7);
assert!(!matcher.try_match("(a(b)c").matched());
```

Actions attached to patterns are invoked when the patterns match. The
[`Capturer`], [`NamedCapturer`] and [`PositionCapturer`] types use actions
for collecting the substrings or positions matched by a pattern.
*/

pub use captures::Action;
pub use captures::Capture;
pub use captures::Capturer;
pub use captures::NamedCapturer;
pub use captures::PositionCapturer;

pub use charset::CharSet;
pub use charset::MAX_CODE_POINT;

pub use class::ClassMatcher;

pub use compiler::Addr;
pub use compiler::Compiler;
pub use compiler::Instr;
pub use compiler::MAX_INSTRUCTIONS;
pub use compiler::Program;
pub use compiler::TestClass;

pub use errors::Error;

pub use pattern::grammar::MAX_RULES;
pub use pattern::node::MAX_CALL_DEPTH;
pub use pattern::Pattern;
pub use pattern::Rule;

pub use vm::MatchResult;
pub use vm::Matcher;

mod captures;
mod charset;
mod class;
mod compiler;
mod errors;
mod pattern;
mod vm;

#[cfg(test)]
mod tests;
