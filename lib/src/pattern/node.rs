use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::captures::Action;
use crate::charset::CharSet;

/// Maximum number of nested rule calls followed while computing the fixed
/// length of a node. Recursive grammars would make the computation diverge
/// otherwise.
pub const MAX_CALL_DEPTH: usize = 200;

/// A node in the tree that describes a pattern.
///
/// Nodes are immutable once created, which allows sharing sub-trees between
/// any number of patterns through [`Arc`]. Rule references are never
/// pointers, a [`Node::Call`] stores an index that is interpreted either
/// against the reference list of the pattern that contains it (open calls)
/// or against the rule arena of the enclosing [`Grammar`] (resolved calls).
#[derive(Clone)]
pub(crate) enum Node {
    /// Matches a single code point.
    Char(char),
    /// Matches any code point in a set.
    Set(CharSet),
    /// Matches any code point.
    Any,
    /// Matches the empty string, never fails.
    True,
    /// Never matches.
    False,
    /// Matches the first node followed by the second one.
    Seq(Arc<Node>, Arc<Node>),
    /// Ordered choice, the second node is tried only if the first one fails.
    Choice(Arc<Node>, Arc<Node>),
    /// Greedy repetition, zero or more times.
    Repeat(Arc<Node>),
    /// Negative lookahead, never consumes input.
    Not(Arc<Node>),
    /// Positive lookahead, never consumes input.
    And(Arc<Node>),
    /// Lookbehind of a fixed number of code points.
    Behind(usize, Arc<Node>),
    /// Invokes an action when the inner node matches.
    Action(Arc<dyn Action>, Arc<Node>),
    /// Calls a rule.
    Call(Call),
    /// A set of rules, the first one is the entry point.
    Grammar(Arc<Grammar>),
}

/// Target of a [`Node::Call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    /// Index in the list of references of the pattern that contains the
    /// call. The name at that index identifies the rule.
    Open(usize),
    /// Index of the rule in the arena of the enclosing grammar.
    Rule(usize),
}

/// Arena of rules owned by a [`Node::Grammar`].
#[derive(Debug)]
pub(crate) struct Grammar {
    pub rules: Vec<RuleDef>,
}

/// A named rule inside a [`Grammar`].
#[derive(Debug)]
pub(crate) struct RuleDef {
    pub index: usize,
    pub name: String,
    pub body: Arc<Node>,
}

impl Grammar {
    /// Returns the rule where matching starts.
    #[inline]
    pub fn entry(&self) -> &RuleDef {
        &self.rules[0]
    }
}

impl Call {
    /// Returns the rule targeted by a resolved call.
    #[inline]
    pub fn rule<'a>(&self, rules: &'a [RuleDef]) -> Option<&'a RuleDef> {
        match self {
            Call::Open(_) => None,
            Call::Rule(index) => rules.get(*index),
        }
    }
}

impl Node {
    /// Returns true if the node can match without consuming input.
    ///
    /// `rules` is the arena of the grammar that contains the node, it is
    /// used for following resolved calls. Nodes outside of any grammar use
    /// an empty arena.
    pub fn is_nullable(&self, rules: &[RuleDef]) -> bool {
        match self {
            Node::Char(_) | Node::Set(_) | Node::Any | Node::False => false,
            Node::True
            | Node::Repeat(_)
            | Node::Not(_)
            | Node::And(_)
            | Node::Behind(..) => true,
            Node::Seq(first, second) => {
                first.is_nullable(rules) && second.is_nullable(rules)
            }
            Node::Choice(first, second) => {
                second.is_nullable(rules) || first.is_nullable(rules)
            }
            Node::Action(_, body) => body.is_nullable(rules),
            Node::Call(call) => call
                .rule(rules)
                .map_or(false, |rule| rule.body.is_nullable(rules)),
            Node::Grammar(grammar) => {
                grammar.entry().body.is_nullable(&grammar.rules)
            }
        }
    }

    /// Returns true if the node matches every subject.
    pub fn is_no_fail(&self, rules: &[RuleDef]) -> bool {
        match self {
            Node::Char(_)
            | Node::Set(_)
            | Node::Any
            | Node::False
            | Node::Not(_)
            | Node::Behind(..)
            | Node::Action(..) => false,
            Node::True | Node::Repeat(_) => true,
            Node::Seq(first, second) => {
                first.is_no_fail(rules) && second.is_no_fail(rules)
            }
            Node::Choice(first, second) => {
                second.is_no_fail(rules) || first.is_no_fail(rules)
            }
            Node::And(body) => body.is_no_fail(rules),
            Node::Call(call) => call
                .rule(rules)
                .map_or(false, |rule| rule.body.is_no_fail(rules)),
            Node::Grammar(grammar) => {
                grammar.entry().body.is_no_fail(&grammar.rules)
            }
        }
    }

    /// Returns true if a failure of this node can be decided by looking
    /// only at the next code point in the subject.
    pub fn is_head_fail(&self, rules: &[RuleDef]) -> bool {
        match self {
            Node::Char(_) | Node::Set(_) | Node::Any | Node::False => true,
            Node::True
            | Node::Repeat(_)
            | Node::Not(_)
            | Node::Behind(..)
            | Node::Action(..) => false,
            Node::Seq(first, second) => {
                second.is_no_fail(rules) && first.is_head_fail(rules)
            }
            Node::Choice(first, second) => {
                first.is_head_fail(rules) && second.is_head_fail(rules)
            }
            Node::And(body) => body.is_head_fail(rules),
            Node::Call(call) => call
                .rule(rules)
                .map_or(false, |rule| rule.body.is_head_fail(rules)),
            Node::Grammar(grammar) => {
                grammar.entry().body.is_head_fail(&grammar.rules)
            }
        }
    }

    /// Returns the number of code points consumed by the node every time it
    /// matches, or `None` if that number is not always the same.
    pub fn fixed_length(&self, rules: &[RuleDef]) -> Option<usize> {
        self.fixed_length_from(rules, 0, 0)
    }

    fn fixed_length_from(
        &self,
        rules: &[RuleDef],
        calls: usize,
        len: usize,
    ) -> Option<usize> {
        match self {
            Node::Char(_) | Node::Set(_) | Node::Any => Some(len + 1),
            Node::True
            | Node::False
            | Node::And(_)
            | Node::Not(_)
            | Node::Behind(..) => Some(len),
            Node::Repeat(_) | Node::Action(..) => None,
            Node::Seq(first, second) => {
                let len = first.fixed_length_from(rules, calls, len)?;
                second.fixed_length_from(rules, calls, len)
            }
            Node::Choice(first, second) => {
                let len1 = first.fixed_length_from(rules, calls, len)?;
                let len2 = second.fixed_length_from(rules, calls, len)?;
                (len1 == len2).then_some(len1)
            }
            Node::Call(call) => {
                if calls >= MAX_CALL_DEPTH {
                    return None;
                }
                call.rule(rules)?.body.fixed_length_from(rules, calls + 1, len)
            }
            Node::Grammar(grammar) => grammar.entry().body.fixed_length_from(
                &grammar.rules,
                calls,
                len,
            ),
        }
    }

    /// Returns true if the node, or any rule reachable from it, contains
    /// an action.
    pub fn has_actions(&self, rules: &[RuleDef]) -> bool {
        let mut visited = vec![false; rules.len()];
        self.find_action(rules, &mut visited)
    }

    fn find_action(&self, rules: &[RuleDef], visited: &mut [bool]) -> bool {
        match self {
            Node::Action(..) => true,
            Node::Char(_)
            | Node::Set(_)
            | Node::Any
            | Node::True
            | Node::False => false,
            Node::Seq(first, second) | Node::Choice(first, second) => {
                first.find_action(rules, visited)
                    || second.find_action(rules, visited)
            }
            Node::Repeat(body)
            | Node::Not(body)
            | Node::And(body)
            | Node::Behind(_, body) => body.find_action(rules, visited),
            Node::Call(Call::Open(_)) => false,
            Node::Call(Call::Rule(index)) => match visited.get_mut(*index) {
                Some(seen) if !*seen => {
                    *seen = true;
                    rules[*index].body.find_action(rules, visited)
                }
                _ => false,
            },
            Node::Grammar(grammar) => {
                let mut visited = vec![false; grammar.rules.len()];
                grammar.rules.iter().any(|rule| {
                    rule.body.find_action(&grammar.rules, &mut visited)
                })
            }
        }
    }

    /// Returns the character set matched by the node if the node is a pure
    /// character class (a single character, a set, or any character).
    pub fn class(&self) -> Option<CharSet> {
        match self {
            Node::Char(c) => {
                let mut set = CharSet::new();
                set.insert(*c as u32);
                Some(set)
            }
            Node::Set(set) => Some(set.clone()),
            Node::Any => Some(CharSet::full()),
            _ => None,
        }
    }

    /// Returns a copy of `node` where every open call index has been
    /// incremented by `n`.
    ///
    /// Resolved calls are relative to the arena of their own grammar, so
    /// they, and everything inside nested grammars, are left untouched.
    pub fn shift_open_calls(node: &Arc<Node>, n: usize) -> Arc<Node> {
        if n == 0 {
            return node.clone();
        }
        match node.as_ref() {
            Node::Call(Call::Open(index)) => {
                Arc::new(Node::Call(Call::Open(index + n)))
            }
            Node::Seq(first, second) => Arc::new(Node::Seq(
                Self::shift_open_calls(first, n),
                Self::shift_open_calls(second, n),
            )),
            Node::Choice(first, second) => Arc::new(Node::Choice(
                Self::shift_open_calls(first, n),
                Self::shift_open_calls(second, n),
            )),
            Node::Repeat(body) => {
                Arc::new(Node::Repeat(Self::shift_open_calls(body, n)))
            }
            Node::Not(body) => {
                Arc::new(Node::Not(Self::shift_open_calls(body, n)))
            }
            Node::And(body) => {
                Arc::new(Node::And(Self::shift_open_calls(body, n)))
            }
            Node::Behind(width, body) => Arc::new(Node::Behind(
                *width,
                Self::shift_open_calls(body, n),
            )),
            Node::Action(action, body) => Arc::new(Node::Action(
                action.clone(),
                Self::shift_open_calls(body, n),
            )),
            Node::Char(_)
            | Node::Set(_)
            | Node::Any
            | Node::True
            | Node::False
            | Node::Call(Call::Rule(_))
            | Node::Grammar(_) => node.clone(),
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Char(c) => write!(f, "Char({:?})", c),
            Node::Set(set) => write!(f, "Set({:?})", set),
            Node::Any => write!(f, "Any"),
            Node::True => write!(f, "True"),
            Node::False => write!(f, "False"),
            Node::Seq(first, second) => {
                f.debug_tuple("Seq").field(first).field(second).finish()
            }
            Node::Choice(first, second) => {
                f.debug_tuple("Choice").field(first).field(second).finish()
            }
            Node::Repeat(body) => f.debug_tuple("Repeat").field(body).finish(),
            Node::Not(body) => f.debug_tuple("Not").field(body).finish(),
            Node::And(body) => f.debug_tuple("And").field(body).finish(),
            Node::Behind(width, body) => {
                f.debug_tuple("Behind").field(width).field(body).finish()
            }
            Node::Action(_, body) => {
                f.debug_tuple("Action").field(body).finish()
            }
            Node::Call(call) => write!(f, "{:?}", call),
            Node::Grammar(grammar) => {
                f.debug_tuple("Grammar").field(&grammar.rules).finish()
            }
        }
    }
}
