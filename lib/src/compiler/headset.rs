/*! Head-set analysis.

The head set of a node is the set of characters that can appear at the
current position when the node matches. It is a conservative approximation:
a character outside the head set guarantees that the node fails, but a
character inside it doesn't guarantee a match. When the node can match the
empty string the head set includes the follow set, the characters that can
appear after the node.

The compiler uses head sets for replacing backtracking choices with tests
that look at the next character only.
*/

use bitflags::bitflags;

use crate::charset::CharSet;
use crate::pattern::node::{Call, Node, RuleDef};

bitflags! {
    /// Describes how a node may match the empty string.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct HeadFlags: u8 {
        /// The node may match the empty string.
        const EMPTY = 0x01;
        /// The node may match the empty string while running an action,
        /// which makes the match observable even if it consumes nothing.
        const ACTION = 0x02;
    }
}

/// Computes the head set of `node`, storing it in `first`.
///
/// The returned flags are empty if the node can't match without consuming
/// input, in which case `first` is exact with respect to the next character.
pub(crate) fn head_set<'a>(
    mut node: &'a Node,
    mut rules: &'a [RuleDef],
    follow: &CharSet,
    first: &mut CharSet,
) -> HeadFlags {
    let mut follow = follow;

    loop {
        match node {
            Node::Char(_) | Node::Set(_) | Node::Any => {
                *first = node.class().unwrap_or_default();
                return HeadFlags::empty();
            }
            Node::True => {
                *first = follow.clone();
                return HeadFlags::EMPTY;
            }
            Node::False => {
                *first = CharSet::new();
                return HeadFlags::empty();
            }
            Node::Action(_, body) => {
                let flags = head_set(body, rules, CharSet::full_ref(), first);
                return if flags.is_empty() {
                    HeadFlags::empty()
                } else {
                    HeadFlags::ACTION
                };
            }
            Node::Call(Call::Rule(index)) => match rules.get(*index) {
                Some(rule) => node = rule.body.as_ref(),
                None => {
                    *first = CharSet::full();
                    return HeadFlags::EMPTY;
                }
            },
            Node::Call(Call::Open(_)) => {
                *first = CharSet::full();
                return HeadFlags::EMPTY;
            }
            Node::Grammar(grammar) => {
                rules = grammar.rules.as_slice();
                node = grammar.entry().body.as_ref();
            }
            Node::Choice(a, b) => {
                let mut second = CharSet::new();
                let flags1 = head_set(a, rules, follow, first);
                let flags2 = head_set(b, rules, follow, &mut second);
                first.union_with(&second);
                return flags1 | flags2;
            }
            Node::Seq(a, b) => {
                if !a.is_nullable(rules) {
                    node = a.as_ref();
                    follow = CharSet::full_ref();
                    continue;
                }
                let mut second = CharSet::new();
                let flags2 = head_set(b, rules, follow, &mut second);
                let flags1 = head_set(a, rules, &second, first);
                return if flags1.is_empty() {
                    HeadFlags::empty()
                } else if (flags1 | flags2).contains(HeadFlags::ACTION) {
                    HeadFlags::ACTION
                } else {
                    flags2
                };
            }
            Node::Repeat(body) => {
                head_set(body, rules, follow, first);
                first.union_with(follow);
                return HeadFlags::EMPTY;
            }
            Node::And(body) => {
                let flags = head_set(body, rules, follow, first);
                first.intersect_with(follow);
                return flags;
            }
            Node::Not(body) | Node::Behind(_, body) => {
                if let (Node::Not(_), Some(class)) = (node, body.class()) {
                    *first = class.complement();
                    return HeadFlags::EMPTY;
                }
                let flags = head_set(body, rules, follow, first);
                *first = follow.clone();
                return flags | HeadFlags::EMPTY;
            }
        }
    }
}

/// Returns true if compiling `node` requires the follow set, which is the
/// case for choices and repetitions at the end of a chain of sequences.
pub(crate) fn needs_follow(mut node: &Node) -> bool {
    loop {
        match node {
            Node::Choice(..) | Node::Repeat(_) => return true,
            Node::Seq(_, second) => node = second.as_ref(),
            _ => return false,
        }
    }
}
