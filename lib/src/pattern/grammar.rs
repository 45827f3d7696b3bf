/*! Resolution and verification of grammars.

A grammar is built from a list of named rules. Each rule body is a pattern
whose open calls refer to rules by name, through the pattern's own list of
references. Building the grammar binds every open call to the index of the
rule with that name in the grammar's rule arena, and then verifies that the
resulting rules are safe to execute: no rule may call itself before consuming
input, and no repetition may have a body that matches the empty string.

The same module normalises sequences and choices into right-nested chains,
the form expected by the compiler.
*/

use std::sync::Arc;

use rustc_hash::FxHashMap;

#[cfg(feature = "logging")]
use log::*;

use crate::errors::Error;
use crate::pattern::node::{Call, Grammar, Node, RuleDef};
use crate::pattern::Rule;

/// Maximum number of rules in a grammar.
pub const MAX_RULES: usize = 200;

/// Determines how open calls are bound while finalizing a tree.
pub(crate) enum Scope<'a> {
    /// Outside of any grammar. Open calls can't be bound.
    TopLevel,
    /// Inside a grammar, open calls are bound to the rule with the same
    /// name.
    Grammar(&'a FxHashMap<&'a str, usize>),
}

/// Builds a grammar from a list of rules.
pub(crate) fn build(rules: Vec<Rule>) -> Result<Grammar, Error> {
    if rules.is_empty() {
        return Err(Error::EmptyGrammar);
    }

    if rules.len() > MAX_RULES {
        return Err(Error::TooManyRules { max: MAX_RULES });
    }

    let mut names = FxHashMap::default();

    for (index, rule) in rules.iter().enumerate() {
        if rule.name.is_empty() {
            return Err(Error::EmptyRuleName);
        }
        if names.insert(rule.name.as_str(), index).is_some() {
            return Err(Error::DuplicateRule { name: rule.name.clone() });
        }
    }

    let scope = Scope::Grammar(&names);
    let mut defs = Vec::with_capacity(rules.len());

    for (index, rule) in rules.iter().enumerate() {
        defs.push(RuleDef {
            index,
            name: rule.name.clone(),
            body: finalize(&rule.pattern.root, &rule.pattern.refs, &scope)?,
        });
    }

    let grammar = Grammar { rules: defs };

    verify(&grammar)?;

    #[cfg(feature = "logging")]
    debug!(
        "grammar resolved: {} rules, entry rule `{}`",
        grammar.rules.len(),
        grammar.entry().name
    );

    Ok(grammar)
}

/// Returns a copy of `node` where open calls have been bound according to
/// `scope`, and where chains of sequences and choices are right-nested.
///
/// `refs` is the list of rule names referenced by the pattern that owns
/// `node`. Nested grammars are already finalized and are returned as they
/// are.
pub(crate) fn finalize(
    node: &Arc<Node>,
    refs: &[String],
    scope: &Scope,
) -> Result<Arc<Node>, Error> {
    let finalized = match node.as_ref() {
        Node::Call(Call::Open(index)) => {
            let name = refs.get(*index).map(String::as_str).unwrap_or("");
            let index = match scope {
                Scope::Grammar(names) => names.get(name).copied(),
                Scope::TopLevel => None,
            };
            match index {
                Some(index) => Node::Call(Call::Rule(index)),
                None => {
                    return Err(Error::UndefinedRule { name: name.to_string() })
                }
            }
        }
        Node::Seq(..) => {
            return chain(node, refs, scope, Node::Seq, |node| match node {
                Node::Seq(first, second) => Some((first, second)),
                _ => None,
            })
        }
        Node::Choice(..) => {
            return chain(node, refs, scope, Node::Choice, |node| match node {
                Node::Choice(first, second) => Some((first, second)),
                _ => None,
            })
        }
        Node::Repeat(body) => Node::Repeat(finalize(body, refs, scope)?),
        Node::Not(body) => Node::Not(finalize(body, refs, scope)?),
        Node::And(body) => Node::And(finalize(body, refs, scope)?),
        Node::Behind(width, body) => {
            Node::Behind(*width, finalize(body, refs, scope)?)
        }
        Node::Action(action, body) => {
            Node::Action(action.clone(), finalize(body, refs, scope)?)
        }
        Node::Char(_)
        | Node::Set(_)
        | Node::Any
        | Node::True
        | Node::False
        | Node::Call(Call::Rule(_))
        | Node::Grammar(_) => return Ok(node.clone()),
    };

    Ok(Arc::new(finalized))
}

/// Finalizes a chain of binary nodes of the same kind, rebuilding it as a
/// right-nested chain. `split` returns the operands of a node if the node
/// belongs to the chain.
fn chain<'a>(
    node: &'a Arc<Node>,
    refs: &[String],
    scope: &Scope,
    make: fn(Arc<Node>, Arc<Node>) -> Node,
    split: fn(&'a Node) -> Option<(&'a Arc<Node>, &'a Arc<Node>)>,
) -> Result<Arc<Node>, Error> {
    let mut operands = Vec::new();
    let mut pending = vec![node];

    // Operands are visited from left to right, `pending` is used as a stack
    // so the second operand of each node is pushed first.
    while let Some(node) = pending.pop() {
        match split(node.as_ref()) {
            Some((first, second)) => {
                pending.push(second);
                pending.push(first);
            }
            None => operands.push(finalize(node, refs, scope)?),
        }
    }

    Ok(operands
        .into_iter()
        .rev()
        .reduce(|rest, operand| Arc::new(make(operand, rest)))
        .unwrap_or_else(|| node.clone()))
}

/// Verifies that no rule in the grammar is left recursive and that no rule
/// contains a loop whose body can match the empty string.
fn verify(grammar: &Grammar) -> Result<(), Error> {
    let rules = grammar.rules.as_slice();
    let mut path = Vec::with_capacity(rules.len());

    for rule in rules {
        path.clear();
        path.push(rule.index);
        check_left_recursion(&rule.body, rules, &mut path, false)?;
    }

    for rule in rules {
        if has_empty_loop(&rule.body, rules) {
            return Err(Error::EmptyLoopInRule { name: rule.name.clone() });
        }
    }

    Ok(())
}

/// Walks the parts of `node` that can be reached without consuming input.
///
/// `path` contains the rules entered so far without consuming input,
/// reaching any of them again means that the grammar is left recursive.
/// `nullable` tells whether everything matched before `node` may have been
/// empty. Returns whether `node` may be reached and matched without
/// consuming input.
fn check_left_recursion<'a>(
    mut node: &'a Node,
    rules: &'a [RuleDef],
    path: &mut Vec<usize>,
    mut nullable: bool,
) -> Result<bool, Error> {
    let depth = path.len();

    let result = loop {
        match node {
            Node::Char(_) | Node::Set(_) | Node::Any | Node::False => {
                break nullable
            }
            Node::True | Node::Behind(..) => break true,
            Node::Grammar(_) => break node.is_nullable(rules),
            Node::Action(_, body) => node = body.as_ref(),
            Node::Call(Call::Open(_)) => break nullable,
            Node::Call(Call::Rule(index)) => {
                let Some(rule) = rules.get(*index) else {
                    break nullable;
                };
                if path.contains(index) {
                    return Err(Error::LeftRecursiveRule {
                        name: rule.name.clone(),
                    });
                }
                path.push(*index);
                node = rule.body.as_ref();
            }
            Node::Not(body) | Node::And(body) | Node::Repeat(body) => {
                node = body.as_ref();
                nullable = true;
            }
            Node::Seq(first, second) => {
                if !check_left_recursion(first, rules, path, false)? {
                    break nullable;
                }
                node = second.as_ref();
            }
            Node::Choice(first, second) => {
                nullable = check_left_recursion(first, rules, path, nullable)?;
                node = second.as_ref();
            }
        }
    };

    path.truncate(depth);
    Ok(result)
}

/// Returns true if `node` contains a repetition whose body is nullable.
/// Calls are not followed, every rule is checked on its own, and nested
/// grammars were checked when they were built.
fn has_empty_loop(node: &Node, rules: &[RuleDef]) -> bool {
    match node {
        Node::Repeat(body) => {
            body.is_nullable(rules) || has_empty_loop(body, rules)
        }
        Node::Not(body)
        | Node::And(body)
        | Node::Behind(_, body)
        | Node::Action(_, body) => has_empty_loop(body, rules),
        Node::Seq(first, second) | Node::Choice(first, second) => {
            has_empty_loop(first, rules) || has_empty_loop(second, rules)
        }
        Node::Char(_)
        | Node::Set(_)
        | Node::Any
        | Node::True
        | Node::False
        | Node::Call(_)
        | Node::Grammar(_) => false,
    }
}
