/*! ASCII representation of pattern trees, for debugging. */

use termtree::Tree;

use crate::class::ClassMatcher;
use crate::pattern::node::{Call, Node, RuleDef};
use crate::pattern::Pattern;

impl Pattern {
    /// Returns a representation of the pattern's tree.
    ///
    /// ```
    /// use pegvm::Pattern;
    ///
    /// let p = Pattern::str("ab").or(&Pattern::n(-1));
    ///
    /// assert_eq!(
    ///     p.ascii_tree().to_string(),
    ///     "choice\n├── seq\n│   ├── char 'a'\n│   └── char 'b'\n└── not\n    └── any\n"
    /// );
    /// ```
    pub fn ascii_tree(&self) -> Tree<String> {
        node_ascii_tree(&self.root, &[], &self.refs)
    }
}

fn node_ascii_tree(
    node: &Node,
    rules: &[RuleDef],
    refs: &[String],
) -> Tree<String> {
    let unary = |label: String, body: &Node| {
        Tree::new(label).with_leaves([node_ascii_tree(body, rules, refs)])
    };

    let binary = |label: &str, first: &Node, second: &Node| {
        Tree::new(label.to_string()).with_leaves([
            node_ascii_tree(first, rules, refs),
            node_ascii_tree(second, rules, refs),
        ])
    };

    match node {
        Node::Char(c) => Tree::new(format!("char {:?}", c)),
        Node::Set(set) => Tree::new(format!("set {}", ClassMatcher::new(set))),
        Node::Any => Tree::new("any".to_string()),
        Node::True => Tree::new("true".to_string()),
        Node::False => Tree::new("false".to_string()),
        Node::Seq(first, second) => {
            binary("seq", first.as_ref(), second.as_ref())
        }
        Node::Choice(first, second) => {
            binary("choice", first.as_ref(), second.as_ref())
        }
        Node::Repeat(body) => unary("repeat".to_string(), body.as_ref()),
        Node::Not(body) => unary("not".to_string(), body.as_ref()),
        Node::And(body) => unary("and".to_string(), body.as_ref()),
        Node::Behind(n, body) => unary(format!("behind {}", n), body.as_ref()),
        Node::Action(_, body) => unary("action".to_string(), body.as_ref()),
        Node::Call(Call::Open(index)) => Tree::new(format!(
            "call `{}` (open)",
            refs.get(*index).map(String::as_str).unwrap_or("?")
        )),
        Node::Call(call @ Call::Rule(index)) => Tree::new(format!(
            "call `{}` (rule {})",
            call.rule(rules).map(|rule| rule.name.as_str()).unwrap_or("?"),
            index
        )),
        Node::Grammar(grammar) => Tree::new(format!(
            "grammar ({} rules)",
            grammar.rules.len()
        ))
        .with_leaves(grammar.rules.iter().map(|rule| {
            Tree::new(format!("rule {} `{}`", rule.index, rule.name))
                .with_leaves([node_ascii_tree(
                    &rule.body,
                    &grammar.rules,
                    &[],
                )])
        })),
    }
}
