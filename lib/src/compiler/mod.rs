/*! Compiles patterns into programs for the matching virtual machine.

The compiler walks the tree of a pattern emitting instructions for each node.
Most of its work consists in avoiding backtracking. A choice compiled in the
naive way pushes a backtrack entry, tries the first alternative, and discards
the entry if the alternative succeeds. When the head set of the first
alternative (the characters it can start with) tells that the alternative
can only fail by looking at the next character, or that the second
alternative can't start with any of those characters, the choice is compiled
as a test of the next character that jumps directly to the right
alternative. Repetitions, lookaheads and sequences benefit from the same
analysis. See [`headset`] for details.

Once the code has been emitted, a peephole pass replaces jumps to jumps with
jumps to the final destination.
*/

#[cfg(feature = "logging")]
use std::time::Instant;

use std::sync::Arc;

#[cfg(feature = "logging")]
use log::*;

use crate::captures::Action;
use crate::charset::CharSet;
use crate::class::ClassMatcher;
use crate::errors::Error;
use crate::pattern::grammar::{finalize, Scope};
use crate::pattern::node::{Call, Grammar, Node, RuleDef};
use crate::pattern::Pattern;
use crate::vm::Matcher;

use headset::{head_set, needs_follow};

pub use instr::{Addr, Instr, Program, TestClass};

pub(crate) mod headset;
pub mod instr;


/// Compiles [`Pattern`]s into [`Matcher`]s.
///
/// ```
/// use pegvm::{Compiler, Pattern};
///
/// let matcher = Compiler::new()
///     .peephole(false)
///     .compile(&Pattern::str("foo"))
///     .unwrap();
///
/// assert!(matcher.try_match("foobar").matched());
/// ```
#[derive(Debug, Clone)]
pub struct Compiler {
    /// Whether jumps are redirected to their final destination once the
    /// code has been emitted. Disabling it produces code that is easier to
    /// relate to the pattern, but slower.
    peephole: bool,
    /// Maximum number of instructions in a compiled program.
    max_instructions: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Creates a new compiler.
    ///
    /// The peephole pass is enabled if the `peephole` feature is enabled,
    /// which is the default.
    pub fn new() -> Self {
        Self {
            peephole: cfg!(feature = "peephole"),
            max_instructions: MAX_INSTRUCTIONS,
        }
    }

    /// Enables or disables the peephole pass.
    pub fn peephole(mut self, yes: bool) -> Self {
        self.peephole = yes;
        self
    }

    /// Maximum number of instructions in the compiled program. Compiling a
    /// pattern that needs more fails with [`Error::TooLarge`]. The default
    /// is [`MAX_INSTRUCTIONS`].
    pub fn max_instructions(mut self, n: usize) -> Self {
        self.max_instructions = n.min(MAX_INSTRUCTIONS);
        self
    }

    /// Compiles a pattern.
    ///
    /// Fails with [`Error::UndefinedRule`] if the pattern has rule references
    /// that are not part of a grammar.
    pub fn compile(&self, pattern: &Pattern) -> Result<Matcher, Error> {
        Ok(Matcher::new(self.compile_program(pattern)?))
    }

    pub(crate) fn compile_program(
        &self,
        pattern: &Pattern,
    ) -> Result<Program, Error> {
        #[cfg(feature = "logging")]
        let start = Instant::now();

        let root = finalize(&pattern.root, &pattern.refs, &Scope::TopLevel)?;

        let mut emitter = Emitter::new(self.max_instructions);

        emitter.emit(&root, &[], false, None, CharSet::full_ref());
        emitter.push(Instr::End);
        emitter.push(Instr::GiveUp);

        if emitter.too_large {
            return Err(Error::TooLarge);
        }

        if self.peephole {
            emitter.peephole();
        }

        #[cfg(feature = "logging")]
        info!(
            "Pattern compiled: {} instructions in {:?}",
            emitter.code.len(),
            Instant::elapsed(&start)
        );

        Ok(Program::new(emitter.code))
    }
}

/// Largest number of instructions a program can have.
pub const MAX_INSTRUCTIONS: usize = u32::MAX as usize;

/// How a character set can be matched.
enum SetKind {
    /// The set is empty, nothing matches.
    Fail,
    /// The set contains every character.
    Any,
    /// The set contains a single character.
    Char(char),
    /// Any other set.
    Set,
}

impl SetKind {
    fn of(set: &CharSet) -> Self {
        if set.is_empty() {
            return SetKind::Fail;
        }
        if set.len() == 1 {
            if let Some(c) = set.first().and_then(char::from_u32) {
                return SetKind::Char(c);
            }
        }
        if set.is_full() {
            return SetKind::Any;
        }
        SetKind::Set
    }
}

/// Emits the instructions for a pattern.
///
/// Functions that emit code receive `rules`, the arena of the grammar that
/// contains the node being compiled, and most of them also receive:
///
/// * `opt`: when true the node is the body of a loop whose backtrack entry
///   is on top of the stack, and the node can update that entry instead of
///   pushing a new one.
/// * `tt`: address of a test instruction that was emitted right before the
///   node and that already checked the next character.
/// * `follow`: the head set of what comes after the node.
struct Emitter {
    code: Vec<Instr>,
    limit: usize,
    /// Set when the code grows beyond `limit`. Once set, nodes are not
    /// emitted anymore, but the instructions already started are
    /// completed so that every jump has a valid target.
    too_large: bool,
}

impl Emitter {
    fn new(limit: usize) -> Self {
        Self { code: Vec::new(), limit, too_large: false }
    }

    #[inline]
    fn push(&mut self, instr: Instr) -> Addr {
        self.code.push(instr);
        if self.code.len() > self.limit {
            self.too_large = true;
        }
        self.code.len() - 1
    }

    #[inline]
    fn here(&self) -> Addr {
        self.code.len()
    }

    /// Makes the instruction at `addr`, if any, jump to the next instruction
    /// that will be emitted.
    fn jump_to_here(&mut self, addr: Option<Addr>) {
        let here = self.here();
        self.jump_to(addr, here);
    }

    fn jump_to(&mut self, addr: Option<Addr>, target: Addr) {
        if let Some(addr) = addr {
            self.code[addr].set_target(target);
        }
    }

    fn emit(
        &mut self,
        mut node: &Node,
        rules: &[RuleDef],
        opt: bool,
        mut tt: Option<Addr>,
        follow: &CharSet,
    ) {
        loop {
            if self.too_large {
                return;
            }
            match node {
                Node::Char(c) => self.emit_char(*c, tt),
                Node::Any => {
                    self.push(Instr::Any);
                }
                Node::Set(set) => self.emit_set(set, tt),
                Node::True => {}
                Node::False => {
                    self.push(Instr::Fail);
                }
                Node::Choice(first, second) => {
                    self.emit_choice(first, second, rules, opt, follow)
                }
                Node::Repeat(body) => {
                    self.emit_repeat(body, rules, opt, follow)
                }
                Node::Behind(n, body) => self.emit_behind(*n, body, rules),
                Node::Not(body) => self.emit_not(body, rules),
                Node::And(body) => self.emit_and(body, rules, tt),
                Node::Action(action, body) => {
                    self.emit_action(action, body, rules, tt)
                }
                Node::Grammar(grammar) => self.emit_grammar(grammar),
                Node::Call(Call::Rule(index)) => {
                    self.push(Instr::OpenCall(*index));
                }
                Node::Call(Call::Open(_)) => {
                    unreachable!("open calls are resolved before compiling")
                }
                Node::Seq(first, second) => {
                    tt = self.emit_seq(first, second, rules, tt, follow);
                    node = second.as_ref();
                    continue;
                }
            }
            return;
        }
    }

    fn emit_char(&mut self, c: char, tt: Option<Addr>) {
        if let Some(Instr::TestChar(test, _)) = tt.map(|tt| &self.code[tt]) {
            if *test == c {
                self.push(Instr::Any);
                return;
            }
        }
        self.push(Instr::Char(c));
    }

    fn emit_set(&mut self, set: &CharSet, tt: Option<Addr>) {
        match SetKind::of(set) {
            SetKind::Fail => {
                self.push(Instr::Fail);
            }
            SetKind::Any => {
                self.push(Instr::Any);
            }
            SetKind::Char(c) => self.emit_char(c, tt),
            SetKind::Set => {
                if let Some(Instr::TestSet(TestClass::Pending(test), _)) =
                    tt.map(|tt| &self.code[tt])
                {
                    if test == set {
                        self.push(Instr::Any);
                        return;
                    }
                }
                self.push(Instr::Set(ClassMatcher::new(set)));
            }
        }
    }

    /// Emits an instruction that tests whether the next character is in
    /// `set`, jumping elsewhere if not. The target of the jump must be
    /// patched by the caller.
    ///
    /// Returns `None` without emitting anything if `accept_empty` is true,
    /// as the pattern being tested may match without any character.
    fn emit_test(
        &mut self,
        set: &CharSet,
        accept_empty: bool,
    ) -> Option<Addr> {
        if accept_empty {
            return None;
        }
        Some(match SetKind::of(set) {
            SetKind::Fail => self.push(Instr::Jmp(0)),
            SetKind::Any => self.push(Instr::TestAny(0)),
            SetKind::Char(c) => self.push(Instr::TestChar(c, 0)),
            SetKind::Set => {
                self.push(Instr::TestSet(TestClass::Pending(set.clone()), 0))
            }
        })
    }

    fn emit_choice(
        &mut self,
        first: &Node,
        second: &Node,
        rules: &[RuleDef],
        opt: bool,
        follow: &CharSet,
    ) {
        let empty_second = matches!(second, Node::True);
        let full = CharSet::full_ref();

        let mut head = CharSet::new();
        let flags = head_set(first, rules, full, &mut head);

        let disjoint = || {
            let mut second_head = CharSet::new();
            head_set(second, rules, follow, &mut second_head);
            !head.intersects(&second_head)
        };

        if first.is_head_fail(rules) || (flags.is_empty() && disjoint()) {
            // The next character decides which alternative is taken, no
            // backtracking needed.
            let test = self.emit_test(&head, false);
            self.emit(first, rules, false, test, follow);

            let jmp = (!empty_second).then(|| self.push(Instr::Jmp(0)));

            self.jump_to_here(test);
            self.emit(second, rules, opt, None, follow);
            self.jump_to_here(jmp);
        } else if opt && empty_second {
            // `first?` inside a loop, the loop's backtrack entry is updated
            // instead of pushing a new one.
            let commit = self.push(Instr::PartialCommit(0));
            self.jump_to_here(Some(commit));
            self.emit(first, rules, true, None, full);
        } else {
            let test = self.emit_test(&head, !flags.is_empty());
            let choice = self.push(Instr::Choice(0));

            self.emit(first, rules, empty_second, test, full);

            let commit = self.push(Instr::Commit(0));

            self.jump_to_here(Some(choice));
            self.jump_to_here(test);
            self.emit(second, rules, opt, None, follow);
            self.jump_to_here(Some(commit));
        }
    }

    fn emit_repeat(
        &mut self,
        body: &Node,
        rules: &[RuleDef],
        opt: bool,
        follow: &CharSet,
    ) {
        if let Some(class) = body.class() {
            self.push(Instr::Span(ClassMatcher::new(&class)));
            return;
        }

        let full = CharSet::full_ref();
        let mut head = CharSet::new();
        let flags = head_set(body, rules, full, &mut head);

        if body.is_head_fail(rules)
            || (flags.is_empty() && !head.intersects(follow))
        {
            // Each iteration starts with a test of the next character, the
            // loop ends when the test fails.
            let test = self.emit_test(&head, false);
            self.emit(body, rules, opt, test, full);
            let jmp = self.push(Instr::Jmp(0));
            self.jump_to_here(test);
            if let Some(test) = test {
                self.jump_to(Some(jmp), test);
            }
            return;
        }

        let test = self.emit_test(&head, !flags.is_empty());

        let choice = if opt {
            let commit = self.push(Instr::PartialCommit(0));
            self.jump_to_here(Some(commit));
            None
        } else {
            Some(self.push(Instr::Choice(0)))
        };

        let start = self.here();
        self.emit(body, rules, false, None, full);
        self.push(Instr::PartialCommit(start));

        self.jump_to_here(choice);
        self.jump_to_here(test);
    }

    fn emit_behind(&mut self, n: usize, body: &Node, rules: &[RuleDef]) {
        if n > 0 {
            self.push(Instr::Behind(n));
        }
        self.emit(body, rules, false, None, CharSet::full_ref());
    }

    fn emit_not(&mut self, body: &Node, rules: &[RuleDef]) {
        let full = CharSet::full_ref();
        let mut head = CharSet::new();
        let flags = head_set(body, rules, full, &mut head);
        let test = self.emit_test(&head, !flags.is_empty());

        if body.is_head_fail(rules) {
            self.push(Instr::Fail);
        } else {
            let choice = self.push(Instr::Choice(0));
            self.emit(body, rules, false, None, full);
            self.push(Instr::FailTwice);
            self.jump_to_here(Some(choice));
        }

        self.jump_to_here(test);
    }

    fn emit_and(&mut self, body: &Node, rules: &[RuleDef], tt: Option<Addr>) {
        let full = CharSet::full_ref();

        match body.fixed_length(rules) {
            // A fixed length body without actions is matched and then the
            // position is moved back.
            Some(len) if !body.has_actions(rules) => {
                self.emit(body, rules, false, tt, full);
                if len > 0 {
                    self.push(Instr::Behind(len));
                }
            }
            _ => {
                let choice = self.push(Instr::Choice(0));
                self.emit(body, rules, false, tt, full);
                let commit = self.push(Instr::BackCommit(0));
                self.jump_to_here(Some(choice));
                self.push(Instr::Fail);
                self.jump_to_here(Some(commit));
            }
        }
    }

    fn emit_action(
        &mut self,
        action: &Arc<dyn Action>,
        body: &Node,
        rules: &[RuleDef],
        tt: Option<Addr>,
    ) {
        self.push(Instr::OpenAction(action.clone()));
        self.emit(body, rules, false, tt, CharSet::full_ref());
        self.push(Instr::CloseAction);
    }

    fn emit_grammar(&mut self, grammar: &Grammar) {
        let first_call = self.push(Instr::Call(0));
        let jmp_to_end = self.push(Instr::Jmp(0));

        let start = self.here();
        self.jump_to_here(Some(first_call));

        let mut addrs = Vec::with_capacity(grammar.rules.len());

        for rule in &grammar.rules {
            addrs.push(self.here());
            self.emit(
                &rule.body,
                &grammar.rules,
                false,
                None,
                CharSet::full_ref(),
            );
            self.push(Instr::Ret);
        }

        self.jump_to_here(Some(jmp_to_end));

        if !self.too_large {
            self.resolve_calls(&addrs, start, self.here());
        }
    }

    /// Replaces the `OPEN_CALL` instructions in the `from..to` range with
    /// calls to the addresses in `addrs`. A call followed by a return is
    /// replaced with a jump.
    fn resolve_calls(&mut self, addrs: &[Addr], from: Addr, to: Addr) {
        for addr in from..to {
            if let Instr::OpenCall(rule) = self.code[addr] {
                let target = addrs[rule];
                debug_assert!(
                    target == from
                        || matches!(self.code[target - 1], Instr::Ret)
                );
                let next = self.final_target(addr + 1);
                self.code[addr] =
                    if matches!(self.code[next], Instr::Ret) {
                        Instr::Jmp(target)
                    } else {
                        Instr::Call(target)
                    };
            }
        }
    }

    /// Emits the first node in a sequence, and returns the test target for
    /// the second one.
    fn emit_seq(
        &mut self,
        first: &Node,
        second: &Node,
        rules: &[RuleDef],
        tt: Option<Addr>,
        follow: &CharSet,
    ) -> Option<Addr> {
        if needs_follow(first) {
            let mut head = CharSet::new();
            head_set(second, rules, follow, &mut head);
            self.emit(first, rules, false, tt, &head);
        } else {
            self.emit(first, rules, false, tt, CharSet::full_ref());
        }

        // The test still applies to the second node only if the first one
        // didn't consume anything.
        if first.fixed_length(rules) == Some(0) {
            tt
        } else {
            None
        }
    }

    /// Follows a chain of jumps starting at `addr`, returning the address of
    /// the first instruction that is not a jump.
    fn final_target(&self, mut addr: Addr) -> Addr {
        while let Instr::Jmp(target) = self.code[addr] {
            addr = target;
        }
        addr
    }

    /// Returns the final target of the instruction at `addr`.
    fn final_label(&self, addr: Addr) -> Addr {
        match self.code[addr].target() {
            Some(target) => self.final_target(target),
            None => addr,
        }
    }

    fn peephole(&mut self) {
        for addr in 0..self.code.len() {
            let replacement = match &self.code[addr] {
                Instr::TestSet(class, _) => {
                    Instr::TestSet(class.ready(), self.final_label(addr))
                }
                Instr::Jmp(_) => {
                    let target = self.final_target(addr);
                    match &self.code[target] {
                        Instr::Ret
                        | Instr::Fail
                        | Instr::FailTwice
                        | Instr::End => self.code[target].clone(),
                        Instr::Commit(_)
                        | Instr::PartialCommit(_)
                        | Instr::BackCommit(_) => {
                            let mut commit = self.code[target].clone();
                            commit.set_target(self.final_label(target));
                            commit
                        }
                        _ => Instr::Jmp(target),
                    }
                }
                instr @ (Instr::Choice(_)
                | Instr::Call(_)
                | Instr::Commit(_)
                | Instr::PartialCommit(_)
                | Instr::BackCommit(_)
                | Instr::TestChar(..)
                | Instr::TestAny(_)) => {
                    let mut instr = instr.clone();
                    instr.set_target(self.final_label(addr));
                    instr
                }
                _ => continue,
            };
            self.code[addr] = replacement;
        }
    }
}

#[cfg(test)]
impl Compiler {
    /// Returns the program for `pattern` as text.
    pub(crate) fn dump(&self, pattern: &Pattern) -> String {
        match self.compile_program(pattern) {
            Ok(program) => program.to_string(),
            Err(err) => err.to_string(),
        }
    }
}
