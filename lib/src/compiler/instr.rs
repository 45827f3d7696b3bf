/*!
Instructions executed by the matching virtual machine.

A compiled pattern is a flat table of instructions. Instructions that
transfer control carry the address of their target, which is the index of
the target instruction in the table. For instance, the pattern
`"ab" / "c"` (match `ab`, or `c` if `ab` fails) compiles to:

```text
00000: TEST_CHAR 'a' 00004
00001: ANY
00002: CHAR 'b'
00003: END
00004: CHAR 'c'
00005: END
00006: GIVE_UP
```

The first instruction checks whether the next character is `a` without
consuming it, and jumps to the second alternative if it isn't. The `CHAR 'a'`
that follows the test is reduced to an `ANY` because the test already proved
that the next character is an `a`. The jump that skipped the second
alternative was replaced with its target, an `END`.
 */

use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use crate::captures::Action;
use crate::charset::CharSet;
use crate::class::ClassMatcher;

/// Address of an instruction, its index in the instruction table.
pub type Addr = usize;

/// Instructions supported by the virtual machine.
#[derive(Clone)]
pub enum Instr {
    /// Consumes any character, fails at the end of the subject.
    Any,

    /// Consumes the given character, fails otherwise.
    Char(char),

    /// Consumes a character that belongs to a class, fails otherwise.
    Set(ClassMatcher),

    /// Continues with the next instruction if a character follows, jumps to
    /// the target otherwise. Never consumes input.
    TestAny(Addr),

    /// Continues with the next instruction if the next character is the
    /// given one, jumps to the target otherwise. Never consumes input.
    TestChar(char, Addr),

    /// Continues with the next instruction if the next character belongs to
    /// a class, jumps to the target otherwise. Never consumes input.
    TestSet(TestClass, Addr),

    /// Consumes every character that belongs to a class, as many as
    /// possible. Never fails.
    Span(ClassMatcher),

    /// Moves the current position back by the given number of characters,
    /// fails if there are not that many characters before the position
    /// where matching started.
    Behind(usize),

    /// Returns from a rule, continuing at the address saved by the matching
    /// `CALL`.
    Ret,

    /// Matching succeeded.
    End,

    /// Pushes a backtrack entry that resumes at the target, with the current
    /// position.
    Choice(Addr),

    /// Unconditional jump.
    Jmp(Addr),

    /// Calls the rule that starts at the target.
    Call(Addr),

    /// Call to the rule with the given index in the grammar being compiled.
    /// Only exists while the grammar is being compiled, it is replaced with
    /// a `CALL` or a `JMP` once the addresses of all the rules are known.
    OpenCall(usize),

    /// Discards the topmost backtrack entry and jumps to the target.
    Commit(Addr),

    /// Updates the topmost backtrack entry with the current position and
    /// jumps to the target.
    PartialCommit(Addr),

    /// Discards the topmost backtrack entry restoring the position saved in
    /// it, and jumps to the target.
    BackCommit(Addr),

    /// Discards the topmost backtrack entry and fails.
    FailTwice,

    /// Fails.
    Fail,

    /// Matching failed. This is the instruction where the initial backtrack
    /// entry resumes.
    GiveUp,

    /// Starts an action.
    OpenAction(Arc<dyn Action>),

    /// Ends the action that was started last, invoking it.
    CloseAction,
}

/// The class tested by [`Instr::TestSet`].
///
/// The compiler creates tests with the plain character set because it
/// needs to compare the class with the one in instructions that follow the
/// test. Sets are converted into matchers when the compilation finishes.
#[derive(Clone)]
pub enum TestClass {
    Pending(CharSet),
    Ready(ClassMatcher),
}

impl TestClass {
    #[inline]
    pub fn matches(&self, c: char) -> bool {
        match self {
            TestClass::Pending(set) => set.contains(c as u32),
            TestClass::Ready(matcher) => matcher.matches(c),
        }
    }

    /// Converts a pending class into a matcher.
    pub fn ready(&self) -> TestClass {
        match self {
            TestClass::Pending(set) => {
                TestClass::Ready(ClassMatcher::new(set))
            }
            TestClass::Ready(matcher) => TestClass::Ready(matcher.clone()),
        }
    }
}

impl Display for TestClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TestClass::Pending(set) => write!(f, "{}", ClassMatcher::new(set)),
            TestClass::Ready(matcher) => write!(f, "{}", matcher),
        }
    }
}

impl Instr {
    /// Returns the target of an instruction that transfers control.
    pub fn target(&self) -> Option<Addr> {
        match self {
            Instr::TestAny(target)
            | Instr::TestChar(_, target)
            | Instr::TestSet(_, target)
            | Instr::Choice(target)
            | Instr::Jmp(target)
            | Instr::Call(target)
            | Instr::Commit(target)
            | Instr::PartialCommit(target)
            | Instr::BackCommit(target) => Some(*target),
            _ => None,
        }
    }

    /// Changes the target of an instruction that transfers control. Does
    /// nothing with other instructions.
    pub fn set_target(&mut self, addr: Addr) {
        match self {
            Instr::TestAny(target)
            | Instr::TestChar(_, target)
            | Instr::TestSet(_, target)
            | Instr::Choice(target)
            | Instr::Jmp(target)
            | Instr::Call(target)
            | Instr::Commit(target)
            | Instr::PartialCommit(target)
            | Instr::BackCommit(target) => *target = addr,
            _ => {}
        }
    }
}

/// A compiled pattern.
#[derive(Clone)]
pub struct Program {
    code: Vec<Instr>,
}

impl Program {
    pub(crate) fn new(code: Vec<Instr>) -> Self {
        Self { code }
    }

    /// Address of the [`Instr::GiveUp`] instruction, the last one in the
    /// program.
    #[inline]
    pub(crate) fn give_up(&self) -> Addr {
        self.code.len() - 1
    }

    /// Number of instructions.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The instructions in the program.
    #[inline]
    pub fn instructions(&self) -> &[Instr] {
        self.code.as_slice()
    }
}

impl AsRef<[Instr]> for Program {
    fn as_ref(&self) -> &[Instr] {
        self.code.as_slice()
    }
}

fn write_char(f: &mut Formatter<'_>, c: char) -> std::fmt::Result {
    if c.is_whitespace() || c.is_control() {
        write!(f, "({:x})", c as u32)
    } else {
        write!(f, "'{}'", c)
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;

        for (addr, instr) in self.code.iter().enumerate() {
            write!(f, "{:05x}: ", addr)?;
            match instr {
                Instr::Any => write!(f, "ANY")?,
                Instr::Char(c) => {
                    write!(f, "CHAR ")?;
                    write_char(f, *c)?;
                }
                Instr::Set(matcher) => write!(f, "SET {}", matcher)?,
                Instr::TestAny(target) => {
                    write!(f, "TEST_ANY {:05x}", target)?
                }
                Instr::TestChar(c, target) => {
                    write!(f, "TEST_CHAR ")?;
                    write_char(f, *c)?;
                    write!(f, " {:05x}", target)?;
                }
                Instr::TestSet(class, target) => {
                    write!(f, "TEST_SET {} {:05x}", class, target)?
                }
                Instr::Span(matcher) => write!(f, "SPAN {}", matcher)?,
                Instr::Behind(n) => write!(f, "BEHIND {}", n)?,
                Instr::Ret => write!(f, "RET")?,
                Instr::End => write!(f, "END")?,
                Instr::Choice(target) => write!(f, "CHOICE {:05x}", target)?,
                Instr::Jmp(target) => write!(f, "JMP {:05x}", target)?,
                Instr::Call(target) => write!(f, "CALL {:05x}", target)?,
                Instr::OpenCall(rule) => write!(f, "OPEN_CALL {}", rule)?,
                Instr::Commit(target) => write!(f, "COMMIT {:05x}", target)?,
                Instr::PartialCommit(target) => {
                    write!(f, "PARTIAL_COMMIT {:05x}", target)?
                }
                Instr::BackCommit(target) => {
                    write!(f, "BACK_COMMIT {:05x}", target)?
                }
                Instr::FailTwice => write!(f, "FAIL_TWICE")?,
                Instr::Fail => write!(f, "FAIL")?,
                Instr::GiveUp => write!(f, "GIVE_UP")?,
                Instr::OpenAction(_) => write!(f, "OPEN_ACTION")?,
                Instr::CloseAction => write!(f, "CLOSE_ACTION")?,
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

impl Debug for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
