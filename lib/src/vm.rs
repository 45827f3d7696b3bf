/*! The backtracking virtual machine that executes compiled patterns.

The machine keeps a stack of frames. A frame pushed by `CHOICE` records the
instruction where matching resumes if the current alternative fails, together
with the position and the length of the action log at the time the frame was
pushed. A frame pushed by `CALL` records only a return address. When
something fails, frames are popped until a `CHOICE` frame is found, and the
state saved in it is restored. The bottom of the stack is a frame that
resumes at `GIVE_UP`, reaching it means that every alternative failed.

Actions are recorded in a log while matching. Backtracking truncates the log
to the length saved in the frame, discarding the actions executed by the
failed alternative. Once the machine reaches `END`, the surviving actions
are committed in the order they were opened.
 */

use std::ops::Range;
use std::sync::Arc;

#[cfg(feature = "logging")]
use log::*;

use crate::captures::Action;
use crate::compiler::{Addr, Instr, Program};
use crate::errors::Error;

/// A compiled pattern, ready for matching.
///
/// The matcher is immutable, the same matcher can be used for matching any
/// number of subjects, from any number of threads.
#[derive(Clone, Debug)]
pub struct Matcher {
    program: Program,
}

/// The result of a match attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchResult {
    matched: bool,
    start: usize,
    end: usize,
}

impl MatchResult {
    /// True if the pattern matched.
    #[inline]
    pub fn matched(&self) -> bool {
        self.matched
    }

    /// Offset where matching started.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Offset where the match ended. For a failed match this is the same
    /// as [`MatchResult::start`].
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// The range of characters matched.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// An entry in the backtracking stack.
struct Frame {
    /// Where execution continues when the frame is popped.
    ip: Addr,
    /// Saved position, `None` for frames pushed by `CALL`.
    pos: Option<usize>,
    /// Length of the action log when the frame was pushed.
    log_len: usize,
}

/// An action that was executed while matching.
struct LogEntry {
    action: Arc<dyn Action>,
    start: usize,
    /// `None` while the action's pattern is still being matched.
    end: Option<usize>,
}

impl Matcher {
    pub(crate) fn new(program: Program) -> Self {
        Self { program }
    }

    /// The program executed by this matcher.
    ///
    /// The program implements [`std::fmt::Display`], which prints the
    /// instructions one per line.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Matches the pattern at the start of `subject`.
    ///
    /// The pattern is anchored, it must match at the start of the subject
    /// but it doesn't need to match all of it. Offsets in the result count
    /// characters, not bytes.
    pub fn try_match(&self, subject: &str) -> MatchResult {
        let subject: Vec<char> = subject.chars().collect();
        self.run(&subject, 0)
    }

    /// Matches the pattern at `offset`, which counts characters from the
    /// start of `subject`.
    ///
    /// Lookbehind assertions never look at the characters before `offset`.
    /// Fails with [`Error::InvalidOffset`] if `offset` is greater than the
    /// number of characters in the subject.
    pub fn try_match_at(
        &self,
        subject: &str,
        offset: usize,
    ) -> Result<MatchResult, Error> {
        let subject: Vec<char> = subject.chars().collect();

        if offset > subject.len() {
            return Err(Error::InvalidOffset { offset, len: subject.len() });
        }

        Ok(self.run(&subject, offset))
    }

    fn run(&self, subject: &[char], start: usize) -> MatchResult {
        let code = self.program.instructions();
        let len = subject.len();

        let mut stack = vec![Frame {
            ip: self.program.give_up(),
            pos: Some(start),
            log_len: 0,
        }];

        let mut log: Vec<LogEntry> = Vec::new();
        // Indexes in `log` of the actions that are still open, the last one
        // is closed by the next `CLOSE_ACTION`.
        let mut open: Vec<usize> = Vec::new();

        let mut ip = 0;
        let mut pos = start;
        let mut fail = false;

        loop {
            if fail {
                fail = false;
                // The root frame has a position, so a choice frame is always
                // found before the stack is exhausted.
                while let Some(frame) = stack.pop() {
                    if let Some(saved) = frame.pos {
                        ip = frame.ip;
                        pos = saved;
                        rollback(&mut log, &mut open, frame.log_len);
                        break;
                    }
                }
            }

            match &code[ip] {
                Instr::End => {
                    commit(subject, &log);
                    return self.finish(true, start, pos);
                }
                Instr::GiveUp => {
                    return self.finish(false, start, pos);
                }
                Instr::Ret => match stack.pop() {
                    Some(frame) => ip = frame.ip,
                    None => fail = true,
                },
                Instr::Any => {
                    if pos < len {
                        pos += 1;
                        ip += 1;
                    } else {
                        fail = true;
                    }
                }
                Instr::Char(c) => {
                    if pos < len && subject[pos] == *c {
                        pos += 1;
                        ip += 1;
                    } else {
                        fail = true;
                    }
                }
                Instr::Set(class) => {
                    if pos < len && class.matches(subject[pos]) {
                        pos += 1;
                        ip += 1;
                    } else {
                        fail = true;
                    }
                }
                Instr::TestAny(target) => {
                    ip = if pos < len { ip + 1 } else { *target };
                }
                Instr::TestChar(c, target) => {
                    ip = if pos < len && subject[pos] == *c {
                        ip + 1
                    } else {
                        *target
                    };
                }
                Instr::TestSet(class, target) => {
                    ip = if pos < len && class.matches(subject[pos]) {
                        ip + 1
                    } else {
                        *target
                    };
                }
                Instr::Span(class) => {
                    while pos < len && class.matches(subject[pos]) {
                        pos += 1;
                    }
                    ip += 1;
                }
                Instr::Behind(n) => {
                    if *n > pos - start {
                        fail = true;
                    } else {
                        pos -= n;
                        ip += 1;
                    }
                }
                Instr::Jmp(target) => ip = *target,
                Instr::Choice(target) => {
                    stack.push(Frame {
                        ip: *target,
                        pos: Some(pos),
                        log_len: log.len(),
                    });
                    ip += 1;
                }
                Instr::Call(target) => {
                    stack.push(Frame {
                        ip: ip + 1,
                        pos: None,
                        log_len: log.len(),
                    });
                    ip = *target;
                }
                Instr::Commit(target) => {
                    stack.pop();
                    ip = *target;
                }
                Instr::PartialCommit(target) => {
                    if let Some(frame) = stack.last_mut() {
                        frame.pos = Some(pos);
                        frame.log_len = log.len();
                    }
                    ip = *target;
                }
                Instr::BackCommit(target) => {
                    if let Some(frame) = stack.pop() {
                        pos = frame.pos.unwrap_or(pos);
                        rollback(&mut log, &mut open, frame.log_len);
                    }
                    ip = *target;
                }
                Instr::FailTwice => {
                    stack.pop();
                    fail = true;
                }
                Instr::Fail => fail = true,
                Instr::OpenAction(action) => {
                    open.push(log.len());
                    log.push(LogEntry {
                        action: action.clone(),
                        start: pos,
                        end: None,
                    });
                    ip += 1;
                }
                Instr::CloseAction => {
                    let Some(entry) = open.pop().and_then(|i| log.get_mut(i))
                    else {
                        unreachable!("CLOSE_ACTION without OPEN_ACTION")
                    };
                    match entry.action.on_match(subject, entry.start, pos) {
                        None => fail = true,
                        Some(p) if p < pos || p > len => {
                            panic!(
                                "action returned position {} outside {}..={}",
                                p, pos, len
                            )
                        }
                        Some(p) => {
                            entry.end = Some(p);
                            pos = p;
                            ip += 1;
                        }
                    }
                }
                Instr::OpenCall(_) => {
                    unreachable!("OPEN_CALL in a compiled program")
                }
            }
        }
    }

    fn finish(&self, matched: bool, start: usize, end: usize) -> MatchResult {
        #[cfg(feature = "logging")]
        trace!(
            "match attempt at offset {}: {}",
            start,
            if matched { "matched" } else { "no match" }
        );

        MatchResult { matched, start, end: if matched { end } else { start } }
    }
}

/// Discards the actions logged after the first `len` ones.
fn rollback(log: &mut Vec<LogEntry>, open: &mut Vec<usize>, len: usize) {
    log.truncate(len);
    while open.last().is_some_and(|i| *i >= len) {
        open.pop();
    }
}

/// Commits the actions that survived the match.
fn commit(subject: &[char], log: &[LogEntry]) {
    for entry in log {
        if let Some(end) = entry.end {
            entry.action.on_commit(subject, entry.start, end);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::Pattern;

    #[test]
    fn failed_match_ends_at_start() {
        let m = Pattern::str("abc").compile().unwrap();

        let r = m.try_match_at("xxabd", 2).unwrap();
        assert!(!r.matched());
        assert_eq!(r.range(), 2..2);

        let r = m.try_match_at("xxabc", 2).unwrap();
        assert!(r.matched());
        assert_eq!(r.range(), 2..5);
    }

    #[test]
    fn offsets_count_chars() {
        let m = Pattern::str("ñé").then(&Pattern::n(1)).compile().unwrap();
        let r = m.try_match("ñé€z");
        assert!(r.matched());
        assert_eq!(r.end(), 3);
    }

    #[test]
    #[should_panic]
    fn action_returning_invalid_position() {
        let m = Pattern::ch('a')
            .action_fn(|_, start, _| Some(start.saturating_sub(1)))
            .compile()
            .unwrap();
        m.try_match("a");
    }
}
