/*! Actions and capture adapters.

An [`Action`] is attached to a pattern with [`Pattern::action`]. The matcher
invokes [`Action::on_match`] every time the pattern matches, even if the
match is later abandoned by backtracking, and [`Action::on_commit`] once the
whole match succeeds, only for the actions that are part of the final
match.

The capturers in this module are built on top of `on_commit`, so they only
record what the successful match contains.

```
use pegvm::{Capturer, Pattern};

let word = Pattern::range(&["az"]).unwrap().repeat(1).unwrap();
let space = Pattern::ch(' ');

let capturer = Capturer::new();
let words = capturer
    .capture(&word)
    .then(&space.then(&capturer.capture(&word)).repeat(0).unwrap());

assert!(words.compile().unwrap().try_match("foo bar baz").matched());

let captures: Vec<String> =
    capturer.captures().into_iter().map(|c| c.value).collect();

assert_eq!(captures, ["foo", "bar", "baz"]);
```
 */

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use crate::Pattern;

/// A callback invoked when a pattern matches.
///
/// `subject` is the whole subject as a slice of characters, `start` and
/// `end` are the offsets where the match of the pattern starts and ends.
pub trait Action: Send + Sync {
    /// Invoked when the pattern matches, before the rest of the match is
    /// known.
    ///
    /// Returning `None` makes the pattern fail as if it didn't match.
    /// Otherwise the result is the position where matching continues, which
    /// must be in the range `end..=subject.len()`. Returning a position out
    /// of that range panics.
    fn on_match(
        &self,
        subject: &[char],
        start: usize,
        end: usize,
    ) -> Option<usize> {
        let _ = (subject, start);
        Some(end)
    }

    /// Invoked after the whole match succeeded, for every action that
    /// is part of it. Actions are committed in the order in which they
    /// started matching. `end` is the position returned by
    /// [`Action::on_match`].
    fn on_commit(&self, subject: &[char], start: usize, end: usize) {
        let _ = (subject, start, end);
    }
}

impl<F> Action for F
where
    F: Fn(&[char], usize, usize) -> Option<usize> + Send + Sync,
{
    fn on_match(
        &self,
        subject: &[char],
        start: usize,
        end: usize,
    ) -> Option<usize> {
        self(subject, start, end)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn substring(subject: &[char], start: usize, end: usize) -> String {
    subject[start..end].iter().collect()
}

/// A captured substring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capture {
    /// Offset of the substring in the subject, in characters.
    pub offset: usize,
    /// The captured substring.
    pub value: String,
}

/// Collects the substrings matched by patterns.
///
/// `Capturer` is a handle, clones share the same captures.
#[derive(Clone, Debug, Default)]
pub struct Capturer {
    captures: Arc<Mutex<Vec<Capture>>>,
}

#[derive(Debug)]
struct CaptureAction {
    captures: Arc<Mutex<Vec<Capture>>>,
}

impl Action for CaptureAction {
    fn on_commit(&self, subject: &[char], start: usize, end: usize) {
        lock(&self.captures).push(Capture {
            offset: start,
            value: substring(subject, start, end),
        });
    }
}

impl Capturer {
    /// Creates a new capturer with no captures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a pattern that captures whatever `pattern` matches.
    pub fn capture(&self, pattern: &Pattern) -> Pattern {
        pattern.action(Arc::new(CaptureAction {
            captures: self.captures.clone(),
        }))
    }

    /// The captures sorted by offset. Captures with the same offset are
    /// sorted by the order in which they were committed.
    pub fn captures(&self) -> Vec<Capture> {
        let mut captures = lock(&self.captures).clone();
        captures.sort_by_key(|capture| capture.offset);
        captures
    }

    /// The capture committed last, if any.
    pub fn peek(&self) -> Option<Capture> {
        lock(&self.captures).last().cloned()
    }

    /// Removes and returns the capture committed last.
    pub fn pop(&self) -> Option<Capture> {
        lock(&self.captures).pop()
    }

    /// Number of captures.
    pub fn len(&self) -> usize {
        lock(&self.captures).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.captures).is_empty()
    }

    /// Removes all the captures.
    pub fn clear(&self) {
        lock(&self.captures).clear();
    }
}

/// Collects the substrings matched by patterns, identifying each of them
/// by name.
#[derive(Clone, Debug, Default)]
pub struct NamedCapturer {
    captures: Arc<Mutex<FxHashMap<String, String>>>,
}

#[derive(Debug)]
struct NamedCaptureAction {
    name: String,
    captures: Arc<Mutex<FxHashMap<String, String>>>,
}

impl Action for NamedCaptureAction {
    fn on_commit(&self, subject: &[char], start: usize, end: usize) {
        lock(&self.captures)
            .insert(self.name.clone(), substring(subject, start, end));
    }
}

impl NamedCapturer {
    /// Creates a new capturer with no captures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a pattern that captures whatever `pattern` matches with the
    /// given name. If the pattern matches more than once, the last match
    /// wins.
    pub fn capture(&self, name: &str, pattern: &Pattern) -> Pattern {
        pattern.action(Arc::new(NamedCaptureAction {
            name: name.to_string(),
            captures: self.captures.clone(),
        }))
    }

    /// The substring captured with the given name.
    pub fn get(&self, name: &str) -> Option<String> {
        lock(&self.captures).get(name).cloned()
    }

    /// Removes all the captures.
    pub fn clear(&self) {
        lock(&self.captures).clear();
    }
}

/// Collects positions in the subject.
#[derive(Clone, Debug, Default)]
pub struct PositionCapturer {
    positions: Arc<Mutex<Vec<usize>>>,
}

#[derive(Debug)]
struct PositionAction {
    positions: Arc<Mutex<Vec<usize>>>,
}

impl Action for PositionAction {
    fn on_commit(&self, _subject: &[char], start: usize, _end: usize) {
        lock(&self.positions).push(start);
    }
}

impl PositionCapturer {
    /// Creates a new capturer with no positions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a pattern that matches the empty string and captures the
    /// position where it matched.
    pub fn capture(&self) -> Pattern {
        Pattern::succeed().action(Arc::new(PositionAction {
            positions: self.positions.clone(),
        }))
    }

    /// The captured positions, sorted.
    pub fn positions(&self) -> Vec<usize> {
        let mut positions = lock(&self.positions).clone();
        positions.sort_unstable();
        positions
    }

    pub fn len(&self) -> usize {
        lock(&self.positions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.positions).is_empty()
    }

    /// Removes all the positions.
    pub fn clear(&self) {
        lock(&self.positions).clear();
    }
}
