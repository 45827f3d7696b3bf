/*! End-to-end tests. */
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::{
    Capturer, Compiler, Error, Pattern, PositionCapturer, Rule,
};

macro_rules! test_match {
    ($pattern:expr, $subject:expr, $expected_result:expr) => {{
        let result = $pattern.compile().unwrap().try_match($subject);

        assert_eq!(
            result.matched(),
            $expected_result,
            "\n\n`{}` should be {}, but it is {}",
            $subject,
            if $expected_result { "matched" } else { "not matched" },
            if $expected_result { "not matched" } else { "matched" },
        );

        result
    }};
}

macro_rules! assert_success {
    ($pattern:expr, $subject:expr) => {{
        test_match!($pattern, $subject, true)
    }};
}

macro_rules! assert_fail {
    ($pattern:expr, $subject:expr) => {{
        test_match!($pattern, $subject, false);
    }};
}

macro_rules! assert_match {
    ($end:expr, $pattern:expr, $subject:expr) => {{
        let result = test_match!($pattern, $subject, true);
        assert_eq!(result.end(), $end);
    }};
}

/// Matches at the end of the subject only.
fn eos() -> Pattern {
    Pattern::n(-1)
}

fn digit() -> Pattern {
    Pattern::set("0123456789")
}

fn letter() -> Pattern {
    Pattern::choice_all(&[
        Pattern::set(""),
        Pattern::range(&["AZ"]).unwrap(),
        Pattern::range(&["az"]).unwrap(),
    ])
}

/// Balanced parenthesis: "(" (not_paren / &"(" parens)* ")"
fn parens() -> Pattern {
    let not_paren = Pattern::n(1).diff(&Pattern::set("()"));
    let nested = Pattern::ch('(')
        .test()
        .then(&Pattern::rule_ref("parens").unwrap());

    Pattern::grammar([Rule::new(
        "parens",
        Pattern::seq_all(&[
            Pattern::str("("),
            not_paren.or(&nested).repeat(0).unwrap(),
            Pattern::str(")"),
        ]),
    )])
    .unwrap()
}

/// Finds the first position where `pattern` matches, skipping any
/// characters before it.
fn look_for(pattern: &Pattern) -> Pattern {
    Pattern::grammar([Rule::new(
        "look_for",
        pattern.or(
            &Pattern::n(1).then(&Pattern::rule_ref("look_for").unwrap()),
        ),
    )])
    .unwrap()
}

#[test]
fn basic_optimizations() {
    let a = Pattern::ch('a');

    assert_match!(1, Pattern::fail().or(&a), "a");
    assert_match!(0, Pattern::succeed().or(&a), "a");
    assert_fail!(a.or(&Pattern::fail()), "b");
    assert_match!(0, a.or(&Pattern::succeed()), "b");

    assert_fail!(Pattern::fail().then(&a), "a");
    assert_match!(1, Pattern::succeed().then(&a), "a");
    assert_fail!(a.then(&Pattern::fail()), "a");
    assert_match!(1, a.then(&Pattern::succeed()), "a");

    assert_fail!(Pattern::fail().test().then(&a), "a");
    assert_match!(1, Pattern::succeed().test().then(&a), "a");
    assert_fail!(a.then(&Pattern::fail().test()), "a");
    assert_match!(1, a.then(&Pattern::succeed().test()), "a");
}

#[test]
fn any() {
    assert_success!(Pattern::n(3), "aaaa");
    assert_success!(Pattern::n(4), "aaaa");
    assert_fail!(Pattern::n(5), "aaaa");
    assert_success!(Pattern::n(-3), "aa");
    assert_fail!(Pattern::n(-3), "aaa");
    assert_fail!(Pattern::n(-3), "aaaa");
    assert_fail!(Pattern::n(-4), "aaaa");
    assert_success!(Pattern::n(-5), "aaaa");

    assert_match!(3, Pattern::n(3), "aaaa");
    assert_match!(0, Pattern::n(-5), "aaaa");
    assert_match!(0, Pattern::n(0), "");
}

#[test]
fn strings_and_sets() {
    assert_match!(1, Pattern::str("a"), "alo");
    assert_match!(2, Pattern::str("al"), "alo");
    assert_fail!(Pattern::str("alu"), "alo");
    assert_match!(0, Pattern::succeed(), "");
    assert_match!(3, Pattern::str("ñé€"), "ñé€ñ");

    assert_success!(digit(), "7");
    assert_fail!(digit(), "x");
    assert_fail!(Pattern::set(""), "x");

    assert_success!(Pattern::range(&["AZ"]).unwrap(), "C");
    assert_fail!(Pattern::range(&["AZ"]).unwrap(), "c");

    let p = Pattern::range(&["az", "AZ"]).unwrap();

    assert_success!(p, "c");
    assert_success!(p, "C");
    assert_fail!(p, "0");

    let p = Pattern::set("01234567")
        .or(&Pattern::str("8").or(&Pattern::str("9")));

    assert_success!(p, "8");
    assert_success!(p, "5");
    assert_fail!(p, "a");

    let p = Pattern::seq_all(&[
        digit().repeat(0).unwrap(),
        letter(),
        digit(),
        eos(),
    ]);

    assert_success!(p, "1298a1");

    let p =
        Pattern::seq_all(&[digit().repeat(0).unwrap(), letter(), eos()]);

    assert_fail!(p, "1257a1");
}

#[test]
fn repetitions() {
    let alpha = Pattern::choice_all(&[
        letter(),
        digit(),
        Pattern::range(&[]).unwrap(),
    ]);

    let word = alpha
        .repeat(1)
        .unwrap()
        .then(&Pattern::n(1).diff(&alpha).repeat(0).unwrap());

    let words = |n| word.repeat(n).unwrap().then(&eos());

    assert_success!(words(0), "alo alo");
    assert_success!(words(1), "alo alo");
    assert_success!(words(2), "alo alo");
    assert_fail!(words(3), "alo alo");

    assert_fail!(words(-1), "alo alo");
    assert_success!(words(-2), "alo alo");
    assert_success!(words(-3), "alo alo");

    assert_match!(3, Pattern::ch('a').repeat(-3).unwrap(), "aaaaa");
    assert_match!(2, Pattern::ch('a').repeat(-3).unwrap(), "aab");
    assert_match!(0, Pattern::ch('a').repeat(-3).unwrap(), "b");
}

#[test]
fn grammars() {
    assert_match!(6, parens(), "(al())()");
    assert_fail!(parens().then(&eos()), "(al())()");
    assert_success!(parens().then(&eos()), "((al())()(é))");
    assert_fail!(parens(), "(al()()");

    // A grammar used as a rule of another grammar.
    let p = Pattern::grammar([
        Rule::new(
            "s",
            parens().then(&Pattern::rule_ref("bang").unwrap()),
        ),
        Rule::new("bang", Pattern::ch('!')),
    ])
    .unwrap();

    assert_match!(4, p, "(a)!");
    assert_fail!(p, "(a)?");

    // Mutually recursive rules.
    let p = Pattern::grammar([
        Rule::new(
            "even",
            Pattern::ch('a')
                .then(&Pattern::rule_ref("odd").unwrap())
                .or(&Pattern::succeed()),
        ),
        Rule::new(
            "odd",
            Pattern::ch('a').then(&Pattern::rule_ref("even").unwrap()),
        ),
    ])
    .unwrap()
    .then(&eos());

    assert_success!(p, "aaaa");
    assert_fail!(p, "aaa");
}

#[test]
fn differences() {
    let letters = letter().repeat(1).unwrap();

    assert_fail!(letters.diff(&Pattern::str("for")), "foreach");
    assert_success!(
        letters.diff(&Pattern::str("for").then(&eos())),
        "foreach"
    );
    assert_fail!(letters.diff(&Pattern::str("for").then(&eos())), "for");
}

#[test]
fn lookbehind() {
    let p = Pattern::n(1).then(&Pattern::ch('a').behind().unwrap());

    assert_match!(1, p, "ab");
    assert_fail!(p, "bb");

    let p = Pattern::str("ab").then(&Pattern::str("ab").behind().unwrap());
    assert_match!(2, p, "abc");

    // Lookbehind doesn't look at characters before the starting offset.
    let m = Pattern::ch('a').behind().unwrap().compile().unwrap();

    assert!(!m.try_match_at("ab", 1).unwrap().matched());
    assert!(!m.try_match_at("ab", 2).unwrap().matched());

    let m = Pattern::n(1)
        .then(&Pattern::ch('b').behind().unwrap())
        .compile()
        .unwrap();

    assert_eq!(m.try_match_at("ab", 1).unwrap().range(), 1..2);
}

#[test]
fn offsets() {
    let m = Pattern::str("lo").compile().unwrap();

    assert_eq!(m.try_match_at("alo", 1).unwrap().range(), 1..3);
    assert_eq!(m.try_match_at("ñlo", 1).unwrap().range(), 1..3);
    assert_eq!(m.try_match_at("alo", 3).unwrap().range(), 3..3);
    assert_eq!(
        m.try_match_at("alo", 4).err(),
        Some(Error::InvalidOffset { offset: 4, len: 3 })
    );
}

#[test]
fn captures() {
    let capturer = Capturer::new();
    let letters = letter().repeat(1).unwrap();

    assert_success!(look_for(&capturer.capture(&letters)), "   4achou123...");
    assert_eq!(capturer.len(), 1);
    assert_eq!(capturer.captures()[0].value, "achou");
    assert_eq!(capturer.captures()[0].offset, 4);

    capturer.clear();

    assert_success!(
        look_for(&capturer.capture(&letters)).repeat(0).unwrap(),
        " two words, one more  "
    );

    assert_eq!(
        capturer
            .captures()
            .into_iter()
            .map(|capture| capture.value)
            .collect::<Vec<_>>(),
        ["two", "words", "one", "more"]
    );

    capturer.clear();

    let positions = PositionCapturer::new();

    assert_success!(
        look_for(&Pattern::seq_all(&[
            parens().test(),
            Pattern::n(1),
            positions.capture()
        ])),
        "  (  (a)"
    );

    assert_eq!(positions.positions(), vec![6]);

    positions.clear();

    assert_success!(
        Pattern::seq_all(&[
            positions.capture(),
            letter().repeat(1).unwrap(),
            positions.capture()
        ]),
        "abcd"
    );

    assert_eq!(positions.positions(), vec![0, 4]);
}

#[test]
fn recursive_captures() {
    let capturer = Capturer::new();

    let p = Pattern::grammar([Rule::new(
        "r",
        capturer.capture(
            &capturer
                .capture(&Pattern::n(1))
                .then(&Pattern::rule_ref("r").unwrap())
                .or(&eos()),
        ),
    )])
    .unwrap();

    assert_success!(p, "abc");
    assert_eq!(capturer.len(), 7);

    assert_eq!(
        capturer
            .captures()
            .into_iter()
            .map(|capture| capture.value)
            .collect::<Vec<_>>(),
        ["abc", "a", "bc", "b", "c", "c", ""]
    );
}

#[test]
fn actions() {
    // Actions that return `None` make the pattern fail.
    let not_x = Pattern::n(1)
        .action_fn(|subject, _, end| (subject[end - 1] != 'x').then_some(end));

    assert_match!(2, not_x.repeat(0).unwrap(), "abxc");

    // Actions can consume more input.
    let rest = Pattern::ch('a').action_fn(|subject, _, _| Some(subject.len()));

    assert_match!(4, rest.then(&eos()), "abcd");

    // Actions in abandoned alternatives are invoked but never committed.
    let matched = Arc::new(AtomicUsize::new(0));
    let capturer = Capturer::new();

    let counter = {
        let matched = matched.clone();
        move |_: &[char], _: usize, end: usize| {
            matched.fetch_add(1, Ordering::Relaxed);
            Some(end)
        }
    };

    let p = Pattern::ch('a')
        .action_fn(counter)
        .then(&Pattern::ch('b'))
        .or(&capturer.capture(&Pattern::str("ac")));

    assert_match!(2, p, "ac");
    assert_eq!(matched.load(Ordering::Relaxed), 1);
    assert_eq!(capturer.captures()[0].value, "ac");
    assert_eq!(capturer.len(), 1);
}

#[test]
fn lookahead_actions_are_rolled_back() {
    let capturer = Capturer::new();

    let p = capturer
        .capture(&Pattern::str("ab"))
        .test()
        .then(&Pattern::str("abc"));

    assert_match!(3, p, "abc");
    assert!(capturer.is_empty());

    let p = capturer
        .capture(&Pattern::str("ab"))
        .test_not()
        .then(&Pattern::n(1));

    assert_match!(1, p, "ac");
    assert_fail!(p, "ab");
    assert!(capturer.is_empty());
}

#[test]
fn failed_matches_commit_nothing() {
    let capturer = Capturer::new();

    let p = capturer.capture(&Pattern::str("ab")).then(&Pattern::ch('c'));

    assert_fail!(p, "abd");
    assert!(capturer.is_empty());

    assert_success!(p, "abc");
    assert_eq!(capturer.len(), 1);
}

#[test]
fn left_recursion() {
    let p = Pattern::grammar([Rule::new(
        "r",
        Pattern::rule_ref("r").unwrap().then(&Pattern::ch('a')),
    )]);

    assert_eq!(
        p.err(),
        Some(Error::LeftRecursiveRule { name: "r".to_string() })
    );
}

#[test]
fn times() {
    for use_grammar in [false, true] {
        let p = Pattern::ch('a').times(3, use_grammar).unwrap();

        assert_match!(3, p, "aaaa");
        assert_fail!(p, "aa");
    }

    // Exact repetitions of patterns that are grammars themselves.
    let p = parens().times(2, true).unwrap();

    assert_match!(6, p, "(a)(b)(c)");
    assert_fail!(p, "(a)b");

    let p = parens().times(2, true).unwrap().times(2, true).unwrap();

    assert_match!(8, p, "()()()()");
    assert_fail!(p, "()()()");
}

#[test]
fn idempotence() {
    let patterns = [
        parens(),
        look_for(&Pattern::str("ab")),
        letter().repeat(1).unwrap().diff(&Pattern::str("for")),
        Pattern::str("ab").or(&Pattern::str("ac")).repeat(0).unwrap(),
    ];

    let subjects = ["", "(a)", "xxab", "foreach", "abacab", "((()))x"];

    for pattern in &patterns {
        let m1 = pattern.compile().unwrap();
        let m2 = pattern.compile().unwrap();

        assert_eq!(m1.program().to_string(), m2.program().to_string());

        for subject in subjects {
            assert_eq!(m1.try_match(subject), m2.try_match(subject));
        }
    }
}

#[test]
fn peephole_preserves_semantics() {
    let patterns = [
        parens(),
        look_for(&letter().repeat(1).unwrap()),
        Pattern::str("ab").or(&Pattern::ch('c')).repeat(0).unwrap(),
        Pattern::set("ac").then(&Pattern::ch('x')).or(&Pattern::ch('b')),
        Pattern::ch('a').times(3, true).unwrap(),
    ];

    let subjects = ["", "(a)", "  word", "ababcx", "axb", "b", "aaa"];

    for pattern in &patterns {
        let optimized = Compiler::new().peephole(true).compile(pattern);
        let plain = Compiler::new().peephole(false).compile(pattern);

        let (optimized, plain) = (optimized.unwrap(), plain.unwrap());

        for subject in subjects {
            assert_eq!(
                optimized.try_match(subject),
                plain.try_match(subject),
                "subject: {:?}",
                subject
            );
        }
    }
}

#[test]
fn undefined_references() {
    assert_eq!(
        Pattern::rule_ref("x").unwrap().compile().err().map(|e| e.to_string()),
        Some("rule `x` is undefined".to_string())
    );

    // References are resolved only against the grammar that contains them.
    let inner = Pattern::grammar([Rule::new(
        "inner",
        Pattern::rule_ref("outer").unwrap(),
    )]);

    assert_eq!(
        inner.err(),
        Some(Error::UndefinedRule { name: "outer".to_string() })
    );
}
