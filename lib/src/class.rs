/*! Compiles character sets into matchers.

A [`CharSet`] is convenient while building and analysing patterns, but it is
a poor choice for matching: a set containing every code point occupies more
than a hundred kilobytes. The matchers produced here describe the same set in
terms of single characters, contiguous ranges and small sorted tables, which
is both compact and fast for the sets that appear in practice.
*/

use std::fmt::{Display, Formatter};

use crate::charset::{CharSet, MAX_CODE_POINT};

/// A matcher for a set of code points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassMatcher {
    /// Matches nothing.
    Nothing,
    /// Matches any code point.
    Everything,
    /// Matches a single code point.
    Char(u32),
    /// Matches the code points in an inclusive range.
    Range(u32, u32),
    /// Matches the code points in a sorted table.
    Sparse(Box<[u32]>),
    /// Matches if any of the inner matchers matches.
    Union(Vec<ClassMatcher>),
}

impl ClassMatcher {
    /// Builds the matcher for `set`.
    ///
    /// Runs of two or more consecutive code points become ranges, isolated
    /// code points between two ranges are grouped in a single table.
    pub fn new(set: &CharSet) -> Self {
        if set.is_empty() {
            return Self::Nothing;
        }

        if set.is_full() {
            return Self::Everything;
        }

        let mut parts = Vec::new();
        let mut singles = Vec::new();

        for (lo, hi) in set.ranges() {
            if hi > lo {
                if !singles.is_empty() {
                    parts.push(Self::singles(std::mem::take(&mut singles)));
                }
                parts.push(Self::Range(lo, hi));
            } else {
                singles.push(lo);
            }
        }

        if !singles.is_empty() {
            parts.push(Self::singles(singles));
        }

        if parts.len() == 1 {
            parts.pop().unwrap_or(Self::Nothing)
        } else {
            Self::Union(parts)
        }
    }

    fn singles(mut singles: Vec<u32>) -> Self {
        if singles.len() == 1 {
            Self::Char(singles[0])
        } else {
            singles.sort_unstable();
            Self::Sparse(singles.into_boxed_slice())
        }
    }

    /// Returns true if `c` belongs to the set described by this matcher.
    #[inline]
    pub fn matches(&self, c: char) -> bool {
        self.contains(c as u32)
    }

    fn contains(&self, c: u32) -> bool {
        match self {
            Self::Nothing => false,
            Self::Everything => true,
            Self::Char(x) => c == *x,
            Self::Range(lo, hi) => (*lo..=*hi).contains(&c),
            Self::Sparse(table) => {
                let (Some(lo), Some(hi)) = (table.first(), table.last())
                else {
                    return false;
                };
                c == *lo
                    || c == *hi
                    || (c > *lo && c < *hi && table.binary_search(&c).is_ok())
            }
            Self::Union(parts) => parts.iter().any(|part| part.contains(c)),
        }
    }
}

impl Display for ClassMatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nothing => write!(f, "()"),
            Self::Everything => write!(f, "(0-{:x})", MAX_CODE_POINT),
            Self::Char(c) => write!(f, "({:x})", c),
            Self::Range(lo, hi) => write!(f, "({:x}-{:x})", lo, hi),
            Self::Sparse(table) => {
                for c in table.iter() {
                    write!(f, "({:x})", c)?;
                }
                Ok(())
            }
            Self::Union(parts) => {
                for part in parts {
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::ClassMatcher;
    use crate::charset::CharSet;

    #[test]
    fn minimal_matchers() {
        assert_eq!(ClassMatcher::new(&CharSet::new()), ClassMatcher::Nothing);
        assert_eq!(
            ClassMatcher::new(&CharSet::full()),
            ClassMatcher::Everything
        );
        assert_eq!(
            ClassMatcher::new(&CharSet::from_chars("x")),
            ClassMatcher::Char('x' as u32)
        );

        let mut digits = CharSet::new();
        digits.insert_range('0' as u32, '9' as u32);
        assert_eq!(
            ClassMatcher::new(&digits),
            ClassMatcher::Range('0' as u32, '9' as u32)
        );

        assert_eq!(
            ClassMatcher::new(&CharSet::from_chars("aeiou")).to_string(),
            "(61)(65)(69)(6f)(75)"
        );
    }

    #[test]
    fn union() {
        let mut set = CharSet::from_chars("_$");
        set.insert_range('a' as u32, 'z' as u32);
        set.insert('~' as u32);

        let matcher = ClassMatcher::new(&set);

        assert_eq!(matcher.to_string(), "(24)(5f)(61-7a)(7e)");
        assert!(matches!(
            matcher,
            ClassMatcher::Union(ref parts) if parts.len() == 3
        ));

        for c in ['$', '_', 'a', 'm', 'z', '~'] {
            assert!(matcher.matches(c), "{:?} should match", c);
        }

        for c in ['A', '0', '`', '{', 'é'] {
            assert!(!matcher.matches(c), "{:?} should not match", c);
        }
    }
}
