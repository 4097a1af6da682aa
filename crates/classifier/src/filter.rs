//! Name Filters
//!
//! A [`Filter`] is the predicate driven by the search box: a substring match
//! (case-insensitive by default) or a regular expression. An empty filter
//! matches everything.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use regex::Regex;

/// A name-matching predicate
#[derive(Debug, Clone, Default)]
pub struct Filter {
    text: String,
    match_case: bool,
    is_regex: bool,
    compiled: Option<Regex>,
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.match_case == other.match_case
            && self.is_regex == other.is_regex
    }
}

impl Eq for Filter {}

impl Filter {
    /// The empty filter, matching every name
    pub fn empty() -> Self {
        Self::default()
    }

    /// Case-insensitive substring filter
    pub fn substring(text: &str) -> Self {
        Self {
            text: text.to_string(),
            match_case: false,
            is_regex: false,
            compiled: None,
        }
    }

    /// Regular-expression filter. An invalid pattern degrades to a literal
    /// substring match instead of failing.
    pub fn regex(pattern: &str, match_case: bool) -> Self {
        let full = if match_case {
            pattern.to_string()
        } else {
            format!("(?i){}", pattern)
        };
        match Regex::new(&full) {
            Ok(compiled) => Self {
                text: pattern.to_string(),
                match_case,
                is_regex: true,
                compiled: Some(compiled),
            },
            Err(_) => {
                let mut filter = Self::substring(pattern);
                filter.match_case = match_case;
                filter
            }
        }
    }

    /// Toggle case sensitivity
    pub fn with_match_case(mut self, match_case: bool) -> Self {
        self.match_case = match_case;
        if self.is_regex {
            return Self::regex(&self.text, match_case);
        }
        self
    }

    /// The raw filter text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the filter is trivial (matches everything)
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Test a name against the filter
    pub fn matches(&self, name: &str) -> bool {
        if self.text.is_empty() {
            return true;
        }
        if let Some(re) = &self.compiled {
            return re.is_match(name);
        }
        if self.match_case {
            name.contains(&self.text)
        } else {
            name.to_lowercase().contains(&self.text.to_lowercase())
        }
    }

    /// Identity of the filter value, used to key match-count memos
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.text.hash(&mut hasher);
        self.match_case.hash(&mut hasher);
        self.is_regex.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matches_everything() {
        let filter = Filter::empty();
        assert!(filter.is_empty());
        assert!(filter.matches("anything"));
        assert!(filter.matches(""));
    }

    #[test]
    fn test_substring_case_insensitive() {
        let filter = Filter::substring("foo");
        assert!(filter.matches("com.example.FooBar"));
        assert!(filter.matches("FOO"));
        assert!(!filter.matches("bar"));
    }

    #[test]
    fn test_match_case() {
        let filter = Filter::substring("Foo").with_match_case(true);
        assert!(filter.matches("com.example.Foo"));
        assert!(!filter.matches("com.example.foo"));
    }

    #[test]
    fn test_regex() {
        let filter = Filter::regex("^com\\..*Foo$", false);
        assert!(filter.matches("com.example.Foo"));
        assert!(!filter.matches("org.example.Foo"));
    }

    #[test]
    fn test_invalid_regex_degrades_to_literal() {
        let filter = Filter::regex("a[b", false);
        assert!(filter.matches("xa[bx"));
        assert!(!filter.matches("ab"));
    }

    #[test]
    fn test_fingerprint_distinguishes_values() {
        let a = Filter::substring("foo");
        let b = Filter::substring("bar");
        let c = Filter::substring("foo").with_match_case(true);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint(), Filter::substring("foo").fingerprint());
    }
}
