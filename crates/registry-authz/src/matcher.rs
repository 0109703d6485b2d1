use serde::{Deserialize, Serialize};

/// Match `text` against a glob `pattern` where `*` matches any run of
/// characters (including none) and `?` matches exactly one character.
///
/// The match is anchored at both ends. On a mismatch the most recent `*`
/// absorbs one more character of the text and matching resumes after it.
pub fn glob_match(text: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t_idx, mut p_idx) = (0usize, 0usize);
    let (mut star_idx, mut match_idx) = (None, 0usize);

    while t_idx < text.len() {
        // Stars are checked before literals so a literal '*' in the text
        // never consumes the wildcard.
        if p_idx < pattern.len() && pattern[p_idx] == '*' {
            star_idx = Some(p_idx);
            match_idx = t_idx;
            p_idx += 1;
            continue;
        }

        if p_idx < pattern.len() && (pattern[p_idx] == '?' || pattern[p_idx] == text[t_idx]) {
            p_idx += 1;
            t_idx += 1;
            continue;
        }

        if let Some(star) = star_idx {
            p_idx = star + 1;
            match_idx += 1;
            t_idx = match_idx;
            continue;
        }

        return false;
    }

    while p_idx < pattern.len() && pattern[p_idx] == '*' {
        p_idx += 1;
    }

    p_idx == pattern.len()
}

/// Ordered set of glob patterns. An empty set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternSet(Vec<String>);

impl PatternSet {
    pub fn new(patterns: Vec<String>) -> Self {
        Self(patterns)
    }

    pub fn any_match(&self, text: &str) -> bool {
        self.0.iter().any(|pattern| glob_match(text, pattern))
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.0.iter().any(|entry| entry == pattern)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for PatternSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
