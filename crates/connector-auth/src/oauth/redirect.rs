//! Redirect URI pattern matching.
//!
//! A registered redirect URI is either an exact URI or a pattern with `*`
//! wildcards. Patterns are matched segment by segment after splitting on `/`:
//! the candidate must have the same number of segments, and a wildcard can
//! never cross a segment boundary.
//!
//! Within a segment a `*` stands for one or more characters, excluding `/`,
//! `?` and `#`. In the authority segment (`host[:port]` after `scheme://`) a
//! `*` also excludes `.`, `:` and `@`, so it matches exactly one DNS label.
//!
//! ```
//! use connector_auth::oauth::redirect::RedirectPattern;
//!
//! let pattern = RedirectPattern::parse("https://*.example.com/cb").unwrap();
//! assert!(pattern.matches("https://app.example.com/cb"));
//! assert!(!pattern.matches("https://example.com/cb"));
//! assert!(!pattern.matches("https://a.b.example.com/cb"));
//! ```

/// Errors raised for malformed registered patterns.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RedirectPatternError {
    /// The pattern is empty.
    #[error("Redirect URI pattern cannot be empty")]
    Empty,

    /// Two wildcards are adjacent, which makes the split ambiguous.
    #[error("Redirect URI pattern '{0}' contains adjacent wildcards")]
    AdjacentWildcards(String),

    /// A wildcard appears in the scheme.
    #[error("Redirect URI pattern '{0}' has a wildcard in the scheme")]
    WildcardScheme(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    tokens: Vec<Token>,
    authority: bool,
}

/// A parsed redirect URI pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPattern {
    raw: String,
    // None for exact patterns
    segments: Option<Vec<Segment>>,
}

impl RedirectPattern {
    /// Parses a registered redirect URI pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is empty, has adjacent wildcards, or puts
    /// a wildcard in the scheme.
    pub fn parse(raw: &str) -> Result<Self, RedirectPatternError> {
        if raw.is_empty() {
            return Err(RedirectPatternError::Empty);
        }

        if !raw.contains('*') {
            return Ok(Self {
                raw: raw.to_string(),
                segments: None,
            });
        }

        if raw.contains("**") {
            return Err(RedirectPatternError::AdjacentWildcards(raw.to_string()));
        }

        let has_authority = raw.contains("://");
        if has_authority && raw.split("://").next().is_some_and(|s| s.contains('*')) {
            return Err(RedirectPatternError::WildcardScheme(raw.to_string()));
        }

        let segments = raw
            .split('/')
            .enumerate()
            .map(|(index, part)| Segment {
                tokens: tokenize(part),
                authority: has_authority && index == 2,
            })
            .collect();

        Ok(Self {
            raw: raw.to_string(),
            segments: Some(segments),
        })
    }

    /// Returns the pattern as registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `true` if the pattern contains wildcards.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.segments.is_some()
    }

    /// Checks whether `candidate` matches this pattern in full.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let Some(segments) = &self.segments else {
            return self.raw == candidate;
        };

        let parts: Vec<&str> = candidate.split('/').collect();
        if parts.len() != segments.len() {
            return false;
        }

        segments
            .iter()
            .zip(parts)
            .all(|(segment, part)| match_tokens(&segment.tokens, part, segment.authority))
    }
}

fn tokenize(part: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (i, literal) in part.split('*').enumerate() {
        if i > 0 {
            tokens.push(Token::Wildcard);
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal.to_string()));
        }
    }
    tokens
}

fn wildcard_char_allowed(c: char, authority: bool) -> bool {
    match c {
        '/' | '?' | '#' => false,
        '.' | ':' | '@' => !authority,
        _ => true,
    }
}

fn match_tokens(tokens: &[Token], text: &str, authority: bool) -> bool {
    match tokens.split_first() {
        None => text.is_empty(),
        Some((Token::Literal(literal), rest)) => text
            .strip_prefix(literal.as_str())
            .is_some_and(|remaining| match_tokens(rest, remaining, authority)),
        Some((Token::Wildcard, rest)) => {
            // Longest run the wildcard may cover
            let run = text
                .char_indices()
                .find(|(_, c)| !wildcard_char_allowed(*c, authority))
                .map_or(text.len(), |(i, _)| i);

            text[..run]
                .char_indices()
                .map(|(i, c)| i + c.len_utf8())
                .any(|end| match_tokens(rest, &text[end..], authority))
        }
    }
}
