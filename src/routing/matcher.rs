//! Path pattern matching.
//!
//! # Responsibilities
//! - Parse declared patterns into segments (literal, `*`, `**`)
//! - Match request paths segment by segment
//!
//! # Design Decisions
//! - Literal segments are case-sensitive
//! - Empty segments are ignored on both sides, so `/a//b/` equals `/a/b`
//! - `**` is only allowed as the final segment and matches zero or more segments
//! - Partial wildcards (`user-*`) are rejected at parse time rather than treated as literals
//! - No regex to guarantee O(n) matching

/// One segment of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request segment exactly.
    Literal(String),
    /// `*`: any single segment.
    Any,
    /// `**`: all remaining segments, including none.
    Rest,
}

/// Reasons a pattern is refused at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("pattern must start with '/'")]
    NotAbsolute,
    #[error("'**' must be the last segment")]
    RestNotLast,
    #[error("segment '{0}' mixes '*' with literal characters")]
    PartialWildcard(String),
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern such as `/api/v1/users/**`.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }
        if !trimmed.starts_with('/') {
            return Err(PatternError::NotAbsolute);
        }

        let parts: Vec<&str> = split_segments(trimmed).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" if i + 1 == parts.len() => Segment::Rest,
                "**" => return Err(PatternError::RestNotLast),
                "*" => Segment::Any,
                p if p.contains('*') => return Err(PatternError::PartialWildcard(p.to_string())),
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    /// The pattern as declared.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns true if `path` matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        let mut request = split_segments(path);

        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Any => {
                    if request.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(expected) => match request.next() {
                    Some(actual) if actual == expected => {}
                    _ => return false,
                },
            }
        }

        // Every pattern segment consumed; the path must be too.
        request.next().is_none()
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
