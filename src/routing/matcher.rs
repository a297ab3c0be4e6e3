//! Path template matching.
//!
//! # Responsibilities
//! - Compile a route path such as `/orgs/:org/repos/:repo` once at startup
//! - Confirm literal equality for templates without placeholders
//! - Extract ordered, percent-decoded bindings for templated paths
//!
//! # Design Decisions
//! - A placeholder is a whole segment of the form `:name` (word characters only)
//! - A placeholder captures one or more non-whitespace characters, so a
//!   trailing placeholder may span several segments while a mid-path one is
//!   bounded by the literal that follows it
//! - Literal segments are regex-escaped and compared against the raw path
//! - Captures are percent-decoded after matching, never before
//! - Binding keys are the lower-cased placeholder names

use percent_encoding::percent_decode_str;
use regex::Regex;
use thiserror::Error;

/// A name/value pair captured from a URL at match time.
///
/// Bindings live for a single request and take precedence over the
/// persistent substitution chain when a fixture is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub key: String,
    pub value: String,
}

impl Binding {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Errors raised while compiling a path template.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("placeholder `:{0}` appears more than once")]
    DuplicatePlaceholder(String),

    #[error("invalid path pattern: {0}")]
    Regex(#[from] regex::Error),
}

/// A compiled route path.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    template: String,
    /// Anchored pattern, present only when the template has placeholders.
    pattern: Option<Regex>,
    /// Placeholder names in template order, lower-cased.
    names: Vec<String>,
}

impl PathTemplate {
    /// Compile a template. Templates without placeholders never touch the
    /// regex engine.
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        let mut names: Vec<String> = Vec::new();
        let mut parts = Vec::new();

        for segment in template.split('/') {
            match placeholder_name(segment) {
                Some(name) => {
                    let key = name.to_lowercase();
                    if names.contains(&key) {
                        return Err(PatternError::DuplicatePlaceholder(key));
                    }
                    names.push(key);
                    parts.push(r"(\S+)".to_string());
                }
                None => parts.push(regex::escape(segment)),
            }
        }

        let pattern = if names.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"\A{}\z", parts.join("/")))?)
        };

        Ok(Self {
            template: template.to_string(),
            pattern,
            names,
        })
    }

    /// The template as written in the route file.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn has_placeholders(&self) -> bool {
        self.pattern.is_some()
    }

    /// Placeholder names in template order.
    pub fn placeholders(&self) -> &[String] {
        &self.names
    }

    /// Number of non-empty `/`-delimited segments. `""` and `/` are both 0.
    pub fn specificity(&self) -> usize {
        self.template.split('/').filter(|s| !s.is_empty()).count()
    }

    /// True when the template denotes the site root.
    pub fn is_root(&self) -> bool {
        self.template.is_empty() || self.template == "/"
    }

    /// Match a raw (still percent-encoded) URL path.
    ///
    /// Returns `None` on mismatch. A literal match yields an empty binding
    /// list; a templated match yields one binding per placeholder.
    pub fn match_path(&self, raw_path: &str) -> Option<Vec<Binding>> {
        let Some(pattern) = &self.pattern else {
            return self.matches_literal(raw_path).then(Vec::new);
        };

        let captures = pattern.captures(raw_path)?;
        if captures.len() != self.names.len() + 1 {
            return None;
        }

        let mut bindings = Vec::with_capacity(self.names.len());
        for (index, name) in self.names.iter().enumerate() {
            let raw = captures.get(index + 1)?.as_str();
            let value = percent_decode_str(raw).decode_utf8_lossy().into_owned();
            bindings.push(Binding::new(name.clone(), value));
        }
        Some(bindings)
    }

    fn matches_literal(&self, raw_path: &str) -> bool {
        let decoded = percent_decode_str(raw_path).decode_utf8_lossy();
        if self.is_root() {
            return decoded.is_empty() || decoded == "/";
        }
        self.template == raw_path || self.template == decoded
    }
}

/// One-shot form of [`PathTemplate::match_path`]. A template that fails to
/// compile never matches.
pub fn match_path(template: &str, raw_path: &str) -> (bool, Vec<Binding>) {
    match PathTemplate::compile(template)
        .ok()
        .and_then(|t| t.match_path(raw_path))
    {
        Some(bindings) => (true, bindings),
        None => (false, Vec::new()),
    }
}

fn placeholder_name(segment: &str) -> Option<&str> {
    let name = segment.strip_prefix(':')?;
    let is_word = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    is_word.then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_template_requires_exact_equality() {
        let t = PathTemplate::compile("/foo/bar").unwrap();
        assert_eq!(t.match_path("/foo/bar"), Some(vec![]));
        assert_eq!(t.match_path("/foo/bar/"), None);
        assert_eq!(t.match_path("/baz/bing"), None);
    }

    #[test]
    fn empty_and_slash_are_the_root() {
        for template in ["", "/"] {
            let t = PathTemplate::compile(template).unwrap();
            assert_eq!(t.match_path("/"), Some(vec![]));
            assert_eq!(t.match_path(""), Some(vec![]));
            assert_eq!(t.match_path("/index"), None);
            assert_eq!(t.specificity(), 0);
        }
    }

    #[test]
    fn extracts_bindings_in_template_order() {
        let t = PathTemplate::compile("/orgs/:org/repos/:repo").unwrap();
        let bindings = t.match_path("/orgs/hashicorp/repos/atlas").unwrap();
        assert_eq!(
            bindings,
            vec![Binding::new("org", "hashicorp"), Binding::new("repo", "atlas")]
        );
    }

    #[test]
    fn mid_path_placeholder_is_bounded_by_the_next_literal() {
        let t = PathTemplate::compile("/users/:foo/bars").unwrap();
        assert_eq!(
            t.match_path("/users/russell/bars"),
            Some(vec![Binding::new("foo", "russell")])
        );
        assert_eq!(t.match_path("/users/russell/bars/extra"), None);
        assert_eq!(t.match_path("/users//bars"), None);
        assert_eq!(
            t.match_path("/users/a/b/bars"),
            Some(vec![Binding::new("foo", "a/b")])
        );
    }

    #[test]
    fn trailing_placeholder_may_span_segments() {
        let t = PathTemplate::compile("/users/:name").unwrap();
        assert_eq!(
            t.match_path("/users/russell"),
            Some(vec![Binding::new("name", "russell")])
        );
        assert_eq!(
            t.match_path("/users/russell/settings"),
            Some(vec![Binding::new("name", "russell/settings")])
        );
        assert_eq!(t.match_path("/users/"), None);
        assert_eq!(t.match_path("/users/two words"), None);
    }

    #[test]
    fn consecutive_placeholders() {
        let t = PathTemplate::compile("/orgs/:owner/:repo/teams").unwrap();
        assert_eq!(
            t.match_path("/orgs/rae/atlas/teams"),
            Some(vec![Binding::new("owner", "rae"), Binding::new("repo", "atlas")])
        );
    }

    #[test]
    fn literal_segments_are_escaped() {
        let t = PathTemplate::compile("/v1.0/:id/file+name").unwrap();
        assert!(t.match_path("/v1.0/7/file+name").is_some());
        assert!(t.match_path("/v1x0/7/file+name").is_none());
        assert!(t.match_path("/v1.0/7/fileeename").is_none());
    }

    #[test]
    fn captures_are_percent_decoded() {
        let t = PathTemplate::compile("/repos/:name").unwrap();
        assert_eq!(
            t.match_path("/repos/my%20repo"),
            Some(vec![Binding::new("name", "my repo")])
        );
    }

    #[test]
    fn placeholder_names_are_lower_cased() {
        let t = PathTemplate::compile("/users/:UserName").unwrap();
        assert_eq!(t.placeholders(), ["username".to_string()]);
    }

    #[test]
    fn duplicate_placeholders_are_rejected() {
        let err = PathTemplate::compile("/a/:id/b/:ID").unwrap_err();
        assert!(matches!(err, PatternError::DuplicatePlaceholder(name) if name == "id"));
    }

    #[test]
    fn colon_inside_a_segment_is_literal() {
        let t = PathTemplate::compile("/a:b/c").unwrap();
        assert!(!t.has_placeholders());
        assert!(t.match_path("/a:b/c").is_some());
    }

    #[test]
    fn one_shot_match() {
        let (matched, bindings) = match_path("/orgs/:org", "/orgs/hashicorp");
        assert!(matched);
        assert_eq!(bindings, vec![Binding::new("org", "hashicorp")]);

        let (matched, bindings) = match_path("/orgs/:org", "/teams/hashicorp");
        assert!(!matched);
        assert!(bindings.is_empty());
    }

    #[test]
    fn specificity_counts_segments() {
        assert_eq!(PathTemplate::compile("/orgs/:org").unwrap().specificity(), 2);
        assert_eq!(PathTemplate::compile("/orgs/:org/repos").unwrap().specificity(), 3);
    }
}
