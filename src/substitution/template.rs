//! Placeholder scanning for fixture text.
//!
//! A placeholder is `{{key}}`, optionally written `{{ .key }}`. Keys are
//! word characters plus `-`. Text outside placeholders is copied verbatim;
//! a lone `}}` is ordinary text.

use thiserror::Error;

/// Malformed fixture text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed action starting at byte {offset}")]
    Unclosed { offset: usize },

    #[error("unsupported action `{action}` at byte {offset}")]
    Unsupported { offset: usize, action: String },
}

/// A lexical piece of fixture text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Text(&'a str),
    Placeholder { raw: &'a str, key: &'a str },
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Token<'_>>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = text;
    let mut consumed = 0;

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            tokens.push(Token::Text(&rest[..open]));
        }

        let inner_start = open + 2;
        let close = rest[inner_start..]
            .find("}}")
            .map(|i| inner_start + i)
            .ok_or(TemplateError::Unclosed {
                offset: consumed + open,
            })?;

        let inner = &rest[inner_start..close];
        let key = inner.trim();
        let key = key.strip_prefix('.').unwrap_or(key);
        if !is_key(key) {
            return Err(TemplateError::Unsupported {
                offset: consumed + open,
                action: inner.trim().to_string(),
            });
        }

        tokens.push(Token::Placeholder {
            raw: &rest[open..close + 2],
            key,
        });
        consumed += close + 2;
        rest = &rest[close + 2..];
    }

    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    Ok(tokens)
}

/// Check that `text` is well-formed fixture text.
pub fn validate(text: &str) -> Result<(), TemplateError> {
    tokenize(text).map(|_| ())
}

/// Keys referenced by `text`, in order of appearance (duplicates kept).
pub fn placeholders(text: &str) -> Result<Vec<&str>, TemplateError> {
    Ok(tokenize(text)?
        .into_iter()
        .filter_map(|token| match token {
            Token::Placeholder { key, .. } => Some(key),
            Token::Text(_) => None,
        })
        .collect())
}

fn is_key(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_single_token() {
        assert_eq!(tokenize("just some input!").unwrap(), vec![Token::Text("just some input!")]);
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn both_placeholder_spellings() {
        assert_eq!(placeholders("{{name}} and {{ .other_key }}").unwrap(), vec!["name", "other_key"]);
    }

    #[test]
    fn raw_text_is_preserved_for_pass_through() {
        let tokens = tokenize("a {{ .cool_key }} b").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("a "),
                Token::Placeholder { raw: "{{ .cool_key }}", key: "cool_key" },
                Token::Text(" b"),
            ]
        );
    }

    #[test]
    fn unclosed_action_is_an_error() {
        assert_eq!(validate("hello {{name"), Err(TemplateError::Unclosed { offset: 6 }));
    }

    #[test]
    fn control_flow_is_not_supported() {
        let err = validate("ok {{ if .x }}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::Unsupported {
                offset: 3,
                action: "if .x".into()
            }
        );
        assert!(validate("{{}}").is_err());
    }

    #[test]
    fn closing_braces_alone_are_text() {
        assert!(validate(r#"{"a": {"b": 1}}"#).is_ok());
    }

    #[test]
    fn offsets_account_for_earlier_placeholders() {
        assert_eq!(validate("{{a}}{{b"), Err(TemplateError::Unclosed { offset: 5 }));
    }
}
