//! YAML front matter.
//!
//! Files are laid out as:
//!
//! ```text
//! ---
//! id: a1
//! name: Bot
//! ---
//! body text
//! ```
//!
//! `serde_yaml` is the only parser; a file without a well-formed header is
//! rejected rather than guessed at.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::SerializeError;

const DELIMITER: &str = "---";

/// Render a front matter header followed by `body`.
///
/// The body is written verbatim so parsing the output yields it back
/// unchanged.
///
/// # Errors
///
/// Returns an error if `front` cannot be represented as YAML.
pub fn render<T: Serialize>(front: &T, body: &str) -> Result<String, SerializeError> {
    let yaml = serde_yaml::to_string(front)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

/// Split `content` into its raw YAML header and body.
///
/// Returns `None` when the content does not open with a `---` line or the
/// header is never closed.
#[must_use]
pub fn split(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\r\n")
        .or_else(|| content.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == DELIMITER {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((header, body));
        }
        offset += line.len();
    }
    None
}

/// Parse the header into `T` and return it with the body.
///
/// # Errors
///
/// Returns [`SerializeError::MissingFrontMatter`] if there is no header and
/// [`SerializeError::Yaml`] if it does not decode into `T`.
pub fn parse<T: DeserializeOwned>(content: &str) -> Result<(T, String), SerializeError> {
    let (header, body) = split(content).ok_or(SerializeError::MissingFrontMatter)?;
    let front = serde_yaml::from_str(header)?;
    Ok((front, body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Header {
        id: String,
        tags: Vec<String>,
    }

    #[test]
    fn test_render_then_parse() {
        let header = Header {
            id: "a1".into(),
            tags: vec!["x".into(), "y".into()],
        };
        let text = render(&header, "# Title\n\nBody with --- dashes\n").unwrap();
        assert!(text.starts_with("---\nid: a1\n"));

        let (parsed, body): (Header, String) = parse(&text).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(body, "# Title\n\nBody with --- dashes\n");
    }

    #[test]
    fn test_empty_body() {
        let header = Header {
            id: "a1".into(),
            tags: vec![],
        };
        let text = render(&header, "").unwrap();
        let (_, body): (Header, String) = parse(&text).unwrap();
        assert_eq!(body, "");
    }

    #[test]
    fn test_crlf_header() {
        let text = "---\r\nid: a1\r\ntags: []\r\n---\r\nbody";
        let (parsed, body): (Header, String) = parse(text).unwrap();
        assert_eq!(parsed.id, "a1");
        assert_eq!(body, "body");
    }

    #[test]
    fn test_multiline_value_with_delimiter_stays_in_header() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Note {
            text: String,
        }
        let note = Note {
            text: "line one\n---\nline three".into(),
        };
        let rendered = render(&note, "tail").unwrap();
        let (parsed, body): (Note, String) = parse(&rendered).unwrap();
        assert_eq!(parsed, note);
        assert_eq!(body, "tail");
    }

    #[test]
    fn test_missing_header_is_rejected() {
        let result: Result<(Header, String), _> = parse("just text");
        assert!(matches!(result, Err(SerializeError::MissingFrontMatter)));

        let unterminated: Result<(Header, String), _> = parse("---\nid: a1\n");
        assert!(matches!(unterminated, Err(SerializeError::MissingFrontMatter)));
    }
}
