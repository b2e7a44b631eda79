//! Defines [`Frontmatter`] and the logic for separating it from a page body.

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

/// The per-page metadata block at the top of a markdown source file. Every
/// field is optional; unknown keys are ignored. Values are read leniently:
/// scalar titles such as `2024` become strings, and an empty or unrecognized
/// flag counts as unset.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Frontmatter {
    /// The title of the page.
    #[serde(default, deserialize_with = "scalar_string")]
    pub title: Option<String>,

    /// A one-line description, used in `llms.txt` listings.
    #[serde(default, deserialize_with = "scalar_string")]
    pub description: Option<String>,

    /// The publication date, as written (`2024-01-31` or RFC 3339).
    #[serde(default, deserialize_with = "scalar_string")]
    pub date: Option<String>,

    /// `false` excludes the page from the local search index.
    #[serde(default, deserialize_with = "optional_flag")]
    pub search: Option<bool>,

    /// Drafts are excluded from `llms.txt`.
    #[serde(default, deserialize_with = "flag")]
    pub draft: bool,

    /// Hidden pages are excluded from `llms.txt`.
    #[serde(default, deserialize_with = "flag")]
    pub hide: bool,
}

fn scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn optional_flag<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<bool>, D::Error> {
    Ok(as_bool(&Value::deserialize(deserializer)?))
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(as_bool(&Value::deserialize(deserializer)?).unwrap_or(false))
}

impl Frontmatter {
    /// Whether the page opted out of search with `search: false`.
    pub fn excludes_search(&self) -> bool {
        self.search == Some(false)
    }
}

/// Splits `input` into its front matter and its body. Input that doesn't
/// begin with a `---` fence has no front matter and is returned whole as the
/// body; an opening fence without a closing one is an error.
pub fn split(input: &str) -> Result<(Frontmatter, &str)> {
    fn frontmatter_indices(input: &str) -> Result<Option<(usize, usize, usize)>> {
        const FENCE: &str = "---";
        if !input.starts_with(FENCE) {
            return Ok(None);
        }
        match input[FENCE.len()..].find("\n---") {
            None => Err(Error::MissingEndFence),
            Some(offset) => Ok(Some((
                FENCE.len(),                                // yaml_start
                FENCE.len() + offset + 1,                   // yaml_stop
                FENCE.len() + offset + 1 + FENCE.len(),     // body_start
            ))),
        }
    }

    match frontmatter_indices(input)? {
        None => Ok((Frontmatter::default(), input)),
        Some((yaml_start, yaml_stop, body_start)) => {
            let yaml = input[yaml_start..yaml_stop].trim();
            let frontmatter = match yaml.is_empty() {
                true => Frontmatter::default(),
                false => serde_yaml::from_str(yaml)?,
            };
            Ok((frontmatter, &input[body_start..]))
        }
    }
}

/// Represents the result of a front matter split.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error separating front matter from a page body.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a source file opens a front matter fence (`---`) but
    /// never closes it.
    #[error("Missing closing `---`")]
    MissingEndFence,

    /// Returned when there was an error parsing the front matter as YAML.
    #[error(transparent)]
    DeserializeYaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_frontmatter() -> Result<()> {
        let (frontmatter, body) =
            split("---\ntitle: Hello\nsearch: false\n---\n# Hello\n")?;
        assert_eq!(Some("Hello".to_owned()), frontmatter.title);
        assert!(frontmatter.excludes_search());
        assert_eq!("\n# Hello\n", body);
        Ok(())
    }

    #[test]
    fn test_no_frontmatter() -> Result<()> {
        let (frontmatter, body) = split("# Plain\n")?;
        assert_eq!(Frontmatter::default(), frontmatter);
        assert!(!frontmatter.excludes_search());
        assert_eq!("# Plain\n", body);
        Ok(())
    }

    #[test]
    fn test_empty_frontmatter() -> Result<()> {
        let (frontmatter, body) = split("---\n---\nbody")?;
        assert_eq!(Frontmatter::default(), frontmatter);
        assert_eq!("\nbody", body);
        Ok(())
    }

    #[test]
    fn test_unknown_keys_ignored() -> Result<()> {
        let (frontmatter, _) = split("---\ntitle: T\ncategories: [a]\ndraft: true\n---\n")?;
        assert!(frontmatter.draft);
        assert!(!frontmatter.hide);
        Ok(())
    }

    #[test]
    fn test_lenient_scalars() -> Result<()> {
        let (frontmatter, _) = split("---\ntitle: 2024\ndescription: true\ndraft:\nhide: \"true\"\nsearch: ~\n---\n")?;
        assert_eq!(Some("2024".to_owned()), frontmatter.title);
        assert_eq!(Some("true".to_owned()), frontmatter.description);
        assert!(!frontmatter.draft);
        assert!(frontmatter.hide);
        assert_eq!(None, frontmatter.search);
        Ok(())
    }

    #[test]
    fn test_unusable_values_ignored() -> Result<()> {
        let (frontmatter, _) = split("---\ntitle: [a, b]\nsearch: maybe\ndraft: {x: 1}\n---\n")?;
        assert_eq!(None, frontmatter.title);
        assert_eq!(None, frontmatter.search);
        assert!(!frontmatter.draft);
        Ok(())
    }

    #[test]
    fn test_missing_end_fence() {
        assert!(matches!(
            split("---\ntitle: Hello\n"),
            Err(Error::MissingEndFence)
        ));
    }
}
