//! Parsed JSON paths.
//!
//! Response locations are parsed once, at pattern creation, into a list of
//! segments. Lookups walk the segments; nothing re-parses dotted strings on
//! the hot path.

use std::fmt;

use serde_json::Value;

/// One step into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSegment {
    /// Object field access.
    Field(String),
    /// Array index access.
    Index(usize),
}

impl PathSegment {
    /// Parses a dotted path (`data.items.0.title`) into segments.
    ///
    /// Purely-numeric components become [`PathSegment::Index`]; everything
    /// else is a field name. An empty string parses to an empty path, which
    /// resolves to the document root.
    pub fn parse_path(path: &str) -> Vec<Self> {
        path.split('.')
            .filter(|component| !component.is_empty())
            .map(|component| match component.parse::<usize>() {
                Ok(index) => Self::Index(index),
                Err(_) => Self::Field(component.to_string()),
            })
            .collect()
    }

    /// Renders segments back into the dotted form.
    pub fn format_path(segments: &[Self]) -> String {
        segments
            .iter()
            .map(|segment| segment.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Walks `segments` into `value`.
    pub fn resolve<'a>(segments: &[Self], value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in segments {
            current = match segment {
                Self::Field(name) => current.get(name.as_str())?,
                Self::Index(index) => current.get(*index)?,
            };
        }
        Some(current)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_and_format_round_trip() {
        for path in ["data.items", "results.0.title", "edges.node.3", "total"] {
            let segments = PathSegment::parse_path(path);
            assert_eq!(PathSegment::format_path(&segments), path);
        }
    }

    #[test]
    fn numeric_components_become_indices() {
        let segments = PathSegment::parse_path("items.2.name");
        assert_eq!(
            segments,
            vec![
                PathSegment::Field("items".into()),
                PathSegment::Index(2),
                PathSegment::Field("name".into()),
            ]
        );
    }

    #[test]
    fn resolve_walks_document() {
        let doc = json!({
            "data": { "items": [ { "title": "first" }, { "title": "second" } ] }
        });

        let segments = PathSegment::parse_path("data.items.1.title");
        let value = PathSegment::resolve(&segments, &doc).unwrap();
        assert_eq!(value, &json!("second"));

        let missing = PathSegment::parse_path("data.nope");
        assert!(PathSegment::resolve(&missing, &doc).is_none());
    }

    #[test]
    fn empty_path_is_root() {
        let doc = json!([1, 2, 3]);
        let segments = PathSegment::parse_path("");
        assert_eq!(PathSegment::resolve(&segments, &doc), Some(&doc));
    }
}
