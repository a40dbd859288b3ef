use std::{borrow::Cow, collections::HashMap, ops::Range};

use crate::{ConvertContext, TreeNode};

/// A span of raw text naming something else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    /// Byte range inside the raw text.
    pub range: Range<usize>,
    pub target: String,
}

/// Pluggable rewrite of raw text, applied before conversion.
///
/// Injectors run in registration order; each one sees the output of the
/// previous one.
pub trait TextInjector: Send + Sync {
    fn rewrite<'t>(&self, raw: &'t str, node: &TreeNode, cx: &ConvertContext<'_>) -> Cow<'t, str>;

    /// Spans of `raw` that refer to other entities.
    fn resolve_references(&self, raw: &str, cx: &ConvertContext<'_>) -> Vec<Reference> {
        let _ = (raw, cx);
        Vec::new()
    }
}

/// Expands `${name}` placeholders from a fixed table.
///
/// Unknown placeholders are left untouched.
#[derive(Clone, Debug, Default)]
pub struct PlaceholderInjector {
    values: HashMap<String, String>,
}

impl PlaceholderInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    fn placeholders(raw: &str) -> impl Iterator<Item = (Range<usize>, &str)> {
        let mut offset = 0;
        std::iter::from_fn(move || {
            let start = offset + raw[offset..].find("${")?;
            let end = start + raw[start..].find('}')?;
            offset = end + 1;
            Some((start..end + 1, &raw[start + 2..end]))
        })
    }
}

impl TextInjector for PlaceholderInjector {
    fn rewrite<'t>(&self, raw: &'t str, _node: &TreeNode, _cx: &ConvertContext<'_>) -> Cow<'t, str> {
        let mut out = String::new();
        let mut copied = 0;
        for (range, name) in Self::placeholders(raw) {
            if let Some(value) = self.values.get(name) {
                out.push_str(&raw[copied..range.start]);
                out.push_str(value);
                copied = range.end;
            }
        }
        if copied == 0 {
            return Cow::Borrowed(raw);
        }
        out.push_str(&raw[copied..]);
        Cow::Owned(out)
    }

    fn resolve_references(&self, raw: &str, _cx: &ConvertContext<'_>) -> Vec<Reference> {
        Self::placeholders(raw)
            .map(|(range, name)| Reference {
                range,
                target: name.to_owned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeKey;

    #[test]
    fn test_expand_known_placeholders() {
        let injector = PlaceholderInjector::new().with("version", "1.2");
        let cx = ConvertContext::standalone();
        let node = TreeNode::Tag(NodeKey::new(0));
        assert_eq!(injector.rewrite("v${version}-${other}", &node, &cx), "v1.2-${other}");
        assert!(matches!(injector.rewrite("plain", &node, &cx), Cow::Borrowed(_)));
    }

    #[test]
    fn test_references_cover_placeholders() {
        let injector = PlaceholderInjector::new();
        let cx = ConvertContext::standalone();
        let refs = injector.resolve_references("a${x}b${yy}", &cx);
        assert_eq!(
            refs,
            [
                Reference { range: 1..5, target: "x".to_owned() },
                Reference { range: 6..11, target: "yy".to_owned() },
            ]
        );
    }
}
