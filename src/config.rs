use crate::util::split_words;

/// How tag and attribute names are derived from method names when a method
/// carries no explicit name annotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NameStrategy {
    /// `getFooBar` -> `foo-bar`
    #[default]
    Hyphen,
    /// `getFooBar` -> `fooBar`
    Java,
}

impl NameStrategy {
    /// Joins lowercase words according to the strategy.
    pub fn join(self, words: &[String]) -> String {
        match self {
            Self::Hyphen => words.join("-"),
            Self::Java => {
                let mut out = String::new();
                for (i, word) in words.iter().enumerate() {
                    if i == 0 {
                        out.push_str(word);
                        continue;
                    }
                    let mut chars = word.chars();
                    if let Some(first) = chars.next() {
                        out.extend(first.to_uppercase());
                        out.push_str(chars.as_str());
                    }
                }
                out
            }
        }
    }

    /// Converts an identifier such as a property name to a tree name.
    pub fn convert(self, identifier: &str) -> String {
        self.join(&split_words(identifier))
    }
}

/// Engine-wide configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BindingConfig {
    /// Default naming for methods without explicit names.
    pub name_strategy: NameStrategy,
    /// Keep converted values in the per-handler cache.
    pub cache_values: bool,
    /// In debug builds, reject writes made outside the exclusive scope.
    pub check_write_access: bool,
    /// Tree nodes visited between two cancellation checks.
    pub cancellation_check_interval: usize,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            name_strategy: NameStrategy::Hyphen,
            cache_values: true,
            check_write_access: true,
            cancellation_check_interval: 64,
        }
    }
}
