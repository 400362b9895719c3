//! Predicate-driven pruning of value trees for debugger display.
//!
//! A [`Filter`] compiles to an optional regex over type names and property
//! names. The empty filter is the identity; a non-empty filter keeps only the
//! subtrees that match, walking depth-first and deciding each child before its
//! parent.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::value::{Property, Value};

/// How the filter input string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Plain substring match.
    #[default]
    Plain,
    /// Whole-word match.
    Words,
    /// The input is a regular expression.
    Regex,
}

/// User-specified display filter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    pub input: String,
    pub kind: MatchKind,
    pub ignore_case: bool,
}

impl Filter {
    pub fn new(input: impl Into<String>, kind: MatchKind, ignore_case: bool) -> Self {
        Self {
            input: input.into(),
            kind,
            ignore_case,
        }
    }

    /// The identity filter: keeps everything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Compile to a matcher. `Ok(None)` for the empty filter; `Err` carries a
    /// human-readable reason for an invalid pattern (never panics).
    pub fn compile(&self) -> Result<Option<CompiledFilter>, FilterError> {
        if self.input.is_empty() {
            return Ok(None);
        }
        let pattern = match self.kind {
            MatchKind::Plain => regex::escape(&self.input),
            MatchKind::Words => format!(r"\b{}\b", regex::escape(&self.input)),
            MatchKind::Regex => self.input.clone(),
        };
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(self.ignore_case)
            .build()
            .map_err(|e| FilterError {
                input: self.input.clone(),
                reason: e.to_string(),
            })?;
        Ok(Some(CompiledFilter { regex }))
    }
}

/// Invalid filter input, reported as a value to the session state machine.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid filter {input:?}: {reason}")]
pub struct FilterError {
    pub input: String,
    pub reason: String,
}

/// A compiled, reusable filter predicate.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    regex: Regex,
}

impl CompiledFilter {
    fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Prune `value` to the matching subtrees. `None` means nothing survived.
    ///
    /// A node whose own type name matches is kept whole (children are not
    /// re-pruned under a matching ancestor). Otherwise refs keep each property
    /// whose name or value type matches as-is, recurse into the rest, and are
    /// dropped entirely once no property survives. Collections behave the same
    /// per element.
    pub fn apply(&self, value: &Value) -> Option<Value> {
        if self.matches(value.type_name().as_str()) {
            return Some(value.clone());
        }
        match value {
            Value::Ref(ty, props) => {
                let survivors: Vec<Property> = props
                    .iter()
                    .filter_map(|prop| {
                        if self.matches(&prop.name)
                            || self.matches(prop.value.type_name().as_str())
                        {
                            Some(prop.clone())
                        } else {
                            self.apply(&prop.value)
                                .map(|pruned| Property::new(prop.name.clone(), pruned))
                        }
                    })
                    .collect();
                if survivors.is_empty() {
                    None
                } else {
                    Some(Value::Ref(ty.clone(), survivors))
                }
            }
            Value::Collection(ty, items) => {
                let survivors: Vec<Value> =
                    items.iter().filter_map(|item| self.apply(item)).collect();
                if survivors.is_empty() {
                    None
                } else {
                    Some(Value::Collection(ty.clone(), survivors))
                }
            }
            // Non-matching leaves carry nothing to keep.
            _ => None,
        }
    }
}

/// Apply `filter` to `value`, returning `value` unchanged for the empty or
/// invalid filter (invalid input is caught earlier, at update time).
pub fn apply_filter(filter: &Filter, value: &Value) -> Option<Value> {
    match filter.compile() {
        Ok(Some(compiled)) => compiled.apply(value),
        Ok(None) => Some(value.clone()),
        Err(_) => Some(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Property;

    fn two_prop_ref() -> Value {
        Value::reference(
            "Test",
            vec![
                Property::new("propA", Value::reference("com.example.another.Test", vec![])),
                Property::new("propB", Value::reference("com.example.yet.another", vec![])),
            ],
        )
    }

    #[test]
    fn test_empty_filter_is_identity() {
        let value = two_prop_ref();
        assert_eq!(apply_filter(&Filter::empty(), &value), Some(value));
    }

    #[test]
    fn test_regex_filter_selects_matching_property() {
        let filter = Filter::new(r"com\.example\.another.*", MatchKind::Regex, false);
        let filtered = apply_filter(&filter, &two_prop_ref()).unwrap();

        assert_eq!(filtered.type_name().as_str(), "Test");
        assert_eq!(filtered.properties().len(), 1);
        assert_eq!(filtered.properties()[0].name, "propA");
    }

    #[test]
    fn test_matching_root_short_circuits() {
        let filter = Filter::new("Test", MatchKind::Plain, false);
        let value = two_prop_ref();
        // Root type matches, so both children survive untouched.
        assert_eq!(apply_filter(&filter, &value), Some(value));
    }

    #[test]
    fn test_property_name_match_keeps_whole_property() {
        let filter = Filter::new("propB", MatchKind::Plain, false);
        let filtered = apply_filter(&filter, &two_prop_ref()).unwrap();
        assert_eq!(filtered.properties().len(), 1);
        assert_eq!(filtered.properties()[0].name, "propB");
    }

    #[test]
    fn test_primitive_type_name_matching() {
        let value = Value::reference(
            "Config",
            vec![
                Property::new("port", Value::int(8080)),
                Property::new("host", Value::string("localhost")),
            ],
        );
        let filter = Filter::new("i64", MatchKind::Plain, false);
        let filtered = apply_filter(&filter, &value).unwrap();
        assert_eq!(filtered.properties().len(), 1);
        assert_eq!(filtered.properties()[0].name, "port");
    }

    #[test]
    fn test_no_match_prunes_everything() {
        let filter = Filter::new("nope", MatchKind::Plain, false);
        assert_eq!(apply_filter(&filter, &two_prop_ref()), None);
    }

    #[test]
    fn test_word_match_requires_boundaries() {
        let value = Value::reference(
            "Holder",
            vec![Property::new("testing", Value::int(1))],
        );
        let words = Filter::new("test", MatchKind::Words, false);
        assert_eq!(apply_filter(&words, &value), None);

        let plain = Filter::new("test", MatchKind::Plain, false);
        assert!(apply_filter(&plain, &value).is_some());
    }

    #[test]
    fn test_ignore_case() {
        let filter = Filter::new("TEST", MatchKind::Plain, true);
        assert!(apply_filter(&filter, &two_prop_ref()).is_some());
    }

    #[test]
    fn test_invalid_regex_is_a_value_not_a_panic() {
        let filter = Filter::new("(unclosed", MatchKind::Regex, false);
        let err = filter.compile().unwrap_err();
        assert_eq!(err.input, "(unclosed");
        assert!(!err.reason.is_empty());
    }

    #[test]
    fn test_nested_match_prunes_path_to_it() {
        let value = Value::reference(
            "Outer",
            vec![
                Property::new(
                    "inner",
                    Value::reference(
                        "Middle",
                        vec![Property::new("target", Value::string("x"))],
                    ),
                ),
                Property::new("noise", Value::int(1)),
            ],
        );
        let filter = Filter::new("target", MatchKind::Plain, false);
        let filtered = apply_filter(&filter, &value).unwrap();

        assert_eq!(filtered.properties().len(), 1);
        let inner = &filtered.properties()[0];
        assert_eq!(inner.name, "inner");
        assert_eq!(inner.value.properties().len(), 1);
        assert_eq!(inner.value.properties()[0].name, "target");
    }
}
