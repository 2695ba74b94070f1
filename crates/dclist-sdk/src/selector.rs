//! Declarative field selection.
//!
//! A [`FieldSelector`] is a tree of field names that serializes to a GraphQL
//! selection set, e.g. `id username stats { guildCount }`. The text is
//! computed once at construction and spliced verbatim into query templates.

use serde_json::Value;

use crate::error::{DclistError, DclistResult};

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Scalar (or whole) field.
    Field,
    /// Object field with its own selection set.
    Nested(FieldSelector),
}

/// Immutable tree of selected fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    fields: Vec<(String, Selection)>,
    serialized: String,
}

impl FieldSelector {
    /// Start an empty selector.
    #[must_use]
    pub fn builder() -> FieldSelectorBuilder {
        FieldSelectorBuilder::default()
    }

    /// Build a selector from a JSON object.
    ///
    /// `1` and `true` include a field, `0`, `false` and `null` leave it out,
    /// and an object selects sub-fields. Key order is preserved.
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] if the input (or any nested
    /// value) is not an object, or a field has an unsupported marker.
    pub fn from_value(value: &Value) -> DclistResult<Self> {
        let Value::Object(map) = value else {
            return Err(DclistError::invalid_argument(
                "Field Selection must be created from an object",
            ));
        };

        let mut builder = Self::builder();
        for (name, marker) in map {
            builder = match marker {
                Value::Bool(true) => builder.field(name),
                Value::Number(n) if n.as_u64() == Some(1) => builder.field(name),
                Value::Bool(false) | Value::Null => builder,
                Value::Number(n) if n.as_u64() == Some(0) => builder,
                Value::Object(_) => builder.nested(name, Self::from_value(marker)?),
                other => {
                    return Err(DclistError::invalid_argument(format!(
                        "Invalid selection marker for field \"{name}\": {other}"
                    )));
                }
            };
        }
        Ok(builder.build())
    }

    /// Selection-set text.
    #[must_use]
    pub fn serialized(&self) -> &str {
        &self.serialized
    }

    /// Top-level entries in declared order.
    #[must_use]
    pub fn fields(&self) -> &[(String, Selection)] {
        &self.fields
    }

    /// Returns `true` if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl std::fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialized)
    }
}

impl TryFrom<Value> for FieldSelector {
    type Error = DclistError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

/// Builder for [`FieldSelector`].
///
/// Selecting a name twice keeps the first position and the latest selection.
#[derive(Debug, Default)]
pub struct FieldSelectorBuilder {
    fields: Vec<(String, Selection)>,
}

impl FieldSelectorBuilder {
    /// Select a field.
    #[must_use]
    pub fn field(self, name: impl Into<String>) -> Self {
        self.insert(name.into(), Selection::Field)
    }

    /// Select several fields.
    #[must_use]
    pub fn fields<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, Self::field)
    }

    /// Select an object field with its own selection.
    #[must_use]
    pub fn nested(self, name: impl Into<String>, selector: FieldSelector) -> Self {
        self.insert(name.into(), Selection::Nested(selector))
    }

    fn insert(mut self, name: String, selection: Selection) -> Self {
        if let Some(slot) = self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            slot.1 = selection;
        } else {
            self.fields.push((name, selection));
        }
        self
    }

    /// Freeze the selection and compute its text.
    #[must_use]
    pub fn build(self) -> FieldSelector {
        let serialized = self
            .fields
            .iter()
            .map(|(name, selection)| match selection {
                Selection::Field => name.clone(),
                Selection::Nested(inner) => format!("{name} {{ {} }}", inner.serialized),
            })
            .collect::<Vec<_>>()
            .join(" ");

        FieldSelector {
            fields: self.fields,
            serialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Minimal selection-set parser: returns `(name, children)` pairs.
    fn parse(text: &str) -> Vec<(String, Vec<(String, Vec<String>)>)> {
        fn walk<'a>(tokens: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>) -> Vec<(String, Vec<(String, Vec<String>)>)> {
            let mut out = Vec::new();
            while let Some(token) = tokens.next() {
                if token == "}" {
                    break;
                }
                if tokens.peek() == Some(&"{") {
                    tokens.next();
                    let children = walk(tokens)
                        .into_iter()
                        .map(|(name, grand)| (name, grand.into_iter().map(|(n, _)| n).collect()))
                        .collect();
                    out.push((token.to_string(), children));
                } else {
                    out.push((token.to_string(), Vec::new()));
                }
            }
            out
        }
        walk(&mut text.split_whitespace().peekable())
    }

    #[test]
    fn serializes_flat_fields_in_order() {
        let selector = FieldSelector::builder()
            .fields(["id", "username", "avatar"])
            .build();
        assert_eq!(selector.serialized(), "id username avatar");
    }

    #[test]
    fn serializes_nested_fields() {
        let selector = FieldSelector::from_value(&json!({
            "id": 1,
            "stats": { "userCount": 1, "guildCount": true },
            "tags": 1
        }))
        .unwrap();
        assert_eq!(
            selector.serialized(),
            "id stats { userCount guildCount } tags"
        );
    }

    #[test]
    fn empty_input_is_empty_string() {
        assert_eq!(FieldSelector::from_value(&json!({})).unwrap().serialized(), "");
        assert!(FieldSelector::builder().build().is_empty());
    }

    #[test]
    fn falsy_markers_are_omitted() {
        let selector =
            FieldSelector::from_value(&json!({ "id": 1, "bio": 0, "github": false, "x": null }))
                .unwrap();
        assert_eq!(selector.serialized(), "id");
    }

    #[test]
    fn rejects_non_object_and_bad_markers() {
        assert!(matches!(
            FieldSelector::from_value(&json!("id")),
            Err(DclistError::InvalidArgument(_))
        ));
        let err = FieldSelector::from_value(&json!({ "id": "yes" })).unwrap_err();
        assert!(err.to_string().contains("\"id\""));
    }

    #[test]
    fn duplicate_field_keeps_first_position() {
        let selector = FieldSelector::builder()
            .field("id")
            .field("owner")
            .field("id")
            .nested("owner", FieldSelector::builder().field("id").build())
            .build();
        assert_eq!(selector.serialized(), "id owner { id }");
    }

    #[test]
    fn reparse_preserves_declared_structure() {
        let inputs = [
            json!({ "a": 1 }),
            json!({ "z": 1, "a": 1, "m": { "q": 1, "b": 1 } }),
            json!({
                "subject": { "id": 1, "username": 1 },
                "author": { "id": 1, "avatar": 1 },
                "type": 1,
                "content": 1
            }),
            json!({ "x": { "y": { "z": 1 } }, "w": 1 }),
        ];

        for input in inputs {
            let selector = FieldSelector::from_value(&input).unwrap();
            let parsed = parse(selector.serialized());
            let object = input.as_object().unwrap();

            let top: Vec<&str> = parsed.iter().map(|(name, _)| name.as_str()).collect();
            let expected: Vec<&str> = object.keys().map(String::as_str).collect();
            assert_eq!(top, expected);

            for (name, children) in &parsed {
                if let Some(Value::Object(nested)) = object.get(name) {
                    let got: Vec<&str> = children.iter().map(|(n, _)| n.as_str()).collect();
                    let want: Vec<&str> = nested.keys().map(String::as_str).collect();
                    assert_eq!(got, want, "children of {name}");
                }
            }
        }
    }
}
