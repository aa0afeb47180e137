//! Normalizes caller shorthand (plain text, raw bytes, loose JSON, lists of
//! either) into canonical [`Content`] values.
//!
//! Coercion is pure and order preserving. Already-canonical input is a fixed
//! point: `coerce_contents(coerce_contents(x).into()) == coerce_contents(x)`.

use serde_json::Value;

use crate::error::{Error, invalid_argument};
use crate::models::{Content, Part, Role};

/// Anything that can stand for a single [`Part`].
#[derive(Debug, Clone, PartialEq)]
pub enum PartUnion {
    Text(String),
    Bytes { mime_type: String, data: Vec<u8> },
    Part(Part),
    /// A plain JSON mapping in wire shape, e.g. `{"text": "hi"}`
    Loose(Value),
}

/// One element of a list-shaped [`ContentUnion`].
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Content(Content),
    Part(PartUnion),
}

/// Caller-facing polymorphic input for content-bearing parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentUnion {
    Content(Content),
    Part(PartUnion),
    List(Vec<ContentItem>),
}

impl ContentUnion {
    /// Classifies an arbitrary JSON value. Objects carrying `parts` or `role`
    /// are contents; other objects are parts.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Array(items) => {
                let items = items.into_iter().map(item_from_value).collect::<Result<_, _>>()?;
                Ok(ContentUnion::List(items))
            }
            other => match item_from_value(other)? {
                ContentItem::Content(content) => Ok(ContentUnion::Content(content)),
                ContentItem::Part(part) => Ok(ContentUnion::Part(part)),
            },
        }
    }
}

fn item_from_value(value: Value) -> Result<ContentItem, Error> {
    match value {
        Value::String(text) => Ok(ContentItem::Part(PartUnion::Text(text))),
        Value::Object(ref map) if map.contains_key("parts") || map.contains_key("role") => {
            let content: Content = serde_json::from_value(value)
                .map_err(|e| invalid_argument(format!("malformed content: {e}")))?;
            Ok(ContentItem::Content(content))
        }
        Value::Object(_) => Ok(ContentItem::Part(PartUnion::Loose(value))),
        other => Err(invalid_argument(format!("cannot interpret {other} as content"))),
    }
}

/// Converts one part-like value into a [`Part`].
///
/// Loose mappings with zero or several populated variants fail with
/// [`Error::InvalidArgument`].
pub fn coerce_part(input: PartUnion) -> Result<Part, Error> {
    match input {
        PartUnion::Text(text) => Ok(Part::text(text)),
        PartUnion::Bytes { mime_type, data } => Ok(Part::inline_data(mime_type, data)),
        PartUnion::Part(part) => Ok(part),
        PartUnion::Loose(value) => Part::from_value(value),
    }
}

// Function calls are produced by the model; everything else a caller passes
// loosely is user input.
fn implicit_role(part: &Part) -> Role {
    match part {
        Part::FunctionCall(_) => Role::Model,
        _ => Role::User,
    }
}

/// Normalizes any [`ContentUnion`] into a list of contents.
///
/// Consecutive part-like items are merged into one synthetic content per run
/// of equal implicit role; an explicit [`Content`] is emitted as-is and ends
/// the current run.
pub fn coerce_contents(input: impl Into<ContentUnion>) -> Result<Vec<Content>, Error> {
    match input.into() {
        ContentUnion::Content(content) => Ok(vec![content]),
        ContentUnion::Part(part) => {
            let part = coerce_part(part)?;
            Ok(vec![Content::new(Some(implicit_role(&part)), vec![part])])
        }
        ContentUnion::List(items) => {
            let mut out = Vec::new();
            let mut run: Option<Content> = None;
            for item in items {
                match item {
                    ContentItem::Content(content) => {
                        out.extend(run.take());
                        out.push(content);
                    }
                    ContentItem::Part(part) => {
                        let part = coerce_part(part)?;
                        let role = implicit_role(&part);
                        match run.as_mut() {
                            Some(current) if current.role == Some(role) => current.parts.push(part),
                            _ => {
                                out.extend(run.take());
                                run = Some(Content::new(Some(role), vec![part]));
                            }
                        }
                    }
                }
            }
            out.extend(run);
            Ok(out)
        }
    }
}

/// Like [`coerce_contents`] but requires the input to describe exactly one
/// content (system instructions, cache system prompts).
pub fn coerce_content(input: impl Into<ContentUnion>) -> Result<Content, Error> {
    let mut contents = coerce_contents(input)?;
    match contents.len() {
        1 => Ok(contents.remove(0)),
        n => Err(invalid_argument(format!("expected a single content, got {n}"))),
    }
}

impl From<&str> for PartUnion {
    fn from(text: &str) -> Self {
        PartUnion::Text(text.to_string())
    }
}

impl From<String> for PartUnion {
    fn from(text: String) -> Self {
        PartUnion::Text(text)
    }
}

impl From<Part> for PartUnion {
    fn from(part: Part) -> Self {
        PartUnion::Part(part)
    }
}

impl From<&str> for ContentItem {
    fn from(text: &str) -> Self {
        ContentItem::Part(text.into())
    }
}

impl From<String> for ContentItem {
    fn from(text: String) -> Self {
        ContentItem::Part(text.into())
    }
}

impl From<Part> for ContentItem {
    fn from(part: Part) -> Self {
        ContentItem::Part(part.into())
    }
}

impl From<Content> for ContentItem {
    fn from(content: Content) -> Self {
        ContentItem::Content(content)
    }
}

impl From<Content> for ContentUnion {
    fn from(content: Content) -> Self {
        ContentUnion::Content(content)
    }
}

impl From<&str> for ContentUnion {
    fn from(text: &str) -> Self {
        ContentUnion::Part(text.into())
    }
}

impl From<String> for ContentUnion {
    fn from(text: String) -> Self {
        ContentUnion::Part(text.into())
    }
}

impl From<Part> for ContentUnion {
    fn from(part: Part) -> Self {
        ContentUnion::Part(part.into())
    }
}

impl From<PartUnion> for ContentUnion {
    fn from(part: PartUnion) -> Self {
        ContentUnion::Part(part)
    }
}

impl From<Vec<Content>> for ContentUnion {
    fn from(contents: Vec<Content>) -> Self {
        ContentUnion::List(contents.into_iter().map(ContentItem::Content).collect())
    }
}

impl From<Vec<Part>> for ContentUnion {
    fn from(parts: Vec<Part>) -> Self {
        ContentUnion::List(parts.into_iter().map(ContentItem::from).collect())
    }
}

impl From<Vec<ContentItem>> for ContentUnion {
    fn from(items: Vec<ContentItem>) -> Self {
        ContentUnion::List(items)
    }
}

impl From<Vec<&str>> for ContentUnion {
    fn from(texts: Vec<&str>) -> Self {
        ContentUnion::List(texts.into_iter().map(ContentItem::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_string_becomes_user_text_content() {
        let contents = coerce_contents("hello").unwrap();
        assert_eq!(contents, vec![Content::user([Part::text("hello")])]);
    }

    #[test]
    fn raw_bytes_become_inline_data() {
        let input = PartUnion::Bytes { mime_type: "image/png".into(), data: vec![9, 9] };
        let contents = coerce_contents(input).unwrap();
        assert_eq!(contents, vec![Content::user([Part::inline_data("image/png", vec![9u8, 9])])]);
    }

    #[test]
    fn content_passes_through_unchanged() {
        let content = Content::new(None, vec![Part::text("as is")]);
        assert_eq!(coerce_contents(content.clone()).unwrap(), vec![content]);
    }

    #[test]
    fn explicit_content_splits_runs() {
        let model_turn = Content::model([Part::text("ok")]);
        let items = vec![
            ContentItem::from("a"),
            ContentItem::from(Part::text("b")),
            ContentItem::Content(model_turn.clone()),
            ContentItem::from("c"),
        ];
        let contents = coerce_contents(items).unwrap();
        assert_eq!(
            contents,
            vec![
                Content::user([Part::text("a"), Part::text("b")]),
                model_turn,
                Content::user([Part::text("c")]),
            ]
        );
    }

    #[test]
    fn function_calls_group_under_model_role() {
        let call = Part::function_call("lookup", Default::default());
        let items = vec![ContentItem::from("question"), ContentItem::from(call.clone())];
        let contents = coerce_contents(items).unwrap();
        assert_eq!(contents, vec![Content::user([Part::text("question")]), Content::model([call])]);
    }

    #[test]
    fn loose_json_is_classified() {
        let input = ContentUnion::from_value(json!([
            "hi",
            {"inlineData": {"mimeType": "text/plain", "data": "aGk="}},
            {"role": "model", "parts": [{"text": "yo"}]}
        ]))
        .unwrap();
        let contents = coerce_contents(input).unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].parts.len(), 2);
        assert_eq!(contents[1], Content::model([Part::text("yo")]));
    }

    #[test]
    fn loose_part_with_two_variants_is_invalid() {
        let input = ContentUnion::from_value(json!({"text": "a", "fileData": {"fileUri": "gs://b/c"}})).unwrap();
        assert!(coerce_contents(input).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn coercion_is_idempotent_for_mixed_lists() {
        let items = vec![ContentItem::from("a"), ContentItem::Content(Content::text("b")), ContentItem::from("c")];
        let once = coerce_contents(items).unwrap();
        let twice = coerce_contents(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn single_content_helper_rejects_lists() {
        let many = vec![Content::text("a"), Content::text("b")];
        assert!(coerce_content(many).unwrap_err().is_invalid_argument());
        assert_eq!(coerce_content("sys").unwrap(), Content::user([Part::text("sys")]));
    }
}
