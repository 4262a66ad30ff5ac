//! Tool result content decoding.
//!
//! A tool handler may return a plain string or a JSON array of content
//! parts. Array elements are interpreted strictly:
//!
//! - `{type:"text", text}` — text part
//! - `{type:"image", data, mimeType, metadata?}` — both `data` and
//!   `mimeType` required
//! - `{type:"resource", resource:{uri, mimeType, name?}}` — `uri` and
//!   `mimeType` required
//!
//! Elements with an unknown `type` or missing required fields are skipped.
//! When nothing survives (non-array input, empty array, all elements
//! invalid) the original input is emitted as a single text part, so a
//! sloppy handler degrades to text instead of disappearing.

use serde_json::Value;
use tracing::debug;

use mcplink_protocol::ContentPart;

/// Decode a handler's raw output value into content parts.
pub fn decode_tool_content(value: &Value) -> Vec<ContentPart> {
    if let Value::Array(elements) = value {
        let decoded: Vec<ContentPart> = elements
            .iter()
            .filter_map(|element| match decode_element(element) {
                Some(part) => Some(part),
                None => {
                    debug!("Skipping malformed content element");
                    None
                }
            })
            .collect();

        if !decoded.is_empty() {
            return decoded;
        }
    }

    vec![ContentPart::text(stringify(value))]
}

/// Strict per-element decode; `None` drops the element.
fn decode_element(element: &Value) -> Option<ContentPart> {
    let object = element.as_object()?;

    match object.get("type")?.as_str()? {
        "text" => {
            let text = object.get("text")?.as_str()?;
            Some(ContentPart::text(text))
        }
        "image" => {
            let data = object.get("data")?.as_str()?;
            let mime_type = object.get("mimeType")?.as_str()?;
            Some(ContentPart::Image {
                data: data.to_string(),
                mime_type: mime_type.to_string(),
                metadata: object.get("metadata").filter(|m| m.is_object()).cloned(),
            })
        }
        "resource" => {
            let resource = object.get("resource")?.as_object()?;
            let uri = resource.get("uri")?.as_str()?;
            let mime_type = resource.get("mimeType")?.as_str()?;
            Some(ContentPart::Resource {
                resource: mcplink_protocol::ResourceContents {
                    uri: uri.to_string(),
                    mime_type: mime_type.to_string(),
                    name: resource.get("name").and_then(|n| n.as_str()).map(String::from),
                    text: resource.get("text").and_then(|t| t.as_str()).map(String::from),
                },
            })
        }
        _ => None,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
