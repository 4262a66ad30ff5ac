//! Server-Sent Events stream parsing.
//!
//! The reader accumulates bytes from the HTTP response stream and cuts
//! events at blank lines. For each event, the bodies of all `data:` fields
//! are concatenated (one leading space after the colon is stripped, per
//! the SSE specification) to form the JSON-RPC payload. `event:` and `id:`
//! fields are ignored; events without any `data:` field are dropped.

/// Incremental SSE parser: feed raw chunks, get complete event payloads.
#[derive(Debug, Default)]
pub struct SseEventParser {
    buffer: String,
}

impl SseEventParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the response body; returns the payloads of every
    /// event completed by this chunk, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        // Normalize CRLF once so boundary detection only deals with \n\n.
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut payloads = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let event = self.buffer[..boundary].to_string();
            self.buffer.drain(..boundary + 2);

            if let Some(payload) = parse_event(&event) {
                payloads.push(payload);
            }
        }
        payloads
    }
}

/// Extract the data payload of a single event block.
///
/// Returns `None` when the event carries no `data:` field (heartbeats,
/// comments, retry hints).
pub fn parse_event(event: &str) -> Option<String> {
    let mut data_lines: Vec<&str> = Vec::new();

    for line in event.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
        // "event:", "id:", "retry:" and comment lines (":") are ignored.
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(data_lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_data_line() {
        let mut parser = SseEventParser::new();
        let events = parser.feed("data: {\"jsonrpc\":\"2.0\",\"result\":{},\"id\":1}\n\n");
        assert_eq!(events, vec![r#"{"jsonrpc":"2.0","result":{},"id":1}"#]);
    }

    #[test]
    fn test_multi_data_lines_concatenate() {
        let mut parser = SseEventParser::new();
        let events = parser.feed("data: line1\ndata: line2\n\n");
        assert_eq!(events, vec!["line1\nline2"]);
    }

    #[test]
    fn test_leading_space_stripped_once() {
        // Only a single space after the colon is stripped
        assert_eq!(parse_event("data:  two spaces").as_deref(), Some(" two spaces"));
        assert_eq!(parse_event("data:none").as_deref(), Some("none"));
    }

    #[test]
    fn test_event_and_id_fields_ignored() {
        let mut parser = SseEventParser::new();
        let events = parser.feed("event: message\nid: 42\ndata: payload\n\n");
        assert_eq!(events, vec!["payload"]);
    }

    #[test]
    fn test_event_without_data_dropped() {
        let mut parser = SseEventParser::new();
        let events = parser.feed("event: heartbeat\n\n: comment\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_split_across_chunks() {
        let mut parser = SseEventParser::new();
        assert!(parser.feed("data: par").is_empty());
        assert!(parser.feed("tial").is_empty());
        let events = parser.feed("\n\n");
        assert_eq!(events, vec!["partial"]);
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut parser = SseEventParser::new();
        let events = parser.feed("data: a\n\ndata: b\n\n");
        assert_eq!(events, vec!["a", "b"]);
    }

    #[test]
    fn test_crlf_boundaries() {
        let mut parser = SseEventParser::new();
        let events = parser.feed("data: a\r\n\r\n");
        assert_eq!(events, vec!["a"]);
    }
}
