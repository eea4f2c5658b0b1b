//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; lines are cut on `\n` (with an optional
//! preceding `\r`) and events are dispatched on a blank line.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Last `id:` seen on the stream.
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this is a default-typed event carrying a feed payload.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    event: Option<String>,
    last_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            // `retry` and unknown fields are ignored; reconnect timing is configured locally.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseEvent {
            event,
            data,
            id: self.last_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event_in_one_chunk() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"data: [1,2]\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "[1,2]");
        assert!(events[0].is_message());
    }

    #[test]
    fn event_split_across_chunks() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"da").is_empty());
        assert!(dec.push(b"ta: [{\"nick\"").is_empty());
        assert!(dec.push(b":\"a\"}]\n").is_empty());
        let events = dec.push(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "[{\"nick\":\"a\"}]");
    }

    #[test]
    fn multi_line_data_joined_with_newline() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"data: [\ndata: 1]\n\n");
        assert_eq!(events[0].data, "[\n1]");
    }

    #[test]
    fn crlf_line_endings() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"data: []\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "[]");
    }

    #[test]
    fn comments_and_retry_are_ignored() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b": keep-alive\nretry: 1000\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn named_events_are_not_messages() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"event: ping\ndata: {}\n\nevent: message\ndata: []\n\n");
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_message());
        assert!(events[1].is_message());
    }

    #[test]
    fn event_type_resets_after_dispatch() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"event: ping\ndata: x\n\ndata: y\n\n");
        assert_eq!(events[1].event, None);
    }

    #[test]
    fn id_persists_across_events() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"id: 7\ndata: a\n\ndata: b\n\n");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[1].id.as_deref(), Some("7"));
    }

    #[test]
    fn multibyte_utf8_split_across_chunks() {
        let mut dec = SseDecoder::new();
        let bytes = "data: \"héllo\"\n\n".as_bytes();
        // Split inside the two-byte 'é'.
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(dec.push(&bytes[..split]).is_empty());
        let events = dec.push(&bytes[split..]);
        assert_eq!(events[0].data, "\"héllo\"");
    }

    #[test]
    fn value_without_space_after_colon() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"data:[]\n\n");
        assert_eq!(events[0].data, "[]");
    }
}
