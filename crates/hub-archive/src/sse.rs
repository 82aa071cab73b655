//! Incremental server-sent events parser
//!
//! Bytes arrive in arbitrary chunks; only complete lines are interpreted.
//! A blank line dispatches the pending event.

/// One dispatched event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name, `message` when the stream did not name it
    pub event: String,
    /// Data lines joined with `\n`
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the events it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }
        events
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            return Some(SseEvent {
                event: self.event.take().unwrap_or_else(|| "message".to_string()),
                data: std::mem::take(&mut self.data).join("\n"),
            });
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {} // id, retry
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: px1000\ndata: {\"items\":[]}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "px1000".into(),
                data: "{\"items\":[]}".into()
            }]
        );
    }

    #[test]
    fn test_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: de").is_empty());
        assert!(parser.feed(b"mo\r\ndata: a\r\n").is_empty());
        let events = parser.feed(b"data: b\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "demo");
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn test_comments_and_defaults() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keepalive\n\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
    }
}
