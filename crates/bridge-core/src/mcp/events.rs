//! Incremental server-sent-events parsing
//!
//! Feeds arbitrary byte chunks, emits completed events. Only the fields the
//! bridge consumes (`event`, `data`, `id`) are tracked; `retry` and unknown
//! fields are skipped.

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; "message" when the stream did not set one
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Stateful line-oriented SSE parser
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the stream; returns every event it completed
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline);
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
            // comment, typically a keep-alive
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    /// Dispatch on blank line; without buffered data nothing is emitted
    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self
                .event
                .take()
                .unwrap_or_else(|| "message".to_string()),
            data: self.data.drain(..).collect::<Vec<_>>().join("\n"),
            // the last seen id carries over to later events
            id: self.id.clone(),
        })
    }
}
