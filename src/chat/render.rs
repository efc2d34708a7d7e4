//! Render events emitted while a turn streams, and the word buffer that
//! paces them.

use tokio::sync::mpsc::UnboundedSender;

use super::session::Turn;

/// Appended to partial renders to show the answer is still streaming.
pub const CURSOR: &str = "▌";

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// A transcript entry to display.
    Message(Turn),
    /// Retrieval has started.
    Searching,
    /// Everything flushed so far, followed by [`CURSOR`].
    Partial(String),
    /// The complete answer.
    Final(String),
}

/// Receives the events of a turn, in order.
pub trait RenderSink {
    fn on_event(&mut self, event: RenderEvent);
}

impl RenderSink for Vec<RenderEvent> {
    fn on_event(&mut self, event: RenderEvent) {
        self.push(event);
    }
}

/// Forwards events to an async observer. A closed receiver drops them.
impl RenderSink for UnboundedSender<RenderEvent> {
    fn on_event(&mut self, event: RenderEvent) {
        let _ = self.send(event);
    }
}

/// Accumulates streamed characters and releases them a word at a time.
///
/// A word ends at a space or newline; the delimiter stays with the word.
#[derive(Debug, Default)]
pub struct WordBuffer {
    flushed: String,
    word: String,
}

impl WordBuffer {
    /// Adds one character; returns `true` when it completed a word.
    pub fn push(&mut self, ch: char) -> bool {
        self.word.push(ch);
        if ch == ' ' || ch == '\n' {
            self.flushed.push_str(&self.word);
            self.word.clear();
            true
        } else {
            false
        }
    }

    pub fn with_cursor(&self) -> String {
        format!("{}{CURSOR}", self.flushed)
    }

    /// Flushes the trailing partial word and returns the whole text.
    pub fn finish(mut self) -> String {
        self.flushed.push_str(&self.word);
        self.flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(fragments: &[&str]) -> (Vec<String>, String) {
        let mut buffer = WordBuffer::default();
        let mut partials = Vec::new();
        for fragment in fragments {
            for ch in fragment.chars() {
                if buffer.push(ch) {
                    partials.push(buffer.with_cursor());
                }
            }
        }
        (partials, buffer.finish())
    }

    #[test]
    fn test_flushes_on_word_boundaries() {
        let (partials, answer) = feed(&["Hel", "lo wor", "ld"]);
        assert_eq!(partials, vec!["Hello ▌"]);
        assert_eq!(answer, "Hello world");
    }

    #[test]
    fn test_newline_is_a_boundary() {
        let (partials, answer) = feed(&["one\ntwo three"]);
        assert_eq!(partials, vec!["one\n▌", "one\ntwo ▌"]);
        assert_eq!(answer, "one\ntwo three");
    }

    #[test]
    fn test_lossless_for_every_split() {
        let text = "Page 2 covers the revenue table.\nSee also page 5 ";
        let chars: Vec<char> = text.chars().collect();
        for cut_a in 0..=chars.len() {
            for cut_b in cut_a..=chars.len() {
                let a: String = chars[..cut_a].iter().collect();
                let b: String = chars[cut_a..cut_b].iter().collect();
                let c: String = chars[cut_b..].iter().collect();
                let (partials, answer) = feed(&[a.as_str(), "", b.as_str(), c.as_str()]);
                assert_eq!(answer, text);
                for pair in partials.windows(2) {
                    let prev = pair[0].strip_suffix(CURSOR).unwrap();
                    assert!(pair[1].starts_with(prev));
                }
            }
        }
    }

    #[test]
    fn test_empty_stream() {
        let (partials, answer) = feed(&[]);
        assert!(partials.is_empty());
        assert_eq!(answer, "");
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.on_event(RenderEvent::Searching);
        tx.on_event(RenderEvent::Final("done".into()));
        drop(tx);

        assert_eq!(rx.recv().await, Some(RenderEvent::Searching));
        assert_eq!(rx.recv().await, Some(RenderEvent::Final("done".into())));
        assert_eq!(rx.recv().await, None);
    }
}
