use std::collections::HashMap;
use std::sync::Mutex;

/// The three channels a stream buffer key distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Response,
    Thinking,
    Tool,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Channel::Response => "response",
            Channel::Thinking => "thinking",
            Channel::Tool => "tool",
        }
    }
}

fn key(user: &str, chat: &str, channel: Channel) -> String {
    format!("{}:{}:{}", user, chat, channel.as_str())
}

/// Tracks per-`(user, chat, channel)` cumulative content and yields
/// incremental deltas as the content grows.
#[derive(Default)]
pub struct StreamBuffer {
    buffers: Mutex<HashMap<String, String>>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(delta, is_first)`:
    /// - no existing buffer → buffer seeded with `content`, `(Some(content), true)`.
    /// - unchanged content → `(None, false)`.
    /// - content extends the buffer → the suffix delta, `(Some(suffix), false)`.
    /// - content is shorter (a restart) → the whole new content, `(Some(content), false)`.
    pub fn get_delta(&self, user: &str, chat: &str, channel: Channel, content: &str) -> (Option<String>, bool) {
        let k = key(user, chat, channel);
        let mut buffers = self.buffers.lock().expect("lock poisoned");

        match buffers.get(&k) {
            None => {
                buffers.insert(k, content.to_string());
                (Some(content.to_string()), true)
            }
            Some(existing) if existing == content => (None, false),
            Some(existing) if content.len() > existing.len() && content.starts_with(existing.as_str()) => {
                let delta = content[existing.len()..].to_string();
                buffers.insert(k, content.to_string());
                (Some(delta), false)
            }
            Some(_) => {
                buffers.insert(k, content.to_string());
                (Some(content.to_string()), false)
            }
        }
    }

    /// Drops the buffer for one channel, or every channel for `(user, chat)`
    /// when `channel` is `None`.
    pub fn clear(&self, user: &str, chat: &str, channel: Option<Channel>) {
        let mut buffers = self.buffers.lock().expect("lock poisoned");
        match channel {
            Some(c) => {
                buffers.remove(&key(user, chat, c));
            }
            None => {
                let prefix = format!("{}:{}:", user, chat);
                buffers.retain(|k, _| !k.starts_with(&prefix));
            }
        }
    }

    pub fn reset_all(&self) {
        self.buffers.lock().expect("lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_seeds_buffer_and_reports_first() {
        let buf = StreamBuffer::new();
        let (delta, first) = buf.get_delta("alice", "c1", Channel::Response, "Hi ");
        assert_eq!(delta.as_deref(), Some("Hi "));
        assert!(first);
    }

    #[test]
    fn growing_content_yields_suffix_delta_and_sums_to_final() {
        let buf = StreamBuffer::new();
        let mut deltas = Vec::new();
        for chunk in ["Hi ", "Hi Al", "Hi Alice"] {
            let (delta, _) = buf.get_delta("alice", "c1", Channel::Response, chunk);
            if let Some(d) = delta {
                deltas.push(d);
            }
        }
        assert_eq!(deltas.concat(), "Hi Alice");
    }

    #[test]
    fn unchanged_content_yields_no_delta() {
        let buf = StreamBuffer::new();
        buf.get_delta("alice", "c1", Channel::Response, "Hi");
        let (delta, first) = buf.get_delta("alice", "c1", Channel::Response, "Hi");
        assert!(delta.is_none());
        assert!(!first);
    }

    #[test]
    fn shorter_content_is_treated_as_a_restart() {
        let buf = StreamBuffer::new();
        buf.get_delta("alice", "c1", Channel::Response, "Hi Alice");
        let (delta, first) = buf.get_delta("alice", "c1", Channel::Response, "Re");
        assert_eq!(delta.as_deref(), Some("Re"));
        assert!(!first);
    }

    #[test]
    fn clear_one_channel_leaves_others_intact() {
        let buf = StreamBuffer::new();
        buf.get_delta("alice", "c1", Channel::Response, "Hi");
        buf.get_delta("alice", "c1", Channel::Thinking, "thought");
        buf.clear("alice", "c1", Some(Channel::Response));
        let (delta, first) = buf.get_delta("alice", "c1", Channel::Response, "Hi");
        assert!(first);
        let (delta2, first2) = buf.get_delta("alice", "c1", Channel::Thinking, "thought");
        assert!(delta2.is_none());
        assert!(!first2);
        let _ = delta;
    }

    #[test]
    fn clear_without_channel_drops_all_channels_for_the_chat() {
        let buf = StreamBuffer::new();
        buf.get_delta("alice", "c1", Channel::Response, "Hi");
        buf.get_delta("alice", "c1", Channel::Thinking, "thought");
        buf.get_delta("bob", "c1", Channel::Response, "Unrelated");
        buf.clear("alice", "c1", None);
        let (_, first) = buf.get_delta("alice", "c1", Channel::Response, "Hi");
        assert!(first);
        let (delta, first) = buf.get_delta("bob", "c1", Channel::Response, "Unrelated");
        assert!(delta.is_none());
        assert!(!first);
    }
}
