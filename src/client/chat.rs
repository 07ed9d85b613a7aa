//! Decoder for the chat inference stream.
//!
//! The inference endpoint answers with newline-delimited records:
//!
//! ```text
//! convid:<conversation id>
//! c:<base64 UTF-8 content chunk>
//! ```
//!
//! Other lines are ignored. Records may be split across network reads, so
//! the decoder buffers bytes until a full line is available.

use std::collections::VecDeque;

use base64::Engine;
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::error::{GysError, Result};

/// Stream of decoded chat events.
pub type ChatStream = BoxStream<'static, Result<ChatEvent>>;

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Server-assigned conversation id.
    ConversationId(String),
    /// Next piece of assistant text.
    Content(String),
}

/// Incremental line decoder.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<ChatEvent>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line[..line.len() - 1])? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flush a trailing record that arrived without a final newline.
    pub fn finish(&mut self) -> Result<Option<ChatEvent>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Result<Option<ChatEvent>> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| GysError::Stream(format!("Invalid UTF-8 in stream line: {}", e)))?;
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return Ok(None);
    }

    if let Some(id) = line.strip_prefix("convid:") {
        return Ok(Some(ChatEvent::ConversationId(id.trim().to_string())));
    }
    if let Some(encoded) = line.strip_prefix("c:") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| GysError::Stream(format!("Invalid base64 content chunk: {}", e)))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| GysError::Stream(format!("Content chunk is not UTF-8: {}", e)))?;
        return Ok(Some(ChatEvent::Content(text)));
    }
    Ok(None)
}

struct DecodeState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: StreamDecoder,
    pending: VecDeque<ChatEvent>,
    done: bool,
}

/// Decode a byte stream into chat events. The stream ends after the first
/// error.
pub fn decode_stream<S, T, E>(bytes: S) -> ChatStream
where
    S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
    T: AsRef<[u8]> + Send + 'static,
    E: Into<GysError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: StreamDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok(event), st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => match st.decoder.push(chunk.as_ref()) {
                    Ok(events) => st.pending.extend(events),
                    Err(e) => {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                },
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.done = true;
                    match st.decoder.finish() {
                        Ok(event) => st.pending.extend(event),
                        Err(e) => return Some((Err(e), st)),
                    }
                }
            }
        }
    })
    .boxed()
}

/// Accumulated result of a chat exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReply {
    pub conversation_id: Option<String>,
    pub content: String,
}

impl ChatReply {
    /// Fold one event into the reply.
    pub fn apply(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::ConversationId(id) => self.conversation_id = Some(id),
            ChatEvent::Content(text) => self.content.push_str(&text),
        }
    }

    /// Drain a stream into a complete reply.
    pub async fn collect(mut stream: ChatStream) -> Result<Self> {
        let mut reply = Self::default();
        while let Some(event) = stream.next().await {
            reply.apply(event?);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn test_decoder_parses_records() {
        let mut decoder = StreamDecoder::new();
        let input = format!("convid:abc-123\nc:{}\nc:{}\n", b64("Hello, "), b64("world"));
        let events = decoder.push(input.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![
                ChatEvent::ConversationId("abc-123".into()),
                ChatEvent::Content("Hello, ".into()),
                ChatEvent::Content("world".into()),
            ]
        );
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = StreamDecoder::new();
        let line = format!("c:{}\n", b64("Selamat pagi ☀"));
        let (a, b) = line.as_bytes().split_at(5);
        assert!(decoder.push(a).unwrap().is_empty());
        assert_eq!(
            decoder.push(b).unwrap(),
            vec![ChatEvent::Content("Selamat pagi ☀".into())]
        );
    }

    #[test]
    fn test_decoder_ignores_unknown_and_blank_lines() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(b"\n   \nping:1\r\n").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_decoder_rejects_bad_base64() {
        let mut decoder = StreamDecoder::new();
        assert!(matches!(
            decoder.push(b"c:!!!not-base64\n"),
            Err(GysError::Stream(_))
        ));
    }

    #[test]
    fn test_finish_flushes_trailing_record() {
        let mut decoder = StreamDecoder::new();
        let tail = format!("c:{}", b64("tail"));
        assert!(decoder.push(tail.as_bytes()).unwrap().is_empty());
        assert_eq!(
            decoder.finish().unwrap(),
            Some(ChatEvent::Content("tail".into()))
        );
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[tokio::test]
    async fn test_decode_stream_collects_reply() {
        let payload = format!("convid:42\nc:{}\nc:{}", b64("Halo "), b64("GYS"));
        let bytes = payload.into_bytes();
        let chunks: Vec<std::result::Result<Vec<u8>, GysError>> =
            bytes.chunks(7).map(|c| Ok(c.to_vec())).collect();

        let reply = ChatReply::collect(decode_stream(futures::stream::iter(chunks)))
            .await
            .unwrap();
        assert_eq!(reply.conversation_id.as_deref(), Some("42"));
        assert_eq!(reply.content, "Halo GYS");
    }

    #[tokio::test]
    async fn test_decode_stream_stops_after_error() {
        let chunks: Vec<std::result::Result<Vec<u8>, GysError>> = vec![
            Ok(format!("c:{}\n", b64("ok")).into_bytes()),
            Err(GysError::Stream("connection reset".into())),
            Ok(format!("c:{}\n", b64("never")).into_bytes()),
        ];
        let events: Vec<Result<ChatEvent>> = decode_stream(futures::stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(ChatEvent::Content(ref s)) if s == "ok"));
        assert!(events[1].is_err());
    }
}
