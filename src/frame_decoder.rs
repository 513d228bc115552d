//! Decoding of line-delimited backend streams into [`Delta`]s.

use futures_util::{Stream, StreamExt};
use memchr::memchr;
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use crate::{Delta, Error};

/// Default limit for a single frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_000_000;

/// Record shape carried by each line of a backend stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// `{"message": {"content": ...}}`
    MessageContent,
    /// `{"choices": [{"delta": {"content": ...}}]}`
    ChoicesDelta,
    /// `{"type": "content_block_delta", "delta": {"text": ...}}`
    ContentBlockDelta,
}

#[derive(Deserialize)]
struct MessageContentFrame {
    message: Option<FrameMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct FrameMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChoicesDeltaFrame {
    choices: Vec<FrameChoice>,
}

#[derive(Deserialize)]
struct FrameChoice {
    #[serde(default)]
    delta: Option<FrameChoiceDelta>,
}

#[derive(Deserialize)]
struct FrameChoiceDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlockFrame {
    r#type: String,
    #[serde(default)]
    delta: Option<ContentBlockDelta>,
    #[serde(default)]
    error: Option<ContentBlockError>,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlockError {
    message: String,
}

impl FrameFormat {
    /// Decode one complete line. `None` means the line carries nothing to report.
    fn decode_record(&self, payload: &str) -> Option<Delta> {
        match self {
            FrameFormat::MessageContent => {
                match serde_json::from_str::<MessageContentFrame>(payload) {
                    Ok(MessageContentFrame {
                        error: Some(error), ..
                    }) => Some(Delta::error(format!("backend reported: {error}"))),
                    Ok(MessageContentFrame {
                        message: Some(message),
                        ..
                    }) => Some(Delta::token(message.content)),
                    Ok(_) => Some(Delta::error("frame has no message field")),
                    Err(e) => Some(Delta::error(format!("invalid frame: {e}"))),
                }
            }
            FrameFormat::ChoicesDelta => match serde_json::from_str::<ChoicesDeltaFrame>(payload) {
                Ok(frame) => {
                    let text = frame
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta)
                        .and_then(|delta| delta.content)
                        .unwrap_or_default();
                    Some(Delta::token(text))
                }
                Err(e) => Some(Delta::error(format!("invalid frame: {e}"))),
            },
            FrameFormat::ContentBlockDelta => {
                match serde_json::from_str::<ContentBlockFrame>(payload) {
                    Ok(frame) => match frame.r#type.as_str() {
                        "content_block_delta" => Some(Delta::token(
                            frame.delta.and_then(|delta| delta.text).unwrap_or_default(),
                        )),
                        "error" => Some(Delta::error(format!(
                            "backend reported: {}",
                            frame
                                .error
                                .map(|error| error.message)
                                .unwrap_or_else(|| "unknown error".to_string())
                        ))),
                        // message_start, ping, content_block_stop, ...
                        _ => None,
                    },
                    Err(e) => Some(Delta::error(format!("invalid frame: {e}"))),
                }
            }
        }
    }
}

/// Incremental decoder for one backend stream.
///
/// Bytes are buffered until a newline completes a frame, so frames and
/// multi-byte characters may be split across chunks at any offset.
#[derive(Debug)]
pub struct FrameDecoder {
    format: FrameFormat,
    /// Bytes of the incomplete trailing line
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    /// Dropping the rest of an oversized line up to its newline.
    discarding: bool,
    finished: bool,
}

impl FrameDecoder {
    pub fn new(format: FrameFormat) -> Self {
        Self::with_max_frame_bytes(format, DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(format: FrameFormat, max_frame_bytes: usize) -> Self {
        Self {
            format,
            buffer: Vec::new(),
            max_frame_bytes,
            discarding: false,
            finished: false,
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Feed one raw chunk and decode every line it completes.
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> Vec<Delta> {
        let mut deltas = Vec::new();
        if self.finished {
            return deltas;
        }

        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(pos) = memchr(b'\n', &self.buffer[start..]) {
            let line_end = start + pos;
            if self.discarding {
                self.discarding = false;
            } else if line_end - start > self.max_frame_bytes {
                deltas.push(self.oversized());
            } else if let Some(delta) = self.decode_line(&self.buffer[start..line_end]) {
                deltas.push(delta);
            }
            start = line_end + 1;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        // Same limit as a completed line, so the result never depends on chunking.
        if self.buffer.len() > self.max_frame_bytes {
            self.buffer.clear();
            if !self.discarding {
                self.discarding = true;
                deltas.push(self.oversized());
            }
        }

        deltas
    }

    fn oversized(&self) -> Delta {
        Delta::error(format!("frame exceeded {} bytes", self.max_frame_bytes))
    }

    /// Flush the trailing line (if any) and emit the final [`Delta::End`].
    pub fn finish(&mut self) -> Vec<Delta> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut deltas = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        if !self.discarding {
            if let Some(delta) = self.decode_line(&rest) {
                deltas.push(delta);
            }
        }
        deltas.push(Delta::End);
        deltas
    }

    fn decode_line(&self, line: &[u8]) -> Option<Delta> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        let text = match std::str::from_utf8(line) {
            Ok(text) => text.trim(),
            Err(e) => return Some(Delta::error(format!("invalid UTF-8 in frame: {e}"))),
        };

        if text.is_empty() || text.starts_with(':') || text.starts_with("event:") {
            return None;
        }

        let payload = match text.strip_prefix("data:") {
            Some(data) => data.trim_start(),
            None => text,
        };
        if payload.is_empty() || payload == "[DONE]" {
            return None;
        }

        self.format.decode_record(payload)
    }
}

/// A stream adapter that decodes a backend byte stream into deltas.
///
/// Yields `Err` only for transport failures of the underlying stream; bad
/// frames come through as [`Delta::Error`]. Ends after yielding [`Delta::End`].
pub struct FrameStream<S> {
    /// The underlying byte stream
    inner: S,
    decoder: FrameDecoder,
    /// Decoded deltas ready to be yielded
    deltas: VecDeque<Delta>,
    done: bool,
}

impl<S> FrameStream<S> {
    pub fn new(stream: S, decoder: FrameDecoder) -> Self {
        Self {
            inner: stream,
            decoder,
            deltas: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, B> Stream for FrameStream<S>
where
    S: Stream<Item = Result<B, Error>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<Delta, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(delta) = self.deltas.pop_front() {
                return Poll::Ready(Some(Ok(delta)));
            }

            if self.done {
                return Poll::Ready(None);
            }

            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    let deltas = self.decoder.decode_chunk(chunk.as_ref());
                    self.deltas.extend(deltas);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    self.done = true;
                    let deltas = self.decoder.finish();
                    self.deltas.extend(deltas);
                }
            }
        }
    }
}

/// Extension trait to add frame decoding to byte streams.
pub trait FrameStreamExt: Stream {
    /// Decode this byte stream with the given decoder.
    fn frames(self, decoder: FrameDecoder) -> FrameStream<Self>
    where
        Self: Sized,
    {
        FrameStream::new(self, decoder)
    }
}

impl<S: Stream> FrameStreamExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn decode_all<C: AsRef<[u8]>>(format: FrameFormat, chunks: &[C]) -> Vec<Delta> {
        let mut decoder = FrameDecoder::new(format);
        let mut deltas = Vec::new();
        for chunk in chunks {
            deltas.extend(decoder.decode_chunk(chunk.as_ref()));
        }
        deltas.extend(decoder.finish());
        deltas
    }

    #[test]
    fn test_single_local_frame() {
        let deltas = decode_all(
            FrameFormat::MessageContent,
            &[b"{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"}}\n"],
        );
        assert_eq!(deltas, vec![Delta::token("Hel"), Delta::End]);
    }

    #[test]
    fn test_hosted_frame_matches_local_frame() {
        let local = decode_all(
            FrameFormat::MessageContent,
            &[b"{\"message\":{\"content\":\"Hi\"}}\n"],
        );
        let hosted = decode_all(
            FrameFormat::ChoicesDelta,
            &[b"{\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n"],
        );
        assert_eq!(local, hosted);
        assert_eq!(hosted[0], Delta::token("Hi"));
    }

    #[test]
    fn test_sse_framing_is_tolerated() {
        let payload = b": keep-alive\n\
            data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
            data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
            data: [DONE]\n\n";
        let deltas = decode_all(FrameFormat::ChoicesDelta, &[payload]);
        assert_eq!(
            deltas,
            vec![Delta::token(""), Delta::token("Hi"), Delta::End]
        );
    }

    #[test]
    fn test_content_block_frames() {
        let payload = b"event: message_start\n\
            data: {\"type\":\"message_start\",\"message\":{}}\n\n\
            event: ping\n\
            data: {\"type\": \"ping\"}\n\n\
            event: content_block_delta\n\
            data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n\
            event: message_stop\n\
            data: {\"type\":\"message_stop\"}\n\n";
        let deltas = decode_all(FrameFormat::ContentBlockDelta, &[payload]);
        assert_eq!(deltas, vec![Delta::token("Hi"), Delta::End]);

        let error = decode_all(
            FrameFormat::ContentBlockDelta,
            &[b"data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n"],
        );
        assert_eq!(error, vec![Delta::error("backend reported: Overloaded"), Delta::End]);
    }

    #[test]
    fn test_malformed_line_does_not_stop_decoding() {
        let payload = b"{\"message\":{\"content\":\"a\"}}\nnot json\n{\"message\":{\"content\":\"b\"}}\n";
        let deltas = decode_all(FrameFormat::MessageContent, &[payload]);
        assert_eq!(deltas.len(), 4);
        assert_eq!(deltas[0], Delta::token("a"));
        assert!(matches!(deltas[1], Delta::Error { .. }));
        assert_eq!(deltas[2], Delta::token("b"));
        assert_eq!(deltas[3], Delta::End);
    }

    #[test]
    fn test_local_error_field_is_a_decode_error() {
        let deltas = decode_all(
            FrameFormat::MessageContent,
            &[b"{\"error\":\"model 'nope' not found\"}\n"],
        );
        assert_eq!(
            deltas[0],
            Delta::error("backend reported: model 'nope' not found")
        );
    }

    #[test]
    fn test_unterminated_last_line_is_flushed_on_finish() {
        let mut decoder = FrameDecoder::new(FrameFormat::MessageContent);
        assert!(decoder
            .decode_chunk(b"{\"message\":{\"content\":\"tail\"}}")
            .is_empty());
        assert_eq!(decoder.finish(), vec![Delta::token("tail"), Delta::End]);
        // Nothing after the end
        assert!(decoder.finish().is_empty());
        assert!(decoder.decode_chunk(b"{\"message\":{\"content\":\"x\"}}\n").is_empty());
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let payload = "{\"message\":{\"content\":\"Hel\"}}\r\n\
            {\"message\":{\"content\":\"lo \u{20ac}\u{1f600}\"}}\n\
            garbage\n\
            {\"message\":{\"content\":\"!\"}}\n"
            .as_bytes();
        let expected = decode_all(FrameFormat::MessageContent, &[payload]);
        assert_eq!(expected.len(), 5);

        for split in 0..=payload.len() {
            let (head, tail) = payload.split_at(split);
            let deltas = decode_all(FrameFormat::MessageContent, &[head, tail]);
            assert_eq!(deltas, expected, "split at byte {split}");
        }

        for first in 0..payload.len() {
            for second in first..payload.len() {
                let deltas = decode_all(
                    FrameFormat::MessageContent,
                    &[
                        &payload[..first],
                        &payload[first..second],
                        &payload[second..],
                    ],
                );
                assert_eq!(deltas, expected, "splits at {first} and {second}");
            }
        }

        // A line over the limit is rejected however it is split.
        let payload = b"{\"message\":{\"content\":\"abcdef\"}}\n{\"message\":{\"content\":\"ok\"}}\n";
        let expected = vec![
            Delta::error("frame exceeded 30 bytes"),
            Delta::token("ok"),
            Delta::End,
        ];
        for split in 0..=payload.len() {
            let (head, tail) = payload.split_at(split);
            let mut decoder = FrameDecoder::with_max_frame_bytes(FrameFormat::MessageContent, 30);
            let mut deltas = decoder.decode_chunk(head);
            deltas.extend(decoder.decode_chunk(tail));
            deltas.extend(decoder.finish());
            assert_eq!(deltas, expected, "limited decoder split at byte {split}");
        }
    }

    #[test]
    fn test_oversized_frame_is_discarded() {
        let mut decoder = FrameDecoder::with_max_frame_bytes(FrameFormat::MessageContent, 30);
        let deltas = decoder.decode_chunk(&[b'x'; 40]);
        assert_eq!(deltas, vec![Delta::error("frame exceeded 30 bytes")]);

        // The rest of the oversized line is dropped, the next line decodes.
        let deltas = decoder.decode_chunk(b"xxxxxxxx\n{\"message\":{\"content\":\"ok\"}}\n");
        assert_eq!(deltas, vec![Delta::token("ok")]);
        assert_eq!(decoder.finish(), vec![Delta::End]);
    }

    #[tokio::test]
    async fn test_frame_stream_utf8_boundary() {
        // Euro symbol is 3 bytes in UTF-8: E2 82 AC
        let euro = "€".as_bytes();
        let chunks: Vec<Result<bytes::Bytes, Error>> = vec![
            Ok(bytes::Bytes::from(
                [b"{\"message\":{\"content\":\"Price: ".as_slice(), &euro[..2]].concat(),
            )),
            Ok(bytes::Bytes::from([&euro[2..], b"100\"}}\n".as_slice()].concat())),
        ];

        let mut frames = stream::iter(chunks).frames(FrameDecoder::new(FrameFormat::MessageContent));

        let delta = frames.next().await.unwrap().unwrap();
        assert_eq!(delta, Delta::token("Price: €100"));
        assert_eq!(frames.next().await.unwrap().unwrap(), Delta::End);
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_frame_stream_surfaces_transport_error() {
        let chunks: Vec<Result<bytes::Bytes, Error>> = vec![
            Ok(bytes::Bytes::from("{\"message\":{\"content\":\"a\"}}\n")),
            Err(Error::unavailable("local", "connection reset")),
        ];

        let mut frames = stream::iter(chunks).frames(FrameDecoder::new(FrameFormat::MessageContent));

        assert_eq!(frames.next().await.unwrap().unwrap(), Delta::token("a"));
        assert!(matches!(
            frames.next().await.unwrap(),
            Err(Error::BackendUnavailable { .. })
        ));
        assert!(frames.next().await.is_none());
    }
}
