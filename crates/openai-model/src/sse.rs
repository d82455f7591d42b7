use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Response;

use crate::Error;

/// Where the raw bytes of an event stream come from.
#[async_trait]
pub trait ByteSource: Send {
    /// Returns the next chunk, or `None` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error>;
}

#[async_trait]
impl ByteSource for Response {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        Ok(self.chunk().await?)
    }
}

#[cfg(test)]
#[async_trait]
impl ByteSource for std::collections::VecDeque<Bytes> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        Ok(self.pop_front())
    }
}

/// Reads the `data` payloads of a server-sent event stream.
///
/// Lines end with LF or CRLF. Comments and fields other than `data` are
/// skipped and several `data` lines of one event are joined with LF. An
/// event cut short by the end of the body is dropped.
pub struct EventStream {
    source: Box<dyn ByteSource>,
    buf: Vec<u8>,
    data: Option<String>,
    exhausted: bool,
}

impl EventStream {
    pub fn new<S: ByteSource + 'static>(source: S) -> Self {
        Self {
            source: Box::new(source),
            buf: Vec::new(),
            data: None,
            exhausted: false,
        }
    }

    /// Returns the payload of the next event that has one.
    pub async fn next_data(&mut self) -> Result<Option<String>, Error> {
        loop {
            while let Some(line) = self.take_line()? {
                if let Some(data) = self.feed_line(&line) {
                    return Ok(Some(data));
                }
            }
            if self.exhausted {
                if self.data.take().is_some() || !self.buf.is_empty() {
                    debug!("dropping an incomplete event at the end of the stream");
                    self.buf.clear();
                }
                return Ok(None);
            }
            match self.source.next_chunk().await? {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => self.exhausted = true,
            }
        }
    }

    // Lines are decoded whole, so characters split across chunks survive.
    fn take_line(&mut self) -> Result<Option<String>, Error> {
        let Some(end) = self.buf.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|_| Error::Stream("an event line is not valid UTF-8"))
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.data.take();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field != "data" {
            trace!("ignoring event field: {field}");
            return None;
        }
        match &mut self.data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => self.data = Some(value.to_owned()),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    fn stream_of(chunks: &[&[u8]]) -> EventStream {
        let chunks: VecDeque<Bytes> = chunks
            .iter()
            .map(|chunk| Bytes::copy_from_slice(chunk))
            .collect();
        EventStream::new(chunks)
    }

    async fn collect(mut stream: EventStream) -> Vec<String> {
        let mut payloads = vec![];
        while let Some(data) = stream.next_data().await.unwrap() {
            payloads.push(data);
        }
        payloads
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let stream = stream_of(&[
            b"data: {\"a\":1}\n\nda",
            b"ta: {\"b\"",
            b":2}\n",
            b"\ndata: [DONE]\n\n",
        ]);
        assert_eq!(collect(stream).await, [r#"{"a":1}"#, r#"{"b":2}"#, "[DONE]"]);
    }

    #[tokio::test]
    async fn test_comments_and_other_fields() {
        let stream = stream_of(&[
            b": keep-alive\n\nevent: chunk\nid: 7\ndata: {\"url\":\"http://x\"}\n\n",
            b"retry: 100\n\n",
        ]);
        assert_eq!(collect(stream).await, [r#"{"url":"http://x"}"#]);
    }

    #[tokio::test]
    async fn test_multi_line_data_and_crlf() {
        let stream = stream_of(&[b"data: first\r\ndata:second\r\n\r\n"]);
        assert_eq!(collect(stream).await, ["first\nsecond"]);
    }

    #[tokio::test]
    async fn test_character_split_across_chunks() {
        let text = "data: 東京\n\n".as_bytes();
        // Cut in the middle of the first three-byte character.
        let stream = stream_of(&[&text[..7], &text[7..]]);
        assert_eq!(collect(stream).await, ["東京"]);
    }

    #[tokio::test]
    async fn test_incomplete_event_dropped() {
        let mut stream = stream_of(&[b"data: one\n\ndata: two\n"]);
        assert_eq!(stream.next_data().await.unwrap().as_deref(), Some("one"));
        assert_eq!(stream.next_data().await.unwrap(), None);
        assert_eq!(stream.next_data().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let mut stream = stream_of(&[b"data: \xff\xfe\n\n"]);
        assert!(matches!(stream.next_data().await, Err(Error::Stream(_))));
    }
}
