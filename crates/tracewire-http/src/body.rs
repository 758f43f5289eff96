//! Body capture and replay
//!
//! Request bodies are read in full, snapshotted and handed to the inner
//! service again as a [`ReplayBody`]. Response bodies are wrapped in a
//! [`CaptureBody`] that forwards every frame unchanged while copying data
//! into a bounded [`BodySnapshot`].

use crate::exchange::ResponseCapture;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Appended to a snapshot that was cut at the capture limit
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// A bounded copy of body bytes
///
/// Keeps at most `limit` bytes but counts everything pushed, so it knows
/// whether it was truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodySnapshot {
    bytes: Vec<u8>,
    limit: usize,
    seen: u64,
}

impl BodySnapshot {
    /// Create an empty snapshot
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            seen: 0,
        }
    }

    /// Snapshot a complete buffer
    pub fn of(bytes: &[u8], limit: usize) -> Self {
        let mut snapshot = Self::new(limit);
        snapshot.push(bytes);
        snapshot
    }

    /// Append a chunk, keeping only what fits
    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        let take = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..take]);
        self.seen += chunk.len() as u64;
    }

    /// Bytes kept
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total bytes pushed, kept or not
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Check if nothing was pushed
    pub fn is_empty(&self) -> bool {
        self.seen == 0
    }

    /// Check if bytes were dropped
    pub fn is_truncated(&self) -> bool {
        self.seen > self.bytes.len() as u64
    }

    /// Count bytes that were never pushed, e.g. when the snapshot was taken
    /// from a rewritten copy of a longer body
    pub(crate) fn covering(mut self, total: u64) -> Self {
        self.seen = self.seen.max(total);
        self
    }

    /// Render as text, with [`TRUNCATION_MARKER`] when bytes were dropped
    ///
    /// Invalid UTF-8 is replaced rather than rejected. The text before the
    /// marker never exceeds the limit.
    pub fn render(&self) -> String {
        let bytes = if self.is_truncated() {
            without_partial_char(&self.bytes)
        } else {
            &self.bytes
        };

        let mut text = String::from_utf8_lossy(bytes).into_owned();
        let mut cut = false;
        if text.len() > self.limit {
            // Replacement characters can outgrow the bytes they stand for.
            let mut end = self.limit;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
            cut = true;
        }

        if cut || self.is_truncated() {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Drop a multi-byte character cut off at the end of the buffer
fn without_partial_char(bytes: &[u8]) -> &[u8] {
    match std::str::from_utf8(bytes) {
        Err(err) if err.error_len().is_none() => &bytes[..err.valid_up_to()],
        _ => bytes,
    }
}

pin_project! {
    /// Request body handed to the inner service
    ///
    /// Either the buffered bytes read for capture, or the original body when
    /// nothing was captured.
    pub struct ReplayBody<B>
    where
        B: Body,
    {
        #[pin]
        kind: Kind<B>,
    }
}

pin_project! {
    #[project = KindProj]
    enum Kind<B>
    where
        B: Body,
    {
        // Bytes read up front, then the read error or trailers if any
        Replayed {
            data: Option<Bytes>,
            error: Option<B::Error>,
            trailers: Option<HeaderMap>,
        },
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

impl<B: Body> ReplayBody<B> {
    /// Wrap a body without reading it
    pub fn passthrough(inner: B) -> Self {
        Self {
            kind: Kind::Passthrough { inner },
        }
    }

    pub(crate) fn replayed(
        data: Bytes,
        error: Option<B::Error>,
        trailers: Option<HeaderMap>,
    ) -> Self {
        Self {
            kind: Kind::Replayed {
                data: (!data.is_empty()).then_some(data),
                error,
                trailers,
            },
        }
    }

    /// Check if the body was buffered for capture
    pub fn is_replayed(&self) -> bool {
        matches!(self.kind, Kind::Replayed { .. })
    }
}

impl<B: Body> Body for ReplayBody<B> {
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project().kind.project() {
            KindProj::Replayed {
                data,
                error,
                trailers,
            } => {
                if let Some(data) = data.take() {
                    return Poll::Ready(Some(Ok(Frame::data(data))));
                }
                // A read failure surfaces where the stream broke off.
                if let Some(err) = error.take() {
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(trailers.take().map(|t| Ok(Frame::trailers(t))))
            }
            KindProj::Passthrough { inner } => {
                let frame = ready!(inner.poll_frame(cx));
                Poll::Ready(frame.map(|result| result.map(|frame| frame.map_data(into_bytes))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Replayed {
                data,
                error,
                trailers,
            } => data.is_none() && error.is_none() && trailers.is_none(),
            Kind::Passthrough { inner } => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Replayed {
                data, error: None, ..
            } => SizeHint::with_exact(data.as_ref().map_or(0, |d| d.len() as u64)),
            Kind::Replayed { .. } => SizeHint::default(),
            Kind::Passthrough { inner } => inner.size_hint(),
        }
    }
}

/// Read a request body in full
///
/// Returns the replay body and, when the read succeeded, the bytes read.
pub(crate) async fn buffer<B: Body>(body: B) -> (ReplayBody<B>, Option<Bytes>) {
    let mut body = std::pin::pin!(body);
    let mut collected = BytesMut::new();
    let mut trailers: Option<HeaderMap> = None;
    let mut error = None;

    while let Some(frame) = body.as_mut().frame().await {
        match frame {
            Ok(frame) => match frame.into_data() {
                Ok(data) => collected.put(data),
                Err(frame) => {
                    if let Ok(t) = frame.into_trailers() {
                        trailers.get_or_insert_with(HeaderMap::new).extend(t);
                    }
                }
            },
            Err(err) => {
                error = Some(err);
                break;
            }
        }
    }

    let data = collected.freeze();
    let captured = error.is_none().then(|| data.clone());
    (ReplayBody::replayed(data, error, trailers), captured)
}

pin_project! {
    /// Response body that records what passes through it
    ///
    /// The exchange completes when the stream ends or, failing that, when
    /// the body is dropped.
    pub struct CaptureBody<B> {
        #[pin]
        inner: B,
        capture: Option<ResponseCapture>,
    }
}

impl<B> CaptureBody<B> {
    pub(crate) fn new(inner: B, capture: ResponseCapture) -> Self {
        Self {
            inner,
            capture: Some(capture),
        }
    }

    pub(crate) fn passthrough(inner: B) -> Self {
        Self {
            inner,
            capture: None,
        }
    }

    /// Check if the exchange is still waiting to complete
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }
}

impl<B: Body> Body for CaptureBody<B> {
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        let frame = match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => frame.map_data(into_bytes),
            Some(Err(err)) => return Poll::Ready(Some(Err(err))),
            None => {
                if let Some(capture) = this.capture.take() {
                    capture.finish();
                }
                return Poll::Ready(None);
            }
        };

        if let (Some(capture), Some(data)) = (this.capture.as_mut(), frame.data_ref()) {
            capture.record(data);
        }
        Poll::Ready(Some(Ok(frame)))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

fn into_bytes<D: Buf>(mut data: D) -> Bytes {
    data.copy_to_bytes(data.remaining())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{Full, StreamBody};
    use proptest::prelude::*;

    #[test]
    fn test_snapshot_within_limit() {
        let snapshot = BodySnapshot::of(b"hello", 10);

        assert!(!snapshot.is_truncated());
        assert_eq!(snapshot.render(), "hello");
    }

    #[test]
    fn test_snapshot_drops_split_character() {
        let rendered = BodySnapshot::of("éé".as_bytes(), 1).render();
        assert_eq!(rendered, TRUNCATION_MARKER);

        let rendered = BodySnapshot::of("aé€".as_bytes(), 4).render();
        assert_eq!(rendered, format!("aé{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_snapshot_replacement_characters_stay_within_limit() {
        let rendered = BodySnapshot::of(&[0xff, 0xfe, b'a'], 3).render();
        assert_eq!(rendered, format!("\u{fffd}{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_snapshot_covering_longer_body() {
        let snapshot = BodySnapshot::of(b"short", 10).covering(40);

        assert!(snapshot.is_truncated());
        assert_eq!(snapshot.render(), format!("short{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_snapshot_at_exact_limit() {
        let snapshot = BodySnapshot::of(b"hello", 5);

        assert!(!snapshot.is_truncated());
        assert_eq!(snapshot.render(), "hello");
    }

    #[test]
    fn test_snapshot_across_chunks() {
        let mut snapshot = BodySnapshot::new(6);
        snapshot.push(b"abcd");
        snapshot.push(b"efgh");
        snapshot.push(b"ij");

        assert_eq!(snapshot.as_bytes(), b"abcdef");
        assert_eq!(snapshot.seen(), 10);
        assert_eq!(snapshot.render(), "abcdef...[truncated]");
    }

    #[test]
    fn test_snapshot_zero_limit() {
        let snapshot = BodySnapshot::of(b"x", 0);
        assert_eq!(snapshot.render(), TRUNCATION_MARKER);
        assert!(BodySnapshot::new(0).is_empty());
    }

    #[tokio::test]
    async fn test_buffer_replays_all_bytes() {
        let body = Full::new(Bytes::from_static(b"{\"a\":1}"));
        let (replay, captured) = buffer(body).await;

        assert!(replay.is_replayed());
        assert_eq!(captured.as_deref(), Some(&b"{\"a\":1}"[..]));

        let replayed = replay.collect().await.unwrap().to_bytes();
        assert_eq!(&replayed[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_buffer_empty_body() {
        let (replay, captured) = buffer(Full::new(Bytes::new())).await;

        assert!(replay.is_end_stream());
        assert_eq!(captured, Some(Bytes::new()));
    }

    #[tokio::test]
    async fn test_buffer_read_error_is_replayed_after_data() {
        let chunks: Vec<Result<Frame<Bytes>, &'static str>> = vec![
            Ok(Frame::data(Bytes::from_static(b"part"))),
            Err("connection reset"),
        ];
        let body = StreamBody::new(futures_util::stream::iter(chunks));

        let (replay, captured) = buffer(body).await;
        assert!(captured.is_none());

        let mut replay = std::pin::pin!(replay);
        let first = replay.as_mut().frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"part"));
        assert_eq!(replay.as_mut().frame().await.unwrap().unwrap_err(), "connection reset");
        assert!(replay.as_mut().frame().await.is_none());
    }

    #[tokio::test]
    async fn test_passthrough_forwards() {
        let body: ReplayBody<Full<Bytes>> = ReplayBody::passthrough(Full::new(Bytes::from("abc")));
        assert!(!body.is_replayed());

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"abc");
    }

    #[tokio::test]
    async fn test_capture_body_passthrough_forwards() {
        let body = CaptureBody::passthrough(Full::new(Bytes::from("payload")));
        assert!(!body.is_capturing());

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"payload");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_snapshot_is_limit_plus_marker(
            limit in 0usize..2048,
            extra in 1usize..2048,
        ) {
            let body = vec![b'x'; limit + extra];
            let rendered = BodySnapshot::of(&body, limit).render();

            prop_assert_eq!(rendered.len(), limit + TRUNCATION_MARKER.len());
            prop_assert!(rendered.ends_with(TRUNCATION_MARKER));
            prop_assert!(rendered[..limit].bytes().all(|b| b == b'x'));
        }

        #[test]
        fn prop_snapshot_never_exceeds_limit(
            limit in 0usize..512,
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..128), 0..16),
        ) {
            let mut snapshot = BodySnapshot::new(limit);
            for chunk in &chunks {
                snapshot.push(chunk);
            }
            let total: usize = chunks.iter().map(Vec::len).sum();

            prop_assert!(snapshot.as_bytes().len() <= limit);
            prop_assert_eq!(snapshot.seen(), total as u64);
            prop_assert_eq!(snapshot.is_truncated(), total > limit);

            let rendered = snapshot.render();
            let text = rendered.strip_suffix(TRUNCATION_MARKER).unwrap_or(rendered.as_str());
            prop_assert!(text.len() <= limit);
        }

        #[test]
        fn prop_multibyte_text_never_exceeds_limit(
            limit in 0usize..64,
            text in "[a-zé€😀]{0,48}",
        ) {
            let rendered = BodySnapshot::of(text.as_bytes(), limit).render();
            let (kept, truncated) = match rendered.strip_suffix(TRUNCATION_MARKER) {
                Some(kept) => (kept, true),
                None => (rendered.as_str(), false),
            };

            prop_assert!(kept.len() <= limit);
            prop_assert!(text.starts_with(kept));
            prop_assert_eq!(truncated, text.len() > limit);
        }
    }
}
