//! services/api/src/delivery/streamer.rs
//!
//! Streams a finished archive to the client and deletes it once the response
//! ends, however it ends.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use super::archive::TempArchive;
use crate::error::ApiError;

/// Lifecycle of one streamed download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Created,
    Streaming,
    Completed,
    Failed,
    Aborted,
}

impl StreamPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamPhase::Completed | StreamPhase::Failed | StreamPhase::Aborted
        )
    }
}

/// Wraps the file stream of a [`TempArchive`].
///
/// The archive is removed when the inner stream ends, when it yields an error,
/// or when the body is dropped before either happens (client disconnect).
///
/// With a known length the download completes on the chunk that reaches it:
/// hyper stops polling a `Content-Length` body once that many bytes are written.
pub struct CleanupStream<S> {
    inner: S,
    archive: TempArchive,
    phase: StreamPhase,
    bytes_sent: u64,
    expected_len: Option<u64>,
}

impl<S> CleanupStream<S> {
    pub fn new(inner: S, archive: TempArchive) -> Self {
        Self {
            inner,
            archive,
            phase: StreamPhase::Created,
            bytes_sent: 0,
            expected_len: None,
        }
    }

    /// Marks the download complete as soon as `len` bytes have been yielded.
    pub fn with_length(mut self, len: u64) -> Self {
        self.expected_len = Some(len);
        self
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    fn finish(&mut self, phase: StreamPhase) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = phase;
        self.archive.cleanup();
        match phase {
            StreamPhase::Completed => info!(
                file = self.archive.download_name(),
                bytes = self.bytes_sent,
                "Download completed"
            ),
            StreamPhase::Aborted => warn!(
                file = self.archive.download_name(),
                bytes = self.bytes_sent,
                "Download aborted by client"
            ),
            _ => {}
        }
    }
}

impl<S> Stream for CleanupStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.phase.is_terminal() {
            return Poll::Ready(None);
        }
        this.phase = StreamPhase::Streaming;

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_sent += chunk.len() as u64;
                if this.expected_len.is_some_and(|len| this.bytes_sent >= len) {
                    this.finish(StreamPhase::Completed);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                warn!(
                    file = this.archive.download_name(),
                    bytes = this.bytes_sent,
                    error = %e,
                    "Download stream failed"
                );
                this.finish(StreamPhase::Failed);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish(StreamPhase::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for CleanupStream<S> {
    fn drop(&mut self) {
        self.finish(StreamPhase::Aborted);
    }
}

/// Turns a packaged archive into a streaming `200 OK` attachment response.
pub async fn stream_and_cleanup(archive: TempArchive) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(archive.path()).await?;
    let length = file.metadata().await.ok().map(|meta| meta.len());
    let disposition = format!("attachment; filename=\"{}\"", archive.download_name());

    let mut stream = CleanupStream::new(ReaderStream::new(file), archive);
    if let Some(length) = length {
        stream = stream.with_length(length);
    }
    let body = Body::from_stream(stream);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CACHE_CONTROL, "no-store");
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }
    builder
        .body(body)
        .map_err(|e| ApiError::Internal(format!("failed to build download response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use futures::{stream, StreamExt};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn written_archive(dir: &Path, contents: &[u8]) -> (TempArchive, PathBuf) {
        let archive = TempArchive::allocate(dir, "global-financial-markets-q2-2025");
        std::fs::write(archive.path(), contents).unwrap();
        let path = archive.path().to_path_buf();
        (archive, path)
    }

    #[tokio::test]
    async fn completed_stream_removes_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, path) = written_archive(dir.path(), b"PK-encrypted");
        let chunks = stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"PK-")),
            Ok(Bytes::from_static(b"encrypted")),
        ]);
        let mut stream = CleanupStream::new(chunks, archive);

        assert_eq!(stream.phase(), StreamPhase::Created);
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"PK-"));
        assert_eq!(stream.phase(), StreamPhase::Streaming);
        assert!(path.exists());
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.is_none());

        assert_eq!(stream.phase(), StreamPhase::Completed);
        assert!(!path.exists());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn failed_stream_removes_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, path) = written_archive(dir.path(), b"PK");
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"PK")),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset")),
        ]);
        let mut stream = CleanupStream::new(chunks, archive);

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());

        assert_eq!(stream.phase(), StreamPhase::Failed);
        assert!(!path.exists());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_mid_stream_removes_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, path) = written_archive(dir.path(), b"PKPK");
        let chunks = stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"PK")),
            Ok(Bytes::from_static(b"PK")),
        ]);
        let mut stream = CleanupStream::new(chunks, archive);

        assert!(stream.next().await.unwrap().is_ok());
        assert!(path.exists());
        drop(stream);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn dropping_before_the_first_poll_removes_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, path) = written_archive(dir.path(), b"PK");
        let stream = CleanupStream::new(stream::empty::<io::Result<Bytes>>(), archive);

        drop(stream);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn response_carries_attachment_headers_and_full_body() {
        let dir = tempfile::tempdir().unwrap();
        let contents = vec![7u8; 200_000];
        let (archive, path) = written_archive(dir.path(), &contents);
        let download_name = archive.download_name().to_string();

        let response = stream_and_cleanup(archive).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[header::CONTENT_LENGTH], "200000");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION].to_str().unwrap(),
            format!("attachment; filename=\"{}\"", download_name)
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.len(), contents.len());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unopenable_archive_is_an_error_and_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let archive = TempArchive::allocate(dir.path(), "retail");

        let err = stream_and_cleanup(archive).await.unwrap_err();

        assert!(matches!(err, ApiError::Io(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn known_length_completes_without_waiting_for_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, path) = written_archive(dir.path(), b"PK-encrypted");
        let chunks = stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"PK-")),
            Ok(Bytes::from_static(b"encrypted")),
        ]);
        let mut stream = CleanupStream::new(chunks, archive).with_length(12);

        assert!(stream.next().await.unwrap().is_ok());
        assert_eq!(stream.phase(), StreamPhase::Streaming);
        assert!(stream.next().await.unwrap().is_ok());

        assert_eq!(stream.phase(), StreamPhase::Completed);
        assert!(!path.exists());
        drop(stream);
    }

    #[tokio::test]
    async fn download_served_over_a_socket_is_logged_as_completed() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        // The current-thread test runtime keeps the server task on this thread.
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().unwrap();
        let contents = vec![42u8; 100_000];
        let (archive, path) = written_archive(dir.path(), &contents);
        let slot = Arc::new(Mutex::new(Some(archive)));
        let app = Router::new().route(
            "/download",
            get(move || {
                let slot = slot.clone();
                async move {
                    let archive = slot.lock().unwrap().take().unwrap();
                    stream_and_cleanup(archive).await
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
        socket
            .write_all(b"GET /download HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\n\r\n")
            .await
            .unwrap();

        let mut received = Vec::new();
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the body was complete");
            received.extend_from_slice(&buf[..n]);
            let header_end = received.windows(4).position(|w| w == b"\r\n\r\n");
            if let Some(end) = header_end {
                if received.len() - (end + 4) >= contents.len() {
                    break;
                }
            }
        }

        for _ in 0..100 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!path.exists());

        let logs = logs.contents();
        assert!(logs.contains("Download completed"), "{}", logs);
        assert!(!logs.contains("aborted"), "{}", logs);
        drop(socket);
    }
}
