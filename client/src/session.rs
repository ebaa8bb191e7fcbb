use crate::ui::StatusSink;
use bounce::frame::{self, FrameReader};
use bounce::message::{BallState, ServerMessage};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{mpsc, Mutex as AsyncMutex},
};

/// Lets the UI settle before a notification goes out. Not a
/// correctness requirement.
pub const NOTIFY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    BallReady,
    WallsReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    PeerClosed,
    Unreachable,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    IO(#[from] std::io::Error),

    #[error("frame: {0}")]
    Frame(#[from] frame::DecodeError),

    #[error("message: {0}")]
    Message(#[from] bounce::message::ParseError),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        use std::io::ErrorKind;

        match self {
            Error::IO(err) => match err.kind() {
                ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => ErrorCategory::PeerClosed,
                ErrorKind::ConnectionRefused
                | ErrorKind::NotFound
                | ErrorKind::AddrNotAvailable => ErrorCategory::Unreachable,
                _ => ErrorCategory::Other,
            },
            _ => ErrorCategory::Other,
        }
    }

    pub fn user_message(&self) -> Option<String> {
        match self.category() {
            ErrorCategory::PeerClosed => None,
            ErrorCategory::Unreachable => Some(
                "The host was not found or the connection was refused. Make sure the \
                 ball server is running, and check that the host name and port settings \
                 are correct."
                    .to_string(),
            ),
            ErrorCategory::Other => Some(format!("The following error occurred: {}.", self)),
        }
    }
}

/// One connection to the ball server. A new `connect` replaces the
/// session wholesale; dropping the old one aborts its stream.
#[derive(Clone)]
pub struct Session {
    walls: Arc<Mutex<Vec<String>>>,
    reader: Arc<AsyncMutex<OwnedReadHalf>>,
    writer: Arc<AsyncMutex<OwnedWriteHalf>>,
    events: mpsc::Sender<Event>,
    sink: Arc<dyn StatusSink>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    #[tracing::instrument(skip(sink))]
    pub async fn connect(
        endpoint: &Endpoint,
        sink: Arc<dyn StatusSink>,
    ) -> Result<(Self, mpsc::Receiver<Event>), Error> {
        sink.set_request_enabled(false);
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        tracing::info!(host = %endpoint.host, port = endpoint.port, "Connected");
        let (read, write) = stream.into_split();
        let (tx, rx) = mpsc::channel(8);
        let session = Self {
            walls: Arc::new(Mutex::new(Vec::new())),
            reader: Arc::new(AsyncMutex::new(read)),
            writer: Arc::new(AsyncMutex::new(write)),
            events: tx,
            sink,
        };
        Ok((session, rx))
    }

    pub async fn run(&self) -> Result<(), Error> {
        let mut reader = self.reader.lock().await;
        let mut frames = FrameReader::new();
        let mut buf = vec![0; 1024];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(err) => return self.fail(err.into()),
            };
            if n == 0 {
                tracing::debug!("peer closed the connection");
                self.sink.set_request_enabled(true);
                return Ok(());
            }
            if let Err(err) = self.drain(&mut frames, &buf[..n]) {
                return self.fail(err);
            }
        }
    }

    fn drain(&self, frames: &mut FrameReader, bytes: &[u8]) -> Result<(), Error> {
        frames.extend(bytes);
        while let Some(raw) = frames.try_next()? {
            self.handle(raw)?;
        }
        Ok(())
    }

    fn handle(&self, raw: String) -> Result<(), Error> {
        tracing::debug!(%raw, "received frame");
        match ServerMessage::parse(&raw)? {
            ServerMessage::Ball => self.notify(Event::BallReady),
            ServerMessage::Walls(walls) => {
                *self.walls.lock() = walls;
                self.notify(Event::WallsReady);
            }
            ServerMessage::Status(_) => {}
        }
        self.sink.status(&raw);
        self.sink.set_request_enabled(true);
        Ok(())
    }

    fn notify(&self, event: Event) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(NOTIFY_DELAY).await;
            if events.send(event).await.is_err() {
                tracing::debug!(?event, "event receiver dropped");
            }
        });
    }

    /// Peer hangups stay silent; everything else reaches the user.
    /// The request control comes back either way so a retry is possible.
    fn fail(&self, err: Error) -> Result<(), Error> {
        if let Some(text) = err.user_message() {
            self.sink.status(&text);
        }
        self.sink.set_request_enabled(true);
        match err.category() {
            ErrorCategory::PeerClosed => {
                tracing::debug!(%err, "ignoring peer hangup");
                Ok(())
            }
            _ => Err(err),
        }
    }

    pub async fn send_ball(&self, ball: &BallState) -> Result<(), Error> {
        let block = frame::encode(&ball.encode());
        let mut writer = self.writer.lock().await;
        writer.write_all(&block).await?;
        writer.flush().await?;
        tracing::debug!(ball = %ball.encode(), "sent ball state");
        Ok(())
    }

    pub fn walls(&self) -> Vec<String> {
        self.walls.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(1);
    const QUIET: Duration = Duration::from_millis(300);

    #[derive(Default)]
    struct RecordingSink {
        statuses: Mutex<Vec<String>>,
        enabled: AtomicBool,
    }

    impl StatusSink for RecordingSink {
        fn status(&self, text: &str) {
            self.statuses.lock().push(text.to_string());
        }

        fn set_request_enabled(&self, enabled: bool) {
            self.enabled.store(enabled, Ordering::SeqCst);
        }
    }

    async fn serve(blocks: Vec<Vec<u8>>) -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for block in blocks {
                stream.write_all(&block).await.unwrap();
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        });
        Endpoint::new("127.0.0.1", port)
    }

    async fn start(
        endpoint: &Endpoint,
        sink: Arc<RecordingSink>,
    ) -> (Session, mpsc::Receiver<Event>) {
        let (session, events) = Session::connect(endpoint, sink).await.unwrap();
        let run = session.clone();
        tokio::spawn(async move { run.run().await });
        (session, events)
    }

    #[tokio::test]
    async fn wall_batch_replaces_buffer_and_notifies() {
        let endpoint = serve(vec![frame::encode("w.2.XXXXalpha=beta")]).await;
        let sink = Arc::new(RecordingSink::default());
        let (session, mut events) = start(&endpoint, sink.clone()).await;

        assert_eq!(
            timeout(WAIT, events.recv()).await.unwrap(),
            Some(Event::WallsReady)
        );
        assert_eq!(session.walls(), vec!["alpha", "beta"]);
        assert_eq!(session.walls(), session.walls());
        assert!(sink.enabled.load(Ordering::SeqCst));
        assert_eq!(sink.statuses.lock().last().unwrap(), "w.2.XXXXalpha=beta");
    }

    #[tokio::test]
    async fn ball_frame_notifies_once_and_leaves_walls_alone() {
        let endpoint = serve(vec![frame::encode("b.1")]).await;
        let sink = Arc::new(RecordingSink::default());
        let (session, mut events) = start(&endpoint, sink.clone()).await;

        assert_eq!(
            timeout(WAIT, events.recv()).await.unwrap(),
            Some(Event::BallReady)
        );
        assert!(timeout(QUIET, events.recv()).await.is_err());
        assert!(session.walls().is_empty());
        assert_eq!(sink.statuses.lock().last().unwrap(), "b.1");
    }

    #[tokio::test]
    async fn unknown_tag_is_status_only() {
        let endpoint = serve(vec![frame::encode("hello there")]).await;
        let sink = Arc::new(RecordingSink::default());
        let (session, mut events) = start(&endpoint, sink.clone()).await;

        assert!(timeout(QUIET, events.recv()).await.is_err());
        assert!(session.walls().is_empty());
        assert_eq!(*sink.statuses.lock(), ["hello there"]);
        assert!(sink.enabled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn frame_split_across_reads_decodes_once_complete() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port());
        tokio::spawn(async move {
            let block = frame::encode("w.1.XXXXonly");
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&block[..5]).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            stream.write_all(&block[5..]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });
        let sink = Arc::new(RecordingSink::default());
        let (session, mut events) = start(&endpoint, sink).await;

        assert_eq!(
            timeout(WAIT, events.recv()).await.unwrap(),
            Some(Event::WallsReady)
        );
        assert_eq!(session.walls(), vec!["only"]);
    }

    #[tokio::test]
    async fn malformed_wall_batch_fails_decode() {
        let endpoint = serve(vec![frame::encode("w.3.XXXXalpha=beta")]).await;
        let sink = Arc::new(RecordingSink::default());
        let (session, mut events) = Session::connect(&endpoint, sink.clone()).await.unwrap();
        let run = {
            let session = session.clone();
            tokio::spawn(async move { session.run().await })
        };

        let err = timeout(WAIT, run).await.unwrap().unwrap().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(timeout(QUIET, events.recv()).await.is_err());
        assert!(session.walls().is_empty());
        assert!(sink.enabled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_ball_writes_one_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port());
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frames = FrameReader::new();
            let mut buf = vec![0; 256];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "stream closed before a full frame arrived");
                frames.extend(&buf[..n]);
                if let Some(payload) = frames.try_next().unwrap() {
                    return payload;
                }
            }
        });

        let sink = Arc::new(RecordingSink::default());
        let (session, _events) = Session::connect(&endpoint, sink).await.unwrap();
        let ball = BallState {
            position: (1.0, 2.0),
            velocity: (3.0, 4.0),
            acceleration: (5.0, 6.0),
        };
        session.send_ball(&ball).await.unwrap();
        assert_eq!(server.await.unwrap(), "1:2:3:4:5:6");
    }

    #[tokio::test]
    async fn connection_refused_is_surfaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port());
        drop(listener);

        let sink = Arc::new(RecordingSink::default());
        let err = Session::connect(&endpoint, sink).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unreachable);
        assert!(err.user_message().unwrap().contains("ball server"));
    }
}
