//! Multiplexed session client.
//!
//! One actor task owns the socket, the channel table and the channel-0
//! queue. Callers talk to it through a cloneable [`Client`] handle:
//! - `request` sends on channel 0 and waits for the matching response
//! - `open_stream` sends on channel 0 and expects a freshly assigned channel
//!   id, registering the channel before any of its frames are dispatched
//!
//! The actor's readiness wait is the only suspension point for reads. Writes
//! run in a companion task fed through a queue, so a slow peer never stalls
//! dispatch; commands built on top are futures interleaved on the same
//! runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use log::{debug, error, info};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;

use crate::error::{NgcsError, Result};
use crate::ipc::codec::{DEFAULT_MAX_LENGTH, Frame, FrameCodec};
use crate::ipc::demux::{ChannelEvent, Demux, ResponseCallback};
use crate::ipc::value::Value;

/// Well-known control socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/run/ngcs/control.sock";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "NGCS_SOCKET";

/// Socket path from `NGCS_SOCKET`, else the well-known path.
pub fn default_socket_path() -> PathBuf {
    std::env::var_os(SOCKET_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

/// Configuration for connecting to the daemon.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path to the daemon's Unix socket.
    pub socket_path: PathBuf,
    /// Largest frame payload accepted or sent.
    pub max_frame_length: usize,
    /// Socket read timeout for the blocking transport.
    pub read_timeout: Option<Duration>,
    /// Socket write timeout for the blocking transport.
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_frame_length: DEFAULT_MAX_LENGTH,
            read_timeout: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientConfig {
    /// Create config with custom socket path.
    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
            ..Default::default()
        }
    }

    pub fn codec(&self) -> FrameCodec {
        FrameCodec::with_max_length(self.max_frame_length)
    }
}

/// Work handed to the session actor.
enum Op {
    Request { request: Value, on_reply: ResponseCallback },
    Close { channel: i32 },
}

/// Handle to a running session.
#[derive(Clone)]
pub struct Client {
    ops: mpsc::UnboundedSender<Op>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Client {
    /// Connect to the daemon and start the session actor.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = UnixStream::connect(&config.socket_path).await?;
        info!("Connected to {}", config.socket_path.display());
        Ok(Self::from_stream(stream, config.codec()))
    }

    /// Start a session over an already connected stream.
    pub fn from_stream(stream: UnixStream, codec: FrameCodec) -> Self {
        Self::with_demux(stream, codec, Demux::new())
    }

    /// Start a session with a preconfigured demultiplexer.
    pub fn with_demux(stream: UnixStream, codec: FrameCodec, demux: Demux) -> Self {
        let (ops, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_session(Framed::new(stream, codec), rx, demux));
        Self { ops }
    }

    /// False once the session actor has stopped.
    pub fn is_connected(&self) -> bool {
        !self.ops.is_closed()
    }

    fn submit(&self, request: Value, on_reply: ResponseCallback) -> Result<()> {
        self.ops
            .send(Op::Request { request, on_reply })
            .map_err(|_| NgcsError::Disconnected)
    }

    /// Send a request on channel 0 and wait for its response.
    ///
    /// An `Error` value from the daemon is returned as `Ok`; callers decide
    /// how to classify it.
    pub async fn request(&self, request: Value) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.submit(
            request,
            Box::new(move |_: &mut Demux, reply: Result<Value>| {
                let _ = tx.send(reply);
            }),
        )?;
        rx.await.map_err(|_| NgcsError::Disconnected)?
    }

    /// Send a request whose response is a new channel id, and open that channel.
    pub async fn open_stream(&self, request: Value) -> Result<ChannelStream> {
        let (tx, rx) = oneshot::channel();
        self.submit(
            request,
            Box::new(move |demux: &mut Demux, reply: Result<Value>| {
                let opened = reply.and_then(|value| accept_channel(demux, value));
                if let Err(Ok((channel, _))) = tx.send(opened) {
                    // Requester gave up; do not leave the channel dangling.
                    demux.close(channel);
                }
            }),
        )?;
        let (channel, events) = rx.await.map_err(|_| NgcsError::Disconnected)??;
        Ok(ChannelStream {
            channel,
            events,
            ops: self.ops.clone(),
            open: true,
        })
    }

    /// Close a channel from this side. No acknowledgement is awaited.
    pub fn close_channel(&self, channel: i32) {
        let _ = self.ops.send(Op::Close { channel });
    }
}

fn accept_channel(
    demux: &mut Demux,
    value: Value,
) -> Result<(i32, mpsc::UnboundedReceiver<ChannelEvent>)> {
    match value {
        Value::Int32(0) => Err(NgcsError::protocol("daemon did not assign a channel")),
        Value::Int32(channel) => {
            let (tx, rx) = mpsc::unbounded_channel();
            demux.register(channel, tx)?;
            Ok((channel, rx))
        }
        Value::Error(message) => Err(NgcsError::Server(String::from_utf8_lossy(&message).into_owned())),
        other => Err(NgcsError::protocol(format!(
            "expected a channel id, got {}",
            other.type_code()
        ))),
    }
}

/// Receiving end of an open channel.
///
/// Dropping the stream closes the channel unless the daemon already did.
#[derive(Debug)]
pub struct ChannelStream {
    channel: i32,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    ops: mpsc::UnboundedSender<Op>,
    open: bool,
}

impl ChannelStream {
    pub fn channel(&self) -> i32 {
        self.channel
    }

    /// Next event; `None` once the channel or the session has ended.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        if !self.open {
            return None;
        }
        let event = self.events.recv().await;
        if matches!(event, None | Some(ChannelEvent::Closed(_))) {
            self.open = false;
        }
        event
    }

    /// Stop receiving: drop the handler and tell the daemon.
    pub fn close(mut self) {
        self.shut();
    }

    fn shut(&mut self) {
        if self.open {
            self.open = false;
            let _ = self.ops.send(Op::Close {
                channel: self.channel,
            });
        }
    }
}

impl Drop for ChannelStream {
    fn drop(&mut self) {
        self.shut();
    }
}

impl std::fmt::Debug for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Request { request, .. } => f.debug_struct("Request").field("request", request).finish(),
            Op::Close { channel } => f.debug_struct("Close").field("channel", channel).finish(),
        }
    }
}

async fn run_session(
    framed: Framed<UnixStream, FrameCodec>,
    mut ops: mpsc::UnboundedReceiver<Op>,
    mut demux: Demux,
) {
    let (sink, mut frames) = framed.split();
    let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
    let mut writer = tokio::spawn(write_frames(sink, outgoing_rx));

    loop {
        tokio::select! {
            op = ops.recv() => match op {
                Some(Op::Request { request, on_reply }) => {
                    debug!("Request on channel 0: {}", request);
                    demux.send_request(&request, on_reply);
                }
                Some(Op::Close { channel }) => demux.close(channel),
                None => {
                    debug!("All client handles dropped, ending session");
                    break;
                }
            },
            frame = frames.next() => match frame {
                Some(Ok(frame)) => demux.dispatch(frame),
                Some(Err(e)) => {
                    error!("Transport error: {}", e);
                    break;
                }
                None => {
                    info!("Daemon closed the connection");
                    break;
                }
            },
            written = &mut writer => {
                match written {
                    Ok(Err(e)) => error!("Failed to write to daemon: {}", e),
                    _ => error!("Writer stopped"),
                }
                ops.close();
                demux.shutdown();
                return;
            }
        }

        // Frames queue up for the writer; reading never waits on the socket
        // becoming writable.
        for frame in demux.take_outbound() {
            if outgoing.send(frame).is_err() {
                break;
            }
        }
    }

    // Handles see the session as gone before any pending caller wakes.
    ops.close();
    demux.shutdown();
    drop(outgoing);
    // Let queued close frames go out before the socket is dropped.
    let _ = writer.await;
}

/// Write half of a session: drains queued frames until the session ends.
async fn write_frames<S>(mut sink: S, mut outgoing: mpsc::UnboundedReceiver<Frame>) -> std::io::Result<()>
where
    S: Sink<Frame, Error = std::io::Error> + Unpin,
{
    while let Some(frame) = outgoing.recv().await {
        sink.feed(frame).await?;
        while let Ok(frame) = outgoing.try_recv() {
            sink.feed(frame).await?;
        }
        sink.flush().await?;
    }
    sink.close().await
}

/// Path the client would connect to, for diagnostics.
pub fn describe_socket(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (missing)", path.display())
    }
}
