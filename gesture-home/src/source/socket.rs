//! Unix socket frame source.
//!
//! The tracker process connects and writes frames as a 4-byte big-endian
//! length followed by the JSON payload.  One tracker is served at a time.
//! Reads block for at most `wait` before `next_frame` returns `Waiting`, so
//! the frame loop keeps its idle timeout running while the camera is slow,
//! stalled or gone.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use super::{now_ms, Frame, LandmarkSource, SourceEvent};

/// Maximum frame payload size (1 MiB).
const MAX_MESSAGE_SIZE: usize = 1_048_576;

const LENGTH_PREFIX: usize = 4;

// ── Framing ────────────────────────────────────────────────

/// Reassembles length-prefixed messages from a byte stream.
#[derive(Debug, Default)]
struct FrameDecoder {
    buf: Vec<u8>,
    start: usize,
}

impl FrameDecoder {
    fn push(&mut self, bytes: &[u8]) {
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete payload, if one has fully arrived.
    fn next_message(&mut self) -> anyhow::Result<Option<String>> {
        let pending = &self.buf[self.start..];
        let Some((prefix, rest)) = pending.split_first_chunk::<LENGTH_PREFIX>() else {
            return Ok(None);
        };

        let len = u32::from_be_bytes(*prefix) as usize;
        if len > MAX_MESSAGE_SIZE {
            self.buf.clear();
            self.start = 0;
            anyhow::bail!("frame of {len} bytes exceeds maximum size");
        }
        let Some(payload) = rest.get(..len) else {
            return Ok(None);
        };

        let message = String::from_utf8_lossy(payload).into_owned();
        self.start += LENGTH_PREFIX + len;
        Ok(Some(message))
    }

    fn is_empty(&self) -> bool {
        self.start == self.buf.len()
    }
}

// ── Source ─────────────────────────────────────────────────

/// A connected tracker.
struct TrackerClient {
    stream: UnixStream,
    decoder: FrameDecoder,
    id: u64,
}

/// Listens for a tracker on a Unix socket.
pub struct SocketSource {
    pub socket_path: PathBuf,
    listener: UnixListener,
    client: Option<TrackerClient>,
    pending: VecDeque<String>,
    wait: Duration,
    next_client_id: u64,
}

impl SocketSource {
    /// Compute the default socket path.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/tmp/gesture-home-{}", unsafe { libc::getuid() }));
        PathBuf::from(runtime_dir).join("gesture-home.sock")
    }

    /// Bind the listener socket, replacing any stale one.  `wait` bounds
    /// how long one `next_frame` call blocks.
    pub fn bind(socket_path: PathBuf, wait: Duration) -> anyhow::Result<Self> {
        if let Some(dir) = socket_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("failed to bind {}", socket_path.display()))?;
        // Accepting is polled between reads; reads themselves block.
        listener.set_nonblocking(true)?;

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))?;
        }

        info!(?socket_path, "waiting for tracker");

        Ok(Self {
            socket_path,
            listener,
            client: None,
            pending: VecDeque::new(),
            // A zero read timeout is rejected by the OS.
            wait: wait.max(Duration::from_millis(1)),
            next_client_id: 1,
        })
    }

    /// Take pending connections: the first becomes the client while none
    /// is connected, the rest are refused.
    fn accept(&mut self) {
        loop {
            let stream = match self.listener.accept() {
                Ok((stream, _addr)) => stream,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("accept error: {}", e);
                    break;
                }
            };
            if self.client.is_some() {
                warn!("tracker already connected, refusing another");
                continue;
            }

            let client_id = self.next_client_id;
            self.next_client_id += 1;
            let setup = stream
                .set_nonblocking(false)
                .and_then(|()| stream.set_read_timeout(Some(self.wait)));
            match setup {
                Ok(()) => {
                    info!(client_id, "tracker connected");
                    self.client = Some(TrackerClient {
                        stream,
                        decoder: FrameDecoder::default(),
                        id: client_id,
                    });
                }
                Err(e) => warn!(client_id, "failed to set up tracker: {}", e),
            }
        }
    }

    /// Block for up to `wait` on the client and queue any complete frames.
    fn read_client(&mut self) {
        let Some(client) = self.client.as_mut() else {
            return;
        };

        let mut buf = [0u8; 4096];
        let alive = match client.stream.read(&mut buf) {
            Ok(0) => {
                info!(client_id = client.id, "tracker disconnected");
                false
            }
            Ok(n) => {
                client.decoder.push(&buf[..n]);
                true
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                true
            }
            Err(e) => {
                debug!(client_id = client.id, "tracker read error: {}", e);
                false
            }
        };

        loop {
            match client.decoder.next_message() {
                Ok(Some(message)) => self.pending.push_back(message),
                Ok(None) => break,
                Err(e) => {
                    error!(client_id = client.id, "{:#}, dropping tracker", e);
                    self.client = None;
                    return;
                }
            }
        }
        if !alive {
            if !client.decoder.is_empty() {
                debug!(client_id = client.id, "discarding partial frame");
            }
            self.client = None;
        }
    }
}

impl LandmarkSource for SocketSource {
    fn next_frame(&mut self) -> anyhow::Result<SourceEvent> {
        if self.pending.is_empty() {
            self.accept();
            if self.client.is_some() {
                self.read_client();
            } else {
                thread::sleep(self.wait);
                self.accept();
            }
        }

        Ok(match self.pending.pop_front() {
            Some(message) => SourceEvent::Frame(Frame::from_json(&message, now_ms())),
            None => SourceEvent::Waiting,
        })
    }
}

impl Drop for SocketSource {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!(path = ?self.socket_path, "failed to remove socket: {}", e);
        }
    }
}
