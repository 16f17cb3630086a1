//! Transports carrying framed messages between a debugger and its front end.
//!
//! Every binding speaks the same framing (see `dbg_wire`); only the way the
//! byte stream is established differs.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};

use dbg_wire::{read_frame, write_frame, Frame, FrameError};

use crate::settings::{ConnectionOptions, TransportKind};

/// Error type for transport failures
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Endpoint could not be reached or bound
    #[error("cannot open {endpoint}: {source}")]
    Unavailable {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Operation needs an open connection
    #[error("not connected")]
    NotConnected,

    /// Stream failed after it was established
    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),

    /// Peer sent something that is not a frame
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Handle that shuts a transport's stream down from another thread.
///
/// A receive blocked on the same stream then returns end-of-stream.
#[derive(Clone)]
pub struct Closer(Arc<dyn Fn() -> io::Result<()> + Send + Sync>);

impl Closer {
    pub fn new(f: impl Fn() -> io::Result<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn close(&self) -> io::Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Closer")
    }
}

/// A bidirectional channel of frames.
pub trait Transport: Send {
    /// Establish the connection: accept for servers, connect for clients.
    fn open(&mut self) -> Result<(), ConnectError>;

    fn send(&mut self, frame: &Frame) -> Result<(), ConnectError>;

    /// Next frame, `Ok(None)` once the peer has gone.
    fn receive(&mut self) -> Result<Option<Frame>, ConnectError>;

    /// Release the stream. Closing a closed transport does nothing.
    fn close(&mut self);

    /// External shutdown handle, `None` when not open.
    fn closer(&self) -> Option<Closer>;

    /// Endpoint description for diagnostics.
    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), ConnectError> {
        (**self).open()
    }

    fn send(&mut self, frame: &Frame) -> Result<(), ConnectError> {
        (**self).send(frame)
    }

    fn receive(&mut self) -> Result<Option<Frame>, ConnectError> {
        (**self).receive()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn closer(&self) -> Option<Closer> {
        (**self).closer()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/*───────────────────────────────────────────────────────────────────────────*
 *  Shared stream framing                                                     *
 *───────────────────────────────────────────────────────────────────────────*/

trait SocketStream: Read + Write + Send + Sync + Sized + 'static {
    fn try_clone_stream(&self) -> io::Result<Self>;
    fn shutdown_both(&self) -> io::Result<()>;
}

impl SocketStream for TcpStream {
    fn try_clone_stream(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

#[cfg(unix)]
impl SocketStream for std::os::unix::net::UnixStream {
    fn try_clone_stream(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_both(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

struct FramedStream<S: SocketStream> {
    writer: S,
    reader: BufReader<S>,
}

impl<S: SocketStream> FramedStream<S> {
    fn new(stream: S) -> io::Result<Self> {
        let reader = BufReader::new(stream.try_clone_stream()?);
        Ok(Self {
            writer: stream,
            reader,
        })
    }

    fn send(&mut self, frame: &Frame) -> Result<(), ConnectError> {
        write_frame(&mut self.writer, frame)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Frame>, ConnectError> {
        match read_frame(&mut self.reader) {
            Ok(frame) => Ok(frame),
            Err(FrameError::Io(e)) if is_disconnect(&e) => {
                log::debug!("peer disconnected: {}", e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn closer(&self) -> Option<Closer> {
        let stream = self.writer.try_clone_stream().ok()?;
        Some(Closer::new(move || stream.shutdown_both()))
    }

    fn shutdown(&self) {
        if let Err(e) = self.writer.shutdown_both() {
            log::debug!("shutdown: {}", e);
        }
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/*───────────────────────────────────────────────────────────────────────────*
 *  TCP                                                                       *
 *───────────────────────────────────────────────────────────────────────────*/

enum TcpMode {
    Listen(TcpListener),
    Connect(SocketAddr),
    Adopted,
}

/// Frames over a TCP socket.
pub struct TcpTransport {
    mode: TcpMode,
    endpoint: String,
    stream: Option<FramedStream<TcpStream>>,
}

impl TcpTransport {
    /// Bind a listening socket now; [`open`](Transport::open) accepts one peer.
    pub fn bind(addr: impl ToSocketAddrs + fmt::Debug) -> Result<Self, ConnectError> {
        let endpoint = format!("{:?}", addr);
        let listener = TcpListener::bind(&addr).map_err(|source| ConnectError::Unavailable {
            endpoint: endpoint.clone(),
            source,
        })?;
        let endpoint = match listener.local_addr() {
            Ok(local) => local.to_string(),
            Err(_) => endpoint,
        };
        log::info!("listening on {}", endpoint);
        Ok(Self {
            mode: TcpMode::Listen(listener),
            endpoint,
            stream: None,
        })
    }

    /// Client side; [`open`](Transport::open) connects to `addr`.
    pub fn connect_to(addr: SocketAddr) -> Self {
        Self {
            mode: TcpMode::Connect(addr),
            endpoint: addr.to_string(),
            stream: None,
        }
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, ConnectError> {
        let endpoint = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<tcp peer>".to_string());
        Ok(Self {
            mode: TcpMode::Adopted,
            endpoint,
            stream: Some(FramedStream::new(stream)?),
        })
    }

    /// Address of the listening socket, for servers.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.mode {
            TcpMode::Listen(listener) => listener.local_addr().ok(),
            _ => None,
        }
    }

    fn unavailable(&self, source: io::Error) -> ConnectError {
        ConnectError::Unavailable {
            endpoint: self.endpoint.clone(),
            source,
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<(), ConnectError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = match &self.mode {
            TcpMode::Listen(listener) => {
                let (stream, peer) = listener.accept().map_err(|e| self.unavailable(e))?;
                log::info!("accepted connection from {}", peer);
                stream
            }
            TcpMode::Connect(addr) => {
                let stream = TcpStream::connect(addr).map_err(|e| self.unavailable(e))?;
                log::info!("connected to {}", addr);
                stream
            }
            TcpMode::Adopted => return Err(ConnectError::NotConnected),
        };
        stream.set_nodelay(true)?;
        self.stream = Some(FramedStream::new(stream)?);
        Ok(())
    }

    fn send(&mut self, frame: &Frame) -> Result<(), ConnectError> {
        self.stream.as_mut().ok_or(ConnectError::NotConnected)?.send(frame)
    }

    fn receive(&mut self) -> Result<Option<Frame>, ConnectError> {
        self.stream.as_mut().ok_or(ConnectError::NotConnected)?.receive()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown();
            log::debug!("closed {}", self.endpoint);
        }
    }

    fn closer(&self) -> Option<Closer> {
        self.stream.as_ref()?.closer()
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.endpoint)
    }
}

/*───────────────────────────────────────────────────────────────────────────*
 *  Unix-domain pipe                                                          *
 *───────────────────────────────────────────────────────────────────────────*/

#[cfg(unix)]
pub use self::pipe::PipeTransport;

#[cfg(unix)]
mod pipe {
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::{Path, PathBuf};

    use super::*;

    enum PipeMode {
        Listen(UnixListener),
        Connect,
        Adopted,
    }

    /// Frames over a Unix-domain stream socket on the same host.
    pub struct PipeTransport {
        mode: PipeMode,
        path: Option<PathBuf>,
        stream: Option<FramedStream<UnixStream>>,
    }

    impl PipeTransport {
        /// Create the socket at `path` and listen on it.
        pub fn bind(path: impl AsRef<Path>) -> Result<Self, ConnectError> {
            let path = path.as_ref().to_path_buf();
            let listener = UnixListener::bind(&path).map_err(|source| ConnectError::Unavailable {
                endpoint: path.display().to_string(),
                source,
            })?;
            log::info!("listening on {}", path.display());
            Ok(Self {
                mode: PipeMode::Listen(listener),
                path: Some(path),
                stream: None,
            })
        }

        /// Client side; [`open`](Transport::open) connects to `path`.
        pub fn connect_to(path: impl AsRef<Path>) -> Self {
            Self {
                mode: PipeMode::Connect,
                path: Some(path.as_ref().to_path_buf()),
                stream: None,
            }
        }

        pub fn from_stream(stream: UnixStream) -> Result<Self, ConnectError> {
            Ok(Self {
                mode: PipeMode::Adopted,
                path: None,
                stream: Some(FramedStream::new(stream)?),
            })
        }

        /// Two connected transports.
        pub fn pair() -> Result<(Self, Self), ConnectError> {
            let (a, b) = UnixStream::pair()?;
            Ok((Self::from_stream(a)?, Self::from_stream(b)?))
        }

        fn endpoint(&self) -> String {
            match &self.path {
                Some(path) => path.display().to_string(),
                None => "<unnamed pipe>".to_string(),
            }
        }
    }

    impl Transport for PipeTransport {
        fn open(&mut self) -> Result<(), ConnectError> {
            if self.stream.is_some() {
                return Ok(());
            }
            let unavailable = |source| ConnectError::Unavailable {
                endpoint: self.endpoint(),
                source,
            };
            let stream = match (&self.mode, &self.path) {
                (PipeMode::Listen(listener), _) => listener.accept().map_err(unavailable)?.0,
                (PipeMode::Connect, Some(path)) => UnixStream::connect(path).map_err(unavailable)?,
                _ => return Err(ConnectError::NotConnected),
            };
            log::info!("pipe {} open", self.endpoint());
            self.stream = Some(FramedStream::new(stream)?);
            Ok(())
        }

        fn send(&mut self, frame: &Frame) -> Result<(), ConnectError> {
            self.stream.as_mut().ok_or(ConnectError::NotConnected)?.send(frame)
        }

        fn receive(&mut self) -> Result<Option<Frame>, ConnectError> {
            self.stream.as_mut().ok_or(ConnectError::NotConnected)?.receive()
        }

        fn close(&mut self) {
            if let Some(stream) = self.stream.take() {
                stream.shutdown();
                log::debug!("closed pipe {}", self.endpoint());
            }
        }

        fn closer(&self) -> Option<Closer> {
            self.stream.as_ref()?.closer()
        }

        fn describe(&self) -> String {
            format!("pipe {}", self.endpoint())
        }
    }

    impl Drop for PipeTransport {
        fn drop(&mut self) {
            if let (PipeMode::Listen(_), Some(path)) = (&self.mode, &self.path) {
                if let Err(e) = std::fs::remove_file(path) {
                    log::debug!("cannot remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

/*───────────────────────────────────────────────────────────────────────────*
 *  In-memory                                                                 *
 *───────────────────────────────────────────────────────────────────────────*/

#[derive(Debug, Default)]
struct MemoryState {
    incoming: VecDeque<Frame>,
    sent: Vec<Frame>,
    open: bool,
    opens: usize,
    fail_open: bool,
    fail_send: bool,
}

/// Transport backed by queues, driven through a [`MemoryPeer`].
///
/// `receive` reports end-of-stream once the queued input runs out.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

/// The other end of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryPeer) {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MemoryPeer { state },
        )
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl MemoryPeer {
    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Queue a frame for the transport to receive.
    pub fn push(&self, frame: Frame) {
        self.with_state(|s| s.incoming.push_back(frame));
    }

    /// Queue plain-data replies.
    pub fn push_replies<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for reply in replies {
            self.push(Frame::reply(reply));
        }
    }

    /// Everything the transport has sent so far.
    pub fn sent(&self) -> Vec<Frame> {
        self.with_state(|s| s.sent.clone())
    }

    pub fn is_open(&self) -> bool {
        self.with_state(|s| s.open)
    }

    /// Number of successful opens.
    pub fn opens(&self) -> usize {
        self.with_state(|s| s.opens)
    }

    /// Make the next opens fail as if the endpoint were unreachable.
    pub fn fail_open(&self, fail: bool) {
        self.with_state(|s| s.fail_open = fail);
    }

    /// Make sends fail as if the stream had broken.
    pub fn fail_send(&self, fail: bool) {
        self.with_state(|s| s.fail_send = fail);
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> Result<(), ConnectError> {
        self.with_state(|s| {
            if s.fail_open {
                return Err(ConnectError::Unavailable {
                    endpoint: "memory".into(),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
                });
            }
            s.open = true;
            s.opens += 1;
            Ok(())
        })
    }

    fn send(&mut self, frame: &Frame) -> Result<(), ConnectError> {
        self.with_state(|s| {
            if !s.open {
                return Err(ConnectError::NotConnected);
            }
            if s.fail_send {
                return Err(ConnectError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "broken")));
            }
            s.sent.push(frame.clone());
            Ok(())
        })
    }

    fn receive(&mut self) -> Result<Option<Frame>, ConnectError> {
        self.with_state(|s| {
            if !s.open {
                return Err(ConnectError::NotConnected);
            }
            Ok(s.incoming.pop_front())
        })
    }

    fn close(&mut self) {
        self.with_state(|s| s.open = false);
    }

    fn closer(&self) -> Option<Closer> {
        let state = Arc::clone(&self.state);
        Some(Closer::new(move || {
            if let Ok(mut s) = state.lock() {
                s.incoming.clear();
            }
            Ok(())
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Which end of the session this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The debugger: listens for a front end
    Server,
    /// The front end: connects to a debugger
    Client,
}

/// Build the transport `options` describe. Servers bind immediately.
pub fn transport_for(options: &ConnectionOptions, side: Side) -> Result<Box<dyn Transport>, ConnectError> {
    match options.io {
        TransportKind::Tcp => {
            let endpoint = options.endpoint();
            match side {
                Side::Server => Ok(Box::new(TcpTransport::bind((options.host.as_str(), options.port))?)),
                Side::Client => {
                    let addr = (options.host.as_str(), options.port)
                        .to_socket_addrs()
                        .map_err(|source| ConnectError::Unavailable {
                            endpoint: endpoint.clone(),
                            source,
                        })?
                        .next()
                        .ok_or_else(|| ConnectError::Unavailable {
                            endpoint,
                            source: io::Error::new(io::ErrorKind::NotFound, "no address"),
                        })?;
                    Ok(Box::new(TcpTransport::connect_to(addr)))
                }
            }
        }
        #[cfg(unix)]
        TransportKind::Pipe => {
            let path = options.socket_path.as_ref().ok_or_else(|| ConnectError::Unavailable {
                endpoint: options.endpoint(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "pipe transport needs a socket path"),
            })?;
            match side {
                Side::Server => Ok(Box::new(PipeTransport::bind(path)?)),
                Side::Client => Ok(Box::new(PipeTransport::connect_to(path))),
            }
        }
        #[cfg(not(unix))]
        TransportKind::Pipe => Err(ConnectError::Unavailable {
            endpoint: options.endpoint(),
            source: io::Error::new(io::ErrorKind::Unsupported, "pipes need a Unix host"),
        }),
    }
}
