//! Settings web server lifecycle.
//!
//! The HTTP server only makes sense while the bridge has an address, so
//! its lifetime follows connectivity events: it starts when the station
//! gets an IP or the access point comes up, and stops on disconnect or AP
//! shutdown. The server handle is owned by [`WebLifecycle`]; nothing else
//! can start or stop it.

use embedded_io::Read;

use crate::config::{HTTP_CHUNK_SIZE, SETTINGS_ROUTE};
use crate::error::Error;
use crate::notify::{NotificationQueue, Severity};

const TAG: &str = "http";

/// Connectivity events that drive the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectivityEvent {
    /// Station got an IP address.
    StaGotIp,
    /// Soft access point is up.
    ApStarted,
    StaDisconnected,
    ApStopped,
}

impl ConnectivityEvent {
    fn brings_up(self) -> bool {
        matches!(self, ConnectivityEvent::StaGotIp | ConnectivityEvent::ApStarted)
    }
}

/// An HTTP server that can be started and stopped.
pub trait HttpServer {
    /// Token for a running server instance.
    type Handle;

    /// Start listening and register the settings route.
    fn start(&mut self) -> Result<Self::Handle, Error>;

    fn stop(&mut self, handle: Self::Handle);
}

/// `Stopped` / `Running(handle)`.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerState<H> {
    Stopped,
    Running(H),
}

/// What an event did to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    Started,
    Stopped,
    StartFailed,
    /// Already in the state the event asks for.
    Unchanged,
}

/// Two-state machine owning the server handle.
pub struct WebLifecycle<S: HttpServer> {
    server: S,
    state: ServerState<S::Handle>,
}

impl<S: HttpServer> WebLifecycle<S> {
    pub fn new(server: S) -> Self {
        Self {
            server,
            state: ServerState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ServerState::Running(_))
    }

    pub fn state(&self) -> &ServerState<S::Handle> {
        &self.state
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// Apply one connectivity event. Every change is reported on `queue`
    /// (best effort: a full queue just drops the report).
    pub fn handle_event<const N: usize>(
        &mut self,
        event: ConnectivityEvent,
        queue: &NotificationQueue<N>,
    ) -> Transition {
        let transition = match (self.is_running(), event.brings_up()) {
            (false, true) => match self.server.start() {
                Ok(handle) => {
                    self.state = ServerState::Running(handle);
                    Transition::Started
                }
                Err(_) => Transition::StartFailed,
            },
            (true, false) => {
                if let ServerState::Running(handle) =
                    core::mem::replace(&mut self.state, ServerState::Stopped)
                {
                    self.server.stop(handle);
                }
                Transition::Stopped
            }
            _ => Transition::Unchanged,
        };

        let report = match transition {
            Transition::Started => Some((Severity::Info, "server started")),
            Transition::Stopped => Some((Severity::Info, "server stopped")),
            Transition::StartFailed => Some((Severity::Warning, "server start failed")),
            Transition::Unchanged => None,
        };
        if let Some((severity, text)) = report {
            let _ = queue.enqueue(severity, TAG, text);
        }
        transition
    }
}

/// Whether a request URI targets the settings page. Query strings are
/// ignored.
pub fn is_settings_request(uri: &str) -> bool {
    let path = uri.split_once('?').map_or(uri, |(path, _)| path);
    path == SETTINGS_ROUTE
}

/// Error statuses a page response can end with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    NotFound,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::NotFound => 404,
            Status::InternalServerError => 500,
        }
    }
}

/// The response side of one HTTP request.
pub trait Responder {
    type Error;

    /// Send a complete `200 OK` body in one go.
    fn send(&mut self, body: &[u8]) -> Result<(), Self::Error>;

    /// Send one chunk of a chunked body; an empty chunk ends the body.
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), Self::Error>;

    fn send_status(&mut self, status: Status) -> Result<(), Self::Error>;
}

/// How a page request was answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Served {
    /// Body fit in one read and went out as a plain response.
    Single(usize),
    /// Body went out in chunks.
    Chunked(usize),
    NotFound,
    /// Reading the page failed before anything was sent.
    ReadFailed,
    /// Reading failed after some chunks went out; the body was cut short.
    Truncated(usize),
}

/// Fill `buf` from `reader` until it is full or the source ends.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, R::Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Stream a static page.
///
/// Reads the page [`HTTP_CHUNK_SIZE`] bytes at a time. A page that fits in
/// a single read is sent as one response; anything larger switches to
/// chunked transfer, closed by an empty chunk. `None` answers 404.
pub fn serve_page<R, W>(page: Option<R>, out: &mut W) -> Result<Served, W::Error>
where
    R: Read,
    W: Responder,
{
    let Some(mut page) = page else {
        out.send_status(Status::NotFound)?;
        return Ok(Served::NotFound);
    };

    let mut buf = [0u8; HTTP_CHUNK_SIZE];
    let mut sent = 0usize;
    let mut chunked = false;

    loop {
        let n = match fill(&mut page, &mut buf) {
            Ok(n) => n,
            Err(_) if chunked => {
                out.send_chunk(&[])?;
                return Ok(Served::Truncated(sent));
            }
            Err(_) => {
                out.send_status(Status::InternalServerError)?;
                return Ok(Served::ReadFailed);
            }
        };

        if n == HTTP_CHUNK_SIZE {
            chunked = true;
            out.send_chunk(&buf)?;
            sent += n;
            continue;
        }

        if !chunked {
            out.send(&buf[..n])?;
            return Ok(Served::Single(n));
        }

        if n > 0 {
            out.send_chunk(&buf[..n])?;
            sent += n;
        }
        out.send_chunk(&[])?;
        return Ok(Served::Chunked(sent));
    }
}
