// ------------------------------------------------------------------
// Wire framing shared by *every* debugger transport.
// The pipe and socket bindings both move the same bytes, so the codec
// lives here and neither binding owns it.
//
//   frame   := header body
//   header  := 5 ASCII decimal digits, the byte length of `body`
//   body    := code payload
//   code    := one reserved role byte, or a plain-data byte
// ------------------------------------------------------------------

use std::fmt;
use std::io::{self, Read, Write};

/*───────────────────────────────────────────────────────────────────────────
 *  Control codes
 *─────────────────────────────────────────────────────────────────────────*/

/// Output the front end should print verbatim.
pub const PRINT: u8 = b'.';
/// The back end is waiting for a command line.
pub const PROMPT: u8 = b'?';
/// Yes/no question whose default answer is "yes".
pub const CONFIRM_TRUE: u8 = b'Y';
/// Yes/no question whose default answer is "no".
pub const CONFIRM_FALSE: u8 = b'N';
/// The back end is going away.
pub const QUIT: u8 = b'q';
/// Plain data, used by the front end for replies.
pub const REPLY: u8 = b'!';

/// Width of the decimal length header.
pub const HEADER_LEN: usize = 5;
/// Largest body the header can describe.
pub const MAX_BODY_LEN: usize = 99_999;

/// Purpose of a framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Prompt,
    Print,
    ConfirmTrue,
    ConfirmFalse,
    Quit,
}

impl Role {
    /// The reserved byte that tags this role on the wire.
    pub const fn code(self) -> u8 {
        match self {
            Role::Prompt => PROMPT,
            Role::Print => PRINT,
            Role::ConfirmTrue => CONFIRM_TRUE,
            Role::ConfirmFalse => CONFIRM_FALSE,
            Role::Quit => QUIT,
        }
    }

    /// Map a control byte back to a role; plain data yields `None`.
    pub const fn from_code(code: u8) -> Option<Role> {
        match code {
            PROMPT => Some(Role::Prompt),
            PRINT => Some(Role::Print),
            CONFIRM_TRUE => Some(Role::ConfirmTrue),
            CONFIRM_FALSE => Some(Role::ConfirmFalse),
            QUIT => Some(Role::Quit),
            _ => None,
        }
    }

    /// Confirm role carrying `default` as the suggested answer.
    pub const fn confirm(default: bool) -> Role {
        if default {
            Role::ConfirmTrue
        } else {
            Role::ConfirmFalse
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Prompt => write!(f, "prompt"),
            Role::Print => write!(f, "print"),
            Role::ConfirmTrue => write!(f, "confirm-true"),
            Role::ConfirmFalse => write!(f, "confirm-false"),
            Role::Quit => write!(f, "quit"),
        }
    }
}

/*───────────────────────────────────────────────────────────────────────────
 *  Frames
 *─────────────────────────────────────────────────────────────────────────*/

/// One message: a control code followed by its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: u8,
    pub payload: String,
}

impl Frame {
    /// Frame tagged with a protocol role.
    pub fn new(role: Role, payload: impl Into<String>) -> Self {
        Self {
            code: role.code(),
            payload: payload.into(),
        }
    }

    /// Plain-data frame, as sent by a front end answering a prompt.
    pub fn reply(payload: impl Into<String>) -> Self {
        Self {
            code: REPLY,
            payload: payload.into(),
        }
    }

    /// Role of this frame, `None` for plain data.
    pub fn role(&self) -> Option<Role> {
        Role::from_code(self.code)
    }

    /// Encode to `header body` bytes.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let body_len = 1 + self.payload.len();
        if body_len > MAX_BODY_LEN {
            return Err(FrameError::TooLong(body_len));
        }
        let mut out = Vec::with_capacity(HEADER_LEN + body_len);
        out.extend_from_slice(format!("{:05}", body_len).as_bytes());
        out.push(self.code);
        out.extend_from_slice(self.payload.as_bytes());
        Ok(out)
    }

    /// Decode a complete body (header already stripped).
    pub fn from_body(body: &[u8]) -> Result<Self, FrameError> {
        let (&code, rest) = body.split_first().ok_or(FrameError::EmptyBody)?;
        let payload = std::str::from_utf8(rest)
            .map_err(|_| FrameError::InvalidUtf8)?
            .to_string();
        Ok(Self { code, payload })
    }
}

/// Errors produced by the frame codec.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame body of {0} bytes exceeds the {MAX_BODY_LEN}-byte limit")]
    TooLong(usize),

    #[error("malformed frame header {0:?}")]
    BadHeader(String),

    #[error("frame has no control code")]
    EmptyBody,

    #[error("frame payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("stream ended inside a frame ({got} of {expected} bytes)")]
    Truncated { expected: usize, got: usize },
}

/// Write one frame and flush.
pub fn write_frame<W: Write + ?Sized>(w: &mut W, frame: &Frame) -> Result<(), FrameError> {
    let bytes = frame.encode()?;
    w.write_all(&bytes)?;
    w.flush()?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the stream on a frame
/// boundary.
pub fn read_frame<R: Read + ?Sized>(r: &mut R) -> Result<Option<Frame>, FrameError> {
    let mut header = [0u8; HEADER_LEN];
    let got = read_full(r, &mut header)?;
    if got == 0 {
        return Ok(None);
    }
    if got < HEADER_LEN {
        return Err(FrameError::Truncated {
            expected: HEADER_LEN,
            got,
        });
    }

    let text = std::str::from_utf8(&header)
        .map_err(|_| FrameError::BadHeader(String::from_utf8_lossy(&header).into_owned()))?;
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FrameError::BadHeader(text.to_string()));
    }
    let len: usize = text
        .parse()
        .map_err(|_| FrameError::BadHeader(text.to_string()))?;

    let mut body = vec![0u8; len];
    let got = read_full(r, &mut body)?;
    if got < len {
        return Err(FrameError::Truncated { expected: len, got });
    }
    Frame::from_body(&body).map(Some)
}

/// Like `read_exact`, but reports how much was read before end-of-stream.
fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
