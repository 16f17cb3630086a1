//! Debugger side of a split-process session.
//!
//! [`Connection`] tracks the life cycle of one transport and
//! [`ServerInterface`] layers the message roles of the protocol on top of it:
//! printed output, prompts, confirmations and the final QUIT notice.

use dbg_wire::{Frame, Role};

use crate::processor::DebuggerInterface;
use crate::render::ListingSink;
use crate::transport::{Closer, ConnectError, Transport};

/// Life-cycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Closing,
}

/// One transport plus the state around it.
///
/// Dropping a connected `Connection` sends a QUIT notice first; failures to
/// deliver it are logged and otherwise ignored.
pub struct Connection<T: Transport> {
    transport: T,
    state: ConnectionState,
    last_control_code: Option<u8>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            last_control_code: None,
        }
    }

    /// Establish the connection. On failure the state stays `Disconnected`.
    pub fn open(&mut self) -> Result<(), ConnectError> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        self.transport.open()?;
        self.state = ConnectionState::Connected;
        log::info!("session connected over {}", self.transport.describe());
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Control code of the last frame received.
    pub fn last_control_code(&self) -> Option<u8> {
        self.last_control_code
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn send(&mut self, frame: &Frame) -> Result<(), ConnectError> {
        if !self.is_connected() {
            return Err(ConnectError::NotConnected);
        }
        if let Err(e) = self.transport.send(frame) {
            log::warn!("send failed, dropping connection: {}", e);
            self.close();
            return Err(e);
        }
        Ok(())
    }

    /// Send `text` tagged with `role`.
    pub fn write(&mut self, role: Role, text: &str) -> Result<(), ConnectError> {
        self.send(&Frame::new(role, text))
    }

    /// Send `text` plus a newline, tagged with `role`.
    pub fn writeline(&mut self, role: Role, text: &str) -> Result<(), ConnectError> {
        self.send(&Frame::new(role, format!("{}\n", text)))
    }

    /// Next frame; `Ok(None)` once the peer has gone, which also disconnects.
    pub fn receive(&mut self) -> Result<Option<Frame>, ConnectError> {
        if !self.is_connected() {
            return Err(ConnectError::NotConnected);
        }
        match self.transport.receive() {
            Ok(Some(frame)) => {
                self.last_control_code = Some(frame.code);
                Ok(Some(frame))
            }
            Ok(None) => {
                log::info!("peer closed {}", self.transport.describe());
                self.close();
                Ok(None)
            }
            Err(e) => {
                log::warn!("receive failed, dropping connection: {}", e);
                self.close();
                Err(e)
            }
        }
    }

    /// Handle for shutting the stream down from another thread.
    pub fn closer(&self) -> Option<Closer> {
        self.transport.closer()
    }

    /// Release the transport. Does nothing unless connected.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        self.state = ConnectionState::Closing;
        self.transport.close();
        self.state = ConnectionState::Disconnected;
        log::debug!("session over {} closed", self.transport.describe());
    }

    /// Tell the peer we are leaving, then close.
    pub fn finalize(&mut self, last_wishes: Role) {
        if self.is_connected() {
            if let Err(e) = self.writeline(last_wishes, "") {
                log::warn!("could not deliver {} notice: {}", last_wishes, e);
            }
        }
        self.close();
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        self.finalize(Role::Quit);
        self.transport.close();
    }
}

/// Debugger interface whose user sits at the other end of a transport.
pub struct ServerInterface<T: Transport> {
    connection: Connection<T>,
}

impl<T: Transport> ServerInterface<T> {
    /// Wrap a connection, opened or not.
    pub fn new(connection: Connection<T>) -> Self {
        Self { connection }
    }

    /// Open `transport` and wrap it.
    pub fn connect(transport: T) -> Result<Self, ConnectError> {
        let mut connection = Connection::new(transport);
        connection.open()?;
        Ok(Self::new(connection))
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection<T> {
        &mut self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Print a line on the front end.
    pub fn msg(&mut self, text: &str) -> Result<(), ConnectError> {
        self.connection.writeline(Role::Print, text)
    }

    /// Print without a trailing newline.
    pub fn msg_nocr(&mut self, text: &str) -> Result<(), ConnectError> {
        self.connection.write(Role::Print, text)
    }

    pub fn errmsg(&mut self, text: &str) -> Result<(), ConnectError> {
        self.msg(&format!("** {}", text))
    }

    pub fn section(&mut self, title: &str) -> Result<(), ConnectError> {
        self.msg(title)
    }

    /// Ask the front end for a line. `Ok(None)` at end of stream.
    ///
    /// A QUIT frame from the front end counts as end of stream.
    pub fn readline(&mut self, prompt: &str) -> Result<Option<String>, ConnectError> {
        if !prompt.is_empty() {
            self.connection.writeline(Role::Prompt, prompt)?;
        }
        let Some(frame) = self.connection.receive()? else {
            return Ok(None);
        };
        if frame.role() == Some(Role::Quit) {
            log::debug!("front end sent quit");
            return Ok(None);
        }
        let mut line = frame.payload;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    pub fn read_command(&mut self, prompt: &str) -> Result<Option<String>, ConnectError> {
        self.readline(prompt)
    }

    /// Ask a yes/no question until answered. End of stream answers `default`.
    pub fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool, ConnectError> {
        loop {
            self.connection.writeline(Role::confirm(default), prompt)?;
            let Some(reply) = self.readline("")? else {
                return Ok(default);
            };
            match reply.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.msg("Please answer y or n.")?,
            }
        }
    }

    /// Send QUIT if still connected, then close.
    pub fn finalize(&mut self) {
        self.connection.finalize(Role::Quit);
    }

    pub fn close(&mut self) {
        self.connection.close();
    }
}

impl<T: Transport> ListingSink for ServerInterface<T> {
    fn write_fragment(&mut self, text: &str) -> Result<(), ConnectError> {
        self.msg_nocr(text)
    }

    fn write_line(&mut self, text: &str) -> Result<(), ConnectError> {
        self.msg(text)
    }

    fn section(&mut self, title: &str) -> Result<(), ConnectError> {
        ServerInterface::section(self, title)
    }

    fn error_line(&mut self, text: &str) -> Result<(), ConnectError> {
        self.errmsg(text)
    }
}

impl<T: Transport> DebuggerInterface for ServerInterface<T> {
    fn msg(&mut self, text: &str) -> Result<(), ConnectError> {
        ServerInterface::msg(self, text)
    }

    fn errmsg(&mut self, text: &str) -> Result<(), ConnectError> {
        ServerInterface::errmsg(self, text)
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool, ConnectError> {
        ServerInterface::confirm(self, prompt, default)
    }

    fn read_command(&mut self, prompt: &str) -> Result<Option<String>, ConnectError> {
        ServerInterface::read_command(self, prompt)
    }

    fn as_sink(&mut self) -> &mut dyn ListingSink {
        self
    }
}
