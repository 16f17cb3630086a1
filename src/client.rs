//! Front-end side of a split-process session: relays the debugger's output
//! to the user and the user's answers back.

use std::io::{BufRead, Write};

use dbg_wire::{Frame, Role};

use crate::session::Connection;
use crate::transport::{ConnectError, Transport};
use crate::DebuggerError;

/// Why [`ClientSession::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The debugger sent QUIT.
    ServerQuit,
    /// The debugger's stream ended.
    Disconnected,
    /// The user's input ended while the debugger wanted a command.
    InputClosed,
}

pub struct ClientSession<T: Transport> {
    connection: Connection<T>,
}

impl<T: Transport> ClientSession<T> {
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

    /// Relay messages until the session ends.
    pub fn run<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<ClientExit, DebuggerError>
    where
        R: BufRead + ?Sized,
        W: Write + ?Sized,
    {
        loop {
            let Some(frame) = self.connection.receive()? else {
                return Ok(ClientExit::Disconnected);
            };
            match frame.role() {
                Some(Role::Print) => {
                    output.write_all(frame.payload.as_bytes())?;
                    output.flush()?;
                }
                Some(Role::Prompt) => {
                    write!(output, "{}", frame.payload.trim_end_matches('\n'))?;
                    output.flush()?;
                    match read_user_line(input)? {
                        Some(line) => self.connection.send(&Frame::reply(line))?,
                        None => {
                            log::info!("user input closed");
                            self.connection.finalize(Role::Quit);
                            return Ok(ClientExit::InputClosed);
                        }
                    }
                }
                Some(role @ (Role::ConfirmTrue | Role::ConfirmFalse)) => {
                    write!(output, "{} (y or n) ", frame.payload.trim_end_matches('\n'))?;
                    output.flush()?;
                    let answer = match read_user_line(input)? {
                        Some(line) => line,
                        None => {
                            let default = if role == Role::ConfirmTrue { "y" } else { "n" };
                            writeln!(output, "{}", default)?;
                            default.to_string()
                        }
                    };
                    self.connection.send(&Frame::reply(answer))?;
                }
                Some(Role::Quit) => {
                    log::info!("debugger quit");
                    self.connection.close();
                    return Ok(ClientExit::ServerQuit);
                }
                None => log::warn!("ignoring frame with control code {:?}", frame.code as char),
            }
        }
    }
}

fn read_user_line<R: BufRead + ?Sized>(input: &mut R) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}
