//! Core of a line-oriented debugger for a bytecode-interpreted runtime.
//!
//! The crate has two halves:
//!
//! * a disassembler that decodes a code object's instruction stream and
//!   renders an annotated listing ([`decoder`], [`render`], [`format`]);
//! * the split-process control plumbing: a command/subcommand registry with
//!   prefix-unique abbreviations ([`registry`], [`commands`], [`processor`])
//!   and a framed session protocol over interchangeable transports
//!   ([`transport`], [`session`], [`client`]).
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use vmdbg::{
//!     code::CodeObject,
//!     decoder::DecodeSession,
//!     opcodes::RuntimeVersion,
//!     render::{render_listing, FormattingPolicy, StringSink},
//! };
//!
//! let code: CodeObject = serde_json::from_str(&std::fs::read_to_string("f.json").unwrap()).unwrap();
//! let session = DecodeSession::new(&code, RuntimeVersion::Classic.table());
//!
//! let mut sink = StringSink::default();
//! render_listing(&mut sink, &session, &FormattingPolicy::default()).unwrap();
//! print!("{}", sink.as_str());
//! ```

pub mod opcodes;
pub mod code;
pub mod decoder;
pub mod render;
pub mod format;
pub mod registry;
pub mod commands;
pub mod processor;
pub mod settings;
pub mod transport;
pub mod session;
pub mod client;

/// Byte offset into an instruction stream.
pub type Offset = usize;

/// Source line number.
pub type LineNumber = u32;

pub use dbg_wire::{Frame, Role};

/// Error type for debugger operations
#[derive(Debug, thiserror::Error)]
pub enum DebuggerError {
    /// Malformed instruction stream
    #[error(transparent)]
    Decode(#[from] decoder::DecodeError),

    /// Listing could not be produced
    #[error(transparent)]
    Listing(#[from] render::ListingError),

    /// Registry misuse
    #[error(transparent)]
    Registry(#[from] registry::RegistryError),

    /// Transport unavailable or broken
    #[error(transparent)]
    Connect(#[from] transport::ConnectError),

    /// Bad configuration
    #[error(transparent)]
    Settings(#[from] settings::SettingsError),

    /// Bad opcode table
    #[error(transparent)]
    OpcodeTable(#[from] opcodes::OpcodeTableError),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
