//! Debugger settings and connection options.
//!
//! Both load from JSON; missing keys take their defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::format::OutputFormat;
use crate::render::{FormattingPolicy, HighlightStyle};

/// Value of a named setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(true) => write!(f, "on"),
            SettingValue::Bool(false) => write!(f, "off"),
            SettingValue::Int(n) => write!(f, "{}", n),
            SettingValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Read access to named settings.
pub trait SettingsProvider {
    fn get(&self, name: &str) -> Option<SettingValue>;

    fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            SettingValue::Int(n) => Some(n),
            _ => None,
        }
    }

    fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            SettingValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

/// Error type for settings handling
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown setting {0:?}")]
    Unknown(String),

    #[error("setting {0:?} is not a boolean")]
    NotBoolean(String),
}

/// Names accepted by [`SettingsProvider::get`] on [`Settings`].
pub const SETTING_NAMES: &[&str] = &[
    "abbrev",
    "confirm",
    "different",
    "format",
    "highlight",
    "listsize",
    "skip",
    "statement_cap",
];

/// User-adjustable debugger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub highlight: HighlightStyle,
    /// Lines shown by a bare `list`.
    pub listsize: u32,
    /// Stop a disassembly after this many statements.
    pub statement_cap: Option<usize>,
    /// Overrides every command's minimum abbreviation when set.
    pub abbrev: Option<usize>,
    /// Skip stopping before `def` and `class` statements.
    pub skip: bool,
    /// Consecutive stops must be at different positions.
    pub different: bool,
    pub format: OutputFormat,
    /// Ask before dangerous commands.
    pub confirm: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            highlight: HighlightStyle::default(),
            listsize: 10,
            statement_cap: None,
            abbrev: None,
            skip: true,
            different: true,
            format: OutputFormat::default(),
            confirm: true,
        }
    }
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json_str(&text)?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> Result<(), SettingsError> {
        match name {
            "skip" => self.skip = value,
            "different" => self.different = value,
            "confirm" => self.confirm = value,
            _ if SETTING_NAMES.contains(&name) => return Err(SettingsError::NotBoolean(name.to_string())),
            _ => return Err(SettingsError::Unknown(name.to_string())),
        }
        Ok(())
    }

    /// Listing policy carrying these settings; bounds are left open.
    pub fn formatting_policy(&self) -> FormattingPolicy {
        FormattingPolicy {
            highlight: self.highlight,
            statement_cap: self.statement_cap,
            ..FormattingPolicy::default()
        }
    }
}

impl SettingsProvider for Settings {
    fn get(&self, name: &str) -> Option<SettingValue> {
        let value = match name {
            "highlight" => SettingValue::Text(self.highlight.to_string()),
            "listsize" => SettingValue::Int(self.listsize.into()),
            "statement_cap" => SettingValue::Int(self.statement_cap? as i64),
            "abbrev" => SettingValue::Int(self.abbrev? as i64),
            "skip" => SettingValue::Bool(self.skip),
            "different" => SettingValue::Bool(self.different),
            "format" => SettingValue::Text(self.format.to_string()),
            "confirm" => SettingValue::Bool(self.confirm),
            _ => return None,
        };
        Some(value)
    }
}

/// Kind of connection between the debugger and its front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// TCP socket
    #[default]
    Tcp,
    /// Unix-domain socket on the same host
    Pipe,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::Pipe => write!(f, "pipe"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" | "socket" => Ok(TransportKind::Tcp),
            "pipe" | "unix" => Ok(TransportKind::Pipe),
            _ => Err(format!("Unknown transport: {}", s)),
        }
    }
}

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1027;

/// Where a session connects or listens.
#[derive(Debug, Clone, PartialEq, Eq, Args, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Connection kind
    #[arg(long = "io", value_enum, default_value_t = TransportKind::Tcp)]
    pub io: TransportKind,

    /// Host for TCP connections
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port for TCP connections
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Socket path for pipe connections
    #[arg(long)]
    pub socket_path: Option<PathBuf>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            io: TransportKind::Tcp,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            socket_path: None,
        }
    }
}

impl ConnectionOptions {
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Human-readable endpoint, used in diagnostics.
    pub fn endpoint(&self) -> String {
        match self.io {
            TransportKind::Tcp => format!("{}:{}", self.host, self.port),
            TransportKind::Pipe => match &self.socket_path {
                Some(path) => path.display().to_string(),
                None => "<no socket path>".to_string(),
            },
        }
    }
}
