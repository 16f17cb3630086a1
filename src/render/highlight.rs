//! Terminal highlighting of listing tokens.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Colour scheme for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightStyle {
    /// No escape sequences
    Plain,
    /// Colours for a light terminal background
    #[default]
    Light,
    /// Colours for a dark terminal background
    Dark,
}

impl fmt::Display for HighlightStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HighlightStyle::Plain => write!(f, "plain"),
            HighlightStyle::Light => write!(f, "light"),
            HighlightStyle::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for HighlightStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "off" => Ok(HighlightStyle::Plain),
            "light" => Ok(HighlightStyle::Light),
            "dark" => Ok(HighlightStyle::Dark),
            _ => Err(format!("Unknown highlight style: {}", s)),
        }
    }
}

/// Lexical role of a listing token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LineNumber,
    Arrow,
    Opcode,
    Const,
    Name,
    Var,
    Label,
    Compare,
    Emphasis,
}

const RESET: &str = "\x1b[0m";

fn sgr(kind: TokenKind, style: HighlightStyle) -> Option<&'static str> {
    let code = match (style, kind) {
        (HighlightStyle::Plain, _) => return None,
        (_, TokenKind::LineNumber) | (_, TokenKind::Emphasis) => "\x1b[1m",
        (HighlightStyle::Light, TokenKind::Arrow) => "\x1b[1;31m",
        (HighlightStyle::Light, TokenKind::Opcode) => "\x1b[34m",
        (HighlightStyle::Light, TokenKind::Const) => "\x1b[32m",
        (HighlightStyle::Light, TokenKind::Name) => "\x1b[36m",
        (HighlightStyle::Light, TokenKind::Var) => "\x1b[35m",
        (HighlightStyle::Light, TokenKind::Label) => "\x1b[31m",
        (HighlightStyle::Light, TokenKind::Compare) => "\x1b[33m",
        (HighlightStyle::Dark, TokenKind::Arrow) => "\x1b[1;91m",
        (HighlightStyle::Dark, TokenKind::Opcode) => "\x1b[94m",
        (HighlightStyle::Dark, TokenKind::Const) => "\x1b[92m",
        (HighlightStyle::Dark, TokenKind::Name) => "\x1b[96m",
        (HighlightStyle::Dark, TokenKind::Var) => "\x1b[95m",
        (HighlightStyle::Dark, TokenKind::Label) => "\x1b[91m",
        (HighlightStyle::Dark, TokenKind::Compare) => "\x1b[93m",
    };
    Some(code)
}

/// Wrap `text` in the escape sequence for `kind` under `style`.
pub fn format_token(kind: TokenKind, text: &str, style: HighlightStyle) -> String {
    match sgr(kind, style) {
        Some(code) => format!("{}{}{}", code, text, RESET),
        None => text.to_string(),
    }
}
