//! Source listing with breakpoint and current-line annotations.

use std::collections::{BTreeMap, HashMap};

use super::{format_token, HighlightStyle, ListingError, ListingSink, TokenKind};
use crate::LineNumber;

/// Supplies source text for listings.
pub trait SourceProvider {
    /// Text of `line` in `filename` (1-based), without its newline.
    fn line(&self, filename: &str, line: LineNumber) -> Option<String>;

    /// Number of lines in `filename`, `None` when the file is unknown.
    fn line_count(&self, filename: &str) -> Option<LineNumber>;

    /// Name used as the breakpoint table key.
    fn canonical_name(&self, filename: &str) -> String {
        filename.to_string()
    }
}

/// A breakpoint as shown in the listing margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointMarker {
    pub number: u32,
    pub enabled: bool,
}

impl BreakpointMarker {
    pub fn icon_char(&self) -> char {
        if self.enabled {
            'B'
        } else {
            'b'
        }
    }
}

/// Read-only view of the breakpoint table.
pub trait BreakpointLookup {
    fn marker(&self, canonical_filename: &str, line: LineNumber) -> Option<BreakpointMarker>;
}

/// Line of the selected frame, if any.
pub trait FrameLineProvider {
    fn current_line(&self) -> Option<LineNumber>;
}

impl FrameLineProvider for Option<LineNumber> {
    fn current_line(&self) -> Option<LineNumber> {
        *self
    }
}

impl BreakpointLookup for BTreeMap<(String, LineNumber), BreakpointMarker> {
    fn marker(&self, canonical_filename: &str, line: LineNumber) -> Option<BreakpointMarker> {
        self.get(&(canonical_filename.to_string(), line)).copied()
    }
}

/// In-memory sources keyed by file name.
#[derive(Debug, Default, Clone)]
pub struct MemorySources {
    files: HashMap<String, Vec<String>>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `text` as the contents of `filename`.
    pub fn insert(&mut self, filename: impl Into<String>, text: &str) {
        self.files
            .insert(filename.into(), text.lines().map(str::to_string).collect());
    }
}

impl SourceProvider for MemorySources {
    fn line(&self, filename: &str, line: LineNumber) -> Option<String> {
        let idx = (line as usize).checked_sub(1)?;
        self.files.get(filename)?.get(idx).cloned()
    }

    fn line_count(&self, filename: &str) -> Option<LineNumber> {
        self.files.get(filename).map(|lines| lines.len() as LineNumber)
    }
}

/// Lines `first..=last` of `filename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub filename: String,
    pub first: LineNumber,
    pub last: LineNumber,
}

/// External collaborators a source listing consults.
pub struct SourceContext<'a> {
    pub sources: &'a dyn SourceProvider,
    pub breakpoints: &'a dyn BreakpointLookup,
    pub frame: &'a dyn FrameLineProvider,
}

/// List source lines with margin annotations. Returns the last line shown.
pub fn render_source(
    sink: &mut dyn ListingSink,
    request: &SourceRequest,
    ctx: &SourceContext<'_>,
    style: HighlightStyle,
) -> Result<Option<LineNumber>, ListingError> {
    let filename = &request.filename;
    let max_line = ctx
        .sources
        .line_count(filename)
        .ok_or_else(|| ListingError::NoSource(filename.clone()))?;

    if request.first > max_line {
        return Err(ListingError::SourceLineOutOfRange {
            line: request.first,
            filename: filename.clone(),
            max: max_line,
        });
    }

    let mut last = request.last;
    if last > max_line {
        sink.write_line(&format!("End position changed to last line {} ", max_line))?;
        last = max_line;
    }

    let canonical = ctx.sources.canonical_name(filename);
    let current = ctx.frame.current_line();
    let mut shown = None;

    for lineno in request.first.max(1)..=last {
        let Some(text) = ctx.sources.line(filename, lineno) else {
            sink.write_line("[EOF]")?;
            break;
        };

        let mut margin = format!("{:>3}", lineno);
        if margin.len() < 5 {
            margin.push(' ');
        }
        let pad = match ctx.breakpoints.marker(&canonical, lineno) {
            Some(bp) => {
                margin.push(bp.icon_char());
                format!("{:02}", bp.number)
            }
            None => {
                margin.push(' ');
                "  ".to_string()
            }
        };
        if current == Some(lineno) {
            margin.push_str("->");
            margin = format_token(TokenKind::Emphasis, &margin, style);
        } else {
            margin.push_str(&pad);
        }

        sink.write_line(&format!("{}\t{}", margin, text.trim_end_matches('\n')))?;
        shown = Some(lineno);
    }

    Ok(shown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::StringSink;

    fn sources() -> MemorySources {
        let mut s = MemorySources::new();
        s.insert("demo.py", "a = 1\nb = 2\nc = a + b\nprint(c)\n");
        s
    }

    fn breakpoints() -> BTreeMap<(String, LineNumber), BreakpointMarker> {
        let mut bps = BTreeMap::new();
        bps.insert(("demo.py".to_string(), 2), BreakpointMarker { number: 1, enabled: true });
        bps.insert(("demo.py".to_string(), 4), BreakpointMarker { number: 12, enabled: false });
        bps
    }

    fn run(first: LineNumber, last: LineNumber, frame: Option<LineNumber>) -> Result<String, ListingError> {
        let sources = sources();
        let bps = breakpoints();
        let ctx = SourceContext {
            sources: &sources,
            breakpoints: &bps,
            frame: &frame,
        };
        let mut sink = StringSink::default();
        render_source(
            &mut sink,
            &SourceRequest {
                filename: "demo.py".into(),
                first,
                last,
            },
            &ctx,
            HighlightStyle::Plain,
        )?;
        Ok(sink.into_string())
    }

    #[test]
    fn test_margin_annotations() {
        let out = run(1, 4, Some(3)).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "  1    \ta = 1");
        assert_eq!(lines[1], "  2 B01\tb = 2");
        assert_eq!(lines[2], "  3  ->\tc = a + b");
        assert_eq!(lines[3], "  4 b12\tprint(c)");
    }

    #[test]
    fn test_current_line_hides_breakpoint_number() {
        let out = run(2, 2, Some(2)).unwrap();
        assert_eq!(out, "  2 B->\tb = 2\n");
    }

    #[test]
    fn test_end_clamped() {
        let out = run(3, 10, None).unwrap();
        assert!(out.starts_with("End position changed to last line 4 \n"));
        assert!(out.ends_with("print(c)\n"));
    }

    #[test]
    fn test_bad_start_line() {
        let err = run(9, 10, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Bad start line 9 - file \"demo.py\" has only 4 lines"
        );
    }

    #[test]
    fn test_unknown_file() {
        let sources = MemorySources::new();
        let bps = BTreeMap::new();
        let ctx = SourceContext {
            sources: &sources,
            breakpoints: &bps,
            frame: &None,
        };
        let mut sink = StringSink::default();
        let req = SourceRequest {
            filename: "nope.py".into(),
            first: 1,
            last: 2,
        };
        assert!(matches!(
            render_source(&mut sink, &req, &ctx, HighlightStyle::Plain),
            Err(ListingError::NoSource(_))
        ));
    }
}
