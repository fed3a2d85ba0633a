//! Log storage - XML document plus a compact line format for export
//!
//! ```text
//! <zedlog>
//!   <loggers>
//!     <logger type="KeyLogger"/>
//!   </loggers>
//!   <entries>
//!     <entry timestamp="..." logger="KeyLogger" type="Key" .../>
//!   </entries>
//! </zedlog>
//! ```

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use zedlog_core::codec::Node;
use zedlog_core::entry::ENTRY_TAG;
use zedlog_core::{Error, EventKind, LogEntry, LogEvent, Result, TokenReader};

pub const ROOT_TAG: &str = "zedlog";
pub const LOGGERS_TAG: &str = "loggers";
pub const LOGGER_TAG: &str = "logger";
pub const ENTRIES_TAG: &str = "entries";

/// In-memory form of a log file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogDocument {
    /// Type tag of each child logger, one record per logger instance
    pub loggers: Vec<String>,
    pub entries: Vec<LogEntry>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Outside,
    Root,
    Loggers,
    Entries,
}

impl LogDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);

        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        w.write_event(Event::Start(BytesStart::new(ROOT_TAG)))?;

        w.write_event(Event::Start(BytesStart::new(LOGGERS_TAG)))?;
        for tag in &self.loggers {
            let mut el = BytesStart::new(LOGGER_TAG);
            el.push_attribute(("type", tag.as_str()));
            w.write_event(Event::Empty(el))?;
        }
        w.write_event(Event::End(BytesEnd::new(LOGGERS_TAG)))?;

        w.write_event(Event::Start(BytesStart::new(ENTRIES_TAG)))?;
        for entry in &self.entries {
            let node = entry.to_node();
            let mut el = BytesStart::new(node.tag());
            for (k, v) in node.attrs() {
                el.push_attribute((k, v));
            }
            w.write_event(Event::Empty(el))?;
        }
        w.write_event(Event::End(BytesEnd::new(ENTRIES_TAG)))?;

        w.write_event(Event::End(BytesEnd::new(ROOT_TAG)))?;

        String::from_utf8(w.into_inner())
            .map_err(|e| Error::malformed_log(format!("non UTF-8 output: {}", e)))
    }

    /// Parse a whole document. An empty (freshly created) file is an empty log.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut doc = Self::new();
        if xml.trim().is_empty() {
            return Ok(doc);
        }

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut section = Section::Outside;
        let mut seen_root = false;
        // Depth of elements nested inside a record (<entry>...</entry>)
        let mut record_depth = 0usize;

        loop {
            let (el, is_empty) = match reader.read_event()? {
                Event::Start(el) => (el, false),
                Event::Empty(el) => (el, true),
                Event::End(el) => {
                    if record_depth > 0 {
                        record_depth -= 1;
                        continue;
                    }
                    let name = el.name();
                    section = match (section, name.as_ref()) {
                        (Section::Loggers, b"loggers") | (Section::Entries, b"entries") => {
                            Section::Root
                        }
                        (Section::Root, b"zedlog") => Section::Outside,
                        _ => section,
                    };
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };

            if record_depth > 0 {
                if !is_empty {
                    record_depth += 1;
                }
                continue;
            }

            let node = to_node(&el)?;
            match (section, node.tag()) {
                (Section::Outside, ROOT_TAG) if !seen_root => {
                    seen_root = true;
                    if !is_empty {
                        section = Section::Root;
                    }
                }
                (Section::Outside, other) => {
                    return Err(Error::malformed_log(format!(
                        "expected a single <{}> root, found <{}>",
                        ROOT_TAG, other
                    )));
                }
                (Section::Root, LOGGERS_TAG) if !is_empty => section = Section::Loggers,
                (Section::Root, ENTRIES_TAG) if !is_empty => section = Section::Entries,
                (Section::Loggers, LOGGER_TAG) => {
                    doc.loggers.push(node.require("type")?.to_string());
                    if !is_empty {
                        record_depth = 1;
                    }
                }
                (Section::Entries, ENTRY_TAG) => {
                    doc.entries.push(LogEntry::from_node(&node)?);
                    if !is_empty {
                        record_depth = 1;
                    }
                }
                // Unknown sections are skipped
                _ => {
                    if !is_empty {
                        record_depth = 1;
                    }
                }
            }
        }

        if !seen_root {
            return Err(Error::malformed_log(format!("missing <{}> root", ROOT_TAG)));
        }
        Ok(doc)
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let xml = fs::read_to_string(path.as_ref())?;
        Self::parse(&xml)
    }

    /// Replace the file at `path` with this document. Written to a sibling
    /// file first and renamed, so a failed write leaves the previous flush.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let xml = self.to_xml()?;
        let tmp = scratch_path(path);
        fs::write(&tmp, xml.as_bytes())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn scratch_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "zedlog".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

fn to_node(el: &BytesStart<'_>) -> Result<Node> {
    let tag = std::str::from_utf8(el.name().as_ref())
        .map_err(|e| Error::malformed_log(format!("tag name: {}", e)))?
        .to_string();
    let mut node = Node::new(tag);
    for attr in el.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| Error::malformed_log(format!("attribute name: {}", e)))?
            .to_string();
        let value = attr.unescape_value()?;
        node.set(&key, value);
    }
    Ok(node)
}

/// Write entries in the compact line format: `KIND|timestamp|event tokens`.
///
/// The leading kind column is the out-of-band type list the token encoding
/// needs to be read back.
pub fn write_text_log<'a, W: Write>(
    entries: impl IntoIterator<Item = &'a LogEntry>,
    mut w: W,
) -> Result<usize> {
    let mut count = 0;
    for entry in entries {
        writeln!(
            w,
            "{}|{}|{}",
            entry.event.kind(),
            entry.timestamp,
            entry.event.to_tokens()
        )?;
        count += 1;
    }
    w.flush()?;
    Ok(count)
}

/// Inverse of [`write_text_log`]. Blank lines are skipped.
pub fn read_text_log<R: BufRead>(r: R) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    for (n, line) in r.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let at_line = |e: zedlog_core::DecodeError| {
            Error::malformed_log(format!("line {}: {}", n + 1, e))
        };
        let mut tokens = TokenReader::new(&line);
        let kind: EventKind = tokens.next_str("kind").map_err(at_line)?.parse().map_err(at_line)?;
        let timestamp = tokens.next_parse("timestamp").map_err(at_line)?;
        let event = LogEvent::read(kind, &mut tokens).map_err(at_line)?;
        entries.push(LogEntry::new(timestamp, event));
    }
    Ok(entries)
}
