//! Metadata sidecar files read by bulk importers.
//!
//! Each exported file or folder gets a `<path>.metadata.properties.xml`
//! next to it, in the Java properties XML layout.

use std::borrow::Cow;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bulkexport_core::NodeRecord;

/// Literal suffix appended to a target path to name its sidecar.
pub const SIDECAR_SUFFIX: &str = ".metadata.properties.xml";

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<!DOCTYPE properties SYSTEM \"http://java.sun.com/dtd/properties.dtd\">\n\
<properties>";
const FOOTER: &str = "\n</properties>";

/// Path of the sidecar belonging to `target`.
pub fn sidecar_path(target: &Path) -> PathBuf {
    append_to_path(target, SIDECAR_SUFFIX)
}

/// Append a raw suffix to the last component of a path.
pub(crate) fn append_to_path(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Escape `&`, `<` and `>` as entities. Nothing else is touched.
pub fn escape_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Render the sidecar document for an (already filtered) record.
///
/// Entries come in a fixed order: `type`, `aspects` (comma-joined), then one
/// entry per property in record order.
pub fn render(record: &NodeRecord) -> String {
    let mut text = String::with_capacity(HEADER.len() + 64 * (record.properties.len() + 2));
    text.push_str(HEADER);

    text.push_str("\n\t<entry key=\"type\">");
    text.push_str(&record.node_type);
    text.push_str("</entry>");

    text.push_str("\n\t<entry key=\"aspects\">");
    for (i, aspect) in record.aspects.iter().enumerate() {
        if i > 0 {
            text.push(',');
        }
        text.push_str(aspect);
    }
    text.push_str("</entry>");

    for (key, value) in &record.properties {
        text.push_str("\n\t<entry key=\"");
        text.push_str(key);
        text.push_str("\">");
        text.push_str(&escape_value(value));
        text.push_str("</entry>");
    }

    text.push_str(FOOTER);
    text
}

/// Write the sidecar for `target`, replacing any existing one.
///
/// Returns the sidecar path and the number of bytes written.
pub fn write_sidecar(target: &Path, record: &NodeRecord) -> io::Result<(PathBuf, u64)> {
    let path = sidecar_path(target);
    let text = render(record);
    fs::write(&path, text.as_bytes())?;
    Ok((path, text.len() as u64))
}
