/// Reader/writer for the extended M3U playlist format: `#EXTM3U` header,
/// optional `#PLAYLIST:<name>`, and `#EXTINF:<secs>,<artist> - <title>`
/// ahead of each path. The reader also tolerates the plain path-per-line
/// variant and resolves relative entries against the file's directory.
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M3uEntry {
    pub path: PathBuf,
    /// Whole seconds, from `#EXTINF`.
    pub duration: Option<i64>,
    /// The `#EXTINF` display string, conventionally "artist - title".
    pub display: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct M3uDocument {
    /// From `#PLAYLIST:`, when present.
    pub name: Option<String>,
    pub entries: Vec<M3uEntry>,
}

pub fn read_file(path: &Path) -> Result<M3uDocument> {
    let text = fs::read_to_string(path)?;
    let base_dir = path.parent().unwrap_or(Path::new(""));
    Ok(parse(&text, base_dir))
}

pub fn parse(text: &str, base_dir: &Path) -> M3uDocument {
    let mut doc = M3uDocument::default();
    let mut pending: Option<(Option<i64>, Option<String>)> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line == "#EXTM3U" {
            continue;
        }
        if let Some(name) = line.strip_prefix("#PLAYLIST:") {
            doc.name = Some(name.trim().to_string());
            continue;
        }
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            let (duration, display) = match info.split_once(',') {
                Some((d, rest)) => (d.trim().parse::<i64>().ok(), Some(rest.trim().to_string())),
                None => (info.trim().parse::<i64>().ok(), None),
            };
            pending = Some((duration, display));
            continue;
        }
        if line.starts_with('#') {
            // Unknown directive.
            continue;
        }

        let mut path = PathBuf::from(line);
        if path.is_relative() {
            path = normalize(&base_dir.join(path));
        }
        let (duration, display) = pending.take().unwrap_or((None, None));
        doc.entries.push(M3uEntry {
            path,
            duration,
            display,
        });
    }
    doc
}

pub fn write(doc: &M3uDocument) -> String {
    let mut out = String::from("#EXTM3U\n");
    if let Some(name) = &doc.name {
        let _ = writeln!(out, "#PLAYLIST:{name}");
    }
    for entry in &doc.entries {
        if entry.duration.is_some() || entry.display.is_some() {
            let _ = writeln!(out, "#EXTINF:{},{}", entry.duration.unwrap_or(-1), entry.display.as_deref().unwrap_or(""));
        }
        let _ = writeln!(out, "{}", entry.path.display());
    }
    out
}

pub fn write_file(doc: &M3uDocument, dest: &Path) -> Result<()> {
    fs::write(dest, write(doc))?;
    Ok(())
}

/// Lexically collapse `.` and `..` components; unlike canonicalization
/// this never touches the filesystem, so entries for vanished files still
/// resolve to comparable paths.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            c => out.push(c),
        }
    }
    out
}
