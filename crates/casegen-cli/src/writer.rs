//! Case files: one pretty-printed JSON document per accepted case.

use casegen_ir::Mode;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes cases into one output directory.
///
/// Workers share a directory but never a file name: each worker writes
/// only inside the index range its plan assigns.
#[derive(Debug, Clone)]
pub struct CaseWriter {
    dir: PathBuf,
}

impl CaseWriter {
    /// Use `dir`, creating it if absent.
    pub fn create(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `P00012.json`, `N00000.json`, ...
    pub fn file_name(mode: Mode, index: usize) -> String {
        format!("{}{:05}.json", mode.prefix(), index)
    }

    pub fn write(&self, mode: Mode, index: usize, case: &Value) -> io::Result<PathBuf> {
        let path = self.dir.join(Self::file_name(mode, index));
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        case.serialize(&mut ser)?;
        buf.push(b'\n');
        fs::write(&path, buf)?;
        debug!(path = %path.display(), "case written");
        Ok(path)
    }

    /// Write a case, falling back to stderr when the file cannot be
    /// written. Returns whether the file was written.
    pub fn write_or_echo(&self, mode: Mode, index: usize, case: &Value) -> bool {
        match self.write(mode, index, case) {
            Ok(_) => true,
            Err(e) => {
                let name = Self::file_name(mode, index);
                warn!(file = %name, error = %e, "failed to write case");
                eprintln!("{name}: {case}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_names() {
        assert_eq!(CaseWriter::file_name(Mode::Positive, 0), "P00000.json");
        assert_eq!(CaseWriter::file_name(Mode::Negative, 123), "N00123.json");
        assert_eq!(CaseWriter::file_name(Mode::Positive, 123456), "P123456.json");
    }

    #[test]
    fn test_write_pretty_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaseWriter::create(dir.path().join("nested/out")).unwrap();
        let case = json!({"z": 1, "a": [1, 2], "m": {"y": 2.5, "b": -1}});
        let path = writer.write(Mode::Positive, 7, &case).unwrap();
        assert_eq!(path.file_name().unwrap(), "P00007.json");

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n    \"a\": [\n        1,"));
        let a = text.find("\"a\"").unwrap();
        let m = text.find("\"m\"").unwrap();
        let z = text.find("\"z\"").unwrap();
        assert!(a < m && m < z);
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, case);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaseWriter::create(dir.path()).unwrap();
        // A directory in the way of the target file.
        fs::create_dir(dir.path().join("N00001.json")).unwrap();
        assert!(!writer.write_or_echo(Mode::Negative, 1, &json!({"a": 1})));
        assert!(writer.write_or_echo(Mode::Negative, 2, &json!({"a": 1})));
    }
}
