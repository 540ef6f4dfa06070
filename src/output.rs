//! Dataset write-out.
//!
//! Each dataset lands as `<name>.json` plus a `<name>.js` twin that binds the
//! same array to a browser global. Nothing is written unless the full record
//! set is non-empty and validates; files are staged next to their targets and
//! renamed into place.
//!
//! Both files are staged before either rename. `<name>.json` is renamed first;
//! if the `.js` rename then fails the new JSON stays in place beside the
//! previous `.js`, and no `.tmp` file is left behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::records::{RecordKind, TopicVocabulary};
use crate::validate::{validate, Violation};

/// Global the topic vocabulary is bound to.
pub const TOPICS_GLOBAL: &str = "__TOPICS__";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("refusing to write an empty {0} dataset")]
    Empty(RecordKind),
    #[error(
        "{kind} dataset failed validation with {} violation(s):\n{}",
        .violations.len(),
        join_lines(.violations)
    )]
    Invalid {
        kind: RecordKind,
        violations: Vec<Violation>,
    },
    #[error("failed to serialize dataset: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

fn join_lines(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| format!("  {violation}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Paths of a published dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub json: PathBuf,
    pub script: PathBuf,
    pub records: usize,
}

/// Writes validated datasets under one directory.
pub struct DatasetWriter {
    dir: PathBuf,
}

impl DatasetWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Validates `records` and replaces `<kind>.json` and `<kind>.js`.
    pub fn publish<R: Serialize>(
        &self,
        kind: RecordKind,
        records: &[R],
    ) -> Result<Published, OutputError> {
        if records.is_empty() {
            return Err(OutputError::Empty(kind));
        }
        let dataset = serde_json::to_value(records)?;
        validate(kind, &dataset).map_err(|violations| OutputError::Invalid { kind, violations })?;

        let json = serde_json::to_string_pretty(&dataset)?;
        let stem = kind.file_stem();
        let json_path = self.dir.join(format!("{stem}.json"));
        let script_path = self.dir.join(format!("{stem}.js"));
        let script = global_binding(kind.global_name(), &json);
        self.write_pair(
            (json_path.as_path(), json.as_str()),
            (script_path.as_path(), script.as_str()),
        )?;
        info!(path = ?json_path, records = records.len(), "wrote {kind}");
        Ok(Published {
            json: json_path,
            script: script_path,
            records: records.len(),
        })
    }

    /// Writes `topics.js` from the vocabulary the run used.
    pub fn publish_topics(&self, vocab: &TopicVocabulary) -> Result<PathBuf, OutputError> {
        let json = serde_json::to_string_pretty(vocab)?;
        let path = self.dir.join("topics.js");
        self.ensure_dir()?;
        write_atomic(&path, &global_binding(TOPICS_GLOBAL, &json))?;
        Ok(path)
    }

    fn write_pair(&self, first: (&Path, &str), second: (&Path, &str)) -> Result<(), OutputError> {
        self.ensure_dir()?;
        let first_tmp = stage(first.0, first.1)?;
        let second_tmp = stage(second.0, second.1).inspect_err(|_| {
            let _ = fs::remove_file(&first_tmp);
        })?;
        commit(&first_tmp, first.0).inspect_err(|_| {
            let _ = fs::remove_file(&first_tmp);
            let _ = fs::remove_file(&second_tmp);
        })?;
        commit(&second_tmp, second.0).inspect_err(|_| {
            let _ = fs::remove_file(&second_tmp);
        })
    }

    fn ensure_dir(&self) -> Result<(), OutputError> {
        fs::create_dir_all(&self.dir).map_err(|source| OutputError::Io {
            path: self.dir.clone(),
            source,
        })
    }
}

fn global_binding(global: &str, json: &str) -> String {
    format!("window.{global} = {json};\n")
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn stage(path: &Path, contents: &str) -> Result<PathBuf, OutputError> {
    let tmp = staging_path(path);
    fs::write(&tmp, contents).map_err(|source| OutputError::Io {
        path: tmp.clone(),
        source,
    })?;
    Ok(tmp)
}

fn commit(tmp: &Path, path: &Path) -> Result<(), OutputError> {
    fs::rename(tmp, path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), OutputError> {
    let tmp = stage(path, contents)?;
    commit(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::QuoteRecord;
    use pretty_assertions::assert_eq;

    fn quote(id: &str, text: &str) -> QuoteRecord {
        QuoteRecord {
            id: id.into(),
            text: text.into(),
            speaker: String::new(),
            listener: String::new(),
            situation: String::new(),
            episode_title: String::new(),
            season: None,
            episode: None,
            source: "Wikiquote".into(),
        }
    }

    #[test]
    fn writes_json_and_global_binding() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DatasetWriter::new(dir.path().join("data"));
        let published = writer
            .publish(RecordKind::Quotes, &[quote("wq-1", "Giddy up!")])
            .unwrap();

        let json = fs::read_to_string(&published.json).unwrap();
        let script = fs::read_to_string(&published.script).unwrap();
        assert_eq!(script, format!("window.__QUOTES__ = {json};\n"));
        let parsed: Vec<QuoteRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, vec![quote("wq-1", "Giddy up!")]);
        assert!(!staging_path(&published.json).exists());
    }

    #[test]
    fn empty_run_leaves_existing_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("quotes.json");
        fs::write(&existing, "[{\"id\":\"wq-1\"}]").unwrap();

        let writer = DatasetWriter::new(dir.path());
        let err = writer
            .publish::<QuoteRecord>(RecordKind::Quotes, &[])
            .unwrap_err();
        assert!(matches!(err, OutputError::Empty(RecordKind::Quotes)));
        assert_eq!(fs::read_to_string(&existing).unwrap(), "[{\"id\":\"wq-1\"}]");
        assert!(!dir.path().join("quotes.js").exists());
    }

    #[test]
    fn invalid_records_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DatasetWriter::new(dir.path());
        let err = writer
            .publish(
                RecordKind::Quotes,
                &[quote("wq-1", "Yada yada"), quote("wq-1", "")],
            )
            .unwrap_err();
        match err {
            OutputError::Invalid { violations, .. } => assert_eq!(violations.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn failed_script_rename_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("quotes.js");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), "").unwrap();

        let writer = DatasetWriter::new(dir.path());
        let err = writer
            .publish(RecordKind::Quotes, &[quote("wq-1", "Serenity now!")])
            .unwrap_err();
        assert!(matches!(err, OutputError::Io { ref path, .. } if path == &blocked));

        let json = dir.path().join("quotes.json");
        assert!(json.exists());
        assert!(!staging_path(&json).exists());
        assert!(!staging_path(&blocked).exists());
        assert!(blocked.join("keep").exists());
    }

    #[test]
    fn topics_script_binds_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DatasetWriter::new(dir.path());
        let path = writer
            .publish_topics(&TopicVocabulary::new(["Dating", "Work"]))
            .unwrap();
        let script = fs::read_to_string(path).unwrap();
        assert!(script.starts_with("window.__TOPICS__ = ["));
        assert!(script.ends_with("];\n"));
    }
}
