use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

use crate::error::Result;
use crate::model::Reply;

const HEADER: [&str; 5] = ["timestamp", "question", "answer", "source", "score"];

/// Append-only CSV audit log of answered questions. Never read back.
pub struct InteractionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl InteractionLog {
    /// Create the file with its header row if it does not exist or is empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let needs_header = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        if needs_header {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(HEADER)?;
            writer.flush()?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, question: &str, answer: &str, source: &str, score: f32) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let timestamp = Local::now().to_rfc3339();
        let score = format!("{score:.4}");
        writer.write_record([timestamp.as_str(), question, answer, source, score.as_str()])?;
        writer.flush()?;
        Ok(())
    }

    pub fn record(&self, reply: &Reply) -> Result<()> {
        self.append(&reply.query, &reply.text, reply.source.as_str(), reply.score)
    }
}
