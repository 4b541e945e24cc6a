use crate::error::{FaqError, Result};
use crate::model::FaqEntry;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

pub fn save_index_jsonl(path: &Path, entries: &[FaqEntry]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for entry in entries {
        let line = serde_json::to_string(entry)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(())
}

/// Load a prebuilt index. All entries must share one embedding dimension.
pub fn load_index_jsonl(path: &Path) -> Result<Vec<FaqEntry>> {
    let file = File::open(path).map_err(|e| FaqError::data_load(path, e.to_string()))?;
    let reader = BufReader::new(file);
    let mut entries: Vec<FaqEntry> = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| FaqError::data_load(path, e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: FaqEntry = serde_json::from_str(&line)
            .map_err(|e| FaqError::data_load(path, format!("line {}: {e}", i + 1)))?;
        if let Some(first) = entries.first() {
            if first.embedding.len() != entry.embedding.len() {
                return Err(FaqError::data_load(
                    path,
                    format!(
                        "line {}: embedding dimension {} differs from {}",
                        i + 1,
                        entry.embedding.len(),
                        first.embedding.len()
                    ),
                ));
            }
        }
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FaqRecord;

    fn entry(id: &str, embedding: Vec<f32>) -> FaqEntry {
        FaqEntry::new(
            FaqRecord {
                id: id.to_string(),
                question: format!("question {id}"),
                answer: format!("answer {id}"),
            },
            embedding,
            Some("test".to_string()),
        )
    }

    #[test]
    fn saved_index_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        save_index_jsonl(&path, &[entry("a", vec![1.0, 0.0]), entry("b", vec![0.0, 1.0])])
            .unwrap();

        let loaded = load_index_jsonl(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].id, "b");
        assert_eq!(loaded[1].embedding, vec![0.0, 1.0]);
        assert_eq!(loaded[0].source.as_deref(), Some("test"));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        save_index_jsonl(&path, &[entry("a", vec![1.0, 0.0]), entry("b", vec![1.0])]).unwrap();

        let err = load_index_jsonl(&path).unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }
}
