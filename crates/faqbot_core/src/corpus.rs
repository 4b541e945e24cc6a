use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

use crate::error::{FaqError, Result};
use crate::model::FaqRecord;

#[derive(Debug, Deserialize)]
struct RawFaq {
    id: Option<String>,
    question: String,
    answer: String,
}

/// Load FAQ records from a `.csv` or `.jsonl` file.
///
/// CSV files need a header row with at least `question` and `answer`
/// columns; an `id` column is used when present, otherwise records are
/// numbered `faq-1`, `faq-2`, ... in file order.
pub fn load_corpus(path: &Path) -> Result<Vec<FaqRecord>> {
    if !path.exists() {
        return Err(FaqError::data_load(path, "file not found"));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "jsonl" => read_raw_jsonl(path)?,
        _ => read_raw_csv(path)?,
    };

    let mut records = Vec::with_capacity(raw.len());
    for (i, r) in raw.into_iter().enumerate() {
        let question = r.question.trim().to_string();
        if question.is_empty() {
            return Err(FaqError::data_load(
                path,
                format!("row {}: empty question", i + 1),
            ));
        }
        records.push(FaqRecord {
            id: r
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("faq-{}", i + 1)),
            question,
            answer: r.answer.trim().to_string(),
        });
    }

    tracing::debug!(path = %path.display(), records = records.len(), "corpus loaded");
    Ok(records)
}

fn read_raw_csv(path: &Path) -> Result<Vec<RawFaq>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| FaqError::data_load(path, e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| FaqError::data_load(path, e.to_string()))?
        .clone();
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), i))
        .collect();

    let question_col = *columns
        .get("question")
        .ok_or_else(|| FaqError::data_load(path, "missing column 'question'"))?;
    let answer_col = *columns
        .get("answer")
        .ok_or_else(|| FaqError::data_load(path, "missing column 'answer'"))?;
    let id_col = columns.get("id").copied();

    let mut out = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row.map_err(|e| FaqError::data_load(path, format!("row {}: {e}", i + 1)))?;
        let field = |col: usize, name: &str| {
            row.get(col).map(str::to_string).ok_or_else(|| {
                FaqError::data_load(path, format!("row {}: missing '{name}' value", i + 1))
            })
        };
        out.push(RawFaq {
            id: id_col.and_then(|c| row.get(c)).map(str::to_string),
            question: field(question_col, "question")?,
            answer: field(answer_col, "answer")?,
        });
    }

    Ok(out)
}

fn read_raw_jsonl(path: &Path) -> Result<Vec<RawFaq>> {
    let file = File::open(path).map_err(|e| FaqError::data_load(path, e.to_string()))?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| FaqError::data_load(path, e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let raw = serde_json::from_str::<RawFaq>(&line)
            .map_err(|e| FaqError::data_load(path, format!("line {}: {e}", i + 1)))?;
        out.push(raw);
    }

    Ok(out)
}
