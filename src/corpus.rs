use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use kdam::{tqdm, BarExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const PARAGRAPH_FIELD: &str = "preprocessed";

/// One line of an input corpus file.
///
/// `preprocessed` is optional here so that a record without it parses and the
/// problem is reported by [`extract_paragraphs`] with the record's position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocessed: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reads a newline-delimited JSON file into records, in file order.
///
/// Blank lines are skipped. Any other line that is not a JSON object aborts
/// the whole read.
pub fn read_jsonl(path: &Path, progress: bool) -> Result<Vec<DocumentRecord>> {
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(path)?);
    let mut bar = tqdm!(
        desc = path.display().to_string(),
        unit = " lines",
        disable = !progress
    );

    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        bar.update(1)?;

        if line.trim().is_empty() {
            continue;
        }

        let record: DocumentRecord = serde_json::from_str(&line).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        records.push(record);
    }
    bar.refresh()?;
    if progress {
        eprintln!();
    }

    debug!(path = %path.display(), records = records.len(), "read corpus file");
    Ok(records)
}

/// Loads every file in order and concatenates their records.
pub fn read_all(paths: &[PathBuf], progress: bool) -> Result<Vec<DocumentRecord>> {
    let mut records = Vec::new();
    for path in paths {
        records.extend(read_jsonl(path, progress)?);
    }
    info!("Total number of texts: {}", records.len());
    Ok(records)
}

/// Flattens the paragraphs of every record: record order, then paragraph order.
pub fn extract_paragraphs(records: &[DocumentRecord]) -> Result<Vec<String>> {
    let mut paragraphs = Vec::new();
    for (record, doc) in records.iter().enumerate() {
        let Some(paras) = &doc.preprocessed else {
            return Err(Error::MissingField {
                record,
                field: PARAGRAPH_FIELD,
            });
        };
        paragraphs.extend(paras.iter().cloned());
    }
    info!("Total number of paragraphs: {}", paragraphs.len());
    Ok(paragraphs)
}

/// Splits a preprocessed paragraph into its tokens.
pub fn tokenize(paragraph: &str) -> Vec<String> {
    paragraph.split_whitespace().map(str::to_string).collect()
}

/// Copies an evenly spaced `percentage` of the non-blank lines of `input` to
/// `output`, starting with the first. Returns the number of lines written.
pub fn sample_lines(input: &Path, output: &Path, percentage: f64) -> Result<usize> {
    if !(percentage > 0.0 && percentage <= 100.0) {
        return Err(Error::Config(format!(
            "sample percentage must be in (0, 100], got {}",
            percentage
        )));
    }
    if !input.exists() {
        return Err(Error::MissingInput(input.to_path_buf()));
    }

    let mut lines = Vec::new();
    for line in BufReader::new(File::open(input)?).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }

    let total = lines.len();
    let sample_size = (total as f64 * percentage / 100.0) as usize;
    let step = if sample_size == 0 { total } else { total / sample_size };
    let step = step.max(1);
    debug!(total, sample_size, step, "sampling corpus lines");

    let mut writer = BufWriter::new(File::create(output)?);
    let mut written = 0;
    for line in lines.iter().step_by(step) {
        writeln!(writer, "{}", line)?;
        written += 1;
    }
    writer.flush()?;

    info!("Sampled {} of {} lines into {}", written, total, output.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_jsonl_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "a.jsonl",
            "{\"preprocessed\": [\"a b\"]}\n\n   \n{\"preprocessed\": [], \"id\": 7}\n",
        );
        let records = read_jsonl(&path, false).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].extra.get("id"), Some(&Value::from(7)));
    }

    #[test]
    fn test_read_jsonl_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_jsonl(&dir.path().join("nope.jsonl"), false).unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
    }

    #[test]
    fn test_read_jsonl_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "bad.jsonl", "{\"preprocessed\": []}\nnot json\n");
        match read_jsonl(&path, false) {
            Err(Error::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected JSON error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_all_concatenates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.jsonl", "{\"preprocessed\": [\"first\"]}\n");
        let b = write_file(
            dir.path(),
            "b.jsonl",
            "{\"preprocessed\": [\"second\"]}\n{\"preprocessed\": [\"third\"]}\n",
        );
        let records = read_all(&[a, b], false).unwrap();
        let paragraphs = extract_paragraphs(&records).unwrap();
        assert_eq!(paragraphs, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_extract_paragraphs_missing_field() {
        let records = vec![
            DocumentRecord {
                preprocessed: Some(vec!["x".into()]),
                ..Default::default()
            },
            DocumentRecord::default(),
        ];
        match extract_paragraphs(&records) {
            Err(Error::MissingField { record, field }) => {
                assert_eq!(record, 1);
                assert_eq!(field, "preprocessed");
            }
            other => panic!("expected missing field, got {:?}", other),
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("  the  cat\tsat\n"), vec!["the", "cat", "sat"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_sample_lines_takes_every_nth_record() {
        let dir = tempfile::tempdir().unwrap();
        let contents: String = (0..20).map(|i| format!("{{\"id\": {}}}\n\n", i)).collect();
        let input = write_file(dir.path(), "in.jsonl", &contents);
        let output = dir.path().join("out.jsonl");

        // 25% of 20 records is 5, one every 4th
        assert_eq!(sample_lines(&input, &output, 25.0).unwrap(), 5);
        let sampled: Vec<DocumentRecord> = read_jsonl(&output, false).unwrap();
        let ids: Vec<i64> = sampled.iter().map(|r| r.extra["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![0, 4, 8, 12, 16]);

        assert_eq!(sample_lines(&input, &output, 100.0).unwrap(), 20);
        // too small a share still keeps the first record
        assert_eq!(sample_lines(&input, &output, 1.0).unwrap(), 1);
    }

    #[test]
    fn test_sample_lines_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(dir.path(), "in.jsonl", "{}\n");
        let output = dir.path().join("out.jsonl");
        for percentage in [0.0, -5.0, 100.5, f64::NAN] {
            assert!(matches!(
                sample_lines(&input, &output, percentage),
                Err(Error::Config(_))
            ));
        }
        assert!(!output.exists());
        assert!(matches!(
            sample_lines(&dir.path().join("missing.jsonl"), &output, 10.0),
            Err(Error::MissingInput(_))
        ));
    }

    #[test]
    fn test_sample_lines_on_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(dir.path(), "in.jsonl", "\n\n");
        let output = dir.path().join("out.jsonl");
        assert_eq!(sample_lines(&input, &output, 50.0).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "");
    }
}
