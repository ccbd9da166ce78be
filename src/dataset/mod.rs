//! The output table: assembly from measured utterances, CSV persistence and
//! merging with an earlier output file.

pub mod metadata;

use crate::pipeline::{Stage, UtteranceTable};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SPEAKER_COLUMN: &str = "speaker";
pub const UTTERANCE_COLUMN: &str = "utterance_id";
pub const SEX_COLUMN: &str = "sex";

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{path} has no \"{column}\" column")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("Duplicate row {speaker}/{utterance_id}")]
    DuplicateKey {
        speaker: String,
        utterance_id: String,
    },
}

/// A header row plus string cells; empty cells are nulls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Key columns, `sex` when metadata was attached, then the columns of
    /// every completed stage in stage order. Paths and working objects are
    /// not carried over.
    pub fn from_table(table: &UtteranceTable) -> Self {
        let stages: Vec<Stage> = table.completed().collect();

        let mut headers = vec![SPEAKER_COLUMN.to_string(), UTTERANCE_COLUMN.to_string()];
        if table.has_metadata() {
            headers.push(SEX_COLUMN.to_string());
        }
        headers.extend(stages.iter().flat_map(|s| s.columns()).map(|c| c.to_string()));

        let rows = table
            .rows()
            .iter()
            .map(|u| {
                let mut cells = vec![u.speaker.clone(), u.utterance_id.clone()];
                if table.has_metadata() {
                    cells.push(u.sex.map(|s| s.as_str().to_string()).unwrap_or_default());
                }
                cells.extend(
                    stages
                        .iter()
                        .flat_map(|s| s.values(&u.measures))
                        .map(format_value),
                );
                cells
            })
            .collect();

        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at (`row`, `column`), if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let c = self.column_index(column)?;
        self.rows.get(row)?.get(c).map(String::as_str)
    }

    pub fn read(path: &Path) -> Result<Self, DatasetError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        for column in [SPEAKER_COLUMN, UTTERANCE_COLUMN] {
            if !headers.iter().any(|h| h == column) {
                return Err(DatasetError::MissingColumn {
                    path: path.to_path_buf(),
                    column,
                });
            }
        }
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn keys(&self) -> Option<(usize, usize)> {
        Some((
            self.column_index(SPEAKER_COLUMN)?,
            self.column_index(UTTERANCE_COLUMN)?,
        ))
    }

    /// Inner join on `(speaker, utterance_id)`, keeping this table's row
    /// order and columns first. Where both sides have a column, `newer`
    /// wins. Rows present on only one side are dropped. Keys must be unique
    /// on both sides.
    pub fn inner_join(&self, newer: &Dataset) -> Result<Dataset, DatasetError> {
        let missing = |column| DatasetError::MissingColumn {
            path: PathBuf::new(),
            column,
        };
        let (os, ou) = self.keys().ok_or_else(|| missing(SPEAKER_COLUMN))?;
        let (ns, nu) = newer.keys().ok_or_else(|| missing(SPEAKER_COLUMN))?;

        let mut index: HashMap<(&str, &str), usize> = HashMap::with_capacity(newer.rows.len());
        for (i, row) in newer.rows.iter().enumerate() {
            let key = (row[ns].as_str(), row[nu].as_str());
            if index.insert(key, i).is_some() {
                return Err(DatasetError::DuplicateKey {
                    speaker: key.0.to_string(),
                    utterance_id: key.1.to_string(),
                });
            }
        }

        // For each output column: where its value comes from.
        let mut sources: Vec<(bool, usize)> = Vec::new();
        let mut headers = Vec::new();
        for (i, h) in self.headers.iter().enumerate() {
            let from_newer = (i != os && i != ou).then(|| newer.column_index(h)).flatten();
            sources.push(match from_newer {
                Some(j) => (true, j),
                None => (false, i),
            });
            headers.push(h.clone());
        }
        for (j, h) in newer.headers.iter().enumerate() {
            if self.column_index(h).is_none() {
                sources.push((true, j));
                headers.push(h.clone());
            }
        }

        let mut rows = Vec::new();
        let mut dropped = 0usize;
        let mut seen: HashSet<(&str, &str)> = HashSet::with_capacity(self.rows.len());
        for old in &self.rows {
            let key = (old[os].as_str(), old[ou].as_str());
            if !seen.insert(key) {
                return Err(DatasetError::DuplicateKey {
                    speaker: key.0.to_string(),
                    utterance_id: key.1.to_string(),
                });
            }
            let Some(&n) = index.get(&key) else {
                dropped += 1;
                continue;
            };
            let new = &newer.rows[n];
            rows.push(
                sources
                    .iter()
                    .map(|&(from_newer, c)| if from_newer { new[c].clone() } else { old[c].clone() })
                    .collect(),
            );
        }
        let unmatched_new = newer.rows.len().saturating_sub(rows.len());
        if dropped > 0 || unmatched_new > 0 {
            log::info!(
                "Join dropped {dropped} earlier and {unmatched_new} new rows without a match"
            );
        }

        Ok(Dataset { headers, rows })
    }
}

/// Shortest representation that reads back to the same value.
fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Sex, UtteranceTable};
    use crate::scanner::UtteranceFiles;

    fn dataset(headers: &[&str], rows: &[&[&str]]) -> Dataset {
        Dataset {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn table() -> UtteranceTable {
        let files = ["0018", "0019"]
            .iter()
            .map(|id| UtteranceFiles {
                speaker: "AH_95".to_string(),
                utterance_id: id.to_string(),
                annotation_path: format!("AH_95/{id}.TextGrid").into(),
                audio_path: format!("AH_95/{id}.wav").into(),
            })
            .collect();
        let mut table = UtteranceTable::from_files(files).unwrap();
        table.rows_mut()[0].measures.v1_start = Some(0.1);
        table.rows_mut()[0].measures.v1_end = Some(0.239);
        table.rows_mut()[0].measures.v1_duration_ms = Some(139.0);
        table.rows_mut()[1].measures.tool_duration_ms = Some(150.0);
        table.mark_complete(Stage::VowelDuration);
        table.mark_complete(Stage::WordDuration);
        table
    }

    #[test]
    fn test_from_table_columns_and_nulls() {
        let ds = Dataset::from_table(&table());
        assert_eq!(
            ds.headers(),
            &[
                "speaker",
                "utterance_id",
                "v1_start",
                "v1_end",
                "v1_duration_ms",
                "tool_duration_ms",
                "target_duration_ms",
                "ratio_word_duration"
            ]
        );
        assert_eq!(ds.get(0, "v1_end"), Some("0.239"));
        assert_eq!(ds.get(0, "tool_duration_ms"), Some(""));
        assert_eq!(ds.get(1, "v1_start"), Some(""));
        assert_eq!(ds.get(1, "tool_duration_ms"), Some("150"));
        assert!(ds.column_index("audio_path").is_none());
    }

    #[test]
    fn test_sex_column_with_metadata() {
        let mut t = table();
        t.attach_sex(&[("AH_95".to_string(), Some(Sex::Female))].into_iter().collect());
        let ds = Dataset::from_table(&t);
        assert_eq!(ds.headers()[2], "sex");
        assert_eq!(ds.get(1, "sex"), Some("f"));
    }

    #[test]
    fn test_write_read_self_join_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acoustic_measures.csv");
        let ds = Dataset::from_table(&table());
        ds.write(&path).unwrap();

        let back = Dataset::read(&path).unwrap();
        assert_eq!(back, ds);
        assert_eq!(back.inner_join(&back).unwrap(), ds);
    }

    #[test]
    fn test_inner_join_drops_unmatched_and_prefers_new_values() {
        let old = dataset(
            &["speaker", "utterance_id", "notes", "f1"],
            &[
                &["AH_95", "0018", "keep", "510"],
                &["AH_95", "0019", "gone", "520"],
                &["BK_02", "0018", "also", "530"],
            ],
        );
        let new = dataset(
            &["speaker", "utterance_id", "f1", "h1_h2"],
            &[
                &["BK_02", "0018", "600", "3.5"],
                &["AH_95", "0018", "500", ""],
                &["CL_07", "0001", "700", "1.0"],
            ],
        );
        let joined = old.inner_join(&new).unwrap();
        assert_eq!(
            joined,
            dataset(
                &["speaker", "utterance_id", "notes", "f1", "h1_h2"],
                &[&["AH_95", "0018", "keep", "500", ""], &["BK_02", "0018", "also", "600", "3.5"]],
            )
        );
    }

    #[test]
    fn test_read_requires_key_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(matches!(
            Dataset::read(&path),
            Err(DatasetError::MissingColumn {
                column: "speaker",
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_new_keys_rejected() {
        let old = dataset(&["speaker", "utterance_id"], &[&["AH_95", "0018"]]);
        let new = dataset(&["speaker", "utterance_id"], &[&["AH_95", "0018"], &["AH_95", "0018"]]);
        assert!(matches!(old.inner_join(&new), Err(DatasetError::DuplicateKey { .. })));
    }

    #[test]
    fn test_duplicate_earlier_keys_rejected() {
        let old = dataset(
            &["speaker", "utterance_id", "f1"],
            &[&["AH_95", "0018", "500"], &["AH_95", "0018", "510"]],
        );
        let new = dataset(&["speaker", "utterance_id", "f1"], &[&["AH_95", "0018", "520"]]);
        assert!(matches!(
            old.inner_join(&new),
            Err(DatasetError::DuplicateKey { speaker, utterance_id })
                if speaker == "AH_95" && utterance_id == "0018"
        ));
    }
}
