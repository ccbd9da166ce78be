use super::{DatasetError, SEX_COLUMN, SPEAKER_COLUMN};
use crate::pipeline::Sex;
use std::collections::HashMap;
use std::path::Path;

/// Read per-speaker sex from a CSV with `speaker` and `sex` columns.
///
/// Empty and unrecognised values map to `None`; the latter are logged.
/// Other columns are ignored.
pub fn load_speaker_sexes(path: &Path) -> Result<HashMap<String, Option<Sex>>, DatasetError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DatasetError::MissingColumn {
                path: path.to_path_buf(),
                column: name,
            })
    };
    let speaker_col = column(SPEAKER_COLUMN)?;
    let sex_col = column(SEX_COLUMN)?;

    let mut sexes = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let speaker = record.get(speaker_col).unwrap_or("").trim();
        if speaker.is_empty() {
            continue;
        }
        let raw = record.get(sex_col).unwrap_or("").trim();
        let sex = Sex::parse(raw);
        if sex.is_none() && !raw.is_empty() {
            log::warn!("{speaker}: unrecognised sex \"{raw}\" in {}", path.display());
        }
        if sexes.insert(speaker.to_string(), sex).is_some() {
            log::warn!("{speaker} listed more than once in {}; using the last entry", path.display());
        }
    }
    log::info!("Loaded sex for {} speakers from {}", sexes.len(), path.display());
    Ok(sexes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_speaker_sexes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speakers.csv");
        std::fs::write(&path, "speaker,age,sex\nAH_95,31,m\nBK_02,27,F\nCL_07,40,\nDM_11,22,x\n").unwrap();

        let sexes = load_speaker_sexes(&path).unwrap();
        assert_eq!(sexes.len(), 4);
        assert_eq!(sexes["AH_95"], Some(Sex::Male));
        assert_eq!(sexes["BK_02"], Some(Sex::Female));
        assert_eq!(sexes["CL_07"], None);
        assert_eq!(sexes["DM_11"], None);
    }

    #[test]
    fn test_missing_sex_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speakers.csv");
        std::fs::write(&path, "speaker,age\nAH_95,31\n").unwrap();
        assert!(matches!(
            load_speaker_sexes(&path),
            Err(DatasetError::MissingColumn { column: "sex", .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(load_speaker_sexes(Path::new("/nonexistent/speakers.csv")).is_err());
    }
}
