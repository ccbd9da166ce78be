use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("No input directory given")]
    EmptyPath,
    #[error("Input directory does not exist: {0}")]
    NotFound(PathBuf),
    #[error("Input path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("IO error while scanning {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// One annotated recording: the annotation file and the audio file that
/// shares its stem.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceFiles {
    pub speaker: String,
    pub utterance_id: String,
    pub annotation_path: PathBuf,
    pub audio_path: PathBuf,
}

/// Suffixes used to pair annotation files with their recordings.
#[derive(Debug, Clone)]
pub struct FilePairing {
    pub annotation_extension: String,
    pub audio_extension: String,
}

impl Default for FilePairing {
    fn default() -> Self {
        Self {
            annotation_extension: crate::ANNOTATION_EXTENSION.to_string(),
            audio_extension: crate::AUDIO_EXTENSION.to_string(),
        }
    }
}

impl FilePairing {
    fn is_annotation(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.annotation_extension))
    }

    /// Audio path by suffix substitution.
    pub fn audio_path_for(&self, annotation_path: &Path) -> PathBuf {
        annotation_path.with_extension(&self.audio_extension)
    }
}

/// Collect every annotation file one level below `root`.
///
/// Each subdirectory of `root` is a speaker session; each annotation file in
/// it is one utterance keyed by its file stem. Files nested deeper, files
/// directly in `root`, and anything without the annotation suffix are
/// ignored. Stems that differ only in the suffix's case collide; the first
/// in file-name order is kept. The result is sorted by (speaker, utterance id).
pub fn collect_from_directory(
    root: &Path,
    pairing: &FilePairing,
) -> Result<Vec<UtteranceFiles>, ScanError> {
    if root.as_os_str().is_empty() {
        return Err(ScanError::EmptyPath);
    }
    if !root.exists() {
        return Err(ScanError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut by_key: BTreeMap<(String, String), UtteranceFiles> = BTreeMap::new();

    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || !pairing.is_annotation(entry.path()) {
            continue;
        }

        let path = entry.path();
        let speaker = match path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
        {
            Some(s) => s.to_string(),
            None => {
                log::warn!("Skipping {}: speaker directory name is not UTF-8", path.display());
                continue;
            }
        };
        let utterance_id = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => {
                log::warn!("Skipping {}: file name is not UTF-8", path.display());
                continue;
            }
        };

        match by_key.entry((speaker.clone(), utterance_id.clone())) {
            Entry::Occupied(kept) => {
                log::warn!(
                    "Skipping {}: {}/{} is already read from {}",
                    path.display(),
                    speaker,
                    utterance_id,
                    kept.get().annotation_path.display()
                );
            }
            Entry::Vacant(slot) => {
                let audio_path = pairing.audio_path_for(path);
                if !audio_path.exists() {
                    log::warn!(
                        "No audio file for {}/{} (expected {})",
                        speaker,
                        utterance_id,
                        audio_path.display()
                    );
                }
                slot.insert(UtteranceFiles {
                    speaker,
                    utterance_id,
                    annotation_path: path.to_path_buf(),
                    audio_path,
                });
            }
        }
    }

    log::info!(
        "Collected {} annotation files under {}",
        by_key.len(),
        root.display()
    );

    Ok(by_key.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn material() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let ah = dir.path().join("AH_95");
        let bk = dir.path().join("BK_02");
        fs::create_dir_all(&ah).unwrap();
        fs::create_dir_all(&bk).unwrap();
        for stem in ["0098", "0018", "0057"] {
            fs::write(ah.join(format!("{stem}.TextGrid")), "").unwrap();
        }
        fs::write(ah.join("0018.wav"), "").unwrap();
        fs::write(ah.join("0098.wav"), "").unwrap();
        fs::write(ah.join("readme.txt"), "").unwrap();
        fs::write(bk.join("0001.TextGrid"), "").unwrap();
        fs::write(dir.path().join("stray.TextGrid"), "").unwrap();
        fs::create_dir_all(ah.join("nested")).unwrap();
        fs::write(ah.join("nested").join("0200.TextGrid"), "").unwrap();
        dir
    }

    #[test]
    fn test_collects_annotation_files_per_speaker() {
        let dir = material();
        let found = collect_from_directory(dir.path(), &FilePairing::default()).unwrap();
        let keys: Vec<(&str, &str)> = found
            .iter()
            .map(|u| (u.speaker.as_str(), u.utterance_id.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("AH_95", "0018"),
                ("AH_95", "0057"),
                ("AH_95", "0098"),
                ("BK_02", "0001"),
            ]
        );
    }

    #[test]
    fn test_only_annotation_files_are_collected() {
        let dir = material();
        let found = collect_from_directory(dir.path(), &FilePairing::default()).unwrap();
        for u in &found {
            assert_eq!(u.annotation_path.extension().unwrap(), "TextGrid");
        }
        assert!(!found.iter().any(|u| u.utterance_id == "readme"));
        assert!(!found.iter().any(|u| u.utterance_id == "stray"));
        assert!(!found.iter().any(|u| u.utterance_id == "0200"));
    }

    #[test]
    fn test_audio_path_by_suffix_substitution() {
        let dir = material();
        let found = collect_from_directory(dir.path(), &FilePairing::default()).unwrap();
        let first = &found[0];
        assert_eq!(first.audio_path, dir.path().join("AH_95").join("0018.wav"));
    }

    #[test]
    fn test_custom_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let s = dir.path().join("S1");
        fs::create_dir_all(&s).unwrap();
        fs::write(s.join("a.tg"), "").unwrap();
        fs::write(s.join("b.TextGrid"), "").unwrap();
        let pairing = FilePairing {
            annotation_extension: "tg".to_string(),
            audio_extension: "flac".to_string(),
        };
        let found = collect_from_directory(dir.path(), &pairing).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].audio_path, s.join("a.flac"));
    }

    #[test]
    fn test_suffix_case_collision_keeps_first() {
        let dir = tempfile::tempdir().unwrap();
        let s = dir.path().join("AH_95");
        fs::create_dir_all(&s).unwrap();
        fs::write(s.join("0018.TextGrid"), "").unwrap();
        fs::write(s.join("0018.textgrid"), "").unwrap();
        fs::write(s.join("0019.textgrid"), "").unwrap();

        let found = collect_from_directory(dir.path(), &FilePairing::default()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].utterance_id, "0018");
        assert_eq!(found[0].annotation_path, s.join("0018.TextGrid"));
        assert_eq!(found[1].annotation_path, s.join("0019.textgrid"));
    }

    #[test]
    fn test_invalid_paths() {
        let pairing = FilePairing::default();
        assert!(matches!(
            collect_from_directory(Path::new(""), &pairing),
            Err(ScanError::EmptyPath)
        ));
        for bad in ["NotAValidPath", "another/kind/of/invalid"] {
            assert!(matches!(
                collect_from_directory(Path::new(bad), &pairing),
                Err(ScanError::NotFound(_))
            ));
        }

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "").unwrap();
        assert!(matches!(
            collect_from_directory(&file, &pairing),
            Err(ScanError::NotADirectory(_))
        ));
    }
}
