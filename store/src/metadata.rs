//! Length index over the persisted patterns of one split.

use std::path::{Path, PathBuf};

use svs_process::config::SoundConfig;
use tracing::{info, instrument, warn};

use crate::{read_pattern, read_record, write_record, Metadata, StoreError, PATTERN_EXTENSION};

/// The index file name is written uppercased, next to the patterns.
pub fn metadata_path(root: &Path, metadata_file: &str) -> PathBuf {
    root.join(metadata_file.to_uppercase())
}

fn collect_pattern_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    let entries = std::fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let path = entry
            .map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_dir() {
            collect_pattern_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == PATTERN_EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Scan every `*.pattern` below `root`. Files that fail to decode or
/// validate are logged and left out.
#[instrument(skip(sound))]
pub fn build_metadata(root: &Path, sound: &SoundConfig) -> Result<Metadata, StoreError> {
    let mut files = Vec::new();
    collect_pattern_files(root, &mut files)?;
    files.sort();

    let mut metadata = Metadata::new(sound.clone());
    let mut skipped = 0;
    for path in files {
        match read_pattern(&path) {
            Ok(record) => metadata.insert(relative_key(root, &path), &record),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable pattern");
                skipped += 1;
            }
        }
    }

    info!(patterns = metadata.len(), skipped, "indexed patterns");
    Ok(metadata)
}

pub fn write_metadata(root: &Path, metadata_file: &str, metadata: &Metadata) -> Result<PathBuf, StoreError> {
    let path = metadata_path(root, metadata_file);
    write_record(&path, metadata)?;
    Ok(path)
}

pub fn read_metadata(path: &Path) -> Result<Metadata, StoreError> {
    read_record(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_name_is_uppercased() {
        assert_eq!(
            metadata_path(Path::new("/p/train"), "metadata.bin"),
            Path::new("/p/train/METADATA.BIN")
        );
    }

    #[test]
    fn keys_use_forward_slashes() {
        let root = Path::new("/p/train");
        let path = root.join("kiritan").join("001").join("x.pattern");
        assert_eq!(relative_key(root, &path), "kiritan/001/x.pattern");
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_metadata(&dir.path().join("nope"), &SoundConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
