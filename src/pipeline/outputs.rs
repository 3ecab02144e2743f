// src/pipeline/outputs.rs

//! Locating the files a stage was supposed to produce.
//!
//! Tools do not always write where they are told (the separator nests its
//! results under model and track directories, and those names change between
//! versions), so lookup is two-step: the declared glob relative to the
//! staging directory, then one recursive search by file name.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, warn};

use crate::fs::{walk_files, FileSystem};
use crate::pipeline::stage::OutputSpec;

fn compile(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid output pattern '{pattern}'"))?;
    Ok(glob.compile_matcher())
}

/// Find the file described by `spec` under `staging_dir`.
///
/// Returns `Ok(None)` when neither the declared pattern nor the file-name
/// fallback matches anything.
pub fn locate_output(
    fs: &dyn FileSystem,
    staging_dir: &Path,
    spec: &OutputSpec,
) -> Result<Option<PathBuf>> {
    let pattern = compile(&spec.pattern)?;
    let files = walk_files(fs, staging_dir);

    let declared = files.iter().find(|file| {
        file.strip_prefix(staging_dir)
            .map(|rel| pattern.is_match(rel))
            .unwrap_or(false)
    });
    if let Some(found) = declared {
        debug!(output = %spec.name, path = ?found, "output found at declared location");
        return Ok(Some(found.clone()));
    }

    let by_name = compile(&spec.file_name)?;
    let fallback = files.iter().find(|file| {
        file.file_name()
            .map(|name| by_name.is_match(Path::new(name)))
            .unwrap_or(false)
    });
    if let Some(found) = fallback {
        warn!(
            output = %spec.name,
            pattern = %spec.pattern,
            path = ?found,
            "output not at declared location; found by file name"
        );
    }
    Ok(fallback.cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn vocals() -> OutputSpec {
        OutputSpec::required("vocals", "separated/htdemucs/*/vocals.wav", "vocals.wav")
    }

    #[test]
    fn declared_location_wins() {
        let fs = MockFileSystem::new();
        fs.add_file("/stage/separated/htdemucs/song/vocals.wav", "a");
        fs.add_file("/stage/elsewhere/vocals.wav", "b");

        let found = locate_output(&fs, Path::new("/stage"), &vocals()).unwrap();
        assert_eq!(found, Some(PathBuf::from("/stage/separated/htdemucs/song/vocals.wav")));
    }

    #[test]
    fn falls_back_to_file_name_search() {
        let fs = MockFileSystem::new();
        fs.add_file("/stage/separated/other_model/x/y/vocals.wav", "a");

        let found = locate_output(&fs, Path::new("/stage"), &vocals()).unwrap();
        assert_eq!(found, Some(PathBuf::from("/stage/separated/other_model/x/y/vocals.wav")));
    }

    #[test]
    fn missing_output_is_none() {
        let fs = MockFileSystem::new();
        fs.add_file("/stage/separated/htdemucs/song/drums.wav", "a");

        let found = locate_output(&fs, Path::new("/stage"), &vocals()).unwrap();
        assert_eq!(found, None);
    }
}
