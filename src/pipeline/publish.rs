// src/pipeline/publish.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::PathsSection;
use crate::errors::{JobpipeError, Result};
use crate::fs::FileSystem;
use crate::pipeline::stage::{ResultSpec, StageOutputs};
use crate::status::JobResult;
use crate::types::JobId;

/// Directory receiving the published files of `job_id`.
pub fn output_dir(paths: &PathsSection, job_id: &JobId) -> PathBuf {
    paths.output_root.join(job_id.as_str())
}

/// Client-facing reference of a published file.
pub fn reference(paths: &PathsSection, job_id: &JobId, file: &str) -> String {
    format!(
        "{}/{}/{}",
        paths.public_prefix.trim_end_matches('/'),
        job_id,
        file
    )
}

/// Copy the outputs named by `spec` out of staging and build the result
/// payload pointing at them.
///
/// A single-file result keeps the produced file name unless `name` is given,
/// in which case it is published as `<name>.<ext>`.
pub fn publish_result(
    fs: &dyn FileSystem,
    paths: &PathsSection,
    job_id: &JobId,
    spec: &ResultSpec,
    outputs: &StageOutputs,
    name: Option<&str>,
) -> Result<JobResult> {
    let dest = output_dir(paths, job_id);

    match spec {
        ResultSpec::Tracks(tracks) => {
            let mut refs = BTreeMap::new();
            for (track, output) in tracks {
                let Some(path) = outputs.get(output) else {
                    debug!(job_id = %job_id, track = %track, "track not produced; left out of result");
                    continue;
                };
                let file = format!("{track}.{}", extension_of(path));
                fs.copy(path, &dest.join(&file))?;
                refs.insert(track.clone(), reference(paths, job_id, &file));
            }
            Ok(JobResult::Tracks { tracks: refs })
        }
        ResultSpec::File(output) => {
            let path = outputs.require(output)?;
            let file = match name {
                Some(name) => format!("{name}.{}", extension_of(path)),
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        JobpipeError::Other(anyhow::anyhow!(
                            "output '{output}' has no usable file name: {:?}",
                            path
                        ))
                    })?,
            };
            fs.copy(path, &dest.join(&file))?;
            Ok(JobResult::File {
                file: reference(paths, job_id, &file),
            })
        }
    }
}

fn extension_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("wav")
}
