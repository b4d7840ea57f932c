use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{UnitError, UnitResult};
use crate::metadata::{EpisodeMetadata, MediaType};
use crate::scanner::ConsolidationUnit;

/// The two consolidation operations this tool performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    /// Combine separate audio and video streams into one container
    Remux,
    /// Join sequential same-extension fragments into one container
    Concat,
}

impl MergeKind {
    /// Pick the operation for a declared media type.
    ///
    /// Unknown tags are rejected here rather than defaulting to either
    /// operation.
    pub fn for_media_type(media_type: MediaType) -> UnitResult<Self> {
        match media_type {
            MediaType::SplitAv => Ok(Self::Remux),
            MediaType::LegacyFragmented => Ok(Self::Concat),
            MediaType::Unknown(tag) => Err(UnitError::UnsupportedMediaType { tag }),
        }
    }
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remux => write!(f, "remux"),
            Self::Concat => write!(f, "concat"),
        }
    }
}

/// Concrete input files for one merge invocation
#[derive(Debug, Clone)]
pub enum MergeInputs {
    Remux { audio: PathBuf, video: PathBuf },
    Concat { fragments: Vec<PathBuf> },
}

impl MergeInputs {
    /// All input paths in the order they are handed to the tool.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::Remux { audio, video } => vec![video.as_path(), audio.as_path()],
            Self::Concat { fragments } => fragments.iter().map(PathBuf::as_path).collect(),
        }
    }
}

/// One planned invocation of the external tool: inputs, output, nothing else.
/// Created per unit and discarded once the invocation finishes.
#[derive(Debug, Clone)]
pub struct MergeJob {
    pub id: String,
    pub inputs: MergeInputs,
    pub output: PathBuf,
}

impl MergeJob {
    /// Resolve the concrete inputs for one unit.
    ///
    /// Fragment listing happens here, so a fragment-less legacy unit fails
    /// before any subprocess is spawned.
    pub fn plan(
        unit: &ConsolidationUnit,
        meta: &EpisodeMetadata,
        output: PathBuf,
        config: &Config,
    ) -> UnitResult<Self> {
        let asset_dir = unit.dir.join(&meta.asset_subdir);
        let inputs = match MergeKind::for_media_type(meta.media_type)? {
            MergeKind::Remux => MergeInputs::Remux {
                audio: asset_dir.join(&config.audio_name),
                video: asset_dir.join(&config.video_name),
            },
            MergeKind::Concat => {
                let fragments = list_fragments(&asset_dir, &config.fragment_ext)?;
                if fragments.is_empty() {
                    return Err(UnitError::NoFragments {
                        dir: asset_dir,
                        ext: config.fragment_ext.clone(),
                    });
                }
                MergeInputs::Concat { fragments }
            }
        };

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            inputs,
            output,
        })
    }

    pub fn kind(&self) -> MergeKind {
        match self.inputs {
            MergeInputs::Remux { .. } => MergeKind::Remux,
            MergeInputs::Concat { .. } => MergeKind::Concat,
        }
    }

    /// Hidden sibling of the final output. The tool writes here and the file
    /// is renamed into place only on success, so a killed run never leaves a
    /// half-written file under the final name.
    fn staging_path(&self) -> PathBuf {
        let stem = self
            .output
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = self
            .output
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.output
            .with_file_name(format!(".{}.{}.{}", stem, self.id, ext))
    }
}

/// Same-extension fragment files directly inside `dir`, in play order.
///
/// Fragment names are numeric counters in practice, so numeric stems sort
/// as numbers (10 after 9, not after 1). Anything else sorts by name after
/// the numbered fragments, keeping the comparison a total order.
fn list_fragments(dir: &Path, ext: &str) -> UnitResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| UnitError::io("list fragments", dir, e))?;

    let mut fragments: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case(ext))
        })
        .collect();

    fragments.sort_by(|a, b| match (numeric_stem(a), numeric_stem(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.file_name().cmp(&b.file_name()),
    });

    Ok(fragments)
}

fn numeric_stem(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// Wrapper around the external merge tool
pub struct Merger {
    config: Config,
}

impl Merger {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the job's merge operation.
    ///
    /// Inputs are only ever read. The single side effect on success is one
    /// new file at `job.output`; on failure the staging file is removed and
    /// nothing appears under the final name.
    pub async fn invoke(&self, job: &MergeJob) -> UnitResult<()> {
        for input in job.inputs.paths() {
            if !input.exists() {
                return Err(UnitError::ExternalTool {
                    tool: self.config.ffmpeg_bin.clone(),
                    message: format!("missing input {input:?}"),
                });
            }
        }

        self.sweep_stale_staging(job);

        let staging = job.staging_path();
        let result = match &job.inputs {
            MergeInputs::Remux { audio, video } => self.remux(video, audio, &staging).await,
            MergeInputs::Concat { fragments } => self.concat(fragments, &staging).await,
        };

        match result {
            Ok(()) => tokio::fs::rename(&staging, &job.output)
                .await
                .map_err(|e| UnitError::io("finalize output", &job.output, e)),
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                Err(e)
            }
        }
    }

    /// Remove staging leftovers for this job's output before merging. A run
    /// killed mid-merge leaves hidden `.{stem}.{uuid}.*` files behind, and
    /// every run stages under a fresh id, so anything matching is an orphan.
    fn sweep_stale_staging(&self, job: &MergeJob) {
        let Some(parent) = job.output.parent() else {
            return;
        };
        let Some(stem) = job.output.file_stem() else {
            return;
        };
        let prefix = format!(".{}.", stem.to_string_lossy());

        let Ok(entries) = fs::read_dir(parent) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let id = rest.split('.').next().unwrap_or_default();
            if Uuid::parse_str(id).is_ok() {
                debug!("Removing stale staging file: {:?}", entry.path());
                let _ = fs::remove_file(entry.path());
            }
        }
    }

    async fn remux(&self, video: &Path, audio: &Path, staging: &Path) -> UnitResult<()> {
        let mut cmd = self.base_command();
        cmd.arg("-i").arg(video);
        cmd.arg("-i").arg(audio);
        cmd.args(["-c", "copy", "-movflags", "+faststart"]);
        cmd.arg(staging);

        self.execute(cmd).await
    }

    async fn concat(&self, fragments: &[PathBuf], staging: &Path) -> UnitResult<()> {
        let list_path = staging.with_extension("list");
        self.write_concat_list(fragments, &list_path).await?;

        let mut cmd = self.base_command();
        cmd.args(["-f", "concat", "-safe", "0"]);
        cmd.arg("-i").arg(&list_path);
        cmd.args(["-c", "copy"]); // Copy streams without re-encoding
        cmd.arg(staging);

        let result = self.execute(cmd).await;

        // Clean up concat list file
        let _ = tokio::fs::remove_file(&list_path).await;

        result
    }

    /// Write the concat demuxer's input list next to the staging file.
    async fn write_concat_list(&self, fragments: &[PathBuf], list_path: &Path) -> UnitResult<()> {
        let mut content = String::new();
        for fragment in fragments {
            let absolute = fragment
                .canonicalize()
                .map_err(|e| UnitError::io("resolve fragment", fragment, e))?;
            // A single quote inside the path closes and reopens the quoting.
            let escaped = absolute.to_string_lossy().replace('\'', "'\\''");
            content.push_str(&format!("file '{escaped}'\n"));
        }

        tokio::fs::write(list_path, content)
            .await
            .map_err(|e| UnitError::io("write concat list", list_path, e))
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.ffmpeg_bin);
        cmd.arg("-y");
        cmd
    }

    async fn execute(&self, mut cmd: Command) -> UnitResult<()> {
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // A run cancelled mid-merge must not leave the tool running.
        cmd.kill_on_drop(true);

        debug!("Executing merge command: {:?}", cmd);

        let output = cmd.output().await.map_err(|e| UnitError::ExternalTool {
            tool: self.config.ffmpeg_bin.clone(),
            message: format!("failed to start: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed: {}", self.config.ffmpeg_bin, stderr.trim());
            // The tool's last stderr line names the actual problem.
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("exited with non-zero status")
                .to_string();
            return Err(UnitError::ExternalTool {
                tool: self.config.ffmpeg_bin.clone(),
                message: reason,
            });
        }

        Ok(())
    }
}
