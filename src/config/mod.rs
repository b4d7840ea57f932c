use std::env;

/// Fixed file names, extensions and tuning knobs used across the pipeline.
///
/// Every component receives this value explicitly so tests can substitute
/// fixture names (e.g. a stub merge tool) without touching the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the per-unit descriptor file.
    pub descriptor_name: String,
    /// Audio stream file name inside an asset directory (split A/V units).
    pub audio_name: String,
    /// Video stream file name inside an asset directory (split A/V units).
    pub video_name: String,
    /// Extension of legacy video fragments, without the dot.
    pub fragment_ext: String,
    /// Extension of consolidated output files, without the dot.
    pub output_ext: String,
    /// Prefix of the asset directory in legacy cache layouts.
    pub legacy_asset_prefix: String,
    /// Merge tool binary; a name looked up on PATH or an explicit path.
    pub ffmpeg_bin: String,
    /// Number of units consolidated concurrently.
    pub workers: usize,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            ffmpeg_bin: env::var("BILITIDY_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string()),
            fragment_ext: env::var("BILITIDY_FRAGMENT_EXT").unwrap_or_else(|_| "flv".to_string()),
            workers: env::var("BILITIDY_JOBS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(2),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            descriptor_name: "entry.json".to_string(),
            audio_name: "audio.m4s".to_string(),
            video_name: "video.m4s".to_string(),
            fragment_ext: "flv".to_string(),
            output_ext: "mp4".to_string(),
            legacy_asset_prefix: "lua".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            workers: 2,
        }
    }
}
