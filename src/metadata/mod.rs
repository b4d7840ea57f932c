use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::config::Config;
use crate::error::{UnitError, UnitResult};

/// Media layout declared by a unit's descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Sequential same-extension video fragments (older app downloads)
    LegacyFragmented,
    /// Separate audio and video streams (DASH-style downloads)
    SplitAv,
    /// Tag this tool does not recognize; rejected at strategy selection
    Unknown(i64),
}

impl MediaType {
    /// Map the descriptor's integer tag onto a media type.
    ///
    /// Unknown tags are carried through rather than rejected here, so the
    /// strategy selector can refuse them explicitly.
    pub fn from_tag(tag: i64) -> Self {
        match tag {
            1 => Self::LegacyFragmented,
            2 => Self::SplitAv,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LegacyFragmented => write!(f, "fragmented"),
            Self::SplitAv => write!(f, "split a/v"),
            Self::Unknown(tag) => write!(f, "unknown({tag})"),
        }
    }
}

/// Resolved metadata for one consolidation unit
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeMetadata {
    pub media_type: MediaType,
    /// Subdirectory of the unit holding the actual media files
    pub asset_subdir: String,
    /// Title of the parent collection; may be empty
    pub collection_title: String,
    /// Title used for the output file; never empty once resolved
    pub episode_title: String,
}

/// Descriptor file fields as written by the app, before interpretation.
///
/// Both schemas deserialize from this one shape; which fields are present
/// decides which schema applies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDescriptor {
    #[serde(default)]
    pub media_type: Option<i64>,
    #[serde(default)]
    pub type_tag: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub page_data: Option<RawPageData>,
}

/// Per-episode section of the descriptor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPageData {
    #[serde(default)]
    pub part: Option<String>,
}

impl RawDescriptor {
    fn collection_title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    fn episode_part(&self) -> Option<&str> {
        self.page_data
            .as_ref()
            .and_then(|p| p.part.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Resolve `(collection_title, episode_title)` with the episode title
    /// falling back to the collection title. `None` when both are absent.
    fn resolve_titles(&self) -> Option<(String, String)> {
        let collection = self.collection_title().unwrap_or_default().to_string();
        let episode = self
            .episode_part()
            .or_else(|| self.collection_title())?
            .to_string();
        Some((collection, episode))
    }
}

/// One descriptor schema: decides whether it applies and interprets the raw
/// descriptor into resolved metadata.
pub trait SchemaResolver {
    /// Schema name for log lines.
    fn name(&self) -> &'static str;

    /// Whether this schema matches the parsed descriptor.
    fn detects(&self, raw: &RawDescriptor) -> bool;

    /// Produce resolved metadata for the unit.
    fn resolve(
        &self,
        unit_dir: &Path,
        raw: &RawDescriptor,
        config: &Config,
    ) -> UnitResult<EpisodeMetadata>;
}

/// Current app layout: the descriptor names its asset directory (`type_tag`)
/// and carries an explicit media type tag.
pub struct ModernSchema;

impl SchemaResolver for ModernSchema {
    fn name(&self) -> &'static str {
        "modern"
    }

    fn detects(&self, raw: &RawDescriptor) -> bool {
        raw.type_tag.is_some()
    }

    fn resolve(
        &self,
        unit_dir: &Path,
        raw: &RawDescriptor,
        _config: &Config,
    ) -> UnitResult<EpisodeMetadata> {
        let asset_subdir = raw
            .type_tag
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| UnitError::malformed(unit_dir, "empty type_tag field"))?
            .to_string();

        let tag = raw
            .media_type
            .ok_or_else(|| UnitError::malformed(unit_dir, "missing media_type field"))?;

        let (collection_title, episode_title) = raw
            .resolve_titles()
            .ok_or_else(|| UnitError::malformed(unit_dir, "missing both title fields"))?;

        Ok(EpisodeMetadata {
            media_type: MediaType::from_tag(tag),
            asset_subdir,
            collection_title,
            episode_title,
        })
    }
}

/// Older app layout: no `type_tag`; the asset directory is the unit's single
/// prefixed subdirectory and the media is implicitly fragmented.
pub struct LegacySchema;

impl SchemaResolver for LegacySchema {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn detects(&self, raw: &RawDescriptor) -> bool {
        raw.type_tag.is_none()
    }

    fn resolve(
        &self,
        unit_dir: &Path,
        raw: &RawDescriptor,
        config: &Config,
    ) -> UnitResult<EpisodeMetadata> {
        let asset_subdir = find_prefixed_dir(unit_dir, &config.legacy_asset_prefix)?
            .ok_or_else(|| {
                UnitError::malformed(
                    unit_dir,
                    format!(
                        "no '{}*' asset directory for legacy descriptor",
                        config.legacy_asset_prefix
                    ),
                )
            })?;

        let (collection_title, episode_title) = raw
            .resolve_titles()
            .ok_or_else(|| UnitError::malformed(unit_dir, "missing both title fields"))?;

        Ok(EpisodeMetadata {
            media_type: MediaType::LegacyFragmented,
            asset_subdir,
            collection_title,
            episode_title,
        })
    }
}

/// First directory entry whose name starts with `prefix`, if any.
fn find_prefixed_dir(unit_dir: &Path, prefix: &str) -> UnitResult<Option<String>> {
    let entries =
        fs::read_dir(unit_dir).map_err(|e| UnitError::io("read unit directory", unit_dir, e))?;

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();

    Ok(names.into_iter().next())
}

/// Locate and parse a unit's descriptor file into resolved metadata.
///
/// Read-only: never touches anything besides the descriptor and (for the
/// legacy schema) the unit's directory listing.
pub fn read_metadata(unit_dir: &Path, config: &Config) -> UnitResult<EpisodeMetadata> {
    let descriptor_path = unit_dir.join(&config.descriptor_name);
    if !descriptor_path.exists() {
        return Err(UnitError::DescriptorNotFound {
            unit: unit_dir.to_path_buf(),
        });
    }

    let content = fs::read_to_string(&descriptor_path)
        .map_err(|e| UnitError::io("read descriptor", &descriptor_path, e))?;
    let raw: RawDescriptor = serde_json::from_str(&content)
        .map_err(|e| UnitError::malformed(unit_dir, format!("invalid json: {e}")))?;

    let schemas: [&dyn SchemaResolver; 2] = [&ModernSchema, &LegacySchema];
    for schema in schemas {
        if schema.detects(&raw) {
            debug!("Resolving {:?} with {} schema", unit_dir, schema.name());
            return schema.resolve(unit_dir, &raw, config);
        }
    }

    Err(UnitError::malformed(
        unit_dir,
        "descriptor matches no known schema",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_descriptor(dir: &Path, content: &str) {
        fs::write(dir.join("entry.json"), content).unwrap();
    }

    #[test]
    fn test_modern_split_av() {
        let temp_dir = TempDir::new().unwrap();
        write_descriptor(
            temp_dir.path(),
            r#"{"media_type": 2, "type_tag": "64", "title": "My Album", "page_data": {"part": "Ep1"}}"#,
        );

        let meta = read_metadata(temp_dir.path(), &Config::default()).unwrap();
        assert_eq!(meta.media_type, MediaType::SplitAv);
        assert_eq!(meta.asset_subdir, "64");
        assert_eq!(meta.collection_title, "My Album");
        assert_eq!(meta.episode_title, "Ep1");
    }

    #[test]
    fn test_modern_legacy_fragmented_tag() {
        let temp_dir = TempDir::new().unwrap();
        write_descriptor(
            temp_dir.path(),
            r#"{"media_type": 1, "type_tag": "lua.flv360.bilibili2api.16", "title": "Show"}"#,
        );

        let meta = read_metadata(temp_dir.path(), &Config::default()).unwrap();
        assert_eq!(meta.media_type, MediaType::LegacyFragmented);
        assert_eq!(meta.asset_subdir, "lua.flv360.bilibili2api.16");
        // No episode title: falls back to the collection title.
        assert_eq!(meta.episode_title, "Show");
    }

    #[test]
    fn test_episode_title_fallback_on_blank_part() {
        let temp_dir = TempDir::new().unwrap();
        write_descriptor(
            temp_dir.path(),
            r#"{"media_type": 2, "type_tag": "80", "title": "Album", "page_data": {"part": "   "}}"#,
        );

        let meta = read_metadata(temp_dir.path(), &Config::default()).unwrap();
        assert_eq!(meta.episode_title, "Album");
    }

    #[test]
    fn test_missing_both_titles_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        write_descriptor(temp_dir.path(), r#"{"media_type": 2, "type_tag": "64"}"#);

        let err = read_metadata(temp_dir.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, UnitError::MalformedMetadata { .. }));
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_unknown_tag_is_carried_through() {
        let temp_dir = TempDir::new().unwrap();
        write_descriptor(
            temp_dir.path(),
            r#"{"media_type": 9, "type_tag": "64", "title": "T"}"#,
        );

        let meta = read_metadata(temp_dir.path(), &Config::default()).unwrap();
        assert_eq!(meta.media_type, MediaType::Unknown(9));
    }

    #[test]
    fn test_missing_media_type_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        write_descriptor(temp_dir.path(), r#"{"type_tag": "64", "title": "T"}"#);

        let err = read_metadata(temp_dir.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, UnitError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_legacy_schema_finds_prefixed_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("lua.flv360.bilibili2api.16")).unwrap();
        write_descriptor(
            temp_dir.path(),
            r#"{"title": "Old Show", "page_data": {"part": "P2"}}"#,
        );

        let meta = read_metadata(temp_dir.path(), &Config::default()).unwrap();
        assert_eq!(meta.media_type, MediaType::LegacyFragmented);
        assert_eq!(meta.asset_subdir, "lua.flv360.bilibili2api.16");
        assert_eq!(meta.episode_title, "P2");
    }

    #[test]
    fn test_legacy_schema_without_asset_dir_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        write_descriptor(temp_dir.path(), r#"{"title": "Old Show"}"#);

        let err = read_metadata(temp_dir.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, UnitError::MalformedMetadata { .. }));
        assert!(err.to_string().contains("lua"));
    }

    #[test]
    fn test_missing_descriptor() {
        let temp_dir = TempDir::new().unwrap();

        let err = read_metadata(temp_dir.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, UnitError::DescriptorNotFound { .. }));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        write_descriptor(temp_dir.path(), "not json at all");

        let err = read_metadata(temp_dir.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, UnitError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_media_type_display() {
        assert_eq!(MediaType::LegacyFragmented.to_string(), "fragmented");
        assert_eq!(MediaType::SplitAv.to_string(), "split a/v");
        assert_eq!(MediaType::Unknown(7).to_string(), "unknown(7)");
    }
}
