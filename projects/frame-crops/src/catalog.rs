use crate::error::PipelineError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Container formats picked up by a scan, compared case-insensitively.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv", "mpeg", "mpg"];

/// A video found by a catalog scan.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    /// Name used for the output subfolder and file prefix
    pub identifier: String,
    pub path: PathBuf,
    /// Lowercased, without the leading dot
    pub extension: String,
}

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub recursive: bool,
    pub sort: bool,
    pub extra_extensions: Vec<String>,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            sort: true,
            extra_extensions: Vec::new(),
        }
    }
}

impl CatalogOptions {
    fn accepted_extensions(&self) -> HashSet<String> {
        VIDEO_EXTENSIONS
            .iter()
            .map(|s| s.to_string())
            .chain(
                self.extra_extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_lowercase()),
            )
            .collect()
    }
}

/// Lists the videos under `folder`.
///
/// Sources sharing a stem get `<stem>_<ext>` identifiers so their outputs
/// cannot overwrite each other; everything else keeps the bare stem. In a
/// recursive scan, files that still share stem and extension are prefixed
/// with their subfolder path, e.g. `day1_clip_mp4`.
pub fn scan(folder: &Path, options: &CatalogOptions) -> Result<Vec<VideoSource>, PipelineError> {
    if !folder.is_dir() {
        return Err(PipelineError::InvalidInputPath(folder.to_path_buf()));
    }
    let folder = folder
        .canonicalize()
        .map_err(|_| PipelineError::InvalidInputPath(folder.to_path_buf()))?;

    let accepted = options.accepted_extensions();
    let max_depth = if options.recursive { usize::MAX } else { 1 };

    let mut found: Vec<(PathBuf, String, String)> = WalkDir::new(&folder)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let path = e.path().to_path_buf();
            let extension = path.extension()?.to_str()?.to_lowercase();
            if !accepted.contains(&extension) {
                return None;
            }
            let stem = path.file_stem()?.to_str()?.to_string();
            Some((path, stem, extension))
        })
        .collect();

    if options.sort {
        found.sort_by(|a, b| a.0.cmp(&b.0));
    }

    let mut stem_counts: HashMap<&str, usize> = HashMap::new();
    let mut name_counts: HashMap<(&str, &str), usize> = HashMap::new();
    for (_, stem, extension) in &found {
        *stem_counts.entry(stem.as_str()).or_default() += 1;
        *name_counts
            .entry((stem.as_str(), extension.as_str()))
            .or_default() += 1;
    }

    let mut sources = Vec::with_capacity(found.len());
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    for (path, stem, extension) in &found {
        let identifier = if stem_counts[stem.as_str()] == 1 {
            stem.clone()
        } else if name_counts[&(stem.as_str(), extension.as_str())] == 1 {
            format!("{}_{}", stem, extension)
        } else {
            match subfolder_prefix(&folder, path) {
                Some(prefix) => format!("{}_{}_{}", prefix, stem, extension),
                None => format!("{}_{}", stem, extension),
            }
        };

        if let Some(first) = claimed.get(&identifier) {
            return Err(PipelineError::IdentifierCollision {
                identifier,
                first: first.clone(),
                second: path.clone(),
            });
        }
        claimed.insert(identifier.clone(), path.clone());

        sources.push(VideoSource {
            identifier,
            path: path.clone(),
            extension: extension.clone(),
        });
    }

    tracing::info!("Found {} video(s) in {:?}", sources.len(), folder);
    Ok(sources)
}

/// Relative folder of `path` under `root`, joined with `_`. `None` at the top level.
fn subfolder_prefix(root: &Path, path: &Path) -> Option<String> {
    let parent = path.parent()?.strip_prefix(root).ok()?;
    let parts: Vec<_> = parent
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("_"))
}
