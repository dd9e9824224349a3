use std::io::Read;
use std::path::{Path, PathBuf};

use crate::foundation::cache::{ensure_parent_dir, remove_if_exists};
use crate::foundation::error::{AssetError, AssetResult};
use crate::foundation::rendezvous::Rendezvous;

/// Declared role of one resource inside a paired asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Photo,
    PairedVideo,
}

/// One constituent of a paired asset, fetched as a byte stream.
pub struct PairedResource {
    pub kind: ResourceKind,
    /// MIME type, e.g. `image/jpeg` or `video/quicktime`.
    pub content_type: String,
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for PairedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairedResource")
            .field("kind", &self.kind)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// A paired asset as a set of resources.
#[derive(Debug, Default)]
pub struct PairedAssetSource {
    pub resources: Vec<PairedResource>,
}

impl PairedAssetSource {
    /// Open a still/video pair already on disk.
    pub fn from_files(still: &Path, video: &Path) -> AssetResult<Self> {
        let open = |path: &Path| -> AssetResult<Box<dyn Read + Send>> {
            let file = std::fs::File::open(path).map_err(|e| {
                AssetError::composition(format!("failed to open '{}': {e}", path.display()))
            })?;
            Ok(Box::new(std::io::BufReader::new(file)))
        };
        Ok(Self {
            resources: vec![
                PairedResource {
                    kind: ResourceKind::Photo,
                    content_type: content_type_for(still).to_string(),
                    reader: open(still)?,
                },
                PairedResource {
                    kind: ResourceKind::PairedVideo,
                    content_type: content_type_for(video).to_string(),
                    reader: open(video)?,
                },
            ],
        })
    }
}

/// File extension for a declared content type.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "public.jpeg" => "jpg",
        "image/heic" | "public.heic" => "heic",
        "image/png" | "public.png" => "png",
        "video/quicktime" | "com.apple.quicktime-movie" => "mov",
        "video/mp4" | "public.mpeg-4" => "mp4",
        _ => "dat",
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("heic") => "image/heic",
        Some("png") => "image/png",
        Some("mov") => "video/quicktime",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Files written by [`extract`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedPair {
    pub still: PathBuf,
    pub video: PathBuf,
}

type Fetched = (ResourceKind, AssetResult<PathBuf>);

fn persist(mut resource: PairedResource, path: &Path) -> AssetResult<PathBuf> {
    ensure_parent_dir(path)?;
    remove_if_exists(path)?;
    let mut file = std::fs::File::create(path).map_err(|e| {
        AssetError::output_location(format!("failed to create '{}': {e}", path.display()))
    })?;
    let copied = std::io::copy(&mut resource.reader, &mut file)?;
    tracing::debug!(kind = ?resource.kind, bytes = copied, path = %path.display(), "resource persisted");
    Ok(path.to_path_buf())
}

/// Stream every resource of `source` into `dir` concurrently.
///
/// Files are named `<stem>.<ext>` with the extension derived from each declared content type.
/// The pair is returned once every fetch has arrived; any failure fails the whole extraction.
#[tracing::instrument(skip(source), fields(dir = %dir.display()))]
pub fn extract(source: PairedAssetSource, dir: &Path, stem: &str) -> AssetResult<ExtractedPair> {
    let expected = source.resources.len();
    let (rendezvous, done) = Rendezvous::<Fetched>::channel(expected);

    let mut seen: Vec<ResourceKind> = Vec::with_capacity(expected);
    for resource in source.resources {
        let kind = resource.kind;
        let repeat = seen.iter().filter(|k| **k == kind).count();
        seen.push(kind);
        let mut name = match kind {
            ResourceKind::Photo => stem.to_string(),
            ResourceKind::PairedVideo => format!("{stem}-video"),
        };
        if repeat > 0 {
            name.push_str(&format!("-{repeat}"));
        }
        let path = dir.join(format!("{name}.{}", extension_for(&resource.content_type)));
        let rv = rendezvous.clone();
        let spawned = std::thread::Builder::new()
            .name("framecast-fetch".to_string())
            .spawn(move || rv.arrive((kind, persist(resource, &path))));
        if let Err(e) = spawned {
            rendezvous.arrive((kind, Err(AssetError::from(e))));
        }
    }

    let fetched = done
        .recv()
        .map_err(|_| AssetError::unknown("resource fetches ended without reporting"))?;

    let mut still = None;
    let mut video = None;
    let mut first_error = None;
    let mut written = Vec::new();
    for (kind, res) in fetched {
        match res {
            Ok(path) => {
                written.push(path.clone());
                let slot = match kind {
                    ResourceKind::Photo => &mut still,
                    ResourceKind::PairedVideo => &mut video,
                };
                slot.get_or_insert(path);
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    let outcome = match (first_error, still, video) {
        (Some(e), _, _) => Err(e),
        (None, Some(still), Some(video)) => Ok(ExtractedPair { still, video }),
        (None, None, _) => Err(AssetError::composition("paired asset has no photo resource")),
        (None, _, None) => Err(AssetError::CouldNotAccessVideoTrack),
    };
    if outcome.is_err() {
        for path in &written {
            let _ = remove_if_exists(path);
        }
    }
    outcome
}

#[cfg(test)]
#[path = "../../tests/unit/paired/extract.rs"]
mod tests;
