//! Directory-based keyframe batch loading.
//!
//! Loads every supported image in one directory, resizes each to a target
//! resolution, and stacks them into a `[N, H, W, 3]` f32 tensor in `[0, 1]`
//! for the conditioning assembler. The host resolves the base input
//! directory; this crate only appends the caller-supplied subdirectory.
//! Loading is sequential and all-or-nothing: one unreadable file fails the
//! whole batch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

mod resize;
mod sort;

pub use resize::{resize_image, ResizeMode};
pub use sort::{sort_files, SortMode};

/// Largest accepted target dimension.
pub const MAX_RES: u32 = 8192;

/// Smallest accepted target dimension.
pub const MIN_RES: u32 = 64;

const SUPPORTED_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "webp", "tif", "tiff"];

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),
    #[error("no valid images found in: {0}")]
    NoValidImages(PathBuf),
    #[error("target dimensions {width}x{height} outside 64..=8192")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("failed to load image {file}: {source}")]
    ImageLoad {
        file: String,
        source: image::ImageError,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Loader parameters, matching the host node's widgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderParams {
    /// Subdirectory under the host's input directory.
    pub directory: String,
    /// Bypass the host's re-execution cache on every run.
    #[serde(default)]
    pub reload_on_execute: bool,
    pub target_width: u32,
    pub target_height: u32,
    #[serde(default)]
    pub resize_mode: ResizeMode,
    #[serde(default)]
    pub sort_mode: SortMode,
}

static RELOAD_NONCE: AtomicU64 = AtomicU64::new(0);

impl LoaderParams {
    pub fn validate(&self) -> Result<(), LoaderError> {
        let ok = |d: u32| (MIN_RES..=MAX_RES).contains(&d);
        if !ok(self.target_width) || !ok(self.target_height) {
            return Err(LoaderError::InvalidDimensions {
                width: self.target_width,
                height: self.target_height,
            });
        }
        Ok(())
    }

    /// Value the host compares to decide whether to reuse a cached result.
    ///
    /// Deterministic in the parameters, except with `reload_on_execute`
    /// set, where every call yields a fresh value so the host never reuses
    /// a cached batch.
    pub fn cache_key(&self) -> String {
        if self.reload_on_execute {
            let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
            let nonce = RELOAD_NONCE.fetch_add(1, Ordering::Relaxed);
            return format!("{nanos}-{nonce}");
        }
        format!(
            "{}_{}_{}_{}_{}",
            self.directory, self.target_width, self.target_height, self.resize_mode, self.sort_mode
        )
    }
}

fn is_supported(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Collect loadable files from the directory, non-recursively. Hidden
/// entries, names that are not valid UTF-8, and unsupported extensions are
/// skipped.
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if name.starts_with('.') || !is_supported(name) {
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

/// Convert a resized RGB image to a `[1, H, W, 3]` f32 tensor in `[0, 1]`.
fn image_to_tensor(img: &image::RgbImage, device: &Device) -> Result<Tensor, LoaderError> {
    let (w, h) = img.dimensions();
    let data: Vec<f32> = img.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    let t = Tensor::from_vec(data, (1, h as usize, w as usize, 3), device)?;
    Ok(t)
}

/// Load every supported image under `base_dir/params.directory` into a
/// `[N, target_height, target_width, 3]` batch.
pub fn load_images(
    base_dir: &Path,
    params: &LoaderParams,
    device: &Device,
) -> Result<Tensor, LoaderError> {
    params.validate()?;

    let full_dir = base_dir.join(&params.directory);
    if !full_dir.is_dir() {
        return Err(LoaderError::DirectoryNotFound(full_dir));
    }

    let files = sort_files(collect_files(&full_dir)?, params.sort_mode);
    info!(
        count = files.len(),
        dir = %full_dir.display(),
        sort = %params.sort_mode,
        "loading keyframe batch"
    );

    let mut tensors = Vec::with_capacity(files.len());
    for path in &files {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let img = image::open(path).map_err(|source| LoaderError::ImageLoad { file, source })?;
        let resized = resize_image(
            &img,
            params.target_width,
            params.target_height,
            params.resize_mode,
        );
        tensors.push(image_to_tensor(&resized, device)?);
    }

    if tensors.is_empty() {
        return Err(LoaderError::NoValidImages(full_dir));
    }

    let refs: Vec<&Tensor> = tensors.iter().collect();
    Ok(Tensor::cat(&refs, 0)?)
}
