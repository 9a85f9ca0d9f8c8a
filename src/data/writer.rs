use crate::error::AlignError;
use crate::pipeline::ArtifactSink;
use crate::Result;
use image::{ImageBuffer, Luma};
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "frames.json";

/// Intensity range of one written frame, needed to map it back to floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub file: String,
    pub min: f32,
    pub max: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameManifest {
    pub frames: Vec<FrameRecord>,
}

impl FrameManifest {
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }
}

/// Write one image as 16-bit grayscale, linearly mapped from its own range.
pub fn write_frame(image: ArrayView2<f32>, path: &Path) -> Result<FrameRecord> {
    let (height, width) = image.dim();
    let (min, max) = image
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if !min.is_finite() || !max.is_finite() {
        return Err(AlignError::numeric(format!(
            "frame {} has no finite range",
            path.display()
        )));
    }

    let span = max - min;
    let pixels: Vec<u16> = image
        .iter()
        .map(|v| {
            if span > 0.0 {
                ((v - min) / span * u16::MAX as f32).round() as u16
            } else {
                0
            }
        })
        .collect();

    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| AlignError::Resource(format!("cannot build a {width}x{height} frame")))?;
    buffer.save(path)?;

    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(FrameRecord { file, min, max })
}

/// Write every projection of `stack` as `{prefix}_{m:05}.tiff` under `dir`,
/// plus a manifest of the frame ranges.
pub fn write_stack(stack: &Array3<f32>, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut manifest = FrameManifest::default();
    let mut paths = Vec::with_capacity(stack.len_of(Axis(0)));

    for (m, image) in stack.axis_iter(Axis(0)).enumerate() {
        let path = dir.join(format!("{prefix}_{m:05}.tiff"));
        manifest.frames.push(write_frame(image, &path)?);
        paths.push(path);
    }

    manifest.save(dir)?;
    tracing::debug!(dir = %dir.display(), frames = paths.len(), "Wrote image sequence");
    Ok(paths)
}

/// Artifact sink writing per-iteration image sequences:
/// `prj/iter_{n:03}/prj_{m:05}.tiff` and `rec/rec_{n:03}.tiff` under the root.
#[derive(Debug, Clone)]
pub struct ImageSequenceSink {
    root: PathBuf,
}

impl ImageSequenceSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn iteration_dir(&self, iteration: usize) -> PathBuf {
        self.root.join("prj").join(format!("iter_{iteration:03}"))
    }

    pub fn reconstruction_path(&self, iteration: usize) -> PathBuf {
        self.root.join("rec").join(format!("rec_{iteration:03}.tiff"))
    }
}

impl ArtifactSink for ImageSequenceSink {
    fn save_iteration(&self, iteration: usize, stack: &Array3<f32>, slice: ArrayView2<f32>) -> Result<()> {
        write_stack(stack, &self.iteration_dir(iteration), "prj")?;

        let rec_path = self.reconstruction_path(iteration);
        if let Some(parent) = rec_path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_frame(slice, &rec_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_records_frame_ranges() {
        let dir = TempDir::new().unwrap();
        let stack = Array3::from_shape_fn((2, 4, 4), |(p, r, c)| (p as f32 + 1.0) * (r + c) as f32);
        let paths = write_stack(&stack, dir.path(), "frame").unwrap();

        assert_eq!(paths.len(), 2);
        assert!(paths[1].ends_with("frame_00001.tiff"));

        let manifest = FrameManifest::load(dir.path()).unwrap().unwrap();
        assert_eq!(manifest.frames[0], FrameRecord { file: "frame_00000.tiff".into(), min: 0.0, max: 6.0 });
        assert_eq!(manifest.frames[1].max, 12.0);
    }

    #[test]
    fn test_non_finite_frame_rejected() {
        let dir = TempDir::new().unwrap();
        let image = Array2::from_elem((3, 3), f32::NAN);
        let err = write_frame(image.view(), &dir.path().join("nan.tiff")).unwrap_err();
        assert!(err.is_numeric());
    }

    #[test]
    fn test_sink_layout() {
        let dir = TempDir::new().unwrap();
        let sink = ImageSequenceSink::new(dir.path());
        let stack = Array3::from_shape_fn((3, 4, 5), |(p, r, c)| (p + r * c) as f32);
        let slice = Array2::from_shape_fn((5, 5), |(r, c)| (r * c) as f32);

        sink.save_iteration(7, &stack, slice.view()).unwrap();

        assert_eq!(sink.iteration_dir(7), dir.path().join("prj").join("iter_007"));
        assert!(sink.iteration_dir(7).join("prj_00002.tiff").exists());
        assert!(sink.reconstruction_path(7).ends_with("rec/rec_007.tiff"));
        assert!(sink.reconstruction_path(7).exists());
    }
}
