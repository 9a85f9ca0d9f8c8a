use crate::data::writer::FrameManifest;
use crate::error::AlignError;
use crate::Result;
use image::{open, ImageBuffer, Luma};
use ndarray::{Array2, Array3, Axis};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["tif", "tiff", "png", "pgm"];

pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ImageBuffer<Luma<u16>, Vec<u16>>> {
    let img = open(path)?;
    Ok(img.to_luma16())
}

/// Load one image as floats, raw 16-bit values.
pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    let img = load_image(path)?;
    let (width, height) = img.dimensions();
    let data: Vec<f32> = img.into_raw().into_iter().map(f32::from).collect();
    Array2::from_shape_vec((height as usize, width as usize), data)
        .map_err(|e| AlignError::Resource(format!("frame layout: {e}")))
}

/// Image files of a directory in name order.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Load an image sequence into a `(P, H, W)` stack.
///
/// When the directory carries a frame manifest, frames are read in manifest
/// order and mapped back to their recorded intensity ranges.
pub fn load_stack(dir: &Path) -> Result<Array3<f32>> {
    let manifest = FrameManifest::load(dir)?;
    let files: Vec<(PathBuf, Option<(f32, f32)>)> = match &manifest {
        Some(manifest) => manifest
            .frames
            .iter()
            .map(|f| (dir.join(&f.file), Some((f.min, f.max))))
            .collect(),
        None => list_images(dir)?.into_iter().map(|p| (p, None)).collect(),
    };

    if files.is_empty() {
        return Err(AlignError::configuration(format!(
            "no images found in {}",
            dir.display()
        )));
    }

    let mut stack: Option<Array3<f32>> = None;
    for (m, (path, range)) in files.iter().enumerate() {
        let mut frame = load_frame(path)?;
        if let Some((min, max)) = *range {
            let span = (max - min) / u16::MAX as f32;
            frame.mapv_inplace(|v| min + v * span);
        }

        let stack = stack.get_or_insert_with(|| Array3::zeros((files.len(), frame.nrows(), frame.ncols())));
        let (_, height, width) = stack.dim();
        if frame.dim() != (height, width) {
            return Err(AlignError::configuration(format!(
                "{} is {}x{}, expected {}x{}",
                path.display(),
                frame.ncols(),
                frame.nrows(),
                width,
                height
            )));
        }
        stack.index_axis_mut(Axis(0), m).assign(&frame);
    }

    tracing::debug!(dir = %dir.display(), frames = files.len(), "Loaded image sequence");
    stack.ok_or_else(|| AlignError::configuration("empty image sequence"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::writer::write_stack;
    use tempfile::TempDir;

    #[test]
    fn test_stack_survives_write_and_load() {
        let dir = TempDir::new().unwrap();
        let stack = Array3::from_shape_fn((3, 5, 7), |(p, r, c)| (p * 35 + r * 7 + c) as f32 * 0.5 - 4.0);
        write_stack(&stack, dir.path(), "prj").unwrap();

        let loaded = load_stack(dir.path()).unwrap();
        assert_eq!(loaded.dim(), (3, 5, 7));
        for (a, b) in loaded.iter().zip(stack.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_empty_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = load_stack(dir.path()).unwrap_err();
        assert!(err.is_configuration());
    }
}
