//! Glyph datasets: per-sample directories of content, style and target PNGs.
use super::image_io::load_grayscale;
use crate::api::error::{Pix2PixError, Pix2PixResult};
use rustml_grad::Tensor;
use std::fs;
use std::path::{Path, PathBuf};

/// One training example.
///
/// - `content`: `[C, H, W]` glyphs of the character in reference fonts
/// - `style`: `[K, H, W]` other glyphs in the target font
/// - `target`: `[H, W]` the character in the target font
#[derive(Debug, Clone)]
pub struct GlyphSample {
    pub content: Tensor,
    pub style: Tensor,
    pub target: Tensor,
}

impl GlyphSample {
    pub fn new(content: Tensor, style: Tensor, target: Tensor) -> Pix2PixResult<Self> {
        let side = match target.shape() {
            [h, w] if h == w => *h,
            other => {
                return Err(Pix2PixError::Dataset(format!(
                    "target must be a square [H, W] plane, got {other:?}"
                )))
            }
        };
        for (name, t) in [("content", &content), ("style", &style)] {
            let ok = t.ndim() == 3 && t.shape()[0] > 0 && t.shape()[1..] == [side, side];
            if !ok {
                return Err(Pix2PixError::Dataset(format!(
                    "{name} must be [N, {side}, {side}], got {:?}",
                    t.shape()
                )));
            }
        }
        Ok(Self {
            content,
            style,
            target,
        })
    }

    pub fn content_count(&self) -> usize {
        self.content.shape()[0]
    }

    pub fn style_count(&self) -> usize {
        self.style.shape()[0]
    }

    pub fn image_size(&self) -> usize {
        self.target.shape()[0]
    }
}

/// In-memory collection of samples that share image size and image counts.
#[derive(Debug, Clone)]
pub struct GlyphDataset {
    samples: Vec<GlyphSample>,
}

fn sorted_entries(dir: &Path) -> Pix2PixResult<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();
    Ok(paths)
}

fn stack_planes(planes: Vec<Vec<f32>>, size: usize) -> Pix2PixResult<Tensor> {
    let count = planes.len();
    Ok(Tensor::from_vec(planes.concat(), [count, size, size])?)
}

/// Content and style stacks plus the target plane, if present, from one
/// sample directory.
fn read_sample_dir(
    dir: &Path,
    image_size: usize,
) -> Pix2PixResult<(Tensor, Tensor, Option<Tensor>)> {
    let mut content = Vec::new();
    let mut style = Vec::new();
    let mut target = None;
    for path in sorted_entries(dir)? {
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).filter(|_| is_png) else {
            continue;
        };
        if stem == "target" {
            target = Some(load_grayscale(&path, image_size)?);
        } else if stem.starts_with("content_") {
            content.push(load_grayscale(&path, image_size)?);
        } else if stem.starts_with("style_") {
            style.push(load_grayscale(&path, image_size)?);
        }
    }
    if content.is_empty() || style.is_empty() {
        return Err(Pix2PixError::Dataset(format!(
            "{} needs at least one content_*.png and one style_*.png",
            dir.display()
        )));
    }
    let target = target
        .map(|t| Tensor::from_vec(t, [image_size, image_size]))
        .transpose()?;
    Ok((
        stack_planes(content, image_size)?,
        stack_planes(style, image_size)?,
        target,
    ))
}

/// Content `[C, H, W]` and style `[K, H, W]` stacks of a sample directory;
/// `target.png` is not needed.
pub fn load_conditions<P: AsRef<Path>>(dir: P, image_size: usize) -> Pix2PixResult<(Tensor, Tensor)> {
    let (content, style, _) = read_sample_dir(dir.as_ref(), image_size)?;
    Ok((content, style))
}

fn load_sample(dir: &Path, image_size: usize) -> Pix2PixResult<GlyphSample> {
    let (content, style, target) = read_sample_dir(dir, image_size)?;
    let target = target.ok_or_else(|| {
        Pix2PixError::Dataset(format!("{} has no target.png", dir.display()))
    })?;
    GlyphSample::new(content, style, target)
}

impl GlyphDataset {
    pub fn from_samples(samples: Vec<GlyphSample>) -> Pix2PixResult<Self> {
        let first = samples
            .first()
            .ok_or_else(|| Pix2PixError::Dataset("dataset has no samples".into()))?;
        let key = (first.content_count(), first.style_count(), first.image_size());
        for (i, s) in samples.iter().enumerate() {
            let other = (s.content_count(), s.style_count(), s.image_size());
            if other != key {
                return Err(Pix2PixError::Dataset(format!(
                    "sample {i} has (content, style, size) {other:?}, expected {key:?}"
                )));
            }
        }
        Ok(Self { samples })
    }

    /// Load every sub-directory of `root` as one sample, in name order.
    pub fn from_dir<P: AsRef<Path>>(root: P, image_size: usize) -> Pix2PixResult<Self> {
        let root = root.as_ref();
        let mut samples = Vec::new();
        for dir in sorted_entries(root)?.into_iter().filter(|p| p.is_dir()) {
            samples.push(load_sample(&dir, image_size)?);
        }
        log::info!("loaded {} samples from {}", samples.len(), root.display());
        Self::from_samples(samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, idx: usize) -> Pix2PixResult<&GlyphSample> {
        self.samples.get(idx).ok_or_else(|| {
            Pix2PixError::Dataset(format!(
                "index {idx} out of bounds for dataset of length {}",
                self.len()
            ))
        })
    }

    pub fn content_count(&self) -> usize {
        self.samples[0].content_count()
    }

    pub fn style_count(&self) -> usize {
        self.samples[0].style_count()
    }

    pub fn image_size(&self) -> usize {
        self.samples[0].image_size()
    }
}

/// Write one sample in the directory layout `from_dir` reads.
pub fn write_sample_dir<P: AsRef<Path>>(dir: P, sample: &GlyphSample) -> Pix2PixResult<()> {
    use super::image_io::save_grayscale;
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let size = sample.image_size();
    let plane = size * size;
    let write_stack = |prefix: &str, stack: &Tensor| -> Pix2PixResult<()> {
        for (i, values) in stack.to_vec().chunks(plane).enumerate() {
            save_grayscale(dir.join(format!("{prefix}_{i:03}.png")), values, size, size)?;
        }
        Ok(())
    };
    write_stack("content", &sample.content)?;
    write_stack("style", &sample.style)?;
    save_grayscale(dir.join("target.png"), &sample.target.to_vec(), size, size)
}
