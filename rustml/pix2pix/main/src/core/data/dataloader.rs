use super::dataset::GlyphDataset;
use crate::api::error::Pix2PixResult;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustml_grad::Tensor;

/// One batch of glyph samples.
///
/// - `content`: `[B, C, H, W]`
/// - `style`: `[B, K, H, W]`
/// - `target`: `[B, H, W]`
#[derive(Debug, Clone)]
pub struct GlyphBatch {
    pub content: Tensor,
    pub style: Tensor,
    pub target: Tensor,
}

impl GlyphBatch {
    pub fn len(&self) -> usize {
        self.target.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterates a [`GlyphDataset`] in batches, optionally shuffled.
///
/// The last batch may be smaller than `batch_size`.
pub struct DataLoader {
    dataset: GlyphDataset,
    batch_size: usize,
    shuffle: bool,
    indices: Vec<usize>,
    current_idx: usize,
    rng: StdRng,
}

impl DataLoader {
    pub fn new(dataset: GlyphDataset, batch_size: usize, shuffle: bool) -> Self {
        Self::build(dataset, batch_size, shuffle, StdRng::from_entropy())
    }

    /// Like [`DataLoader::new`] with a reproducible shuffle order.
    pub fn with_seed(dataset: GlyphDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self::build(dataset, batch_size, shuffle, StdRng::seed_from_u64(seed))
    }

    fn build(dataset: GlyphDataset, batch_size: usize, shuffle: bool, mut rng: StdRng) -> Self {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        if shuffle {
            indices.shuffle(&mut rng);
        }
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
            indices,
            current_idx: 0,
            rng,
        }
    }

    /// Rewind to the first batch, re-shuffling if configured.
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    /// Batches per epoch (ceiling division).
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn dataset(&self) -> &GlyphDataset {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Stack the samples at `indices` into one batch.
    fn collate(&self, indices: &[usize]) -> Pix2PixResult<GlyphBatch> {
        let n = indices.len();
        let size = self.dataset.image_size();
        let (c, k) = (self.dataset.content_count(), self.dataset.style_count());
        let mut content = Vec::with_capacity(n * c * size * size);
        let mut style = Vec::with_capacity(n * k * size * size);
        let mut target = Vec::with_capacity(n * size * size);
        for &idx in indices {
            let sample = self.dataset.get(idx)?;
            content.extend(sample.content.to_vec());
            style.extend(sample.style.to_vec());
            target.extend(sample.target.to_vec());
        }
        Ok(GlyphBatch {
            content: Tensor::from_vec(content, [n, c, size, size])?,
            style: Tensor::from_vec(style, [n, k, size, size])?,
            target: Tensor::from_vec(target, [n, size, size])?,
        })
    }
}

impl Iterator for DataLoader {
    type Item = GlyphBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.indices.len() {
            return None;
        }
        let end = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch_indices = self.indices[self.current_idx..end].to_vec();
        self.current_idx = end;

        match self.collate(&batch_indices) {
            Ok(batch) => Some(batch),
            Err(e) => {
                log::warn!("stopping epoch early: failed to collate batch {batch_indices:?}: {e}");
                None
            }
        }
    }
}
