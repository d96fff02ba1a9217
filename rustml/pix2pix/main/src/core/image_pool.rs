use crate::api::error::Pix2PixResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustml_grad::Tensor;

/// Replay buffer of previously generated images.
///
/// Feeding the discriminator a mix of current and past fakes keeps it from
/// overfitting to the generator's latest output.
pub struct ImagePool {
    pool_size: usize,
    images: Vec<Tensor>,
    rng: StdRng,
}

impl ImagePool {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            images: Vec::with_capacity(pool_size),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(pool_size: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(pool_size)
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Images to show the discriminator for this batch `[B, ...]`.
    ///
    /// While the pool fills, every image is stored and returned. Once full,
    /// each image is, with probability 0.5, swapped for a random stored one.
    /// Returned images are detached from the graph.
    pub fn query(&mut self, images: &Tensor) -> Pix2PixResult<Tensor> {
        if self.pool_size == 0 {
            return Ok(images.detach());
        }
        let batch = images.shape()[0];
        let mut selected = Vec::with_capacity(batch);
        for i in 0..batch {
            let image = images.slice_raw(0, i, i + 1)?.detach();
            if self.images.len() < self.pool_size {
                self.images.push(image.clone());
                selected.push(image);
            } else if self.rng.gen::<f32>() > 0.5 {
                let idx = self.rng.gen_range(0..self.pool_size);
                let old = std::mem::replace(&mut self.images[idx], image);
                selected.push(old);
            } else {
                selected.push(image);
            }
        }
        let refs: Vec<&Tensor> = selected.iter().collect();
        Ok(Tensor::cat_raw(&refs, 0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(value: f32, n: usize) -> Tensor {
        Tensor::full([n, 1, 2, 2], value)
    }

    #[test]
    fn zero_sized_pool_passes_through_detached() {
        let mut pool = ImagePool::new(0);
        let mut x = batch(1.0, 3);
        x.set_requires_grad(true);
        let y = pool.query(&x).unwrap();
        assert_eq!(y.to_vec(), x.to_vec());
        assert_ne!(y.id(), x.id());
        assert!(!y.requires_grad());
        assert!(pool.is_empty());
    }

    #[test]
    fn fills_before_replacing() {
        let mut pool = ImagePool::with_seed(4, 1);
        let y = pool.query(&batch(1.0, 3)).unwrap();
        assert_eq!(y.to_vec(), vec![1.0; 12]);
        assert_eq!(pool.len(), 3);
        pool.query(&batch(2.0, 1)).unwrap();
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn full_pool_mixes_old_and_new() {
        let mut pool = ImagePool::with_seed(2, 7);
        pool.query(&batch(0.0, 2)).unwrap();
        let mut swapped = 0;
        let mut kept = 0;
        for _ in 0..50 {
            let out = pool.query(&batch(1.0, 1)).unwrap();
            assert_eq!(out.shape(), &[1, 1, 2, 2]);
            if out.to_vec()[0] == 1.0 {
                kept += 1;
            } else {
                swapped += 1;
            }
        }
        assert_eq!(pool.len(), 2);
        assert!(kept > 0);
        assert!(swapped > 0);
    }

    #[test]
    fn results_are_detached() {
        let mut pool = ImagePool::with_seed(1, 0);
        let mut x = batch(1.0, 1);
        x.set_requires_grad(true);
        let y = pool.query(&x).unwrap();
        assert!(!y.requires_grad());
        assert_ne!(y.id(), x.id());
    }
}
