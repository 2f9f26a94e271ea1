use crate::error::{GraphError, Result};
use crate::tensor::{RawTensor, Tensor};
use rand::seq::SliceRandom;

pub mod mnist;

pub use mnist::{MnistSplits, load_mnist_dataset, load_mnist_images, load_mnist_labels};

/// Labelled samples stored as one flat buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    data: Vec<f32>,
    sample_shape: Vec<usize>,
    labels: Vec<usize>,
}

impl Dataset {
    pub fn new(data: Vec<f32>, sample_shape: Vec<usize>, labels: Vec<usize>) -> Result<Self> {
        let per_sample: usize = sample_shape.iter().product();
        if per_sample == 0 || data.len() != per_sample * labels.len() {
            return Err(GraphError::InvalidParameter(format!(
                "{} values cannot hold {} samples of shape {sample_shape:?}",
                data.len(),
                labels.len()
            )));
        }
        Ok(Dataset {
            data,
            sample_shape,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn sample_shape(&self) -> &[usize] {
        &self.sample_shape
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    fn sample_len(&self) -> usize {
        self.sample_shape.iter().product()
    }

    /// First `mid` samples and the rest
    pub fn split_at(&self, mid: usize) -> (Dataset, Dataset) {
        let mid = mid.min(self.len());
        let cut = mid * self.sample_len();
        (
            Dataset {
                data: self.data[..cut].to_vec(),
                sample_shape: self.sample_shape.clone(),
                labels: self.labels[..mid].to_vec(),
            },
            Dataset {
                data: self.data[cut..].to_vec(),
                sample_shape: self.sample_shape.clone(),
                labels: self.labels[mid..].to_vec(),
            },
        )
    }

    /// Gather samples into a `[batch, ..sample_shape]` tensor plus labels
    pub fn batch(&self, indices: &[usize]) -> (Tensor, Vec<usize>) {
        let n = self.sample_len();
        let mut data = Vec::with_capacity(indices.len() * n);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            data.extend_from_slice(&self.data[i * n..(i + 1) * n]);
            labels.push(self.labels[i]);
        }
        let mut shape = vec![indices.len()];
        shape.extend_from_slice(&self.sample_shape);
        (RawTensor::new(data, &shape, false), labels)
    }
}

/// How [`minibatches`] walks a dataset
#[derive(Debug, Clone, Copy)]
pub struct MinibatchOptions {
    pub batch_size: usize,
    pub shuffle: bool,
    /// Yield the final short batch instead of dropping it
    pub allow_dynamic_batch_size: bool,
}

impl Default for MinibatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            allow_dynamic_batch_size: false,
        }
    }
}

/// Iterator over `(inputs, labels)` batches
pub struct Minibatches<'a> {
    dataset: &'a Dataset,
    order: Vec<usize>,
    batch_size: usize,
    allow_dynamic_batch_size: bool,
    position: usize,
}

impl Iterator for Minibatches<'_> {
    type Item = (Tensor, Vec<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.order.len().saturating_sub(self.position);
        if remaining == 0 || (remaining < self.batch_size && !self.allow_dynamic_batch_size) {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let batch = self.dataset.batch(&self.order[self.position..end]);
        self.position = end;
        Some(batch)
    }
}

/// Split `dataset` into batches of `batch_size`.
///
/// The last incomplete batch is dropped unless
/// `allow_dynamic_batch_size` is set.
pub fn minibatches(dataset: &Dataset, options: MinibatchOptions) -> Result<Minibatches<'_>> {
    if options.batch_size == 0 {
        return Err(GraphError::InvalidParameter("batch_size must be positive".into()));
    }
    let mut order: Vec<usize> = (0..dataset.len()).collect();
    if options.shuffle {
        order.shuffle(&mut rand::rng());
    }
    Ok(Minibatches {
        dataset,
        order,
        batch_size: options.batch_size,
        allow_dynamic_batch_size: options.allow_dynamic_batch_size,
        position: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorOps;

    fn ten_samples() -> Dataset {
        Dataset::new((0..20).map(|v| v as f32).collect(), vec![2], (0..10).collect()).unwrap()
    }

    #[test]
    fn drops_incomplete_batch_by_default() {
        let ds = ten_samples();
        let opts = MinibatchOptions {
            batch_size: 4,
            shuffle: false,
            ..Default::default()
        };
        let sizes: Vec<_> = minibatches(&ds, opts).unwrap().map(|(_, y)| y.len()).collect();
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn dynamic_batch_size_keeps_tail() {
        let ds = ten_samples();
        let opts = MinibatchOptions {
            batch_size: 4,
            shuffle: false,
            allow_dynamic_batch_size: true,
        };
        let batches: Vec<_> = minibatches(&ds, opts).unwrap().collect();
        assert_eq!(batches.len(), 3);
        let (x, y) = &batches[2];
        assert_eq!(x.shape(), vec![2, 2]);
        assert_eq!(x.to_vec(), vec![16.0, 17.0, 18.0, 19.0]);
        assert_eq!(y, &vec![8, 9]);
    }

    #[test]
    fn shuffled_batches_cover_every_sample_once() {
        let ds = ten_samples();
        let opts = MinibatchOptions {
            batch_size: 5,
            ..Default::default()
        };
        let mut seen: Vec<usize> = minibatches(&ds, opts).unwrap().flat_map(|(_, y)| y).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn rejects_inconsistent_buffers() {
        assert!(Dataset::new(vec![0.0; 5], vec![2], vec![0, 1]).is_err());
        assert!(minibatches(&ten_samples(), MinibatchOptions {
            batch_size: 0,
            ..Default::default()
        })
        .is_err());
    }
}
