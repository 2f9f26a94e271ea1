use crate::data::Dataset;
use crate::error::{GraphError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const IMAGE_MAGIC: u32 = 0x0000_0803;
const LABEL_MAGIC: u32 = 0x0000_0801;
const VALIDATION_SIZE: usize = 10_000;

fn read_u32(header: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        header[offset],
        header[offset + 1],
        header[offset + 2],
        header[offset + 3],
    ])
}

/// Byte count promised by the header dimensions, checked against what the
/// file actually holds before anything is allocated
fn payload_len(file: &File, header_len: usize, dims: &[u32]) -> Result<usize> {
    let wanted = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
        .ok_or_else(|| GraphError::Format(format!("IDX dimensions {dims:?} overflow")))?;
    let available = file.metadata()?.len().saturating_sub(header_len as u64);
    if (wanted as u64) > available {
        return Err(GraphError::Format(format!(
            "IDX header promises {wanted} bytes, file holds {available}"
        )));
    }
    Ok(wanted)
}

/// Load MNIST images from an IDX file, scaled to [0, 1]
///
/// Returns the flattened pixels and `(rows, cols)`.
pub fn load_mnist_images<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, (usize, usize))> {
    let mut file = File::open(path)?;

    let mut header = [0u8; 16];
    file.read_exact(&mut header)?;

    let magic = read_u32(&header, 0);
    if magic != IMAGE_MAGIC {
        return Err(GraphError::Format(format!(
            "invalid MNIST image magic number: 0x{magic:08x}"
        )));
    }

    let dims = [read_u32(&header, 4), read_u32(&header, 8), read_u32(&header, 12)];
    let (rows, cols) = (dims[1] as usize, dims[2] as usize);

    let mut pixels = vec![0u8; payload_len(&file, header.len(), &dims)?];
    file.read_exact(&mut pixels)?;

    let data: Vec<f32> = pixels.iter().map(|&p| f32::from(p) / 255.0).collect();
    Ok((data, (rows, cols)))
}

/// Load MNIST labels (0-9) from an IDX file
pub fn load_mnist_labels<P: AsRef<Path>>(path: P) -> Result<Vec<usize>> {
    let mut file = File::open(path)?;

    let mut header = [0u8; 8];
    file.read_exact(&mut header)?;

    let magic = read_u32(&header, 0);
    if magic != LABEL_MAGIC {
        return Err(GraphError::Format(format!(
            "invalid MNIST label magic number: 0x{magic:08x}"
        )));
    }

    let num_labels = read_u32(&header, 4);
    let mut labels = vec![0u8; payload_len(&file, header.len(), &[num_labels])?];
    file.read_exact(&mut labels)?;
    Ok(labels.into_iter().map(usize::from).collect())
}

/// Train, validation and test splits
#[derive(Debug, Clone)]
pub struct MnistSplits {
    pub train: Dataset,
    pub val: Dataset,
    pub test: Dataset,
}

/// Read the four raw IDX files from `dir` and reshape every image to
/// `sample_shape` (e.g. `[784]` or `[28, 28, 1]`).
///
/// The last 10,000 training images become the validation split.
/// Nothing is downloaded; missing files surface as I/O errors.
pub fn load_mnist_dataset(dir: impl AsRef<Path>, sample_shape: &[usize]) -> Result<MnistSplits> {
    let dir = dir.as_ref();
    let load = |images: &str, labels: &str| -> Result<Dataset> {
        let (pixels, (rows, cols)) = load_mnist_images(dir.join(images))?;
        let labels = load_mnist_labels(dir.join(labels))?;
        let per_image: usize = sample_shape.iter().product();
        if per_image != rows * cols {
            return Err(GraphError::InvalidParameter(format!(
                "sample shape {sample_shape:?} does not hold {rows}x{cols} images"
            )));
        }
        Dataset::new(pixels, sample_shape.to_vec(), labels)
    };

    let full_train = load("train-images-idx3-ubyte", "train-labels-idx1-ubyte")?;
    let test = load("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte")?;
    let split = full_train.len().saturating_sub(VALIDATION_SIZE);
    let (train, val) = full_train.split_at(split);
    tracing::info!(
        train = train.len(),
        val = val.len(),
        test = test.len(),
        "loaded MNIST"
    );
    Ok(MnistSplits { train, val, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_idx(dir: &Path, name: &str, bytes: &[u8]) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(bytes).unwrap();
    }

    fn images(n: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        for v in [IMAGE_MAGIC, n, 2, 2] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend((0..n * 4).map(|i| (i % 256) as u8));
        bytes
    }

    fn labels(n: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        for v in [LABEL_MAGIC, n] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend((0..n).map(|i| (i % 10) as u8));
        bytes
    }

    #[test]
    fn parses_idx_headers() {
        let dir = tempfile::tempdir().unwrap();
        write_idx(dir.path(), "imgs", &images(3));
        write_idx(dir.path(), "lbls", &labels(3));
        let (pixels, dims) = load_mnist_images(dir.path().join("imgs")).unwrap();
        assert_eq!(dims, (2, 2));
        assert_eq!(pixels.len(), 12);
        assert!((pixels[1] - 1.0 / 255.0).abs() < 1e-6);
        assert_eq!(load_mnist_labels(dir.path().join("lbls")).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn oversized_header_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Vec::new();
        for v in [IMAGE_MAGIC, u32::MAX, u32::MAX, u32::MAX] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        write_idx(dir.path(), "huge", &bytes);
        assert!(matches!(
            load_mnist_images(dir.path().join("huge")),
            Err(GraphError::Format(_))
        ));

        let mut short = labels(3);
        short[4..8].copy_from_slice(&1_000_000u32.to_be_bytes());
        write_idx(dir.path(), "short", &short);
        assert!(matches!(
            load_mnist_labels(dir.path().join("short")),
            Err(GraphError::Format(_))
        ));
    }

    #[test]
    fn rejects_swapped_files() {
        let dir = tempfile::tempdir().unwrap();
        write_idx(dir.path(), "lbls", &labels(3));
        assert!(matches!(
            load_mnist_images(dir.path().join("lbls")),
            Err(GraphError::Format(_))
        ));
    }

    #[test]
    fn dataset_split_and_shape_check() {
        let dir = tempfile::tempdir().unwrap();
        write_idx(dir.path(), "train-images-idx3-ubyte", &images(12));
        write_idx(dir.path(), "train-labels-idx1-ubyte", &labels(12));
        write_idx(dir.path(), "t10k-images-idx3-ubyte", &images(4));
        write_idx(dir.path(), "t10k-labels-idx1-ubyte", &labels(4));

        let splits = load_mnist_dataset(dir.path(), &[2, 2, 1]).unwrap();
        // Fewer than 10k training images: everything lands in validation.
        assert_eq!(splits.train.len(), 0);
        assert_eq!(splits.val.len(), 12);
        assert_eq!(splits.test.len(), 4);
        assert_eq!(splits.test.sample_shape(), &[2, 2, 1]);

        assert!(load_mnist_dataset(dir.path(), &[5]).is_err());
    }
}
