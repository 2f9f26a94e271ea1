use crate::error::{GraphError, Result};
use crate::io::config::ModelConfig;
use crate::tensor::Tensor;
use bincode::{Decode, Encode};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub mod config;

pub type StateDict = BTreeMap<String, TensorData>;

// Serializable representation of tensor data
#[derive(Encode, Decode, Clone, Debug, PartialEq)]
pub struct TensorData {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl TensorData {
    pub fn from_tensor(t: &Tensor) -> Self {
        let borrowed = t.borrow();
        TensorData {
            data: borrowed.data.clone(),
            shape: borrowed.shape.clone(),
        }
    }

    /// Element count agrees with the shape
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.shape.iter().product::<usize>()
    }

    pub fn to_tensor(&self, requires_grad: bool) -> Tensor {
        crate::RawTensor::new(self.data.clone(), &self.shape, requires_grad)
    }
}

/// Summary of differences between two state dicts.
///
/// `expected` is usually taken from `model.state_dict()`, and `loaded` is
/// what was read from disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StateDictDiff {
    /// Keys that exist in `expected` but are missing from `loaded`.
    pub missing_keys: Vec<String>,
    /// Keys that exist in `loaded` but not in `expected`.
    pub unexpected_keys: Vec<String>,
    /// `(key, expected_shape, loaded_shape)` for keys present in both
    pub shape_mismatches: Vec<(String, Vec<usize>, Vec<usize>)>,
    /// `(key, shape, data_len)` for loaded entries whose data does not fill
    /// their shape
    pub corrupt_entries: Vec<(String, Vec<usize>, usize)>,
}

impl StateDictDiff {
    pub fn is_empty(&self) -> bool {
        self.missing_keys.is_empty()
            && self.unexpected_keys.is_empty()
            && self.shape_mismatches.is_empty()
            && self.corrupt_entries.is_empty()
    }
}

impl fmt::Display for StateDictDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing_keys.is_empty() {
            parts.push(format!("missing keys {:?}", self.missing_keys));
        }
        if !self.unexpected_keys.is_empty() {
            parts.push(format!("unexpected keys {:?}", self.unexpected_keys));
        }
        for (key, expected, loaded) in &self.shape_mismatches {
            parts.push(format!("'{key}' expected {expected:?}, got {loaded:?}"));
        }
        for (key, shape, len) in &self.corrupt_entries {
            parts.push(format!("'{key}' has {len} values for shape {shape:?}"));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Compute a diff between an "expected" and a "loaded" state dict.
///
/// Purely informational; no tensors are touched.
pub fn diff_state_dict(expected: &StateDict, loaded: &StateDict) -> StateDictDiff {
    let mut diff = StateDictDiff::default();

    for (key, expected_td) in expected {
        match loaded.get(key) {
            None => diff.missing_keys.push(key.clone()),
            Some(actual_td) if expected_td.shape != actual_td.shape => {
                diff.shape_mismatches.push((
                    key.clone(),
                    expected_td.shape.clone(),
                    actual_td.shape.clone(),
                ));
            }
            Some(_) => {}
        }
    }

    for (key, td) in loaded {
        if !expected.contains_key(key) {
            diff.unexpected_keys.push(key.clone());
        }
        if !td.is_consistent() {
            diff.corrupt_entries
                .push((key.clone(), td.shape.clone(), td.data.len()));
        }
    }

    diff
}

const MAGIC: u32 = u32::from_le_bytes(*b"GNM1");
const FORMAT_VERSION: u32 = 1;

/// On-disk model container: optional topology (JSON) plus optional weights
#[derive(Encode, Decode, Debug, Clone)]
pub struct ModelFile {
    magic: u32,
    format_version: u32,
    pub config_json: Option<String>,
    pub weights: Option<StateDict>,
}

impl ModelFile {
    pub fn new(config: Option<&ModelConfig>, weights: Option<StateDict>) -> Result<Self> {
        let config_json = config.map(serde_json::to_string).transpose()?;
        Ok(ModelFile {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            config_json,
            weights,
        })
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(&encoded)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            bytes = encoded.len(),
            has_config = self.config_json.is_some(),
            has_weights = self.weights.is_some(),
            "wrote model file"
        );
        Ok(())
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let (decoded, _): (ModelFile, _) =
            bincode::decode_from_slice(&buffer, bincode::config::standard())?;
        if decoded.magic != MAGIC {
            return Err(GraphError::Format(format!(
                "{} is not a model file",
                path.as_ref().display()
            )));
        }
        if decoded.format_version != FORMAT_VERSION {
            return Err(GraphError::Format(format!(
                "unsupported model file version {}",
                decoded.format_version
            )));
        }
        if let Some((key, td)) = decoded
            .weights
            .iter()
            .flatten()
            .find(|(_, td)| !td.is_consistent())
        {
            return Err(GraphError::Format(format!(
                "{}: '{key}' has {} values for shape {:?}",
                path.as_ref().display(),
                td.data.len(),
                td.shape
            )));
        }
        Ok(decoded)
    }

    /// The stored topology, or `MissingConfig` naming `path`
    pub fn model_config(&self, path: &Path) -> Result<ModelConfig> {
        let json = self
            .config_json
            .as_deref()
            .ok_or_else(|| GraphError::MissingConfig {
                path: path.display().to_string(),
            })?;
        Ok(serde_json::from_str(json)?)
    }

    /// The stored weights, or `MissingWeights` naming `path`
    pub fn take_weights(&mut self, path: &Path) -> Result<StateDict> {
        self.weights.take().ok_or_else(|| GraphError::MissingWeights {
            path: path.display().to_string(),
        })
    }
}

/// Write a bare state dict (no topology)
pub fn save_state_dict(state: &StateDict, path: impl AsRef<Path>) -> Result<()> {
    ModelFile::new(None, Some(state.clone()))?.write(path)
}

pub fn load_state_dict(path: impl AsRef<Path>) -> Result<StateDict> {
    let path = path.as_ref();
    ModelFile::read(path)?.take_weights(path)
}

#[cfg(test)]
mod io_tests {
    use super::*;

    fn sample_state() -> StateDict {
        let mut state = StateDict::new();
        state.insert(
            "dense_1/weights".to_string(),
            TensorData {
                data: vec![0.5, -1.0, 2.0, 0.0],
                shape: vec![2, 2],
            },
        );
        state.insert(
            "dense_1/biases".to_string(),
            TensorData {
                data: vec![0.1, 0.2],
                shape: vec![2],
            },
        );
        state
    }

    #[test]
    fn test_save_load_state_dict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.gnm");
        let state = sample_state();
        save_state_dict(&state, &path).unwrap();
        assert_eq!(load_state_dict(&path).unwrap(), state);
    }

    #[test]
    fn weight_only_file_has_no_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.gnm");
        save_state_dict(&sample_state(), &path).unwrap();
        let file = ModelFile::read(&path).unwrap();
        let err = file.model_config(&path).unwrap_err();
        assert!(matches!(err, GraphError::MissingConfig { .. }));
        assert!(err.is_runtime());
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.gnm");
        std::fs::write(&path, b"definitely not bincode").unwrap();
        assert!(ModelFile::read(&path).is_err());
    }

    #[test]
    fn test_state_dict_diff_reports_mismatches() {
        let expected = sample_state();
        let mut loaded = expected.clone();

        loaded.remove("dense_1/biases");
        loaded.insert(
            "extra".to_string(),
            TensorData {
                data: vec![0.0],
                shape: vec![1],
            },
        );
        if let Some(td) = loaded.get_mut("dense_1/weights") {
            td.shape = vec![4];
        }

        let diff = diff_state_dict(&expected, &loaded);
        assert!(!diff.is_empty());
        assert_eq!(diff.missing_keys, vec!["dense_1/biases".to_string()]);
        assert_eq!(diff.unexpected_keys, vec!["extra".to_string()]);
        assert_eq!(diff.shape_mismatches.len(), 1);
        assert!(diff.to_string().contains("dense_1/weights"));
        assert!(diff.corrupt_entries.is_empty());
    }

    #[test]
    fn truncated_tensor_data_is_reported() {
        let expected = sample_state();
        let mut loaded = expected.clone();
        if let Some(td) = loaded.get_mut("dense_1/weights") {
            td.data.truncate(2);
        }
        let diff = diff_state_dict(&expected, &loaded);
        assert_eq!(
            diff.corrupt_entries,
            vec![("dense_1/weights".to_string(), vec![2, 2], 2)]
        );
        assert!(diff.to_string().contains("2 values"));
    }

    #[test]
    fn file_with_truncated_tensor_is_rejected_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.gnm");
        let mut state = sample_state();
        if let Some(td) = state.get_mut("dense_1/biases") {
            td.data.pop();
        }
        save_state_dict(&state, &path).unwrap();
        let err = ModelFile::read(&path).unwrap_err();
        assert!(matches!(err, GraphError::Format(_)), "{err}");
    }
}
