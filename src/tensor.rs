use crate::autograd::GradFn;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::cell::RefCell;
use std::rc::Rc;

/// Type alias for a reference-counted, interior-mutable tensor.
///
/// `Rc<RefCell<RawTensor>>` lets the autograd graph hold several references to
/// the same tensor while gradients are still accumulated in place.
/// Single-threaded only.
pub type Tensor = Rc<RefCell<RawTensor>>;

// ===== RAW TENSOR STRUCTURE =====

/// The core tensor structure containing data and gradient tracking
///
/// Fields:
/// - `data`: flat Vec<f32> of actual values (row-major order)
/// - `shape`: dimensions, e.g. [batch, height, width, channels]
/// - `grad`: accumulated gradient (Some after backward if `requires_grad`)
/// - `requires_grad`: whether to track gradients for this tensor
/// - `grad_fn`: function to compute parent gradients during backward
/// - `parents`: input tensors that this tensor depends on
pub struct RawTensor {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
    pub grad: Option<Vec<f32>>,
    pub requires_grad: bool,
    pub grad_fn: Option<Box<dyn GradFn>>,
    pub parents: Vec<Tensor>,
}

impl Clone for RawTensor {
    fn clone(&self) -> Self {
        RawTensor {
            data: self.data.clone(),
            shape: self.shape.clone(),
            grad: self.grad.clone(),
            requires_grad: self.requires_grad,
            grad_fn: self.grad_fn.as_ref().map(|gf| gf.clone_box()),
            parents: self.parents.clone(),
        }
    }
}

impl std::fmt::Debug for RawTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("requires_grad", &self.requires_grad)
            .field("has_grad", &self.grad.is_some())
            .finish()
    }
}

// ===== TENSOR CONSTRUCTORS =====
impl RawTensor {
    /// Create a new tensor from data and shape
    ///
    /// # Panics
    /// Panics if data.len() != shape.product()
    pub fn new(data: Vec<f32>, shape: &[usize], requires_grad: bool) -> Tensor {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "Data length must match shape"
        );
        Rc::new(RefCell::new(RawTensor {
            data,
            shape: shape.to_vec(),
            grad: None,
            requires_grad,
            grad_fn: None,
            parents: vec![],
        }))
    }
    pub fn zeros(shape: &[usize]) -> Tensor {
        let size = shape.iter().product();
        Self::new(vec![0.0; size], shape, false)
    }
    pub fn ones(shape: &[usize]) -> Tensor {
        let size = shape.iter().product();
        Self::new(vec![1.0; size], shape, false)
    }
    pub fn constant(value: f32, shape: &[usize]) -> Tensor {
        let size = shape.iter().product();
        Self::new(vec![value; size], shape, false)
    }
    /// Values uniformly distributed in [0, 1)
    pub fn rand(shape: &[usize]) -> Tensor {
        let size = shape.iter().product();
        let mut rng = rand::rng();
        let data: Vec<f32> = (0..size).map(|_| rng.random::<f32>()).collect();
        Self::new(data, shape, false)
    }
    /// Values from N(mean, stddev^2)
    pub fn random_normal(shape: &[usize], mean: f32, stddev: f32) -> Tensor {
        let size = shape.iter().product();
        let mut rng = rand::rng();
        let data: Vec<f32> = match Normal::new(mean, stddev) {
            Ok(normal) => (0..size).map(|_| normal.sample(&mut rng)).collect(),
            Err(_) => vec![mean; size],
        };
        Self::new(data, shape, false)
    }
    pub fn randn(shape: &[usize]) -> Tensor {
        Self::random_normal(shape, 0.0, 1.0)
    }
    /// Normal samples redrawn until they fall within two standard deviations
    pub fn truncated_normal(shape: &[usize], mean: f32, stddev: f32) -> Tensor {
        let size = shape.iter().product();
        let mut rng = rand::rng();
        let data: Vec<f32> = match Normal::new(0.0f32, 1.0) {
            Ok(normal) => (0..size)
                .map(|_| loop {
                    let z = normal.sample(&mut rng);
                    if z.abs() <= 2.0 {
                        break mean + stddev * z;
                    }
                })
                .collect(),
            Err(_) => vec![mean; size],
        };
        Self::new(data, shape, false)
    }
    /// Xavier uniform initialization
    ///
    /// Samples weights uniformly from [-limit, limit] where
    /// limit = sqrt(6 / (fan_in + fan_out)). For conv kernels shaped
    /// `[kh, kw, in, out]` the receptive field is folded into both fans.
    pub fn xavier_uniform(shape: &[usize]) -> Tensor {
        let (fan_in, fan_out) = Self::fans(shape);
        let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
        let size: usize = shape.iter().product();
        let mut rng = rand::rng();
        let data: Vec<f32> = (0..size)
            .map(|_| rng.random_range(-limit..=limit))
            .collect();
        Self::new(data, shape, false)
    }

    fn fans(shape: &[usize]) -> (usize, usize) {
        match shape.len() {
            0 => (1, 1),
            1 => (shape[0], shape[0]),
            n => {
                let receptive: usize = shape[..n - 2].iter().product();
                (shape[n - 2] * receptive, shape[n - 1] * receptive)
            }
        }
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

// ===== LOSS FUNCTIONS =====

/// Gradient for sparse softmax cross-entropy: (softmax - onehot) / batch
#[derive(Clone)]
struct CrossEntropyGradFn {
    probs: Vec<f32>,
    labels: Vec<usize>,
    classes: usize,
}

impl GradFn for CrossEntropyGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let scale = out_grad.data.first().copied().unwrap_or(1.0);
        let batch = self.labels.len();
        let mut grad = self.probs.clone();
        for (row, &label) in self.labels.iter().enumerate() {
            grad[row * self.classes + label] -= 1.0;
        }
        for g in grad.iter_mut() {
            *g *= scale / batch as f32;
        }
        let shape = parents[0].borrow().shape.clone();
        vec![Some(RawTensor::new(grad, &shape, false))]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(self.clone())
    }
}

impl RawTensor {
    pub fn mse_loss(pred: &Tensor, target: &Tensor) -> Tensor {
        let diff = pred.sub(target);
        let squared = diff.elem_mul(&diff);
        squared.mean()
    }

    /// Softmax cross-entropy between `[batch, classes]` logits and integer
    /// class labels, averaged over the batch.
    ///
    /// # Panics
    /// Panics if logits are not 2-D, the label count differs from the batch
    /// size, or a label is out of range.
    pub fn cross_entropy(logits: &Tensor, labels: &[usize]) -> Tensor {
        let (data, shape, requires_grad) = {
            let l = logits.borrow();
            (l.data.clone(), l.shape.clone(), l.requires_grad)
        };
        assert_eq!(shape.len(), 2, "cross_entropy expects [batch, classes] logits");
        let (batch, classes) = (shape[0], shape[1]);
        assert_eq!(batch, labels.len(), "one label per logit row");

        let mut probs = vec![0.0; data.len()];
        let mut loss = 0.0;
        for (row, &label) in labels.iter().enumerate() {
            assert!(label < classes, "label {label} out of range for {classes} classes");
            let logits_row = &data[row * classes..(row + 1) * classes];
            let max = logits_row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let sum: f32 = logits_row.iter().map(|&v| (v - max).exp()).sum();
            for (c, &v) in logits_row.iter().enumerate() {
                probs[row * classes + c] = (v - max).exp() / sum;
            }
            loss += sum.ln() + max - logits_row[label];
        }
        let out = Self::new(vec![loss / batch.max(1) as f32], &[1], requires_grad);
        if requires_grad {
            out.borrow_mut().parents = vec![logits.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(CrossEntropyGradFn {
                probs,
                labels: labels.to_vec(),
                classes,
            }));
        }
        out
    }

    /// Index of the largest value in each row of a 2-D tensor
    pub fn argmax_rows(t: &Tensor) -> Vec<usize> {
        let t = t.borrow();
        let cols = t.shape.last().copied().unwrap_or(1).max(1);
        t.data
            .chunks(cols)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 { (i, v) } else { best }
                    })
                    .0
            })
            .collect()
    }
}

// ===== NUMERICAL GRADIENT CHECKING =====

impl RawTensor {
    /// Check gradients numerically using central differences
    ///
    /// Analytical gradient: what `backward()` computes.
    /// Numerical gradient: (f(x+ε) - f(x-ε)) / (2ε)
    ///
    /// # Returns
    /// (max_error, mean_error, passed)
    pub fn check_gradients<F>(
        tensor: &Tensor,
        loss_fn: F,
        epsilon: f32,
        tolerance: f32,
    ) -> (f32, f32, bool)
    where
        F: Fn(&Tensor) -> Tensor,
    {
        let loss = loss_fn(tensor);
        loss.backward();

        let Some(analytical_grad) = tensor.grad() else {
            return (f32::INFINITY, f32::INFINITY, false);
        };
        let mut numerical_grad = vec![0.0; analytical_grad.len()];

        let original_data = tensor.borrow().data.clone();
        let original_shape = tensor.borrow().shape.clone();

        for i in 0..original_data.len() {
            let mut data_plus = original_data.clone();
            data_plus[i] += epsilon;
            let val_plus = loss_fn(&RawTensor::new(data_plus, &original_shape, false))
                .borrow()
                .data[0];

            let mut data_minus = original_data.clone();
            data_minus[i] -= epsilon;
            let val_minus = loss_fn(&RawTensor::new(data_minus, &original_shape, false))
                .borrow()
                .data[0];

            numerical_grad[i] = (val_plus - val_minus) / (2.0 * epsilon);
        }

        let mut max_error: f32 = 0.0;
        let mut total_error: f32 = 0.0;
        for (&analytical, &numerical) in analytical_grad.iter().zip(&numerical_grad) {
            let error = (analytical - numerical).abs();
            let relative_error = if numerical.abs() > 1e-3 {
                error / numerical.abs()
            } else {
                error
            };
            max_error = max_error.max(relative_error);
            total_error += relative_error;
        }

        let mean_error = total_error / analytical_grad.len().max(1) as f32;
        (max_error, mean_error, max_error < tolerance)
    }

    /// Gradient check with epsilon=1e-2 and tolerance=1e-2
    pub fn check_gradients_simple<F>(tensor: &Tensor, loss_fn: F) -> bool
    where
        F: Fn(&Tensor) -> Tensor,
    {
        let (max_err, mean_err, passed) = Self::check_gradients(tensor, loss_fn, 1e-2, 1e-2);
        if !passed {
            tracing::warn!(max_err, mean_err, "gradient check failed");
        }
        passed
    }
}

// ===== TRAIT-BASED API =====

/// Method-style tensor operations: `tensor.add(&other)` instead of
/// `RawTensor::add(&tensor, &other)`
pub trait TensorOps {
    // Binary ops
    fn add(&self, other: &Tensor) -> Tensor;
    fn sub(&self, other: &Tensor) -> Tensor;
    fn elem_mul(&self, other: &Tensor) -> Tensor;
    fn div(&self, other: &Tensor) -> Tensor;

    // Unary ops
    fn neg(&self) -> Tensor;
    fn exp(&self) -> Tensor;
    fn log(&self) -> Tensor;
    fn tanh(&self) -> Tensor;
    fn sigmoid(&self) -> Tensor;
    fn relu(&self) -> Tensor;
    fn leaky_relu(&self, alpha: f32) -> Tensor;

    // Reduce ops
    fn sum(&self) -> Tensor;
    fn mean(&self) -> Tensor;

    // Movement ops
    fn reshape(&self, new_shape: &[usize]) -> Tensor;

    fn matmul(&self, other: &Tensor) -> Tensor;

    // Gradient ops
    fn backward(&self);
    fn grad(&self) -> Option<Vec<f32>>;

    fn shape(&self) -> Vec<usize>;
    fn to_vec(&self) -> Vec<f32>;
}

impl TensorOps for Tensor {
    fn add(&self, other: &Tensor) -> Tensor {
        RawTensor::add(self, other)
    }
    fn sub(&self, other: &Tensor) -> Tensor {
        RawTensor::sub(self, other)
    }
    fn elem_mul(&self, other: &Tensor) -> Tensor {
        RawTensor::elem_mul(self, other)
    }
    fn div(&self, other: &Tensor) -> Tensor {
        RawTensor::div(self, other)
    }

    fn neg(&self) -> Tensor {
        RawTensor::neg(self)
    }
    fn exp(&self) -> Tensor {
        RawTensor::exp(self)
    }
    fn log(&self) -> Tensor {
        RawTensor::log(self)
    }
    fn tanh(&self) -> Tensor {
        RawTensor::tanh(self)
    }
    fn sigmoid(&self) -> Tensor {
        RawTensor::sigmoid(self)
    }
    fn relu(&self) -> Tensor {
        RawTensor::relu(self)
    }
    fn leaky_relu(&self, alpha: f32) -> Tensor {
        RawTensor::leaky_relu(self, alpha)
    }

    fn sum(&self) -> Tensor {
        RawTensor::sum(self)
    }
    fn mean(&self) -> Tensor {
        RawTensor::mean(self)
    }

    fn reshape(&self, new_shape: &[usize]) -> Tensor {
        RawTensor::reshape(self, new_shape)
    }

    fn matmul(&self, other: &Tensor) -> Tensor {
        RawTensor::matmul(self, other)
    }

    fn backward(&self) {
        RawTensor::backward(self)
    }
    fn grad(&self) -> Option<Vec<f32>> {
        self.borrow().grad.clone()
    }

    fn shape(&self) -> Vec<usize> {
        self.borrow().shape.clone()
    }
    fn to_vec(&self) -> Vec<f32> {
        self.borrow().data.clone()
    }
}

// ===== PUBLIC API EXPORTS =====

pub fn zeros(shape: &[usize]) -> Tensor {
    RawTensor::zeros(shape)
}

pub fn ones(shape: &[usize]) -> Tensor {
    RawTensor::ones(shape)
}

pub fn randn(shape: &[usize]) -> Tensor {
    RawTensor::randn(shape)
}

pub fn mse_loss(pred: &Tensor, target: &Tensor) -> Tensor {
    RawTensor::mse_loss(pred, target)
}

pub fn cross_entropy(logits: &Tensor, labels: &[usize]) -> Tensor {
    RawTensor::cross_entropy(logits, labels)
}

pub fn check_gradients_simple<F>(tensor: &Tensor, loss_fn: F) -> bool
where
    F: Fn(&Tensor) -> Tensor,
{
    RawTensor::check_gradients_simple(tensor, loss_fn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    #[should_panic(expected = "Data length must match shape")]
    fn new_rejects_mismatched_data() {
        let _ = RawTensor::new(vec![1.0, 2.0], &[3], false);
    }

    #[test]
    fn truncated_normal_stays_within_two_sigma() {
        let t = RawTensor::truncated_normal(&[1000], 0.0, 0.1);
        assert!(t.borrow().data.iter().all(|v| v.abs() <= 0.2 + 1e-6));
    }

    #[test]
    fn xavier_conv_kernel_bounds() {
        // fan_in = 3*3*2, fan_out = 3*3*4
        let t = RawTensor::xavier_uniform(&[3, 3, 2, 4]);
        let limit = (6.0f32 / 54.0).sqrt();
        assert!(t.borrow().data.iter().all(|v| v.abs() <= limit));
    }

    #[test]
    fn cross_entropy_uniform_logits() {
        let logits = RawTensor::zeros(&[2, 4]);
        let loss = cross_entropy(&logits, &[0, 3]);
        assert_relative_eq!(loss.borrow().data[0], 4.0f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn cross_entropy_gradient_matches_numerical() {
        let logits = RawTensor::new(vec![0.5, -1.0, 2.0, 0.1, 0.3, -0.7], &[2, 3], true);
        assert!(check_gradients_simple(&logits, |t| cross_entropy(t, &[2, 0])));
    }

    #[test]
    fn argmax_picks_first_maximum() {
        let t = RawTensor::new(vec![1.0, 3.0, 3.0, 5.0, 0.0, 1.0], &[2, 3], false);
        assert_eq!(RawTensor::argmax_rows(&t), vec![1, 0]);
    }
}
