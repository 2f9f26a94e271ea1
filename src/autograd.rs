use crate::tensor::{RawTensor, Tensor};
use std::collections::HashSet;

// ===== GRADIENT FUNCTION TRAIT =====

/// Trait for gradient computation functions.
///
/// Each operation type implements this to define how gradients flow backward.
/// The `backward` method takes:
/// - `out_grad`: gradient of loss w.r.t. this operation's output
/// - `parents`: the input tensors to this operation
///
/// Returns: vector of gradients w.r.t. each parent (Some if `requires_grad`, None otherwise)
pub trait GradFn {
    /// Compute gradients for parent tensors given output gradient
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>>;
    /// Clone this gradient function (needed for Rc/RefCell)
    fn clone_box(&self) -> Box<dyn GradFn>;
}

// ===== BACKPROPAGATION =====

impl RawTensor {
    /// Run backpropagation starting from this tensor
    ///
    /// Reverse-mode automatic differentiation:
    /// 1. Seed this tensor's gradient with ones (a scalar loss gets `[1.0]`)
    /// 2. Build a topological order with an explicit post-order DFS
    /// 3. Walk it consumers-first, calling each node's `grad_fn`
    /// 4. Accumulate the returned gradients into the parents
    ///
    /// # Panics
    /// Calling on a tensor that doesn't require gradients
    pub fn backward(tensor_ref: &Tensor) {
        enum Action {
            Visit(Tensor),
            PostVisit(Tensor),
        }

        assert!(
            tensor_ref.borrow().requires_grad,
            "Called backward on a tensor that doesn't require grad"
        );
        {
            let mut tensor = tensor_ref.borrow_mut();
            if tensor.grad.is_none() {
                tensor.grad = Some(vec![1.0; tensor.data.len()]);
            }
        }

        // A visited set alone is not enough for diamond-shaped graphs (a layer
        // output consumed twice), so every node waits for all its consumers.
        let mut topo_order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![Action::Visit(tensor_ref.clone())];

        while let Some(action) = stack.pop() {
            match action {
                Action::Visit(t) => {
                    if !visited.insert(t.as_ptr()) {
                        continue;
                    }
                    stack.push(Action::PostVisit(t.clone()));
                    let parents = t.borrow().parents.clone();
                    for parent in parents {
                        stack.push(Action::Visit(parent));
                    }
                }
                Action::PostVisit(t) => topo_order.push(t),
            }
        }

        for tensor in topo_order.into_iter().rev() {
            let (grad_fn, parents, grad_data, shape) = {
                let t = tensor.borrow();
                (
                    t.grad_fn.as_ref().map(|gf| gf.clone_box()),
                    t.parents.clone(),
                    t.grad.clone(),
                    t.shape.clone(),
                )
            };
            if let Some(grad_fn) = grad_fn
                && let Some(grad_out_data) = grad_data
            {
                let grad_out = RawTensor {
                    data: grad_out_data,
                    shape,
                    grad: None,
                    requires_grad: false,
                    grad_fn: None,
                    parents: vec![],
                };

                let parent_grads = grad_fn.backward(&grad_out, &parents);

                for (parent_grad, parent_ref) in parent_grads.into_iter().zip(parents.iter()) {
                    let Some(g) = parent_grad else { continue };
                    let mut parent = parent_ref.borrow_mut();
                    if !parent.requires_grad {
                        continue;
                    }
                    let contribution = g.borrow().data.clone();
                    match parent.grad {
                        None => parent.grad = Some(contribution),
                        Some(ref mut existing) => {
                            RawTensor::accumulate_grad(existing, &contribution)
                        }
                    }
                }
            }
        }
    }

    fn accumulate_grad(existing: &mut [f32], new_grad: &[f32]) {
        assert_eq!(
            existing.len(),
            new_grad.len(),
            "Gradient size mismatch during accumulation"
        );
        for (a, b) in existing.iter_mut().zip(new_grad) {
            *a += *b;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn diamond_graph_accumulates_both_paths() {
        // y = x*x + x  => dy/dx = 2x + 1
        let x = RawTensor::new(vec![3.0], &[1], true);
        let y = x.elem_mul(&x).add(&x);
        y.backward();
        assert_eq!(x.grad().unwrap(), vec![7.0]);
    }

    #[test]
    #[should_panic(expected = "doesn't require grad")]
    fn backward_on_constant_panics() {
        let x = RawTensor::new(vec![1.0], &[1], false);
        x.backward();
    }
}
