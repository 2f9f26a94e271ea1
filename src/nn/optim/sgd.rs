use crate::nn::optim::Optimizer;
use crate::tensor::Tensor;

/// Plain SGD, with optional heavy-ball momentum and L2 weight decay
///
/// With momentum `m`: `v = m * v - lr * g`, then `w += v`.
pub struct SGD {
    params: Vec<Tensor>,
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    /// One buffer per parameter, empty until momentum is used
    velocity: Vec<Vec<f32>>,
}

impl SGD {
    pub fn new(params: Vec<Tensor>, lr: f32, momentum: f32, weight_decay: f32) -> Self {
        let velocity = params
            .iter()
            .map(|p| {
                if momentum > 0.0 {
                    vec![0.0; p.borrow().numel()]
                } else {
                    Vec::new()
                }
            })
            .collect();
        SGD {
            params,
            lr,
            momentum,
            weight_decay,
            velocity,
        }
    }

    /// No momentum, no decay
    pub fn with_lr(params: Vec<Tensor>, lr: f32) -> Self {
        Self::new(params, lr, 0.0, 0.0)
    }
}

impl Optimizer for SGD {
    fn params(&self) -> &[Tensor] {
        &self.params
    }

    fn step(&mut self) {
        for (param, velocity) in self.params.iter().zip(&mut self.velocity) {
            let mut p = param.borrow_mut();
            let Some(grad) = p.grad.take() else {
                continue;
            };
            let decay = self.weight_decay;
            for (i, (w, g)) in p.data.iter_mut().zip(&grad).enumerate() {
                let g = g + decay * *w;
                match velocity.get_mut(i) {
                    Some(v) => {
                        *v = self.momentum * *v - self.lr * g;
                        *w += *v;
                    }
                    None => *w -= self.lr * g,
                }
            }
            p.grad = Some(grad);
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}
