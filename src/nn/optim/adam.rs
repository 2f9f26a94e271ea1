use crate::nn::optim::Optimizer;
use crate::tensor::Tensor;

/// Adam with optional L2 weight decay folded into the gradient
pub struct Adam {
    params: Vec<Tensor>,
    lr: f32,
    betas: (f32, f32),
    eps: f32,
    weight_decay: f32,
    m: Vec<Vec<f32>>, // 1st moment
    v: Vec<Vec<f32>>, // 2nd moment
    t: usize,         // timestep
}

impl Adam {
    #[must_use]
    pub fn new(
        params: Vec<Tensor>,
        lr: f32,
        betas: (f32, f32),
        eps: f32,
        weight_decay: f32,
    ) -> Self {
        let m: Vec<Vec<f32>> = params
            .iter()
            .map(|p| vec![0.0; p.borrow().data.len()])
            .collect();
        let v = m.clone();
        Adam {
            params,
            lr,
            betas,
            eps,
            weight_decay,
            m,
            v,
            t: 0,
        }
    }

    /// `betas = (0.9, 0.999)`, `eps = 1e-8`, no weight decay
    #[must_use]
    pub fn with_lr(params: Vec<Tensor>, lr: f32) -> Self {
        Self::new(params, lr, (0.9, 0.999), 1e-8, 0.0)
    }

    pub fn steps_taken(&self) -> usize {
        self.t
    }
}

impl Optimizer for Adam {
    fn params(&self) -> &[Tensor] {
        &self.params
    }

    fn step(&mut self) {
        self.t += 1;
        let m_hat_scale = 1.0 / (1.0 - self.betas.0.powi(self.t as i32));
        let v_hat_scale = 1.0 / (1.0 - self.betas.1.powi(self.t as i32));

        for ((param, m), v) in self.params.iter().zip(&mut self.m).zip(&mut self.v) {
            let mut p = param.borrow_mut();
            let Some(mut grad) = p.grad.clone() else {
                continue;
            };
            if self.weight_decay != 0.0 {
                for (g, theta) in grad.iter_mut().zip(&p.data) {
                    *g += self.weight_decay * *theta;
                }
            }

            for (((d, &g), m), v) in p.data.iter_mut().zip(&grad).zip(m.iter_mut()).zip(v.iter_mut()) {
                *m = self.betas.0 * *m + (1.0 - self.betas.0) * g;
                *v = self.betas.1 * *v + (1.0 - self.betas.1) * g * g;
                let m_hat = *m * m_hat_scale;
                let v_hat = *v * v_hat_scale;
                *d -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}
