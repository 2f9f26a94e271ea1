use crate::data::{Dataset, MinibatchOptions, minibatches};
use crate::error::Result;
use crate::model::Model;
use crate::nn::Optimizer;
use crate::tensor::{RawTensor, TensorOps};

/// Mean loss and accuracy over the batches of one pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
    pub batches: usize,
}

/// One epoch of sparse cross-entropy training in train mode.
///
/// The model is switched back to eval mode afterwards. Returns the mean
/// training loss.
pub fn train_epoch(
    model: &mut Model,
    optimizer: &mut dyn Optimizer,
    dataset: &Dataset,
    options: MinibatchOptions,
) -> Result<f32> {
    model.train();
    let mut total = 0.0;
    let mut batches = 0usize;
    for (x, y) in minibatches(dataset, options)? {
        optimizer.zero_grad();
        let logits = model.forward_one(&x)?;
        let loss = RawTensor::cross_entropy(&logits, &y);
        loss.backward();
        optimizer.step();
        total += loss.to_vec()[0];
        batches += 1;
    }
    model.eval();
    let mean = total / batches.max(1) as f32;
    tracing::debug!(batches, loss = mean, "finished epoch");
    Ok(mean)
}

/// Loss and accuracy in the model's current mode, without shuffling
pub fn evaluate(model: &Model, dataset: &Dataset, batch_size: usize) -> Result<Evaluation> {
    let options = MinibatchOptions {
        batch_size,
        shuffle: false,
        allow_dynamic_batch_size: true,
    };
    let (mut loss, mut accuracy, mut batches) = (0.0, 0.0, 0usize);
    for (x, y) in minibatches(dataset, options)? {
        let logits = model.forward_one(&x)?;
        loss += RawTensor::cross_entropy(&logits, &y).to_vec()[0];
        let predicted = RawTensor::argmax_rows(&logits);
        let correct = predicted.iter().zip(&y).filter(|(p, t)| p == t).count();
        accuracy += correct as f32 / y.len() as f32;
        batches += 1;
    }
    let n = batches.max(1) as f32;
    let result = Evaluation {
        loss: loss / n,
        accuracy: accuracy / n,
        batches,
    };
    tracing::info!(loss = result.loss, accuracy = result.accuracy, "evaluated");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Adam, CallLayer, Dense, input};

    fn linearly_separable() -> Dataset {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..64 {
            let t = i as f32 / 64.0;
            let label = i % 2;
            let sign = if label == 0 { -1.0 } else { 1.0 };
            data.extend_from_slice(&[sign * (1.0 + t), t - 0.5]);
            labels.push(label);
        }
        Dataset::new(data, vec![2], labels).unwrap()
    }

    #[test]
    fn training_improves_accuracy() {
        let x = input(vec![None, Some(2)]).unwrap();
        let y = Dense::new(2).call(&x).unwrap();
        let mut model = Model::new("linear", x, y).unwrap();
        let data = linearly_separable();
        let mut opt = Adam::with_lr(model.weights(), 0.05);
        let options = MinibatchOptions {
            batch_size: 16,
            ..Default::default()
        };
        for _ in 0..30 {
            train_epoch(&mut model, &mut opt, &data, options).unwrap();
        }
        assert!(!model.is_training());
        let eval = evaluate(&model, &data, 32).unwrap();
        assert_eq!(eval.batches, 2);
        assert!(eval.accuracy > 0.95, "accuracy {}", eval.accuracy);
    }
}
