//! Train, save with weights, reload, evaluate, keep training.

use graphnet::data::{Dataset, MinibatchOptions, load_mnist_dataset};
use graphnet::train::{evaluate, train_epoch};
use graphnet::*;
use rand_distr::{Distribution, Normal};
use tempfile::TempDir;

const FEATURES: usize = 20;
const CLASSES: usize = 4;

/// Gaussian blobs around well separated class centers
fn blobs(per_class: usize) -> Dataset {
    let noise = Normal::new(0.0f32, 0.5).unwrap();
    let mut rng = rand::rng();
    let mut data = Vec::with_capacity(per_class * CLASSES * FEATURES);
    let mut labels = Vec::with_capacity(per_class * CLASSES);
    for i in 0..per_class * CLASSES {
        let class = i % CLASSES;
        for f in 0..FEATURES {
            let center = if f % CLASSES == class { 3.0 } else { 0.0 };
            data.push(center + noise.sample(&mut rng));
        }
        labels.push(class);
    }
    Dataset::new(data, vec![FEATURES], labels).unwrap()
}

fn get_model(features: usize, hidden: usize, classes: usize) -> Model {
    let ni = input(vec![None, Some(features)]).unwrap();
    let nn = Dropout::new(0.8).unwrap().call(&ni).unwrap();
    let nn = Dense::new(hidden)
        .act(Activation::Relu)
        .in_channels(features)
        .call(&nn)
        .unwrap();
    let nn = Dropout::new(0.8).unwrap().call(&nn).unwrap();
    let nn = Dense::new(hidden)
        .act(Activation::Relu)
        .in_channels(hidden)
        .call(&nn)
        .unwrap();
    let nn = Dropout::new(0.8).unwrap().call(&nn).unwrap();
    let nn = Dense::new(classes).in_channels(hidden).call(&nn).unwrap();
    Model::new("mlp", ni, nn).unwrap()
}

fn fit(model: &mut Model, data: &Dataset, epochs: usize, lr: f32) {
    let mut optimizer = Adam::with_lr(model.weights(), lr);
    let options = MinibatchOptions {
        batch_size: 50,
        shuffle: true,
        allow_dynamic_batch_size: false,
    };
    for _ in 0..epochs {
        train_epoch(model, &mut optimizer, data, options).unwrap();
    }
}

#[test]
fn trained_weights_survive_reload_and_training_continues() {
    graphnet::logging::init_for_tests();
    let train = blobs(100);
    let val = blobs(25);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("MLP.gnm");

    let mut mlp = get_model(FEATURES, 64, CLASSES);
    fit(&mut mlp, &train, 10, 0.01);
    mlp.eval();
    let before = evaluate(&mlp, &val, 50).unwrap();
    mlp.save(&path, true).unwrap();

    let mut reloaded = Model::load(&path, true).unwrap();
    assert_eq!(reloaded.config().unwrap(), mlp.config().unwrap());
    reloaded.eval();
    let after = evaluate(&reloaded, &val, 50).unwrap();
    approx::assert_relative_eq!(before.loss, after.loss, epsilon = 1e-5);
    assert!(after.accuracy > 0.7, "val acc {}", after.accuracy);

    fit(&mut reloaded, &train, 2, 0.01);
    reloaded.save(&path, true).unwrap();
    let again = evaluate(&Model::load(&path, true).unwrap(), &val, 50).unwrap();
    assert!(again.accuracy > 0.7, "val acc {}", again.accuracy);
}

#[test]
fn gradients_reach_every_weight() {
    let mut mlp = get_model(FEATURES, 8, CLASSES);
    mlp.train();
    let (x, y) = blobs(4).batch(&[0, 1, 2, 3]);
    let logits = mlp.forward_one(&x).unwrap();
    cross_entropy(&logits, &y).backward();
    for (name, w) in mlp.named_weights() {
        assert!(w.grad().is_some(), "no gradient for {name}");
    }
    mlp.zero_grad();
    assert!(mlp.weights().iter().all(|w| w.grad().is_none()));
}

/// Runs on real MNIST when `GRAPHNET_MNIST_DIR` points at the raw IDX files
#[test]
fn mnist_mlp_round_trip() {
    let Ok(dir) = std::env::var("GRAPHNET_MNIST_DIR") else {
        return;
    };
    let splits = load_mnist_dataset(dir, &[784]).unwrap();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("MLP.gnm");

    let mut mlp = get_model(784, 800, 10);
    let mut optimizer = Adam::with_lr(mlp.weights(), 1e-4);
    let options = MinibatchOptions {
        batch_size: 500,
        ..Default::default()
    };
    for _ in 0..3 {
        train_epoch(&mut mlp, &mut optimizer, &splits.train, options).unwrap();
    }
    mlp.save(&path, true).unwrap();

    let reloaded = Model::load(&path, true).unwrap();
    let eval = evaluate(&reloaded, &splits.val, 500).unwrap();
    assert!(eval.accuracy > 0.7, "val acc {}", eval.accuracy);
}
