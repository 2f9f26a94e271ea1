//! Model assembly, forward pass and save/load benchmarks

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use graphnet::{
    Activation, CallLayer, Conv2d, Dense, Flatten, MaxPool2d, Model, RawTensor, Tensor, input,
};

fn small_cnn() -> Model {
    let ni = input(vec![None, Some(24), Some(24), Some(3)]).unwrap();
    let nn = Conv2d::new(16)
        .filter_size((5, 5))
        .act(Activation::Relu)
        .call(&ni)
        .unwrap();
    let nn = MaxPool2d::new().call(&nn).unwrap();
    let nn = Flatten::new().call(&nn).unwrap();
    let nn = Dense::new(10).call(&nn).unwrap();
    Model::new("bench_cnn", ni, nn).unwrap()
}

fn random_images(batch: usize) -> Tensor {
    let size = batch * 24 * 24 * 3;
    let data: Vec<f32> = (0..size).map(|i| (i as f32 * 0.01).sin()).collect();
    RawTensor::new(data, &[batch, 24, 24, 3], false)
}

fn bench_forward(c: &mut Criterion) {
    let model = small_cnn();
    let x = random_images(8);
    c.bench_function("cnn_forward_batch8", |b| {
        b.iter(|| black_box(&model).forward_one(black_box(&x)).unwrap());
    });
}

fn bench_config(c: &mut Criterion) {
    let model = small_cnn();
    let cfg = model.config().unwrap();
    c.bench_function("config_to_json", |b| {
        b.iter(|| serde_json::to_string(black_box(&cfg)).unwrap());
    });
    c.bench_function("model_from_config", |b| {
        b.iter(|| Model::from_config(black_box(&cfg)).unwrap());
    });
}

fn bench_save_load(c: &mut Criterion) {
    let model = small_cnn();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.gnm");
    c.bench_function("save_with_weights", |b| {
        b.iter(|| model.save(black_box(&path), true).unwrap());
    });
    model.save(&path, true).unwrap();
    c.bench_function("load_with_weights", |b| {
        b.iter(|| Model::load(black_box(&path), true).unwrap());
    });
}

criterion_group!(benches, bench_forward, bench_config, bench_save_load);
criterion_main!(benches);
