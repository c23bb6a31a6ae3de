use std::fs;
use std::path::Path;

use rand::Rng;

use fanet::data::{encode_idx_images, encode_idx_labels};
use fanet::intnn::{IntSequential, IntTrainConfig, IntTrainer};
use fanet::prelude::*;
use fanet::quant::QuantActivation;

const SIDE: usize = 4;
const NUM_CLASSES: usize = 4;

/// 4x4 images where row `label` is bright and the rest is dim noise.
fn synthetic(rng: &mut StdRng, n: usize) -> (Array2<u8>, Vec<u8>) {
    let mut images = Array2::<u8>::zeros((n, SIDE * SIDE));
    let mut labels = Vec::with_capacity(n);
    for mut row in images.rows_mut() {
        let label = rng.gen_range(0..NUM_CLASSES);
        for (j, px) in row.iter_mut().enumerate() {
            *px = if j / SIDE == label { rng.gen_range(200..=255) } else { rng.gen_range(0..=40) };
        }
        labels.push(label as u8);
    }
    (images, labels)
}

fn write_split(root: &Path, split: Split, images: &Array2<u8>, labels: &[u8]) {
    let (img_path, lbl_path) = DatasetKind::Mnist.paths(root, split);
    fs::create_dir_all(img_path.parent().unwrap()).unwrap();
    fs::write(img_path, encode_idx_images(images, SIDE, SIDE).unwrap()).unwrap();
    fs::write(lbl_path, encode_idx_labels(labels)).unwrap();
}

/// Writes a train/test pair of IDX files under `root/mnist/`.
fn write_dataset(root: &Path, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (train_x, train_y) = synthetic(&mut rng, 200);
    let (test_x, test_y) = synthetic(&mut rng, 100);
    write_split(root, Split::Train, &train_x, &train_y);
    write_split(root, Split::Test, &test_x, &test_y);
}

fn float_splits(root: &Path) -> (Dataset, Dataset) {
    (
        Dataset::load(DatasetKind::Mnist, Split::Train, root).unwrap(),
        Dataset::load(DatasetKind::Mnist, Split::Test, root).unwrap(),
    )
}

fn assert_learned(history: &[EpochReport]) {
    let last = history.last().unwrap();
    assert!(last.test_acc >= 0.9, "final test accuracy {}", last.test_acc);
    assert!(last.train_acc >= 0.9, "final train accuracy {}", last.train_acc);
    assert!(history.iter().all(|r| r.total_loss.is_finite()));

    // later epochs hold on to what the first one reached
    let (first, rest) = history.split_first().unwrap();
    if !rest.is_empty() {
        let mean = |f: fn(&EpochReport) -> f64| rest.iter().map(f).sum::<f64>() / rest.len() as f64;
        let later_test = mean(|r| r.test_acc);
        let later_train = mean(|r| r.train_acc);
        assert!(later_test >= first.test_acc - 0.01, "test accuracy fell from {} to {}", first.test_acc, later_test);
        assert!(later_train >= first.train_acc - 0.01, "train accuracy fell from {} to {}", first.train_acc, later_train);
    }
}

#[test]
fn backprop_cross_entropy_learns_separable_task() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), 1);
    let (train, test) = float_splits(dir.path());

    let config = TrainConfig { epochs: 10, batch_size: 10, lr: 0.1, seed: 3 };
    let mut model = Sequential::builder()
        .seed(3)
        .add_dense(16, 16, Activation::Tanh, Init::XavierUniform).unwrap()
        .add_dense(16, 8, Activation::Tanh, Init::XavierUniform).unwrap()
        .add_dense(8, NUM_CLASSES, Activation::Linear, Init::XavierUniform).unwrap()
        .optimizer(config.optimizer())
        .loss(Loss::CrossEntropy)
        .build()
        .unwrap();

    let history = Trainer::new(config, LearningRule::Backprop).unwrap()
        .fit(&mut model, &train, &test, false)
        .unwrap();
    assert_eq!(history.len(), 10);
    assert_learned(&history);
}

#[test]
fn backprop_mse_with_softmax_output_learns_separable_task() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), 2);
    let (train, test) = float_splits(dir.path());

    let config = TrainConfig { epochs: 10, batch_size: 10, lr: 0.5, seed: 4 };
    let mut model = Sequential::builder()
        .seed(4)
        .add_dense(16, 16, Activation::Relu, Init::XavierUniform).unwrap()
        .add_dense(16, 8, Activation::Relu, Init::XavierUniform).unwrap()
        .add_dense(8, NUM_CLASSES, Activation::Softmax, Init::XavierUniform).unwrap()
        .optimizer(config.optimizer())
        .loss(Loss::MSE)
        .build()
        .unwrap();

    let history = Trainer::new(config, LearningRule::Backprop).unwrap()
        .fit(&mut model, &train, &test, false)
        .unwrap();
    assert_learned(&history);
}

#[test]
fn direct_feedback_learns_and_keeps_feedback_fixed() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), 3);
    let (train, test) = float_splits(dir.path());

    let config = TrainConfig { epochs: 10, batch_size: 10, lr: 0.1, seed: 5 };
    let mut model = Sequential::builder()
        .seed(5)
        .add_dense(16, 16, Activation::Tanh, Init::FanInUniform).unwrap()
        .add_dense(16, 8, Activation::Tanh, Init::FanInUniform).unwrap()
        .add_dense(8, NUM_CLASSES, Activation::Tanh, Init::FanInUniform).unwrap()
        .optimizer(config.optimizer())
        .loss(Loss::MSE)
        .direct_feedback()
        .build()
        .unwrap();
    let before = model.feedback.clone().unwrap();

    let history = Trainer::new(config, LearningRule::DirectFeedback).unwrap()
        .fit(&mut model, &train, &test, false)
        .unwrap();
    assert_learned(&history);
    assert_eq!(model.feedback.as_ref(), Some(&before));
}

#[test]
fn integer_dfa_learns_separable_task() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), 4);
    let train = RawDataset::load(DatasetKind::Mnist, Split::Train, dir.path()).unwrap();
    let test = RawDataset::load(DatasetKind::Mnist, Split::Test, dir.path()).unwrap();

    let config = IntTrainConfig { epochs: 5, batch_size: 10, lr_inv: 1000, seed: 6 };
    let mut model = IntSequential::new(&[16, 8, 8, NUM_CLASSES], QuantActivation::Tanh, 6).unwrap();
    let history = IntTrainer::new(config).unwrap().fit(&mut model, &train, &test, false).unwrap();

    assert_eq!(history.len(), 5);
    assert_learned(&history);
    assert!(model.layers().iter().all(|l| l.w.iter().all(|v| v.abs() <= 32767)));
}

#[test]
fn trained_model_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), 5);
    let (train, test) = float_splits(dir.path());

    let config = TrainConfig { epochs: 2, batch_size: 10, lr: 0.1, seed: 0 };
    let mut model = Sequential::builder()
        .add_dense(16, 8, Activation::Tanh, Init::FanInUniform).unwrap()
        .add_dense(8, NUM_CLASSES, Activation::Tanh, Init::FanInUniform).unwrap()
        .optimizer(config.optimizer())
        .loss(Loss::MSE)
        .direct_feedback()
        .build()
        .unwrap();
    Trainer::new(config, LearningRule::DirectFeedback).unwrap()
        .fit(&mut model, &train, &test, false)
        .unwrap();

    let path = dir.path().join("dfa.model");
    model.save(&path).unwrap();
    let loaded = Sequential::load(&path).unwrap();
    let (x, _) = test.batch(&[0, 1, 2]);
    assert_eq!(model.predict(&x).unwrap(), loaded.predict(&x).unwrap());
    assert_eq!(model.feedback, loaded.feedback);
}

#[test]
fn malformed_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), 6);
    let (img_path, lbl_path) = DatasetKind::Mnist.paths(dir.path(), Split::Test);

    // labels written where images are expected
    fs::write(&img_path, encode_idx_labels(&[1, 2, 3])).unwrap();
    let err = Dataset::load(DatasetKind::Mnist, Split::Test, dir.path()).unwrap_err();
    assert!(matches!(err, NNError::DatasetFormat(_)));

    // truncated label payload
    let mut rng = StdRng::seed_from_u64(0);
    let (images, labels) = synthetic(&mut rng, 3);
    fs::write(&img_path, encode_idx_images(&images, SIDE, SIDE).unwrap()).unwrap();
    let mut bytes = encode_idx_labels(&labels);
    bytes.truncate(bytes.len() - 1);
    fs::write(&lbl_path, bytes).unwrap();
    assert!(Dataset::load(DatasetKind::Mnist, Split::Test, dir.path()).is_err());

    assert!(matches!(
        Dataset::load(DatasetKind::FashionMnist, Split::Test, dir.path()),
        Err(NNError::IoError(_))
    ));
}
