//! Integer-only fully connected network trained with direct feedback alignment.
//!
//! Every tensor is `i64`. The forward pass uses quantized activations, which also
//! produce gradient-inverse matrices. The backward pass divides by those instead of
//! multiplying by a derivative. Learning rates are expressed as their inverse
//! (`lr_inv`), so an update is `-(inputᵀ·delta) / lr_inv` with truncating division.

use std::time::Instant;

use rand::Rng;

use crate::prelude::*;
use crate::data::one_hot_with;
use crate::quant::{QuantActivation, Q_MAX};
use crate::train::batch_indices;
use crate::utils::count_correct;

/// Weights and biases are kept inside the signed 16-bit range.
pub const PARAM_LIMIT: i64 = i16::MAX as i64;
/// Value written at the label index of an integer one-hot target.
pub const TARGET_HOT: i64 = 15;
/// Label marker of the pocket cross loss.
pub const POCKET_HOT: i64 = i32::MAX as i64;

const LR_INV_DOUBLING_PERIOD: usize = 10;
const LR_INV_CEILING: i64 = 20_000;

/// Largest `r` with `r * r <= x`; 0 for non-positive `x`.
pub fn floor_sqrt(x: i64) -> i64 {
    if x <= 0 {
        return 0;
    }
    let mut r = 1;
    while r * r <= x {
        r += 1;
    }
    r - 1
}

/// Elementwise `a / b` with truncation; a zero divisor is treated as 1.
pub fn div_elem(a: &Array2<i64>, b: &Array2<i64>) -> Result<Array2<i64>> {
    if a.dim() != b.dim() {
        return Err(NNError::LayerShapeMismatch(format!(
            "cannot divide {:?} by {:?} elementwise",
            a.dim(),
            b.dim()
        )));
    }
    let mut out = a.clone();
    Zip::from(&mut out).and(b).for_each(|v, &d| {
        *v /= if d == 0 { 1 } else { d };
    });
    Ok(out)
}

fn check_same_shape(y_hat: &Array2<i64>, y: &Array2<i64>) -> Result<()> {
    if y_hat.dim() != y.dim() {
        return Err(NNError::LayerShapeMismatch(format!(
            "prediction {:?} vs target {:?}",
            y_hat.dim(),
            y.dim()
        )));
    }
    Ok(())
}

/// Batch sum of `(ŷ - y)² / 2`, halved per element.
pub fn l2_loss(y_hat: &Array2<i64>, y: &Array2<i64>) -> Result<i64> {
    check_same_shape(y_hat, y)?;
    Ok(Zip::from(y_hat)
        .and(y)
        .fold(0, |acc, &p, &t| acc + (p - t) * (p - t) / 2))
}

pub fn l2_loss_delta(y_hat: &Array2<i64>, y: &Array2<i64>) -> Result<Array2<i64>> {
    check_same_shape(y_hat, y)?;
    Ok(y_hat - y)
}

/// Integer loss applied to the network output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntLoss {
    /// `(ŷ - y)² / 2` over every element, delta `ŷ - y`.
    #[default]
    L2,
    /// Only the labelled output counts: it is pulled toward `Q_MAX`.
    CrossEntropy,
    /// `POCKET_HOT - ŷ` at the labelled output, constant delta of -1 there.
    PocketCross,
}

impl IntLoss {
    /// Value the one-hot targets carry at the label index.
    pub fn target_hot(&self) -> i64 {
        match self {
            Self::L2 => TARGET_HOT,
            Self::CrossEntropy => 1,
            Self::PocketCross => POCKET_HOT,
        }
    }

    /// Returns the batch loss and the delta fed back to every layer.
    pub fn criteria(&self, y_hat: &Array2<i64>, y: &Array2<i64>) -> Result<(i64, Array2<i64>)> {
        match self {
            Self::L2 => Ok((l2_loss(y_hat, y)?, l2_loss_delta(y_hat, y)?)),
            Self::CrossEntropy => {
                check_same_shape(y_hat, y)?;
                let mut delta = Array2::zeros(y_hat.raw_dim());
                Zip::from(&mut delta).and(y_hat).and(y).for_each(|d, &p, &t| {
                    if t == 1 {
                        *d = p - Q_MAX;
                    }
                });
                let loss = delta.iter().map(|d| d * d / 2).sum();
                Ok((loss, delta))
            }
            Self::PocketCross => {
                check_same_shape(y_hat, y)?;
                let mut loss = 0;
                let mut delta = Array2::zeros(y_hat.raw_dim());
                Zip::from(&mut delta).and(y_hat).and(y).for_each(|d, &p, &t| {
                    if t == POCKET_HOT {
                        loss += POCKET_HOT - p;
                        *d = -1;
                    }
                });
                Ok((loss, delta))
            }
        }
    }
}

/// How `IntSequential::with_init` fills the weights. Biases always start at 0.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntInit {
    /// The usual start for integer DFA.
    #[default]
    Zeros,
    /// Non-zero, uniform over `±floor_sqrt(12·127/(fan_in+fan_out))`.
    He,
    /// Non-zero, uniform over `±127`.
    Random,
}

/// Uniform over `[-r, r]` without 0.
fn nonzero_uniform<R: Rng + ?Sized>(shape: (usize, usize), r: i64, rng: &mut R) -> Array2<i64> {
    Array2::random_using(shape, Uniform::new_inclusive(0, 2 * r - 1), rng)
        .mapv(|v: i64| if v < r { v - r } else { v - r + 1 })
}

/// `lr_inv` to use after `epoch` (1-based) has finished.
pub fn lr_inv_after_epoch(epoch: usize, lr_inv: i64) -> i64 {
    if epoch % LR_INV_DOUBLING_PERIOD == 0 && lr_inv < LR_INV_CEILING {
        lr_inv * 2
    } else {
        lr_inv
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IntDense {
    pub w: Array2<i64>,
    pub b: Array2<i64>,
    pub activation: QuantActivation,
    feedback: Option<Array2<i64>>,
}

impl IntDense {
    /// A layer with every weight and bias at zero.
    pub fn zeros(input: usize, output: usize, activation: QuantActivation) -> Result<Self> {
        if input == 0 || output == 0 {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "integer layer needs non-zero dimensions, got {} -> {}",
                input, output
            )));
        }
        Ok(Self {
            w: Array2::zeros((input, output)),
            b: Array2::zeros((1, output)),
            activation,
            feedback: None,
        })
    }

    pub fn new<R: Rng + ?Sized>(
        input: usize,
        output: usize,
        activation: QuantActivation,
        init: IntInit,
        rng: &mut R,
    ) -> Result<Self> {
        let mut layer = Self::zeros(input, output, activation)?;
        match init {
            IntInit::Zeros => {}
            IntInit::He => layer.w = nonzero_uniform(layer.w.dim(), layer.he_range(), rng),
            IntInit::Random => layer.w = nonzero_uniform(layer.w.dim(), Q_MAX, rng),
        }
        Ok(layer)
    }

    pub fn input_dim(&self) -> usize {
        self.w.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.w.ncols()
    }

    /// Feedback matrix, present once the layer has taken a hidden-layer step.
    pub fn feedback(&self) -> Option<&Array2<i64>> {
        self.feedback.as_ref()
    }

    /// Half-width of the He weight distribution, at least 1.
    pub fn he_range(&self) -> i64 {
        let fan = (self.input_dim() + self.output_dim()) as i64;
        floor_sqrt(12 * Q_MAX / fan).max(1)
    }

    /// Half-width of the feedback distribution.
    pub fn feedback_range(&self) -> i64 {
        let fan = (self.input_dim() + self.output_dim()) as i64;
        floor_sqrt(12 * PARAM_LIMIT / fan).max(1)
    }

    /// Returns `(output, grad_inv)`.
    pub fn forward(&self, x: &Array2<i64>) -> Result<(Array2<i64>, Array2<i64>)> {
        if x.ncols() != self.input_dim() {
            return Err(NNError::InvalidInputShape(format!(
                "expected {} features, got {}",
                self.input_dim(),
                x.ncols()
            )));
        }
        let z = x.dot(&self.w) + &self.b;
        Ok(self.activation.activate(&z, self.input_dim()))
    }

    /// Draws the feedback matrix on first use, uniform over `[-r, r]` without 0.
    fn feedback_or_init<R: Rng + ?Sized>(&mut self, num_classes: usize, rng: &mut R) -> &Array2<i64> {
        let r = self.feedback_range();
        let width = self.output_dim();
        self.feedback.get_or_insert_with(|| nonzero_uniform((num_classes, width), r, rng))
    }

    /// `W += (inputᵀ·delta) / -lr_inv`, `b += Σ_rows delta / -lr_inv`, then clamp both.
    pub fn update(&mut self, input: &Array2<i64>, delta: &Array2<i64>, lr_inv: i64) -> Result<()> {
        if lr_inv <= 0 {
            return Err(NNError::InvalidLayerConfiguration(format!("lr_inv must be positive, got {}", lr_inv)));
        }
        if input.nrows() != delta.nrows() || input.ncols() != self.input_dim() || delta.ncols() != self.output_dim() {
            return Err(NNError::LayerShapeMismatch(format!(
                "update of {:?} layer with input {:?} and delta {:?}",
                self.w.dim(),
                input.dim(),
                delta.dim()
            )));
        }
        let dw = input.t().dot(delta) / -lr_inv;
        let db = delta.sum_axis(Axis(0)).insert_axis(Axis(0)) / -lr_inv;
        self.w += &dw;
        self.b += &db;
        self.w.mapv_inplace(|v| v.clamp(-PARAM_LIMIT, PARAM_LIMIT));
        self.b.mapv_inplace(|v| v.clamp(-PARAM_LIMIT, PARAM_LIMIT));
        Ok(())
    }
}

/// What the forward pass keeps for the update: each layer's input and
/// gradient-inverse, plus the network output.
pub struct IntCache {
    pub inputs: Vec<Array2<i64>>,
    pub grad_invs: Vec<Array2<i64>>,
    pub output: Array2<i64>,
}

pub struct IntSequential {
    layers: Vec<IntDense>,
    loss: IntLoss,
    rng: StdRng,
}

impl IntSequential {
    /// Zero-initialised layers over `dims` (input first, classes last).
    /// `seed` drives the feedback matrices.
    pub fn new(dims: &[usize], activation: QuantActivation, seed: u64) -> Result<Self> {
        Self::with_init(dims, activation, IntInit::Zeros, seed)
    }

    /// Like `new`, with weights drawn per `init` from the same seeded generator
    /// that later draws the feedback matrices.
    pub fn with_init(dims: &[usize], activation: QuantActivation, init: IntInit, seed: u64) -> Result<Self> {
        if dims.len() < 2 {
            return Err(NNError::EmptyModel);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let layers = dims
            .windows(2)
            .map(|d| IntDense::new(d[0], d[1], activation, init, &mut rng))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            loss: IntLoss::default(),
            rng,
        })
    }

    /// Wraps existing layers; each layer's input width must match the previous output.
    pub fn from_layers(layers: Vec<IntDense>, seed: u64) -> Result<Self> {
        if layers.is_empty() {
            return Err(NNError::EmptyModel);
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].output_dim() != pair[1].input_dim() {
                return Err(NNError::LayerShapeMismatch(format!(
                    "layer {} outputs {} but layer {} expects {}",
                    i,
                    pair[0].output_dim(),
                    i + 1,
                    pair[1].input_dim()
                )));
            }
        }
        Ok(Self {
            layers,
            loss: IntLoss::default(),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn with_loss(mut self, loss: IntLoss) -> Self {
        self.loss = loss;
        self
    }

    pub fn loss(&self) -> IntLoss {
        self.loss
    }

    pub fn layers(&self) -> &[IntDense] {
        &self.layers
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, IntDense::output_dim)
    }

    pub fn summary(&self) -> String {
        let mut s = format!("IntSequential ({:?} loss)\n", self.loss);
        for (i, layer) in self.layers.iter().enumerate() {
            s.push_str(&format!(
                "  int_dense_{}: {} -> {} ({:?})\n",
                i,
                layer.input_dim(),
                layer.output_dim(),
                layer.activation
            ));
        }
        s
    }

    pub fn forward_cached(&self, x: &Array2<i64>) -> Result<IntCache> {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut grad_invs = Vec::with_capacity(self.layers.len());
        let mut a = x.clone();
        for layer in &self.layers {
            let (out, grad_inv) = layer.forward(&a)?;
            inputs.push(a);
            grad_invs.push(grad_inv);
            a = out;
        }
        Ok(IntCache { inputs, grad_invs, output: a })
    }

    pub fn predict(&self, x: &Array2<i64>) -> Result<Array2<i64>> {
        Ok(self.forward_cached(x)?.output)
    }

    /// One integer DFA step on a batch. Returns `(loss, output)` from the
    /// forward pass that preceded the update. `y` must carry the model loss's
    /// `target_hot` at each label.
    pub fn dfa_step(&mut self, x: &Array2<i64>, y: &Array2<i64>, lr_inv: i64) -> Result<(i64, Array2<i64>)> {
        let cache = self.forward_cached(x)?;
        let (loss, e) = self.loss.criteria(&cache.output, y)?;
        let num_classes = e.ncols();
        let last = self.layers.len() - 1;

        for (i, layer) in self.layers.iter_mut().enumerate().rev() {
            let delta = if i == last {
                div_elem(&e, &cache.grad_invs[i])?
            } else {
                let feedback = layer.feedback_or_init(num_classes, &mut self.rng);
                div_elem(&e.dot(feedback), &cache.grad_invs[i])?
            };
            layer.update(&cache.inputs[i], &delta, lr_inv)?;
        }
        Ok((loss, cache.output))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct IntTrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Initial inverse learning rate.
    pub lr_inv: i64,
    pub seed: u64,
}

fn rows_i64(raw: &RawDataset, idx: &[usize]) -> Array2<i64> {
    raw.images.select(Axis(0), idx).mapv(i64::from)
}

/// Fraction of `dataset` the model classifies correctly.
pub fn int_accuracy(model: &IntSequential, dataset: &RawDataset, batch_size: usize) -> Result<f64> {
    if dataset.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0;
    for idx in batch_indices(dataset.len(), batch_size, None)? {
        let x = rows_i64(dataset, &idx);
        let labels: Vec<usize> = idx.iter().map(|&i| dataset.labels[i]).collect();
        correct += count_correct(&model.predict(&x)?, &labels);
    }
    Ok(correct as f64 / dataset.len() as f64)
}

pub struct IntTrainer {
    pub config: IntTrainConfig,
    lr_inv: i64,
    rng: StdRng,
}

impl IntTrainer {
    pub fn new(config: IntTrainConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(NNError::InvalidBatchSize(0));
        }
        if config.lr_inv <= 0 {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "lr_inv must be positive, got {}",
                config.lr_inv
            )));
        }
        Ok(Self {
            config,
            lr_inv: config.lr_inv,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    pub fn lr_inv(&self) -> i64 {
        self.lr_inv
    }

    /// One pass over full mini-batches of `train`, then evaluation on `test`.
    /// The trailing partial batch is skipped.
    pub fn run_epoch(
        &mut self,
        model: &mut IntSequential,
        train: &RawDataset,
        test: &RawDataset,
        epoch: usize,
    ) -> Result<EpochReport> {
        let batch_size = self.config.batch_size;
        if train.len() < batch_size {
            return Err(NNError::DatasetFormat(format!(
                "training split has {} samples, fewer than one batch of {}",
                train.len(),
                batch_size
            )));
        }
        let num_classes = model.output_dim();
        let hot = model.loss().target_hot();
        let mut total_loss = 0;
        let mut correct = 0;

        let batches = batch_indices(train.len(), batch_size, Some(&mut self.rng))?;
        for idx in batches.iter().filter(|b| b.len() == batch_size) {
            let x = rows_i64(train, idx);
            let labels: Vec<usize> = idx.iter().map(|&i| train.labels[i]).collect();
            let y = one_hot_with(&labels, num_classes, hot)?;
            let (loss, output) = model.dfa_step(&x, &y, self.lr_inv)?;
            log::debug!("epoch {} batch loss {}", epoch, loss);
            total_loss += loss;
            correct += count_correct(&output, &labels);
        }

        let report = EpochReport {
            epoch,
            total_loss: total_loss as f64,
            train_acc: correct as f64 / train.len() as f64,
            test_acc: int_accuracy(model, test, batch_size)?,
        };
        self.lr_inv = lr_inv_after_epoch(epoch, self.lr_inv);
        Ok(report)
    }

    pub fn fit(
        &mut self,
        model: &mut IntSequential,
        train: &RawDataset,
        test: &RawDataset,
        verbose: bool,
    ) -> Result<Vec<EpochReport>> {
        log::info!("initial training accuracy: {:.2}%", int_accuracy(model, train, self.config.batch_size)? * 100.0);
        log::info!("initial test accuracy: {:.2}%", int_accuracy(model, test, self.config.batch_size)? * 100.0);

        let style = ReportStyle::IntTabbed;
        if verbose {
            println!("{}", style.header());
        }
        let start = Instant::now();
        let mut history = Vec::with_capacity(self.config.epochs);
        for epoch in 1..=self.config.epochs {
            let report = self.run_epoch(model, train, test, epoch)?;
            if verbose {
                println!("{}", report.format(style));
            }
            history.push(report);
        }
        if verbose {
            if let Some(last) = history.last() {
                println!("Final training accuracy: {:.2}%", last.train_acc * 100.0);
                println!("Final test accuracy: {:.2}%", last.test_acc * 100.0);
            }
            println!("Training time: {:.2} seconds", start.elapsed().as_secs_f64());
        }
        Ok(history)
    }
}
