//! Epoch loop shared by every float trainer: shuffled mini-batches, one
//! learning-rule step per batch, then a forward-only pass over the test split.

use std::fmt;
use std::time::Instant;

use rand::seq::SliceRandom;

use crate::prelude::*;
use crate::utils::count_correct;

/// Run-level hyperparameters. The binaries fill this from their constants.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub seed: u64,
}

impl TrainConfig {
    pub fn optimizer(&self) -> OptimizerType {
        OptimizerType::SGD(self.lr)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningRule {
    Backprop,
    DirectFeedback,
}

/// Layout of the per-epoch lines on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStyle {
    /// Fixed-width columns: `Epoch TrainLoss   TrainAcc    TestAcc`.
    Columns,
    /// Comma-and-tab separated: `Epoch,\tTrainLoss,\tTrainAcc,\tTestAcc`.
    Tabbed,
    /// `Tabbed` with the loss left-aligned in eight characters.
    IntTabbed,
}

impl ReportStyle {
    pub fn header(&self) -> String {
        match self {
            Self::Columns => format!("{:<6}{:<12}{:<12}{:<10}", "Epoch", "TrainLoss", "TrainAcc", "TestAcc"),
            Self::Tabbed | Self::IntTabbed => "Epoch,\tTrainLoss,\tTrainAcc,\tTestAcc".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    /// Sum over batches of `batch_loss * batch_len`.
    pub total_loss: f64,
    /// Fractions in [0, 1].
    pub train_acc: f64,
    pub test_acc: f64,
}

impl EpochReport {
    pub fn format(&self, style: ReportStyle) -> String {
        // the loss column is truncated to an integer
        let loss = self.total_loss.trunc() as i64;
        let train = format!("{:.2}%", self.train_acc * 100.0);
        let test = format!("{:.2}%", self.test_acc * 100.0);
        match style {
            ReportStyle::Columns => format!("{:<6}{:<12}{:<12}{:<10}", self.epoch, loss, train, test),
            ReportStyle::Tabbed => format!("{},\t{},\t{},\t\t{}", self.epoch, loss, train, test),
            ReportStyle::IntTabbed => format!("{},\t{:<8},\t{},\t\t{}", self.epoch, loss, train, test),
        }
    }
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.format(ReportStyle::Columns))
    }
}

/// Splits `0..n` into batches of `batch_size`, shuffled by `rng` when given.
/// A trailing partial batch is kept.
pub fn batch_indices(n: usize, batch_size: usize, rng: Option<&mut StdRng>) -> Result<Vec<Vec<usize>>> {
    if batch_size == 0 {
        return Err(NNError::InvalidBatchSize(batch_size));
    }
    let mut indices: Vec<usize> = (0..n).collect();
    if let Some(rng) = rng {
        indices.shuffle(rng);
    }
    Ok(indices.chunks(batch_size).map(|c| c.to_vec()).collect())
}

/// Fraction of `dataset` classified correctly, evaluated in order in batches.
pub fn evaluate_accuracy(model: &Sequential, dataset: &Dataset, batch_size: usize) -> Result<f64> {
    if dataset.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0;
    for idx in batch_indices(dataset.len(), batch_size, None)? {
        let (x, labels) = dataset.batch(&idx);
        correct += count_correct(&model.predict(&x)?, &labels);
    }
    Ok(correct as f64 / dataset.len() as f64)
}

pub struct Trainer {
    pub config: TrainConfig,
    pub rule: LearningRule,
    pub style: ReportStyle,
    rng: StdRng,
}

impl Trainer {
    pub fn new(config: TrainConfig, rule: LearningRule) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(NNError::InvalidBatchSize(0));
        }
        let style = match rule {
            LearningRule::Backprop => ReportStyle::Columns,
            LearningRule::DirectFeedback => ReportStyle::Tabbed,
        };
        Ok(Self {
            config,
            rule,
            style,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// One pass over `train` followed by evaluation on `test`.
    pub fn run_epoch(
        &mut self,
        model: &mut Sequential,
        train: &Dataset,
        test: &Dataset,
        epoch: usize,
    ) -> Result<EpochReport> {
        if train.is_empty() {
            return Err(NNError::DatasetFormat("training split is empty".to_string()));
        }
        let num_classes = model.output_dim();
        let mut total_loss = 0.0;
        let mut correct = 0;

        for idx in batch_indices(train.len(), self.config.batch_size, Some(&mut self.rng))? {
            let (x, labels) = train.batch(&idx);
            let y = one_hot(&labels, num_classes)?;
            let (loss, output) = match self.rule {
                LearningRule::Backprop => model.train_batch(&x, &y)?,
                LearningRule::DirectFeedback => model.dfa_step(&x, &y)?,
            };
            log::debug!("epoch {} batch loss {:.6}", epoch, loss);
            total_loss += loss * labels.len() as f64;
            correct += count_correct(&output, &labels);
        }

        let test_acc = evaluate_accuracy(model, test, self.config.batch_size)?;
        Ok(EpochReport {
            epoch,
            total_loss,
            train_acc: correct as f64 / train.len() as f64,
            test_acc,
        })
    }

    /// Runs every epoch, printing the metrics table when `verbose`.
    pub fn fit(
        &mut self,
        model: &mut Sequential,
        train: &Dataset,
        test: &Dataset,
        verbose: bool,
    ) -> Result<Vec<EpochReport>> {
        let mut history = Vec::with_capacity(self.config.epochs);
        if verbose {
            println!("{}", self.style.header());
        }
        let start = Instant::now();
        for epoch in 1..=self.config.epochs {
            let report = self.run_epoch(model, train, test, epoch)?;
            if verbose {
                println!("{}", report.format(self.style));
            }
            history.push(report);
        }
        if verbose {
            println!("Training time: {:.2} seconds", start.elapsed().as_secs_f64());
        }
        Ok(history)
    }
}
