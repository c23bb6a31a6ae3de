use fanet::core::output::write_history_to_csv;
use fanet::intnn::{IntInit, IntLoss, IntSequential, IntTrainConfig, IntTrainer};
use fanet::plot::plot_history::plot_history;
use fanet::prelude::*;
use fanet::quant::QuantActivation;

const NAME: &str = "train_int_dfa";
const DATA_ROOT: &str = "dataset";
const DIM1: usize = 100;
const DIM2: usize = 50;
const NUM_CLASSES: usize = 10;
const EPOCHS: usize = 5;
const BATCH_SIZE: usize = 20;
const LR_INV: i64 = 1000;
const SEED: u64 = 114514;
const INIT: IntInit = IntInit::Zeros;
const LOSS: IntLoss = IntLoss::L2;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let train = RawDataset::load(DatasetKind::Mnist, Split::Train, DATA_ROOT)?;
    let test = RawDataset::load(DatasetKind::Mnist, Split::Test, DATA_ROOT)?;

    let config = IntTrainConfig { epochs: EPOCHS, batch_size: BATCH_SIZE, lr_inv: LR_INV, seed: SEED };

    let input = train.rows * train.cols;
    let mut model = IntSequential::with_init(&[input, DIM1, DIM2, NUM_CLASSES], QuantActivation::Tanh, INIT, SEED)?
        .with_loss(LOSS);
    log::info!("{}", model.summary());

    let mut trainer = IntTrainer::new(config)?;
    let history = trainer.fit(&mut model, &train, &test, true)?;
    log::info!("final lr_inv: {}", trainer.lr_inv());

    write_history_to_csv(&history, format!("{}_history.csv", NAME))?;
    plot_history(&history, format!("{}_history.png", NAME))?;

    Ok(())
}
