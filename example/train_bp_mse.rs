use fanet::core::output::write_history_to_csv;
use fanet::plot::plot_history::plot_history;
use fanet::prelude::*;

const NAME: &str = "train_bp_mse";
const DATA_ROOT: &str = "dataset";
const DIM1: usize = 100;
const DIM2: usize = 50;
const NUM_CLASSES: usize = 10;
const EPOCHS: usize = 40;
const BATCH_SIZE: usize = 20;
const LEARNING_RATE: f64 = 0.01;
const SEED: u64 = 0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let train = Dataset::load(DatasetKind::Mnist, Split::Train, DATA_ROOT)?;
    let test = Dataset::load(DatasetKind::Mnist, Split::Test, DATA_ROOT)?;

    let config = TrainConfig { epochs: EPOCHS, batch_size: BATCH_SIZE, lr: LEARNING_RATE, seed: SEED };

    let mut model = Sequential::builder()
        .seed(SEED)
        .add_dense(train.num_features(), DIM1, Activation::Relu, Init::XavierUniform)?
        .add_dense(DIM1, DIM2, Activation::Relu, Init::XavierUniform)?
        .add_dense(DIM2, NUM_CLASSES, Activation::Softmax, Init::XavierUniform)?
        .optimizer(config.optimizer())
        .loss(Loss::MSE)
        .build()?;

    log::info!("{}", model.summary());

    let history = Trainer::new(config, LearningRule::Backprop)?.fit(&mut model, &train, &test, true)?;

    write_history_to_csv(&history, format!("{}_history.csv", NAME))?;
    plot_history(&history, format!("{}_history.png", NAME))?;
    model.save(format!("{}.model", NAME))?;

    Ok(())
}
