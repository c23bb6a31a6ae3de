use crate::prelude::*;
use crate::core::losses::criteria;
use crate::core::optimizers::Optimization;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Sequential {
    pub layers: Vec<Dense>,
    pub optimizer: OptimizerConfig,
    pub loss: Loss,
    /// Present only for models trained with Direct Feedback Alignment.
    pub feedback: Option<DirectFeedback>,
}

/// Values recorded by a forward pass. `activations[0]` is the network input
/// and `activations[i + 1]` the output of layer `i`.
#[derive(Debug, Clone)]
pub struct ForwardCache {
    pub zs: Vec<Array2<f64>>,
    pub activations: Vec<Array2<f64>>,
}

impl ForwardCache {
    pub fn output(&self) -> Result<&Array2<f64>> {
        self.activations.last().ok_or(NNError::EmptyModel)
    }
}

impl Sequential {
    pub fn new(layers: &[Dense]) -> Result<Self> {
        if layers.is_empty() {
            return Err(NNError::EmptyModel);
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].output_dim() != pair[1].input_dim() {
                return Err(NNError::LayerShapeMismatch(format!(
                    "layer {} emits {} features but layer {} expects {}",
                    i,
                    pair[0].output_dim(),
                    i + 1,
                    pair[1].input_dim()
                )));
            }
        }
        Ok(Self {
            layers: layers.to_vec(),
            optimizer: OptimizerConfig::default(),
            loss: Loss::None,
            feedback: None,
        })
    }

    pub fn builder() -> SequentialBuilder {
        SequentialBuilder::default()
    }

    pub fn summary(&self) -> String {
        let mut total_param = 0;
        let mut res = "\nModel Sequential\n".to_string();
        res.push_str("-------------------------------------------------------------\n");
        res.push_str("Layer (Type)\t\t Output shape\t\t No.of params\n");
        for layer in self.layers.iter() {
            let params = layer.param_count();
            total_param += params;
            res.push_str(&format!(
                "{} ({:?})\t\t  (None, {})\t\t  {}\n",
                layer.typ(),
                layer.activation,
                layer.output_dim(),
                params
            ));
        }
        if let Some(feedback) = &self.feedback {
            for b in feedback.matrices() {
                res.push_str(&format!("Feedback (fixed)\t  ({}, {})\t\t  0\n", b.nrows(), b.ncols()));
            }
        }
        res.push_str("-------------------------------------------------------------\n");
        res.push_str(&format!("Total params: {}\n", total_param));
        res
    }

    pub fn compile(&mut self, optimizer: OptimizerConfig, loss: Loss) {
        if loss == Loss::CrossEntropy
            && self.layers.last().map(|l| l.activation) == Some(Activation::Softmax)
        {
            log::warn!("cross-entropy already applies softmax; a softmax output layer normalizes twice");
        }
        self.optimizer = optimizer;
        self.loss = loss;
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_dim())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, |l| l.output_dim())
    }

    /// Forward pass that keeps every pre-activation and activation.
    pub fn forward_cached(&self, x: &Array2<f64>) -> Result<ForwardCache> {
        let mut zs = Vec::with_capacity(self.layers.len());
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(x.clone());
        for layer in self.layers.iter() {
            let (z, a) = layer.forward(activations.last().ok_or(NNError::EmptyModel)?)?;
            zs.push(z);
            activations.push(a);
        }
        Ok(ForwardCache { zs, activations })
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut a = x.clone();
        for layer in self.layers.iter() {
            (_, a) = layer.forward(&a)?;
        }
        Ok(a)
    }

    pub fn evaluate(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<f64> {
        let (loss, _) = criteria(&self.predict(x)?, y, self.loss)?;
        Ok(loss)
    }

    fn learning_rate(&self) -> Result<f64> {
        self.optimizer
            .learning_rate()
            .ok_or_else(|| NNError::Other("Optimizer not set. Call compile() before training".to_string()))
    }

    /// One backpropagation step on a batch. Returns the batch loss and the
    /// network output computed before the update.
    pub fn train_batch(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<(f64, Array2<f64>)> {
        self.learning_rate()?;
        if x.nrows() == 0 {
            return Err(NNError::InvalidBatchSize(0));
        }

        let ForwardCache { zs, activations } = self.forward_cached(x)?;
        let y_hat = activations.last().ok_or(NNError::EmptyModel)?;
        let (loss, mut da) = criteria(y_hat, y, self.loss)?;

        // back propagation
        let mut grads = Vec::with_capacity(self.layers.len());
        for ((layer, z), a) in self
            .layers
            .iter()
            .rev()
            .zip(zs.into_iter().rev())
            .zip(activations.iter().rev().skip(1))
        {
            let (dw, db, da_prev) = layer.backward(z, a, da)?;
            grads.push((dw, db));
            da = da_prev;
        }
        grads.reverse();

        for (layer, (dw, db)) in self.layers.iter_mut().zip(grads) {
            layer.optimize(dw, db, &self.optimizer);
        }

        let output = activations.last().cloned().ok_or(NNError::EmptyModel)?;
        Ok((loss, output))
    }

    /// One Direct Feedback Alignment step on a batch.
    ///
    /// The output error `e = 2(out - y)/batch` drives every layer: the output
    /// layer uses `e` directly, hidden layer `l` uses `e · B_l`; both are
    /// multiplied by the layer's local derivative. No gradient travels through
    /// the transposed forward weights, and the feedback matrices are only read.
    /// Returns the batch MSE and the output computed before the update.
    pub fn dfa_step(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<(f64, Array2<f64>)> {
        self.learning_rate()?;
        let feedback = self.feedback.as_ref().ok_or_else(|| {
            NNError::InvalidLayerConfiguration("model has no feedback matrices".to_string())
        })?;
        let batch = x.nrows();
        if batch == 0 {
            return Err(NNError::InvalidBatchSize(0));
        }

        let cache = self.forward_cached(x)?;
        let out = cache.output()?;
        let (loss, _) = criteria(out, y, Loss::MSE)?;
        let error = (out - y) * (2.0 / batch as f64);

        let last = self.layers.len() - 1;
        let mut deltas = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            let local = layer.activation.derivative_from_output(&cache.activations[i + 1])?;
            let signal = if i == last { error.clone() } else { feedback.project(i, &error)? };
            deltas.push(signal * local);
        }

        for ((layer, delta), input) in self.layers.iter_mut().zip(deltas).zip(cache.activations.iter()) {
            let (dw, db) = Dense::gradients(input, &delta);
            layer.optimize(dw, db, &self.optimizer);
        }

        Ok((loss, out.clone()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded: Vec<u8> = bincode::serialize(self)
            .map_err(NNError::SerializationError)?;

        File::create(path.as_ref())
            .map_err(|e| NNError::ModelSaveError(format!("{}: {}", path.as_ref().display(), e)))?
            .write_all(&encoded)?;

        log::info!("model saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Sequential> {
        let mut buffer = Vec::new();

        File::open(path.as_ref())
            .map_err(|e| NNError::ModelLoadError(format!("{}: {}", path.as_ref().display(), e)))?
            .read_to_end(&mut buffer)?;

        let model: Sequential = bincode::deserialize(&buffer)
            .map_err(NNError::SerializationError)?;

        Ok(model)
    }
}

pub struct SequentialBuilder {
    layers: Vec<Dense>,
    optimizer: OptimizerConfig,
    loss: Loss,
    direct_feedback: bool,
    rng: StdRng,
}

impl Default for SequentialBuilder {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            optimizer: OptimizerConfig::default(),
            loss: Loss::None,
            direct_feedback: false,
            rng: StdRng::seed_from_u64(0),
        }
    }
}

impl SequentialBuilder {
    /// Reseeds the initializer; call before adding layers.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn add_dense(mut self, prev: usize, perceptron: usize, activation: Activation, init: Init) -> Result<Self> {
        let layer = Dense::new(prev, perceptron, activation, init, &mut self.rng)?;
        self.layers.push(layer);
        Ok(self)
    }

    pub fn optimizer(mut self, optimizer: OptimizerType) -> Self {
        self.optimizer = OptimizerConfig { optimizer_type: optimizer };
        self
    }

    pub fn loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    /// Draws one fixed feedback matrix per hidden layer when the model is built.
    pub fn direct_feedback(mut self) -> Self {
        self.direct_feedback = true;
        self
    }

    pub fn build(mut self) -> Result<Sequential> {
        let mut model = Sequential::new(&self.layers)?;
        if self.direct_feedback {
            let widths: Vec<usize> = self.layers[..self.layers.len() - 1]
                .iter()
                .map(|l| l.output_dim())
                .collect();
            model.feedback = Some(DirectFeedback::new(model.output_dim(), &widths, &mut self.rng)?);
        }
        model.compile(self.optimizer, self.loss);
        Ok(model)
    }
}
