use crate::prelude::*;
use crate::core::optimizers::Optimization;
use crate::core::activations::Activation;
use rand::Rng;

pub trait LayerTrait {
    fn new<R: Rng + ?Sized>(
        prev: usize,
        perceptron: usize,
        activation: Activation,
        init: Init,
        rng: &mut R,
    ) -> Result<Self>
    where
        Self: Sized;

    fn typ(&self) -> String;
}

/// Weight initialization schemes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// U(-sqrt(6/(fan_in+fan_out)), +sqrt(6/(fan_in+fan_out))) for weights, zero bias.
    XavierUniform,
    /// U(-1/sqrt(fan_in), 1/sqrt(fan_in)) for weights and bias.
    FanInUniform,
    Zeros,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Dense {
    pub w: Array2<f64>,
    pub b: Array2<f64>,
    pub activation: Activation,
}

impl LayerTrait for Dense {
    fn new<R: Rng + ?Sized>(
        prev: usize,
        perceptron: usize,
        activation: Activation,
        init: Init,
        rng: &mut R,
    ) -> Result<Self> {
        if perceptron == 0 || prev == 0 {
            return Err(NNError::InvalidLayerConfiguration(
                "Layer dimensions must be greater than 0".to_string()
            ));
        }
        let (w, b) = match init {
            Init::XavierUniform => {
                let limit = (6.0 / (prev + perceptron) as f64).sqrt();
                (
                    Array2::random_using((prev, perceptron), Uniform::new_inclusive(-limit, limit), rng),
                    Array2::zeros((1, perceptron)),
                )
            }
            Init::FanInUniform => {
                let bound = 1.0 / (prev as f64).sqrt();
                let w = Array2::random_using((prev, perceptron), Uniform::new_inclusive(-bound, bound), rng);
                let b = Array2::random_using((1, perceptron), Uniform::new_inclusive(-bound, bound), rng);
                (w, b)
            }
            Init::Zeros => (Array2::zeros((prev, perceptron)), Array2::zeros((1, perceptron))),
        };
        Ok(Self { w, b, activation })
    }

    fn typ(&self) -> String {
        "Dense".into()
    }
}

impl Dense {
    pub fn input_dim(&self) -> usize {
        self.w.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.w.ncols()
    }

    /// Returns `(z, a)`: the pre-activation and the activation output.
    pub fn forward(&self, a: &Array2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        if a.ncols() != self.input_dim() {
            return Err(NNError::InvalidInputShape(format!(
                "expected {} features, got {}",
                self.input_dim(),
                a.ncols()
            )));
        }
        let z = a.dot(&self.w) + &self.b;
        let a = self.activation.forward(z.clone())?;
        Ok((z, a))
    }

    /// Returns `(dw, db, da_prev)`. `da` must already carry the batch averaging
    /// of the loss, so no further scaling happens here.
    pub fn backward(&self, z: Array2<f64>, a: &Array2<f64>, da: Array2<f64>) -> Result<(Array2<f64>, Array2<f64>, Array2<f64>)> {
        let dz = self.activation.backward(z, da)?;
        let (dw, db) = Self::gradients(a, &dz);
        let da = dz.dot(&self.w.t());
        Ok((dw, db, da))
    }

    /// Weight and bias gradients for a layer delta `dz` and the layer input `a`.
    pub fn gradients(a: &Array2<f64>, dz: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let dw = a.t().dot(dz);
        let db = dz.sum_axis(Axis(0)).insert_axis(Axis(0));
        (dw, db)
    }

    pub fn param_count(&self) -> usize {
        self.w.len() + self.b.len()
    }
}

impl Optimization for Dense {
    fn optimize(&mut self, dw: Array2<f64>, db: Array2<f64>, optimizer: &OptimizerConfig) {
        apply_optimization(&mut self.w, &mut self.b, dw, db, optimizer);
    }
}
