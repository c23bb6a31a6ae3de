#[allow(unused)]
use crate::prelude::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    pub fn forward(&self, z: Array2<f64>) -> Result<Array2<f64>> {
        Ok(match self {
            Self::Linear => z,
            Self::Relu => relu_forward(z),
            Self::Sigmoid => sigmoid_forward(z),
            Self::Tanh => tanh_forward(z),
            Self::Softmax => softmax_forward(z),
        })
    }

    /// Pulls `da` (gradient w.r.t. the activation output) back through the
    /// nonlinearity, returning the gradient w.r.t. the pre-activation `z`.
    pub fn backward(&self, z: Array2<f64>, da: Array2<f64>) -> Result<Array2<f64>> {
        if z.shape() != da.shape() {
            return Err(NNError::LayerShapeMismatch(format!(
                "pre-activation {:?} vs upstream gradient {:?}",
                z.shape(),
                da.shape()
            )));
        }
        Ok(match self {
            Self::Linear => da,
            Self::Relu => da * relu_backward(z),
            Self::Sigmoid => da * sigmoid_backward(z),
            Self::Tanh => da * tanh_backward(z),
            Self::Softmax => softmax_backward(z, da),
        })
    }

    /// Local derivative expressed through the activation output `a`.
    /// Only defined for the elementwise nonlinearities whose derivative is a
    /// function of their output; this is what the feedback-alignment step uses.
    pub fn derivative_from_output(&self, a: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(match self {
            Self::Linear => Array2::ones(a.raw_dim()),
            Self::Relu => a.mapv(|a| if a > 0.0 { 1.0 } else { 0.0 }),
            Self::Sigmoid => a.mapv(|a| a * (1.0 - a)),
            Self::Tanh => a.mapv(|a| 1.0 - a * a),
            Self::Softmax => {
                return Err(NNError::InvalidLayerConfiguration(
                    "softmax has no elementwise derivative".to_string(),
                ))
            }
        })
    }
}

fn sigmoid_forward(z: Array2<f64>) -> Array2<f64> {
    z.mapv(|z| 1.0 / (1.0 + (-z).exp()))
}

fn sigmoid_backward(z: Array2<f64>) -> Array2<f64> {
    z.mapv(|z| {
        let s = 1.0 / (1.0 + (-z).exp());
        s * (1.0 - s)
    })
}

fn relu_forward(z: Array2<f64>) -> Array2<f64> {
    z.mapv(|z| if z > 0.0 {z} else {0.0})
}

fn relu_backward(z: Array2<f64>) -> Array2<f64> {
    z.mapv(|z| if z > 0.0 {1.0} else {0.0})
}

fn tanh_forward(z: Array2<f64>) -> Array2<f64> {
    z.mapv(|z| z.tanh())
}

fn tanh_backward(z: Array2<f64>) -> Array2<f64> {
    z.mapv(|z| {
        let t = z.tanh();
        1.0 - t * t
    })
}

/// Row-wise softmax, shifted by the row max for stability.
pub(crate) fn softmax_forward(mut z: Array2<f64>) -> Array2<f64> {
    for mut row in z.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    z
}

// Jacobian-vector product per row: s * (da - <da, s>)
fn softmax_backward(z: Array2<f64>, da: Array2<f64>) -> Array2<f64> {
    let s = softmax_forward(z);
    let dot = (&s * &da).sum_axis(Axis(1)).insert_axis(Axis(1));
    &s * &(da - &dot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn softmax_rows_sum_to_one() {
        let z = array![[1.0, 2.0, 3.0], [-1000.0, 0.0, 1000.0]];
        let s = Activation::Softmax.forward(z).unwrap();
        for row in s.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert!(s.iter().all(|v| v.is_finite()));
    }

    /// Softmax backward against a central finite difference of sum(da * softmax(z)).
    #[test]
    fn softmax_backward_matches_finite_difference() {
        let z = array![[0.3, -1.2, 0.8, 0.1]];
        let da = array![[0.5, -0.25, 1.0, 0.0]];
        let grad = Activation::Softmax.backward(z.clone(), da.clone()).unwrap();

        let h = 1e-6;
        for j in 0..z.ncols() {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[[0, j]] += h;
            zm[[0, j]] -= h;
            let fp = (softmax_forward(zp) * &da).sum();
            let fm = (softmax_forward(zm) * &da).sum();
            assert_abs_diff_eq!(grad[[0, j]], (fp - fm) / (2.0 * h), epsilon = 1e-6);
        }
    }

    #[test]
    fn tanh_derivative_from_output_matches_backward() {
        let z = array![[-2.0, -0.5, 0.0, 0.7, 3.0]];
        let a = Activation::Tanh.forward(z.clone()).unwrap();
        let from_output = Activation::Tanh.derivative_from_output(&a).unwrap();
        let from_z = Activation::Tanh.backward(z.clone(), Array2::ones(z.raw_dim())).unwrap();
        for (x, y) in from_output.iter().zip(from_z.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn relu_zeroes_negative_side() {
        let z = array![[-1.0, 0.0, 2.5]];
        assert_eq!(Activation::Relu.forward(z.clone()).unwrap(), array![[0.0, 0.0, 2.5]]);
        let dz = Activation::Relu.backward(z, array![[1.0, 1.0, 1.0]]).unwrap();
        assert_eq!(dz, array![[0.0, 0.0, 1.0]]);
    }

    #[test]
    fn softmax_has_no_elementwise_derivative() {
        let a = array![[0.5, 0.5]];
        assert!(Activation::Softmax.derivative_from_output(&a).is_err());
    }
}
