use crate::prelude::*;
use crate::core::activations::softmax_forward;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    /// Mean over every element of `(y_hat - y)^2`.
    MSE,
    /// Softmax cross-entropy on raw logits against probability (one-hot) targets,
    /// averaged over the batch. The softmax is applied here and nowhere else.
    CrossEntropy,
    None,
}

/// Returns `(loss, dloss/dy_hat)` for a batch. Both are already averaged, so
/// layers consume the gradient without further scaling.
pub fn criteria(y_hat: &Array2<f64>, y: &Array2<f64>, loss_ty: Loss) -> Result<(f64, Array2<f64>)> {
    if y_hat.shape() != y.shape() {
        return Err(NNError::LayerShapeMismatch(format!(
            "Prediction shape {:?} doesn't match target shape {:?}",
            y_hat.shape(), y.shape()
        )));
    }
    if y_hat.is_empty() {
        return Err(NNError::InvalidBatchSize(0));
    }

    let (loss, da) = match loss_ty {
        Loss::MSE => {
            let n = y_hat.len() as f64;
            let diff = y_hat - y;
            let loss = diff.mapv(|d| d * d).sum() / n;
            (loss, diff * (2.0 / n))
        },
        Loss::CrossEntropy => {
            let batch = y_hat.nrows() as f64;
            let log_probs = log_softmax(y_hat);
            let loss = -(y * &log_probs).sum() / batch;
            let da = (softmax_forward(y_hat.clone()) - y) / batch;
            (loss, da)
        },
        Loss::None => {
            return Err(NNError::Other("Loss function not set".to_string()));
        },
    };

    Ok((loss, da))
}

/// Row-wise log-softmax via log-sum-exp.
pub fn log_softmax(z: &Array2<f64>) -> Array2<f64> {
    let mut out = z.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        let lse = max + row.mapv(|v| (v - max).exp()).sum().ln();
        row.mapv_inplace(|v| v - lse);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mse_matches_mean_squared_error() {
        let y_hat = array![[0.5, 0.0], [1.0, -1.0]];
        let y = array![[1.0, 0.0], [0.0, 0.0]];
        let (loss, da) = criteria(&y_hat, &y, Loss::MSE).unwrap();
        assert_abs_diff_eq!(loss, (0.25 + 0.0 + 1.0 + 1.0) / 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(da[[0, 0]], 2.0 * -0.5 / 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(da[[1, 1]], 2.0 * -1.0 / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn cross_entropy_of_uniform_logits_is_log_classes() {
        let y_hat = Array2::zeros((3, 10));
        let y = crate::data::one_hot(&[0, 4, 9], 10).unwrap();
        let (loss, da) = criteria(&y_hat, &y, Loss::CrossEntropy).unwrap();
        assert_abs_diff_eq!(loss, 10f64.ln(), epsilon = 1e-12);
        // gradient rows sum to zero: softmax and target both sum to one
        for row in da.rows() {
            assert_abs_diff_eq!(row.sum(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn cross_entropy_is_stable_for_large_logits() {
        let y_hat = array![[1000.0, -1000.0]];
        let y = array![[1.0, 0.0]];
        let (loss, _) = criteria(&y_hat, &y, Loss::CrossEntropy).unwrap();
        assert!(loss.is_finite());
        assert_abs_diff_eq!(loss, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let r = criteria(&Array2::zeros((2, 3)), &Array2::zeros((2, 4)), Loss::MSE);
        assert!(matches!(r, Err(NNError::LayerShapeMismatch(_))));
    }

    #[test]
    fn unset_loss_is_an_error() {
        assert!(criteria(&Array2::zeros((1, 1)), &Array2::zeros((1, 1)), Loss::None).is_err());
    }
}
