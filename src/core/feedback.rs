use crate::prelude::*;
use rand::Rng;

/// Fixed random feedback matrices for Direct Feedback Alignment.
///
/// Hidden layer `l` receives `error · B_l`, where `error` is the output-layer
/// error (`batch × num_classes`) and `B_l` is `num_classes × width_l`. The
/// matrices are drawn once from `N(0, 1) / sqrt(width_l)` and the type offers
/// no way to mutate them afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DirectFeedback {
    matrices: Vec<Array2<f64>>,
}

impl DirectFeedback {
    pub fn new<R: Rng + ?Sized>(num_classes: usize, widths: &[usize], rng: &mut R) -> Result<Self> {
        if num_classes == 0 || widths.iter().any(|&w| w == 0) {
            return Err(NNError::InvalidLayerConfiguration(
                "feedback matrices need non-zero class count and layer widths".to_string(),
            ));
        }
        let normal = Normal::new(0.0f64, 1.0).map_err(|e| NNError::Other(e.to_string()))?;
        let matrices = widths
            .iter()
            .map(|&width| Array2::random_using((num_classes, width), normal, &mut *rng) / (width as f64).sqrt())
            .collect();
        Ok(Self { matrices })
    }

    pub fn matrices(&self) -> &[Array2<f64>] {
        &self.matrices
    }

    pub fn num_classes(&self) -> usize {
        self.matrices.first().map_or(0, |b| b.nrows())
    }

    /// Projects the output error into hidden layer `layer`.
    pub fn project(&self, layer: usize, error: &Array2<f64>) -> Result<Array2<f64>> {
        let b = self.matrices.get(layer).ok_or_else(|| {
            NNError::InvalidLayerConfiguration(format!(
                "no feedback matrix for hidden layer {} ({} available)",
                layer,
                self.matrices.len()
            ))
        })?;
        if error.ncols() != b.nrows() {
            return Err(NNError::LayerShapeMismatch(format!(
                "output error has {} columns, feedback matrix expects {}",
                error.ncols(),
                b.nrows()
            )));
        }
        Ok(error.dot(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn shapes_follow_class_count_and_widths() {
        let fb = DirectFeedback::new(10, &[100, 50], &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(fb.matrices()[0].dim(), (10, 100));
        assert_eq!(fb.matrices()[1].dim(), (10, 50));
        assert_eq!(fb.num_classes(), 10);
    }

    /// Entries of B_l have variance close to 1/width_l.
    #[test]
    fn variance_is_scaled_by_width() {
        let fb = DirectFeedback::new(50, &[400], &mut StdRng::seed_from_u64(3)).unwrap();
        let b = &fb.matrices()[0];
        let n = b.len() as f64;
        let mean = b.sum() / n;
        let var = b.mapv(|v| (v - mean).powi(2)).sum() / n;
        assert_abs_diff_eq!(var * 400.0, 1.0, epsilon = 0.05);
    }

    #[test]
    fn same_seed_same_matrices() {
        let a = DirectFeedback::new(10, &[20, 5], &mut StdRng::seed_from_u64(9)).unwrap();
        let b = DirectFeedback::new(10, &[20, 5], &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn project_checks_shapes() {
        let fb = DirectFeedback::new(3, &[4], &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(fb.project(0, &Array2::zeros((2, 3))).unwrap().dim(), (2, 4));
        assert!(fb.project(0, &Array2::zeros((2, 5))).is_err());
        assert!(fb.project(1, &Array2::zeros((2, 3))).is_err());
    }

    #[test]
    fn rejects_zero_width() {
        assert!(DirectFeedback::new(10, &[0], &mut StdRng::seed_from_u64(1)).is_err());
    }
}
