use ndarray::Array2;

/// Affine rescaling from a known value range onto [0, 1].
pub trait Normalization {
    fn to_unity(&mut self, lb: f64, ub: f64);
}

impl Normalization for Array2<f64> {
    fn to_unity(&mut self, lb: f64, ub: f64) {
        let range = ub - lb;

        // A degenerate range maps everything to 0.0
        if range.abs() < f64::EPSILON {
            self.fill(0.0);
        } else {
            self.mapv_inplace(|v| (v - lb) / range);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn pixel_bytes_land_in_unit_interval() {
        let mut px = array![[0.0, 51.0, 255.0]];
        px.to_unity(0.0, 255.0);
        assert_eq!(px, array![[0.0, 0.2, 1.0]]);
    }

    #[test]
    fn degenerate_range_collapses() {
        let mut v = array![[3.0, 4.0]];
        v.to_unity(1.0, 1.0);
        assert_eq!(v, array![[0.0, 0.0]]);
    }
}
