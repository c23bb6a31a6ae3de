#[allow(unused)]
use crate::prelude::*;

/// Column index of the largest value in each row. Ties go to the lowest index.
pub fn argmax_rows<A: PartialOrd + Copy>(m: &Array2<A>) -> Vec<usize> {
    m.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (j, v) in row.iter().enumerate().skip(1) {
                if *v > row[best] {
                    best = j;
                }
            }
            best
        })
        .collect()
}

/// Number of rows whose argmax equals the label.
pub fn count_correct<A: PartialOrd + Copy>(output: &Array2<A>, labels: &[usize]) -> usize {
    argmax_rows(output)
        .into_iter()
        .zip(labels)
        .filter(|(pred, label)| pred == *label)
        .count()
}

#[macro_export]
macro_rules! Model {
    (seed $s:expr, input_shape $i:expr, $(dense $x:expr, activation $a:expr, init $n:expr),*) => {
        {
            let x = vec![$($x),*];
            let a = vec![$($a),*];
            let n = vec![$($n),*];
            let mut builder = Sequential::builder().seed($s);
            let mut prev = $i;
            for k in 0..x.len() {
                builder = builder.add_dense(prev, x[k], a[k], n[k])?;
                prev = x[k];
            }
            builder
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_on_ties() {
        let m = array![[0.1, 0.9, 0.9], [3.0, 3.0, 1.0], [-1.0, -2.0, -0.5]];
        assert_eq!(argmax_rows(&m), vec![1, 0, 2]);
    }

    #[test]
    fn count_correct_compares_with_labels() {
        let m = array![[1, 5, 2], [9, 0, 0]];
        assert_eq!(count_correct(&m, &[1, 1]), 1);
    }

    #[test]
    fn model_macro_chains_layer_widths() -> Result<()> {
        let model = Model!(seed 1, input_shape 4,
            dense 3, activation Activation::Tanh, init Init::XavierUniform,
            dense 2, activation Activation::Linear, init Init::XavierUniform)
        .build()?;
        assert_eq!(model.layers.len(), 2);
        assert_eq!(model.layers[0].w.dim(), (4, 3));
        assert_eq!(model.layers[1].w.dim(), (3, 2));
        Ok(())
    }
}
