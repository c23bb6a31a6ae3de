//! Integer, piecewise-linear activation functions.
//!
//! The scalar forms are defined on the 8-bit domain `[-128, 127]` and saturate
//! outside it. Division always truncates toward zero.
//!
//! | fn          | segment upper bounds (inclusive)   | outputs                                             |
//! |-------------|------------------------------------|-----------------------------------------------------|
//! | `q_sigmoid` | -128, -75, -32, 31, 74, 127, +inf  | 1, x/8+20, x/2+48, x+64, x/2+80, x/8+108, 127       |
//! | `q_tanh`    | -128, -75, -32, 31, 74, 127, +inf  | -127, x/4-88, x-32, 2x, x+32, x/4+88, 127           |
//! | `q_relu8bit`| -                                  | clamp(x, 0, 127)                                    |
//!
//! Alongside the value every activation reports a *gradient inverse*: the
//! integer reciprocal of its local slope, which the integer backward pass
//! divides by.

use crate::prelude::*;

pub const Q_MIN: i64 = -127;
pub const Q_MAX: i64 = 127;
/// Input right-shift applied by the layer forms of sigmoid, tanh and rescale.
pub const K_BIT: u32 = 8;

/// Inclusive upper bounds of the first six sigmoid/tanh segments.
pub const BREAKPOINTS: [i64; 6] = [-128, -75, -32, 31, 74, 127];

/// Gradient inverse per segment, shared by sigmoid and tanh.
pub const SEGMENT_GRAD_INV: [i64; 7] = [Q_MAX, 8, 2, 1, 2, 8, Q_MAX];

const LEAKY_SLOPE_INV: i64 = 5;
const PLU_SLOPE_INV: i64 = 10;
const PLU_KNEE: i64 = 1;

fn segment(x: i64) -> usize {
    BREAKPOINTS.iter().position(|&b| x <= b).unwrap_or(BREAKPOINTS.len())
}

pub fn q_sigmoid(x: i64) -> i64 {
    match segment(x) {
        0 => 1,
        1 => x / 8 + 20,
        2 => x / 2 + 48,
        3 => x + 64,
        4 => x / 2 + 80,
        5 => x / 8 + 108,
        _ => Q_MAX,
    }
}

pub fn q_tanh(x: i64) -> i64 {
    match segment(x) {
        0 => Q_MIN,
        1 => x / 4 - 88,
        2 => x - 32,
        3 => 2 * x,
        4 => x + 32,
        5 => x / 4 + 88,
        _ => Q_MAX,
    }
}

pub fn q_relu8bit(x: i64) -> i64 {
    x.clamp(0, Q_MAX)
}

pub fn q_sigmoid_grad_inv(x: i64) -> i64 {
    SEGMENT_GRAD_INV[segment(x)]
}

pub fn q_tanh_grad_inv(x: i64) -> i64 {
    SEGMENT_GRAD_INV[segment(x)]
}

pub fn q_relu8bit_grad_inv(x: i64) -> i64 {
    if (0..=Q_MAX).contains(&x) { 1 } else { Q_MAX }
}

/// Activations usable by the integer layers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantActivation {
    Sigmoid,
    Tanh,
    Rescale,
    Softmax,
    Relu8Bit,
    LeakyRelu,
    Plu,
    AsIs,
}

impl QuantActivation {
    /// Applies the activation to a batch of pre-activations.
    ///
    /// `fan_in` is the layer's input width; only `Tanh` uses it, dividing the
    /// input by `2^K_BIT * fan_in` before the lookup. Returns `(output, grad_inv)`.
    pub fn activate(&self, z: &Array2<i64>, fan_in: usize) -> (Array2<i64>, Array2<i64>) {
        let shift = 1i64 << K_BIT;
        match self {
            Self::Sigmoid => map_pair(z, |v| {
                let x = v / shift;
                (q_sigmoid(x).clamp(1, Q_MAX), q_sigmoid_grad_inv(x))
            }),
            Self::Tanh => {
                let divisor = shift * (fan_in.max(1) as i64);
                map_pair(z, |v| {
                    let x = v / divisor;
                    (q_tanh(x).clamp(Q_MIN, Q_MAX), q_tanh_grad_inv(x))
                })
            }
            Self::Rescale => map_pair(z, |v| (v / shift, 1)),
            Self::Softmax => softmax(z),
            Self::Relu8Bit => map_pair(z, |v| (q_relu8bit(v), q_relu8bit_grad_inv(v))),
            Self::LeakyRelu => map_pair(z, leaky_relu),
            Self::Plu => map_pair(z, plu),
            Self::AsIs => (z.clone(), Array2::ones(z.raw_dim())),
        }
    }

    /// The scalar curve drawn by the visualizer, when one exists.
    pub fn scalar(&self) -> Option<fn(i64) -> i64> {
        match self {
            Self::Sigmoid => Some(q_sigmoid as fn(i64) -> i64),
            Self::Tanh => Some(q_tanh),
            Self::Relu8Bit => Some(q_relu8bit),
            _ => None,
        }
    }
}

fn map_pair<F: Fn(i64) -> (i64, i64)>(z: &Array2<i64>, f: F) -> (Array2<i64>, Array2<i64>) {
    let mut out = Array2::zeros(z.raw_dim());
    let mut grad_inv = Array2::zeros(z.raw_dim());
    Zip::from(&mut out).and(&mut grad_inv).and(z).for_each(|o, g, &v| {
        let (y, gi) = f(v);
        *o = y;
        *g = gi;
    });
    (out, grad_inv)
}

fn leaky_relu(v: i64) -> (i64, i64) {
    let lo = i16::MIN as i64;
    let hi = i16::MAX as i64;
    if v < lo {
        (lo, Q_MAX)
    } else if v < 0 {
        (v / LEAKY_SLOPE_INV, LEAKY_SLOPE_INV)
    } else if v < hi {
        (v, 1)
    } else {
        (hi, Q_MAX)
    }
}

fn plu(x: i64) -> (i64, i64) {
    let lower = (x - PLU_KNEE) / PLU_SLOPE_INV + PLU_KNEE;
    let upper = (x + PLU_KNEE) / PLU_SLOPE_INV - PLU_KNEE;
    // bounds may cross; the lower one is checked first and wins
    let y = if x < lower {
        lower
    } else if x > upper {
        upper
    } else {
        x
    };
    let grad_inv = if x != 0 { (y / x).abs() } else { 1 };
    (y.clamp(Q_MIN, Q_MAX), grad_inv)
}

/// Row-wise integer softmax: negatives drop to zero and the positives are
/// scaled by `Q_MAX / row_sum` so the row sums to at most `Q_MAX`.
fn softmax(z: &Array2<i64>) -> (Array2<i64>, Array2<i64>) {
    let mut out = z.mapv(|v| v.max(0));
    let mut grad_inv = Array2::ones(z.raw_dim());
    for (mut row, mut g) in out.rows_mut().into_iter().zip(grad_inv.rows_mut()) {
        let sum = row.sum().max(1);
        let scale = Q_MAX / sum;
        for (v, gi) in row.iter_mut().zip(g.iter_mut()) {
            if *v == 0 {
                *gi = Q_MAX;
            } else {
                *v *= scale;
            }
        }
    }
    (out, grad_inv)
}
