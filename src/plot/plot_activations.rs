use plotters::prelude::*;
use std::path::{Path, PathBuf};

use crate::error::{NNError, Result};
use crate::quant::QuantActivation;

const X_MIN: i64 = -128;
const X_MAX: i64 = 127;
const TICK: i64 = 32;

/// `128·sigmoid(x/32)`, the curve `q_sigmoid` approximates.
pub fn sigmoid_reference(x: f64) -> f64 {
    128.0 / (1.0 + (-x / 32.0).exp())
}

/// `128·tanh(x/64)`, the curve `q_tanh` approximates.
pub fn tanh_reference(x: f64) -> f64 {
    128.0 * (x / 64.0).tanh()
}

/// The curves drawn by `plot_all_activations`, with their file stem.
pub fn quantized_curves() -> Vec<(&'static str, QuantActivation, Option<fn(f64) -> f64>)> {
    vec![
        ("q_sigmoid", QuantActivation::Sigmoid, Some(sigmoid_reference as fn(f64) -> f64)),
        ("q_tanh", QuantActivation::Tanh, Some(tanh_reference as fn(f64) -> f64)),
        ("q_relu8bit", QuantActivation::Relu8Bit, None),
    ]
}

/// Draws `f` over [-128, 127] and, when given, the continuous curve it approximates.
pub fn plot_quantized_activation(
    name: &str,
    f: fn(i64) -> i64,
    reference: Option<fn(f64) -> f64>,
    filename: &Path,
) -> Result<()> {
    draw(name, f, reference, filename).map_err(|e| NNError::PlotError(e.to_string()))?;
    log::info!("{} plot saved as '{}'", name, filename.display());
    Ok(())
}

fn draw(
    name: &str,
    f: fn(i64) -> i64,
    reference: Option<fn(f64) -> f64>,
    filename: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(filename, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(name, ("sans-serif", 30).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            (X_MIN as f64..(X_MAX + 1) as f64).step(TICK as f64),
            -140f64..140f64,
        )?;

    chart.configure_mesh().x_desc("x").y_desc(name).draw()?;

    chart
        .draw_series(LineSeries::new(
            (X_MIN..=X_MAX).map(|x| (x as f64, f(x) as f64)),
            &BLUE,
        ))?
        .label("quantized")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    if let Some(g) = reference {
        chart
            .draw_series(LineSeries::new(
                (X_MIN..=X_MAX).map(|x| (x as f64, g(x as f64))),
                &RED,
            ))?
            .label("reference")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Writes `<name>.png` into `dir` for every quantized curve.
pub fn plot_all_activations<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (name, activation, reference) in quantized_curves() {
        let f = activation
            .scalar()
            .ok_or_else(|| NNError::PlotError(format!("{:?} has no scalar form", activation)))?;
        let path = dir.as_ref().join(format!("{}.png", name));
        plot_quantized_activation(name, f, reference, &path)?;
        written.push(path);
    }
    Ok(written)
}
