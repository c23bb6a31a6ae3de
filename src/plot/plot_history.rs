use plotters::prelude::*;
use std::path::Path;

use crate::error::{NNError, Result};
use crate::train::EpochReport;

/// Two panels: total loss per epoch (log scale) and train/test accuracy.
pub fn plot_history<P: AsRef<Path>>(history: &[EpochReport], filename: P) -> Result<()> {
    if history.is_empty() {
        return Err(NNError::PlotError("no epochs to plot".to_string()));
    }
    draw(history, filename.as_ref()).map_err(|e| NNError::PlotError(e.to_string()))?;
    log::info!("history plot saved as '{}'", filename.as_ref().display());
    Ok(())
}

fn draw(history: &[EpochReport], filename: &Path) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(filename, (1200, 500)).into_drawing_area();
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally(600);

    let first = history[0].epoch;
    let last = history[history.len() - 1].epoch + 1;

    // Adjust losses to avoid log of zero or negative numbers
    let log_losses: Vec<(usize, f64)> = history
        .iter()
        .map(|r| (r.epoch, if r.total_loss <= 0.0 { 1e-10 } else { r.total_loss }.log10()))
        .collect();
    let y_min = log_losses.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).floor();
    let mut y_max = log_losses.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max).ceil();
    if y_max <= y_min {
        y_max = y_min + 1.0;
    }

    let mut loss_chart = ChartBuilder::on(&left)
        .caption("Training Loss (Log Scale)", ("sans-serif", 26).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(first..last, y_min..y_max)?;

    loss_chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc("Loss")
        .y_label_formatter(&|y| format!("1e{:.0}", y))
        .draw()?;

    loss_chart.draw_series(LineSeries::new(log_losses, &BLUE))?;

    let mut acc_chart = ChartBuilder::on(&right)
        .caption("Accuracy", ("sans-serif", 26).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(first..last, 0f64..100f64)?;

    acc_chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc("Accuracy (%)")
        .draw()?;

    acc_chart
        .draw_series(LineSeries::new(
            history.iter().map(|r| (r.epoch, r.train_acc * 100.0)),
            &BLUE,
        ))?
        .label("Train")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    acc_chart
        .draw_series(LineSeries::new(
            history.iter().map(|r| (r.epoch, r.test_acc * 100.0)),
            &RED,
        ))?
        .label("Test")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    acc_chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = plot_history(&[], dir.path().join("h.png")).unwrap_err();
        assert!(matches!(err, NNError::PlotError(_)));
    }
}
