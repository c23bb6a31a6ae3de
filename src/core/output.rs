use csv::Writer;
use std::path::Path;

use crate::error::Result;
use crate::train::EpochReport;

/// Writes one CSV row per epoch: `epoch,total_loss,train_acc,test_acc`.
pub fn write_history_to_csv<P: AsRef<Path>>(history: &[EpochReport], file_path: P) -> Result<()> {
    let mut wtr = Writer::from_path(file_path.as_ref())?;

    for report in history {
        wtr.serialize(report)?;
    }

    wtr.flush()?;
    log::info!("history written to {}", file_path.as_ref().display());
    Ok(())
}
