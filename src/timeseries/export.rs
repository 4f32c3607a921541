use std::io::Write;
use std::path::Path;

use crate::basic::error::Result;

use super::state::TimeSeriesResult;

/// Writes one CSV row per step: convergence columns followed by `vm_i`/`va_i` (degrees) per bus.
///
/// Steps with fewer buses than the widest step leave the missing columns empty.
pub fn write_csv<W: Write>(result: &TimeSeriesResult, writer: W) -> Result<()> {
    let width = result.steps.iter().map(|s| s.result.voltage.len()).max().unwrap_or(0);
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = ["step", "time_s", "converged", "iterations", "mismatch", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for i in 0..width {
        header.push(format!("vm_{i}"));
        header.push(format!("va_{i}"));
    }
    wtr.write_record(&header)?;

    for step in &result.steps {
        let res = &step.result;
        let mut row = vec![
            step.index.to_string(),
            step.time_s.map(|t| t.to_string()).unwrap_or_default(),
            res.converged.to_string(),
            res.iterations.to_string(),
            res.mismatch.to_string(),
            res.error.map(|e| format!("{e:?}")).unwrap_or_default(),
        ];
        let vm = res.voltage.magnitudes();
        let va = res.voltage.angles();
        for i in 0..width {
            if i < vm.len() {
                row.push(vm[i].to_string());
                row.push(va[i].to_degrees().to_string());
            } else {
                row.push(String::new());
                row.push(String::new());
            }
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// [`write_csv`] into a file, replacing it if it exists.
pub fn write_csv_file(result: &TimeSeriesResult, path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(result, file)
}
