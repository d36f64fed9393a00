//! CSV export for simulation reports and sweep outcomes.

use std::io::{self, Write};

use crate::sim::engine::SimulationReport;
use crate::sim::sweep::SweepOutcome;

/// Column header of the hourly profile export.
const HOURLY_HEADER: &str = "step,time_h,solar_mw,grid_mw,battery_mw,soc,\
                             curtailed_mw,losses_mwh,solar_delivered_mw";

/// Column header of the sweep export.
const SWEEP_HEADER: &str = "rank,power_mw,duration_h,technology,score,valid,\
                            grid_pct,curtailed_pct,losses_mwh,daily_cycles";

/// Writes a report's hourly profile as CSV to any writer.
///
/// One header row, then one row per timestep. Output is deterministic for
/// identical reports.
///
/// # Arguments
///
/// * `report` - Finished simulation report
/// * `writer` - Destination implementing `Write`
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(report: &SimulationReport, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HOURLY_HEADER.split(',').map(str::trim))?;

    for r in &report.hourly {
        wtr.write_record(&[
            r.step.to_string(),
            format!("{:.2}", r.time_h),
            format!("{:.4}", r.solar_mw),
            format!("{:.4}", r.grid_mw),
            format!("{:.4}", r.battery_mw),
            format!("{:.4}", r.soc),
            format!("{:.4}", r.curtailed_mw),
            format!("{:.6}", r.losses_mwh),
            format!("{:.4}", r.solar_delivered_mw),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes ranked sweep points as CSV, best first. Failures are not written.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_sweep_csv(outcome: &SweepOutcome, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(SWEEP_HEADER.split(',').map(str::trim))?;

    for (i, p) in outcome.ranked.iter().enumerate() {
        wtr.write_record(&[
            (i + 1).to_string(),
            format!("{:.3}", p.power_mw),
            format!("{:.3}", p.duration_h),
            p.technology.clone(),
            format!("{:.6}", p.score),
            p.valid.to_string(),
            format!("{:.2}", p.metrics.grid_pct),
            format!("{:.2}", p.metrics.curtailed_pct),
            format!("{:.4}", p.metrics.losses_mwh),
            format!("{:.4}", p.metrics.daily_cycles),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::ModelOptions;
    use crate::catalog::Catalog;
    use crate::sim::engine::{SimulationRequest, run_simulation};
    use crate::sim::sweep::{SweepSpec, run_sweep};

    fn report() -> SimulationReport {
        run_simulation(
            &SimulationRequest::default(),
            &Catalog::builtin(),
            &ModelOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn header_and_row_count() {
        let mut buf = Vec::new();
        write_csv(&report(), &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "step,time_h,solar_mw,grid_mw,battery_mw,soc,curtailed_mw,losses_mwh,solar_delivered_mw"
        );
        assert_eq!(lines.len(), 25);
    }

    #[test]
    fn deterministic_output() {
        let r = report();
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        write_csv(&r, &mut buf1).unwrap();
        write_csv(&r, &mut buf2).unwrap();
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn rows_parse_back_as_numbers() {
        let mut buf = Vec::new();
        write_csv(&report(), &mut buf).unwrap();
        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        assert_eq!(rdr.headers().map(csv::StringRecord::len).ok(), Some(9));
        let mut rows = 0;
        for record in rdr.records() {
            let rec = record.unwrap();
            for i in 1..9 {
                assert!(rec[i].parse::<f64>().is_ok(), "column {i}");
            }
            rows += 1;
        }
        assert_eq!(rows, 24);
    }

    #[test]
    fn sweep_rows_are_ranked() {
        let spec = SweepSpec {
            powers_mw: vec![1.0, 2.0],
            durations_h: vec![2.0],
            ..SweepSpec::default()
        };
        let outcome = run_sweep(
            &SimulationRequest::default(),
            &spec,
            &Catalog::builtin(),
            &ModelOptions::default(),
            None,
        )
        .unwrap();
        let mut buf = Vec::new();
        write_sweep_csv(&outcome, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,"));
    }
}
