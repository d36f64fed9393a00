mod common;

use std::sync::atomic::AtomicBool;

use bess_sim::BessError;
use bess_sim::io::export::{write_csv, write_sweep_csv};
use bess_sim::sim::dynamic::ControlEpisode;
use bess_sim::sim::{
    Objective, SimulationReport, SimulationRequest, SweepSpec, run_simulation, run_sweep,
};
use bess_sim::strategy::StrategyKind;

use common::{assert_close, catalog, model, options};

#[test]
fn report_metrics_are_consistent_with_hourly_rows() {
    let request = SimulationRequest {
        strategy: "night_shift".to_string(),
        month: Some(6),
        days: 2,
        ..SimulationRequest::default()
    };
    let report = run_simulation(&request, &catalog(), &options()).unwrap();
    assert!(report.balance.valid, "{:?}", report.balance.reason);
    assert_eq!(report.config.strategy, StrategyKind::NightShift);
    assert_eq!(report.config.steps, 48);
    assert_eq!(report.hourly.len(), 48);

    let solar: f64 = report.hourly.iter().map(|r| r.solar_mw).sum();
    let grid: f64 = report.hourly.iter().map(|r| r.grid_mw).sum();
    let losses: f64 = report.hourly.iter().map(|r| r.losses_mwh).sum();
    assert_close(report.metrics.solar_mwh, solar, 1e-9);
    assert_close(report.metrics.grid_mwh, grid, 1e-9);
    assert_close(report.metrics.losses_mwh, losses, 1e-9);
    assert_close(
        report.metrics.grid_pct + report.metrics.curtailed_pct + report.metrics.losses_pct,
        100.0 - 100.0 * stored_share(&report),
        1e-6,
    );
    assert!(report.metrics.soc_min <= report.metrics.soc_max);
    assert!(report.metrics.daily_cycles > 0.0);
}

/// Share of solar energy still held in the battery at the end of the run.
///
/// Runs start empty, at the LFP minimum SOC of 0.05.
fn stored_share(report: &SimulationReport) -> f64 {
    let soc_end = report.hourly.last().map(|r| r.soc).unwrap_or_default();
    let stored_mwh = (soc_end - 0.05) * report.config.capacity_mwh;
    stored_mwh / report.metrics.solar_mwh
}

#[test]
fn report_serializes_to_json() {
    let report = run_simulation(&SimulationRequest::default(), &catalog(), &options()).unwrap();
    let json = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["config"]["strategy"], "cap_shaving");
    assert_eq!(value["hourly"].as_array().map(Vec::len), Some(24));
    assert_eq!(value["balance"]["valid"], true);
    assert_eq!(value["balance"]["quality"], "good");
}

#[test]
fn csv_export_has_one_row_per_step() {
    let request = SimulationRequest {
        steps_per_day: 96,
        ..SimulationRequest::default()
    };
    let report = run_simulation(&request, &catalog(), &options()).unwrap();
    let mut buf = Vec::new();
    write_csv(&report, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 97);
    assert!(text.lines().nth(1).unwrap().starts_with("0,0.00,"));
}

#[test]
fn sweep_ranks_every_configuration() {
    let spec = SweepSpec {
        powers_mw: vec![0.5, 1.0, 2.0],
        durations_h: vec![1.0, 4.0],
        technologies: vec!["lfp".to_string(), "vanadium_flow".to_string()],
        objective: Objective::CurtailmentRatio,
        threads: 2,
    };
    let request = SimulationRequest::default();
    assert_eq!(spec.len(&request), 12);

    let outcome = run_sweep(&request, &spec, &catalog(), &options(), None).unwrap();
    assert!(!outcome.cancelled);
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.ranked.len(), 12);
    for pair in outcome.ranked.windows(2) {
        assert!(pair[0].score <= pair[1].score);
    }
    let best = outcome.best().unwrap();
    let worst = outcome.ranked.last().unwrap();
    assert!(best.score < worst.score);
    assert!(outcome.ranked.iter().all(|p| p.valid));

    let json = outcome.to_json().unwrap();
    assert!(json.contains("\"objective\": \"curtailment_ratio\""));

    let mut buf = Vec::new();
    write_sweep_csv(&outcome, &mut buf).unwrap();
    assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 13);
}

#[test]
fn sweep_collects_failures_without_aborting() {
    let spec = SweepSpec {
        powers_mw: vec![0.0, 1.0],
        durations_h: vec![2.0],
        ..SweepSpec::default()
    };
    let outcome = run_sweep(
        &SimulationRequest::default(),
        &spec,
        &catalog(),
        &options(),
        None,
    )
    .unwrap();
    assert_eq!(outcome.ranked.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].power_mw, 0.0);
    assert!(outcome.to_string().contains("1 failed"));
}

#[test]
fn cancelled_sweep_skips_remaining_work() {
    let cancel = AtomicBool::new(true);
    let outcome = run_sweep(
        &SimulationRequest::default(),
        &SweepSpec::default(),
        &catalog(),
        &options(),
        Some(&cancel),
    )
    .unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.ranked.is_empty());
}

#[test]
fn empty_sweep_grid_is_a_configuration_error() {
    let spec = SweepSpec {
        durations_h: Vec::new(),
        ..SweepSpec::default()
    };
    let r = run_sweep(&SimulationRequest::default(), &spec, &catalog(), &options(), None);
    assert!(matches!(r, Err(BessError::Configuration(_))));
}

#[test]
fn control_episode_tracks_external_requests() {
    let solar = vec![0.0, 0.0, 1.0, 2.0, 2.0, 1.0, 0.0, 0.0];
    let requests = [0.0, 0.0, -1.0, -1.0, -1.0, 0.0, 0.8, 0.8];
    let mut episode = ControlEpisode::new(model(1.0, 2.0, "lfp"), solar.clone(), None).unwrap();
    let trace = episode.replay(&requests).unwrap().clone();
    assert!(episode.is_done());
    assert_eq!(trace.len(), solar.len());

    for i in 0..solar.len() {
        assert_close(trace.grid[i], solar[i] + trace.power[i], 1e-12);
    }
    assert!(trace.soc[4] > trace.soc[1]);
    assert!(trace.soc[7] < trace.soc[5]);
    assert!(trace.grid_export_mwh(1.0) > 0.0);

    assert!(matches!(episode.advance(0.0), Err(BessError::NumericalDomain(_))));
}

#[test]
fn control_episode_allows_grid_import() {
    let mut episode = ControlEpisode::new(model(1.0, 2.0, "lfp"), vec![0.0; 2], None).unwrap();
    let step = episode.advance(-0.5).unwrap();
    assert_eq!(step.actual_power_mw, -0.5);
    assert_eq!(step.grid_mw, -0.5);
    assert!(episode.trace().grid_import_mwh(1.0) > 0.0);
}
