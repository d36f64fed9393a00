//! Canonical clear-sky solar profiles.

use crate::error::{BessError, Result};

/// Typical specific yield by month (kWh per kWp per day), January first.
pub const SPECIFIC_YIELD_KWH_PER_KWP: [f64; 12] =
    [1.0, 1.8, 2.9, 4.1, 4.9, 5.2, 5.3, 4.7, 3.4, 2.2, 1.1, 0.8];

/// Daylight duration by month (hours), January first.
pub const DAY_LENGTH_HOURS: [f64; 12] =
    [8.5, 10.0, 11.8, 13.6, 15.2, 16.0, 15.6, 14.2, 12.4, 10.6, 9.0, 8.0];

/// Hour of day around which daylight is centred.
pub const SOLAR_NOON_HOUR: f64 = 12.5;

fn month_index(month: Option<u8>) -> Result<Option<usize>> {
    match month {
        None => Ok(None),
        Some(m @ 1..=12) => Ok(Some(usize::from(m) - 1)),
        Some(m) => Err(BessError::config(format!("month must be in 1..=12, got {m}"))),
    }
}

fn mean(values: &[f64; 12]) -> f64 {
    values.iter().sum::<f64>() / 12.0
}

/// Specific yield for a month, or the annual mean for `None`.
///
/// # Errors
///
/// Returns `Configuration` for a month outside 1..=12.
pub fn specific_yield(month: Option<u8>) -> Result<f64> {
    Ok(month_index(month)?.map_or_else(
        || mean(&SPECIFIC_YIELD_KWH_PER_KWP),
        |i| SPECIFIC_YIELD_KWH_PER_KWP[i],
    ))
}

/// Daylight hours for a month, or the annual mean for `None`.
///
/// # Errors
///
/// Returns `Configuration` for a month outside 1..=12.
pub fn day_length(month: Option<u8>) -> Result<f64> {
    Ok(month_index(month)?.map_or_else(|| mean(&DAY_LENGTH_HOURS), |i| DAY_LENGTH_HOURS[i]))
}

/// One day of clear-sky solar output (MW per sample).
///
/// A half-sine between sunrise and sunset, sampled at step midpoints and
/// scaled so the day's energy equals `psfv_mw` times the monthly specific
/// yield. Samples are clipped at `psfv_mw`.
///
/// # Arguments
///
/// * `psfv_mw` - Installed PV capacity (MWp)
/// * `month` - Calendar month 1..=12, or `None` for an annual-average day
/// * `steps_per_day` - Samples per day; the timestep is `24 / steps_per_day` hours
///
/// # Errors
///
/// Returns `Configuration` for a non-positive capacity, a zero step count,
/// or an invalid month.
///
/// # Examples
///
/// ```
/// use bess_sim::sim::profile::canonical_daily_profile;
///
/// let day = canonical_daily_profile(10.0, Some(6), 24).unwrap();
/// let energy: f64 = day.iter().sum();
/// assert!((energy - 52.0).abs() < 1e-9);
/// assert_eq!(day[0], 0.0);
/// ```
pub fn canonical_daily_profile(
    psfv_mw: f64,
    month: Option<u8>,
    steps_per_day: usize,
) -> Result<Vec<f64>> {
    if !(psfv_mw.is_finite() && psfv_mw > 0.0) {
        return Err(BessError::config(format!("psfv_mw must be > 0, got {psfv_mw}")));
    }
    if steps_per_day == 0 {
        return Err(BessError::config("steps_per_day must be > 0"));
    }
    let energy_mwh = psfv_mw * specific_yield(month)?;
    let length_h = day_length(month)?;
    let sunrise = SOLAR_NOON_HOUR - length_h / 2.0;
    let dt = 24.0 / steps_per_day as f64;

    let shape: Vec<f64> = (0..steps_per_day)
        .map(|i| {
            let t = (i as f64 + 0.5) * dt - sunrise;
            if (0.0..=length_h).contains(&t) {
                (std::f64::consts::PI * t / length_h).sin().max(0.0)
            } else {
                0.0
            }
        })
        .collect();
    let shape_energy: f64 = shape.iter().sum::<f64>() * dt;
    if shape_energy <= 0.0 {
        return Ok(vec![0.0; steps_per_day]);
    }
    let scale = energy_mwh / shape_energy;
    Ok(shape.into_iter().map(|v| (v * scale).min(psfv_mw)).collect())
}

/// `days` consecutive copies of [`canonical_daily_profile`].
///
/// # Errors
///
/// As [`canonical_daily_profile`], plus `Configuration` for zero days.
pub fn canonical_profile(
    psfv_mw: f64,
    month: Option<u8>,
    steps_per_day: usize,
    days: usize,
) -> Result<Vec<f64>> {
    if days == 0 {
        return Err(BessError::config("days must be > 0"));
    }
    let day = canonical_daily_profile(psfv_mw, month, steps_per_day)?;
    Ok(day.repeat(days))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_matches_yield() {
        for month in 1..=12u8 {
            let day = canonical_daily_profile(4.0, Some(month), 96).unwrap();
            let energy: f64 = day.iter().sum::<f64>() * 0.25;
            let expected = 4.0 * SPECIFIC_YIELD_KWH_PER_KWP[usize::from(month) - 1];
            assert!((energy - expected).abs() < 1e-9, "month {month}");
        }
    }

    #[test]
    fn annual_mean_when_month_missing() {
        let day = canonical_daily_profile(1.0, None, 24).unwrap();
        let energy: f64 = day.iter().sum();
        assert!((energy - mean(&SPECIFIC_YIELD_KWH_PER_KWP)).abs() < 1e-9);
    }

    #[test]
    fn winter_days_are_shorter() {
        let lit = |m| {
            canonical_daily_profile(1.0, Some(m), 96)
                .unwrap()
                .iter()
                .filter(|v| **v > 0.0)
                .count()
        };
        assert!(lit(12) < lit(6));
    }

    #[test]
    fn never_exceeds_capacity_and_non_negative() {
        let day = canonical_daily_profile(3.0, Some(7), 288).unwrap();
        assert!(day.iter().all(|v| (0.0..=3.0).contains(v)));
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(canonical_daily_profile(0.0, None, 24).is_err());
        assert!(canonical_daily_profile(1.0, Some(13), 24).is_err());
        assert!(canonical_daily_profile(1.0, None, 0).is_err());
        assert!(canonical_profile(1.0, None, 24, 0).is_err());
        assert_eq!(canonical_profile(1.0, None, 24, 3).unwrap().len(), 72);
    }
}
