//! Energy physiology
//!
//! Resting metabolic rate, age and energy-imbalance formulas shared by the
//! trend engine, the forecaster and the watchdog.

use crate::types::Sex;
use chrono::NaiveDate;

/// Energy density of lean (fat-free) tissue, kcal per kg
pub const LEAN_KCAL_PER_KG: f64 = 1020.0;

/// Energy density of fat tissue, kcal per kg
pub const FAT_KCAL_PER_KG: f64 = 9500.0;

/// Days per year used for fractional ages
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Coefficients of the allometric RMR model `c * w^p - y * age`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmrCoefficients {
    pub c: f64,
    pub p: f64,
    pub y: f64,
}

impl Sex {
    pub fn rmr_coefficients(&self) -> RmrCoefficients {
        match self {
            Sex::Male => RmrCoefficients {
                c: 293.0,
                p: 0.433,
                y: 5.92,
            },
            Sex::Female => RmrCoefficients {
                c: 248.0,
                p: 0.4356,
                y: 5.09,
            },
        }
    }
}

/// Fractional age in years on `date`
pub fn age_in_years(dob: NaiveDate, date: NaiveDate) -> f64 {
    (date - dob).num_days() as f64 / DAYS_PER_YEAR
}

/// Resting metabolic rate in kcal/day, never negative
///
/// Non-decreasing in weight and non-increasing in age for a fixed sex.
pub fn resting_metabolic_rate(weight_kg: f64, age_years: f64, sex: Sex) -> f64 {
    let k = sex.rmr_coefficients();
    let rmr = k.c * weight_kg.max(0.0).powf(k.p) - k.y * age_years;
    rmr.max(0.0)
}

/// Daily energy imbalance (kcal) implied by fat and lean mass changes (kg)
pub fn caloric_imbalance(delta_fat_kg: f64, delta_lean_kg: f64) -> f64 {
    delta_fat_kg * FAT_KCAL_PER_KG + delta_lean_kg * LEAN_KCAL_PER_KG
}

/// Fractional RMR drop from `peak_rmr` to `rmr`, clamped to [0, 1]
pub fn metabolic_adaptation(peak_rmr: f64, rmr: f64) -> f64 {
    if peak_rmr <= 0.0 {
        return 0.0;
    }
    (1.0 - rmr / peak_rmr).clamp(0.0, 1.0)
}
