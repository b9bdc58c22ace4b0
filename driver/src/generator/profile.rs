use anyhow::Context;
use chrono::{Duration, NaiveDate};
use limnocore::model::GeoBounds;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::Write as _;

/// Configuration for generating a synthetic wide measurement sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub stations: usize,
    pub timestamps: usize,
    /// First sampling date, `YYYY-MM-DD`.
    pub start_date: String,
    pub interval_days: i64,
    pub base_value: f64,
    pub amplitude: f64,
    pub noise: f64,
    pub seed: u64,
    pub bounds: GeoBounds,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            stations: 24,
            timestamps: 6,
            start_date: "2024-01-01".into(),
            interval_days: 30,
            base_value: 12.0,
            amplitude: 6.0,
            noise: 1.5,
            seed: 0,
            bounds: GeoBounds::FALLBACK,
        }
    }
}

impl DemoConfig {
    fn normalized_stations(&self) -> usize {
        self.stations.max(1)
    }

    fn normalized_timestamps(&self) -> usize {
        self.timestamps.max(1)
    }

    fn dates(&self) -> anyhow::Result<Vec<String>> {
        let start = NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d")
            .with_context(|| format!("parsing demo start date {:?}", self.start_date))?;
        let step = self.interval_days.max(1);
        (0..self.normalized_timestamps())
            .map(|i| {
                let offset = step
                    .checked_mul(i as i64)
                    .context("overflow computing demo sampling dates")?;
                start
                    .checked_add_signed(Duration::days(offset))
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .context("demo sampling date out of range")
            })
            .collect()
    }
}

/// Builds a CSV sheet with one row per station: `latitude,longitude` followed
/// by one column per sampling date. Values follow a seasonal wave whose phase
/// drifts across the lake, plus seeded noise, and never drop below zero.
pub fn build_demo_csv(config: &DemoConfig) -> anyhow::Result<String> {
    let dates = config.dates()?;
    let bounds = if config.bounds.is_usable() {
        config.bounds
    } else {
        GeoBounds::FALLBACK
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut csv = String::from("latitude,longitude");
    for date in &dates {
        csv.push(',');
        csv.push_str(date);
    }
    csv.push('\n');

    let periods = dates.len() as f64;
    for _ in 0..config.normalized_stations() {
        let latitude = rng.gen_range(bounds.south..bounds.north);
        let longitude = rng.gen_range(bounds.west..bounds.east);
        let drift = (latitude - bounds.south) / (bounds.north - bounds.south) * PI;
        write!(csv, "{latitude:.5},{longitude:.5}")?;
        for step in 0..dates.len() {
            let phase = step as f64 / periods * 2.0 * PI + drift;
            let jitter = if config.noise > 0.0 {
                rng.gen_range(-config.noise..config.noise)
            } else {
                0.0
            };
            let value = (config.base_value + config.amplitude * phase.sin() + jitter).max(0.0);
            write!(csv, ",{value:.2}")?;
        }
        csv.push('\n');
    }

    Ok(csv)
}
