//! Bench calibration from a `raw,grams` CSV.
//!
//! The fit produces the two numbers the appliance works with: counts per gram
//! (the persisted `calibration` factor) and the raw reading at zero load.
use serde::Deserialize;

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,grams
///
/// Example:
/// raw,grams
/// 842913,0.0
/// 982534,100.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub grams: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// ADC counts per gram.
    pub counts_per_gram: f32,
    /// Raw reading with nothing on the scale.
    pub zero_counts: i64,
}

// OLS fit of grams = a*raw + b in f64.
fn fit(pts: &[(i64, f32)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|r| r.0 as f64).sum::<f64>() / n;
    let mean_y = pts.iter().map(|r| f64::from(r.1)).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (rx, gy) in pts {
        let x = *rx as f64 - mean_x;
        let y = f64::from(*gy) - mean_y;
        sxx += x * x;
        sxy += x * y;
    }
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine slope (degenerate X variance)");
    }
    let a = sxy / sxx;
    if !a.is_finite() || a == 0.0 {
        eyre::bail!("calibration produced zero or non-finite slope");
    }
    Ok((a, mean_y - a * mean_x))
}

impl Calibration {
    /// Fit from at least two rows with strictly monotonic raw values.
    ///
    /// An ordinary least squares line is fitted first; rows whose residual
    /// exceeds 2× RMS are then dropped and the line refitted once.
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }

        let mut dir: i8 = 0;
        for (i, w) in rows.windows(2).enumerate() {
            let d = w[1].raw - w[0].raw;
            if d == 0 {
                eyre::bail!(
                    "calibration rows have duplicate raw values at index {} and {}",
                    i,
                    i + 1
                );
            }
            let step_dir = if d > 0 { 1 } else { -1 };
            if dir == 0 {
                dir = step_dir;
            } else if dir != step_dir {
                eyre::bail!(
                    "calibration raw values must be monotonic (strictly increasing or strictly decreasing)"
                );
            }
        }

        let pts: Vec<(i64, f32)> = rows.iter().map(|r| (r.raw, r.grams)).collect();
        let (a0, b0) = fit(&pts)?;
        let sumsq: f64 = pts
            .iter()
            .map(|(x, y)| {
                let r = f64::from(*y) - (a0 * (*x as f64) + b0);
                r * r
            })
            .sum();
        let rms = (sumsq / pts.len() as f64).sqrt();
        let (a, b) = robust_refit(&pts, a0, b0, rms, 2.0).unwrap_or((a0, b0));

        let zero = -b / a;
        if !zero.is_finite() {
            eyre::bail!("calibration produced invalid tare baseline");
        }
        let counts_per_gram = 1.0 / a;
        if !(counts_per_gram.is_finite() && counts_per_gram > 0.0) {
            eyre::bail!("calibration must increase grams with raw counts (got {counts_per_gram} counts/g)");
        }
        Ok(Self {
            counts_per_gram: counts_per_gram as f32,
            zero_counts: zero.round() as i64,
        })
    }
}

/// Refit over inliers (|residual| <= k·rms). `None` when nothing was rejected
/// or too few points remain.
fn robust_refit(pts: &[(i64, f32)], a0: f64, b0: f64, rms: f64, k: f64) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0 && k.is_finite() && k > 0.0) {
        return None;
    }
    let thr = k * rms;
    let inliers: Vec<(i64, f32)> = pts
        .iter()
        .copied()
        .filter(|(x, y)| (f64::from(*y) - (a0 * (*x as f64) + b0)).abs() <= thr)
        .collect();
    if inliers.len() >= 2 && inliers.len() < pts.len() {
        fit(&inliers).ok()
    } else {
        None
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Calibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != ["raw", "grams"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,grams', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    Calibration::from_rows(&rows)
}
