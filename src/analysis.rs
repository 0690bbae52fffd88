//! Per-voltage gain summary. Each event's amplitude is pedestal-corrected
//! against the mean of an early-sample window, integrated over time, and
//! normalized by input impedance and the fundamental charge; events are then
//! aggregated into mean/std/err per voltage.

use crate::config::AnalysisSettings;
use crate::error::Result;
use crate::frame::WaveformFrame;
use ndarray::Array1;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

const ELEMENTARY_CHARGE: f64 = 1.602e-19;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GainPoint {
    pub voltage: f64,
    pub gain: f64,
    pub std: f64,
    pub err: f64,
}

/// Integrate one pedestal-corrected event into a charge count.
fn event_charge(time: &Array1<f64>, amplitude: &Array1<f64>, settings: &AnalysisSettings) -> f64 {
    let len = amplitude.len();
    let start = settings.pedestal_start.min(len);
    let end = settings.pedestal_end.min(len);
    let pedestal = if start < end {
        amplitude.slice(ndarray::s![start..end]).mean().unwrap_or(0.0)
    } else {
        amplitude.mean().unwrap_or(0.0)
    };

    // Falling pulses integrate positive after the sign flip.
    let corrected = amplitude.mapv(|a| -(a - pedestal));

    let mut integral = 0.0;
    for i in 1..len {
        let dt = time[i] - time[i - 1];
        integral += dt * (corrected[i] + corrected[i - 1]) / 2.0;
    }
    integral / (settings.input_impedance_ohms * ELEMENTARY_CHARGE)
}

/// Compute the gain summary for the configured channel, one point per
/// voltage in step order.
pub fn gain_summary(frame: &WaveformFrame, settings: &AnalysisSettings) -> Vec<GainPoint> {
    let tag = format!("CH{}", settings.channel);

    let mut points = Vec::new();
    for voltage in frame.voltages() {
        let mut charges = Vec::new();
        let mut current_event: Option<usize> = None;
        let mut time = Vec::new();
        let mut amplitude = Vec::new();

        let flush =
            |time: &mut Vec<f64>, amplitude: &mut Vec<f64>, charges: &mut Vec<f64>| {
                if !time.is_empty() {
                    let t = Array1::from_vec(std::mem::take(time));
                    let a = Array1::from_vec(std::mem::take(amplitude));
                    charges.push(event_charge(&t, &a, settings));
                }
            };

        for row in frame.rows() {
            if row.voltage != voltage || row.n_channel != tag {
                continue;
            }
            if current_event != Some(row.n_event) {
                flush(&mut time, &mut amplitude, &mut charges);
                current_event = Some(row.n_event);
            }
            time.push(row.time);
            amplitude.push(row.amplitude);
        }
        flush(&mut time, &mut amplitude, &mut charges);

        if charges.is_empty() {
            continue;
        }
        let n = charges.len() as f64;
        let gain = charges.iter().sum::<f64>() / n;
        let variance = charges.iter().map(|c| (c - gain).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        points.push(GainPoint {
            voltage,
            gain,
            std,
            err: std / n.sqrt(),
        });
    }
    points
}

pub fn write_gain_csv(points: &[GainPoint], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}
