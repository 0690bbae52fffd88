//! Flattens the nested per-event/per-channel waveforms of a step into one
//! uniquely-keyed table, and exports the concatenated scan result as a flat
//! delimited file.

use crate::error::{Result, ScanError};
use crate::event::RawEventBatch;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One sample of one channel of one event. Rows are keyed by
/// `(n_event, n_channel)` with the originating voltage carried as a column;
/// `n_event` is scoped to its voltage step and restarts at 0 on each step.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WaveformRow {
    pub n_event: usize,
    pub n_channel: String,
    pub voltage: f64,
    #[serde(rename = "Time (s)")]
    pub time: f64,
    #[serde(rename = "Amplitude (V)")]
    pub amplitude: f64,
}

#[derive(Debug, Clone, Default)]
pub struct WaveformFrame {
    rows: Vec<WaveformRow>,
}

/// Build one step's table. Event indices enumerate across all of the step's
/// batches in arrival order; channel keys become stable `CH{n}` tags so the
/// concatenated scan result can be filtered uniformly by channel and
/// voltage.
pub fn assemble(batches: &[RawEventBatch], voltage: f64) -> Result<WaveformFrame> {
    if batches.iter().all(|batch| batch.is_empty()) {
        return Err(ScanError::EmptyInput);
    }

    let mut rows = Vec::new();
    for (n_event, event) in batches.iter().flatten().enumerate() {
        for (&channel, waveform) in &event.channels {
            let tag = format!("CH{channel}");
            for (&time, &amplitude) in waveform.time.iter().zip(waveform.amplitude.iter()) {
                rows.push(WaveformRow {
                    n_event,
                    n_channel: tag.clone(),
                    voltage,
                    time,
                    amplitude,
                });
            }
        }
    }
    Ok(WaveformFrame { rows })
}

impl WaveformFrame {
    /// Concatenate per-step tables into the scan result, preserving step
    /// order. Callers must not pass an empty list (a scan with no data
    /// short-circuits before concatenation).
    pub fn concat(frames: Vec<WaveformFrame>) -> WaveformFrame {
        let mut rows = Vec::new();
        for frame in frames {
            rows.extend(frame.rows);
        }
        WaveformFrame { rows }
    }

    pub fn rows(&self) -> &[WaveformRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct voltages in first-appearance (step) order.
    pub fn voltages(&self) -> Vec<f64> {
        let mut seen = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.voltage) {
                seen.push(row.voltage);
            }
        }
        seen
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<()> {
        self.write_csv(File::create(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Waveform};

    fn two_channel_event(samples: usize) -> Event {
        let mut event = Event::default();
        for channel in [0u32, 1] {
            let time: Vec<f64> = (0..samples).map(|i| i as f64 * 4e-10).collect();
            let amplitude: Vec<f64> = (0..samples).map(|i| i as f64 * 0.1).collect();
            event
                .channels
                .insert(channel, Waveform::from_samples(time, amplitude));
        }
        event
    }

    #[test]
    fn row_count_covers_every_sample() {
        let batches = vec![
            vec![two_channel_event(8), two_channel_event(8)],
            vec![],
            vec![two_channel_event(8)],
        ];
        let frame = assemble(&batches, 900.0).unwrap();

        // 3 events x 2 channels x 8 samples
        assert_eq!(frame.len(), 48);
        assert!(frame.rows().iter().all(|r| r.voltage == 900.0));
    }

    #[test]
    fn event_indices_enumerate_across_batches() {
        let batches = vec![
            vec![two_channel_event(4)],
            vec![two_channel_event(4), two_channel_event(4)],
        ];
        let frame = assemble(&batches, 800.0).unwrap();

        let mut indices: Vec<usize> = frame.rows().iter().map(|r| r.n_event).collect();
        indices.dedup();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn channel_tags_are_stable_strings() {
        let batches = vec![vec![two_channel_event(2)]];
        let frame = assemble(&batches, 850.0).unwrap();

        let tags: Vec<&str> = frame.rows().iter().map(|r| r.n_channel.as_str()).collect();
        assert_eq!(tags, vec!["CH0", "CH0", "CH1", "CH1"]);
    }

    #[test]
    fn all_empty_batches_fail_instead_of_yielding_an_empty_table() {
        let batches: Vec<crate::event::RawEventBatch> = vec![vec![], vec![]];
        assert!(matches!(
            assemble(&batches, 800.0),
            Err(ScanError::EmptyInput)
        ));
        assert!(matches!(assemble(&[], 800.0), Err(ScanError::EmptyInput)));
    }

    #[test]
    fn concat_preserves_step_order_and_per_step_indices() {
        let low = assemble(&[vec![two_channel_event(2)]], 800.0).unwrap();
        let high = assemble(&[vec![two_channel_event(2)]], 1000.0).unwrap();
        let result = WaveformFrame::concat(vec![low, high]);

        assert_eq!(result.voltages(), vec![800.0, 1000.0]);
        // indices restart at each step boundary
        assert!(result.rows().iter().all(|r| r.n_event == 0));
    }

    #[test]
    fn csv_has_the_expected_header_and_row_count() {
        let frame = assemble(&[vec![two_channel_event(2)]], 800.0).unwrap();
        let mut buffer = Vec::new();
        frame.write_csv(&mut buffer).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "n_event,n_channel,voltage,Time (s),Amplitude (V)"
        );
        assert_eq!(lines.count(), 4);
    }
}
