use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use confique::Config;
use hvscan::analysis;
use hvscan::config::Conf;
use hvscan::gateway::{Digitizer, HvSupply};
use hvscan::scan::{Scan, ScanParams};
use hvscan::sim::{SimDigitizer, SimHvSupply};
use log::{info, LevelFilter};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

/// Sweep a detector's bias voltage and record digitizer waveforms at each
/// step. The six scan parameters must be given all together, or not at all
/// to run with the configured defaults.
#[derive(Parser, Debug)]
#[command(name = "hvscan", version, allow_negative_numbers = true)]
struct Cli {
    /// Channel DC offset in volts
    dc_offset: Option<f64>,
    /// Self-trigger threshold in raw ADC counts (0-4095)
    self_trigger_threshold: Option<u32>,
    /// Minimum events to collect per voltage step
    n_events: Option<usize>,
    /// Scan lower bound in volts
    low_hv: Option<f64>,
    /// Scan upper bound in volts
    high_hv: Option<f64>,
    /// Number of voltage steps, endpoints included
    n_steps: Option<usize>,

    /// TOML config file (missing file falls back to built-in defaults)
    #[arg(short, long, default_value = "hvscan.toml")]
    config: PathBuf,
}

fn scan_params(cli: &Cli, conf: &Conf) -> ScanParams {
    match (
        cli.dc_offset,
        cli.self_trigger_threshold,
        cli.n_events,
        cli.low_hv,
        cli.high_hv,
        cli.n_steps,
    ) {
        (None, None, None, None, None, None) => ScanParams::from_conf(&conf.scan),
        (Some(dc_offset), Some(threshold), Some(n_events), Some(low_hv), Some(high_hv), Some(n_steps)) => {
            ScanParams {
                dc_offset,
                self_trigger_threshold: threshold,
                n_events,
                low_hv,
                high_hv,
                n_steps,
            }
        }
        _ => Cli::command()
            .error(
                ErrorKind::WrongNumberOfValues,
                "the scan arguments must be given all together or not at all",
            )
            .exit(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    TermLogger::init(
        LevelFilter::Info,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let conf = Conf::builder()
        .file(&cli.config)
        .load()
        .context("loading configuration")?;
    let params = scan_params(&cli, &conf);
    params.validate()?;

    let mut digitizer = SimDigitizer::connect(conf.digitizer.link_num, &conf.sim)?;
    let mut supply = SimHvSupply::connect(&conf.sim)?;
    info!("HV connected with: {}", supply.idn());

    let frame = Scan::new(&mut digitizer, &mut supply, &conf, params).run()?;
    info!("Acquisition complete.");

    let out_dir = Path::new(&conf.run.output_dir);
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]_[hour][minute][second]"))?;

    let waveform_path = out_dir.join(format!("hv_scan_{stamp}.csv"));
    frame.write_csv_path(&waveform_path)?;
    info!("wrote {} rows to {}", frame.len(), waveform_path.display());

    if conf.analysis.write_gain_summary {
        let points = analysis::gain_summary(&frame, &conf.analysis);
        let gain_path = out_dir.join(format!("hv_scan_{stamp}_gain.csv"));
        analysis::write_gain_csv(&points, &gain_path)?;
        info!(
            "wrote gain summary for {} voltages to {}",
            points.len(),
            gain_path.display()
        );
    }

    digitizer.disconnect()?;
    supply.disconnect()?;

    Ok(())
}
