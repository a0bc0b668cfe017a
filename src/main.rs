use anyhow::{anyhow, Context};
use chrono::{DateTime, FixedOffset, Utc};
use env_logger::Builder;
use log::LevelFilter;
use pairscan::config::PipelineConfig;
use pairscan::pipeline::{prepare_panel, run};
use pairscan::ports::panel_file::load_price_panel;
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::str::FromStr;

fn init_logging() -> anyhow::Result<()> {
    // Initialize logging with local timezone
    let offset_seconds = env::var("TIMEZONE_OFFSET")
        .unwrap_or_else(|_| "3600".to_string())
        .parse::<i32>()
        .context("Invalid TIMEZONE_OFFSET")?;
    let offset = FixedOffset::east_opt(offset_seconds)
        .ok_or_else(|| anyhow!("TIMEZONE_OFFSET out of range: {}", offset_seconds))?;
    Builder::from_default_env()
        .format(move |buf, record| {
            let utc_now: DateTime<Utc> = Utc::now();
            let local_now = utc_now.with_timezone(&offset);
            writeln!(
                buf,
                "{} [{}] - {}",
                local_now.format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            LevelFilter::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
                .unwrap_or(LevelFilter::Info),
        )
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    log::info!("Starting pair scan...");

    let cfg = PipelineConfig::from_env_or_yaml().context("invalid pairscan config")?;
    let panel_path = cfg
        .price_panel_file
        .as_deref()
        .ok_or_else(|| anyhow!("PRICE_PANEL_FILE (or price_panel_file) must be set"))?;
    let prices = load_price_panel(panel_path)?;
    let prices = prepare_panel(&prices, &cfg)?;
    let report = run(&prices, &cfg)?;

    match cfg.report_file.as_deref() {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create report file {}", path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writer.flush()?;
            log::info!("Wrote report to {}", path);
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writeln!(writer)?;
        }
    }
    log::info!(
        "{} of {} ranked pairs accepted, {} excluded",
        report.accepted_pairs.len(),
        report.ranked_pairs.len(),
        report.failures.len()
    );
    Ok(())
}
