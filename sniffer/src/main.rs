use anyhow::{Context, Result};
use ccsniff_usb::device::SnifferUSB;
use clap::Parser;
use log::{error, info, warn};
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};
use std::path::PathBuf;
use tokio::signal;

use crate::cli::{Cli, LevelFilter};
use crate::session::SessionError;
use crate::settings::Settings;
use crate::shutdown::Shutdown;
use crate::sink::CaptureSink;

mod capture;
mod cli;
mod session;
mod settings;
mod shutdown;
mod sink;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    CombinedLogger::init(vec![TermLogger::new(
        args.log_level.into(),
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .context("Could not configure the logger")?;

    info!("Starting ccsniff v{}", VERSION);
    let mut settings = Settings::load(&args.config)?;
    if let Some(power) = args.power {
        settings.power = power;
    }
    if args.strict_framing {
        settings.strict_framing = true;
    }

    let output = args.output.unwrap_or_else(default_capture_file);
    info!("Sniffing on channel {}, writing to {}", args.channel, output.display());
    if settings.strict_framing {
        warn!("Strict framing enabled, frames with bad length fields will be dropped");
    }

    let shutdown = Shutdown::new();
    tokio::spawn(await_ctrl_c(shutdown.clone()));

    // The device handle and the capture file live on this one thread for their whole lifetime.
    let worker_shutdown = shutdown.clone();
    let result = tokio::task::spawn_blocking(move || {
        let bring_up = settings.bring_up(args.channel);
        let snaplen = settings.chunk_size as u32;

        session::run(
            || {
                SnifferUSB::open(settings.vendor_id, settings.product_id)
                    .map(|usb| usb.with_timeout(settings.timeout()))
            },
            || CaptureSink::create(&output, snaplen, settings.link_type),
            &bring_up,
            settings.capture(),
            &worker_shutdown,
        )
    })
    .await
    .context("Capture thread panicked")?;

    match result {
        Ok(report) => {
            info!(
                "Captured {} frame(s) on channel {}",
                report.stats.records, report.device.channel
            );
            Ok(())
        }
        Err(e) => {
            match &e {
                SessionError::BringUp(bring_up) => {
                    error!("Sniffer setup failed at step {}", bring_up.step())
                }
                SessionError::Connect(_) => error!("Unable to open the sniffer"),
                _ => error!("Capture aborted"),
            }
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

impl From<LevelFilter> for log::LevelFilter {
    fn from(level: LevelFilter) -> Self {
        match level {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Error => log::LevelFilter::Error,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_capture_file() -> PathBuf {
    PathBuf::from(
        chrono::Local::now()
            .format("ccsniff-%Y%m%d-%H%M%S.pcap")
            .to_string(),
    )
}

async fn await_ctrl_c(shutdown: Shutdown) {
    if signal::ctrl_c().await.is_ok() {
        info!("Stopping capture..");
        shutdown.trigger();
    }
}
