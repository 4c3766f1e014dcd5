//! Wavefinder operator application
//!
//! ```bash
//! wavefinder --config config/wavefinder.toml
//! wavefinder --simulate --log-level debug
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use wavefinder::config::{AppConfig, DEFAULT_CONFIG_PATH};
use wavefinder::gui::WavefinderApp;
use wavefinder::hardware::{GalilAdapter, Monochromator, SimulatedMonochromator};
use wavefinder::logging;
use wavefinder::transport::{MockConnector, MockTransport, TcpConnector};

#[derive(Parser, Debug)]
#[command(name = "wavefinder", version, about = "Monochromator and gimbal control panels")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use simulated devices instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Override the configured log level
    #[arg(long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_from(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.application.log_level = level;
    }

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    logging::init(&config.application.log_level, args.json_logs)?;
    tracing::info!(
        config = %args.config.display(),
        simulate = args.simulate,
        "Starting {}",
        config.application.name
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("wavefinder-io")
        .build()
        .context("Failed to start the async runtime")?;

    // no monochromator driver is wired in yet, so the panel always runs against the simulation
    let monochromator: Arc<dyn Monochromator> =
        Arc::new(SimulatedMonochromator::from_config(&config.monochromator));

    let adapter = match &config.galil {
        Some(galil) => {
            let axis_names = galil.axis_names();
            let connected = if args.simulate {
                let channels: String = galil.axes.iter().map(|a| a.channel.as_str()).collect();
                let connector = MockConnector::new(MockTransport::with_axes(&channels));
                runtime.block_on(GalilAdapter::connect(&connector, &galil.address, &axis_names))
            } else {
                let connector = TcpConnector::new(galil.timeout());
                runtime.block_on(GalilAdapter::connect(&connector, &galil.address, &axis_names))
            };
            let adapter = connected.with_context(|| {
                format!("Failed to connect to Galil controller at {}", galil.address)
            })?;
            Some(Arc::new(adapter))
        }
        None => {
            tracing::info!("No [galil] section configured, gimbal panel disabled");
            None
        }
    };

    let app = WavefinderApp::start(&config, runtime.handle().clone(), monochromator, adapter);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([520.0, 420.0])
            .with_min_inner_size([360.0, 280.0])
            .with_title(&config.application.name),
        ..Default::default()
    };

    eframe::run_native(
        &config.application.name,
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("GUI error: {e}"))?;

    tracing::info!("Exited cleanly");
    Ok(())
}
