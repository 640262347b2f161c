// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;
use futuresdr::anyhow::{Context, Result};

use sdr_scan::cli::Cli;
use sdr_scan::config::ScanConfig;
use sdr_scan::report::SignalReport;
use sdr_scan::scanner::ScanEvent;
use sdr_scan::sdr::{list_devices, print_run_params};
use sdr_scan::session::ScanSession;

fn init_logging(level: &str) {
    // RUST_LOG wins over --log-level
    env_logger::Builder::new()
        .parse_filters(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn load_config(cli: &Cli) -> Result<ScanConfig> {
    let mut config = if cli.no_config {
        ScanConfig::default()
    } else {
        match ScanConfig::load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Could not load configuration, using defaults: {e}");
                ScanConfig::default()
            }
        }
    };
    cli.apply(&mut config);
    config.validate()?;

    if cli.save_config {
        config.save()?;
        if let Ok(path) = ScanConfig::config_path() {
            log::info!("Configuration saved to {}", path.display());
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if cli.list_devices {
        let devices = list_devices();
        if devices.is_empty() {
            println!("No RTL-SDR devices found");
        }
        for device in devices {
            println!("{}: {} (serial {})", device.index, device.name, device.serial);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    let source = cli.source_kind(&config)?;
    print_run_params(&config);

    let mut report = SignalReport::open(config.output.as_deref())?;
    let mut session = ScanSession::start(&config, source).context("Failed to start scan")?;

    loop {
        tokio::select! {
            event = session.next_event() => {
                let Some(event) = event else {
                    log::info!("Flowgraph stopped");
                    break;
                };
                report.handle(&event)?;
                if matches!(event, ScanEvent::Finished { .. }) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                session.stop();
                break;
            }
        }
    }

    report.flush()?;
    log::info!("{} signal(s) reported", report.reported());
    tokio::task::spawn_blocking(move || session.join())
        .await
        .context("Failed to join flowgraph thread")??;
    Ok(())
}
