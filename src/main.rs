use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use label_printer_ble::domain::models::{AppEvent, MessageSeverity};
use label_printer_ble::domain::profile;
use label_printer_ble::domain::settings::{Settings, SettingsService};
use label_printer_ble::infrastructure::bluetooth::{
    mock::MockBleHost, protocol, BleHost, PrinterService,
};
use label_printer_ble::infrastructure::logging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "label_printer_ble", version, about = "Send command streams to BLE label printers")]
struct Cli {
    /// Talk to an in-memory printer instead of Bluetooth hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Platform profile (ios, android, ...); defaults to the detected OS
    #[arg(long, global = true, env = "LABEL_PRINTER_PLATFORM")]
    platform: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List printers in range
    Scan {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Send a payload to a printer (the built-in test label by default)
    Print {
        /// Device id to use instead of the first printer found
        #[arg(long)]
        device: Option<String>,
        /// File whose bytes are sent as-is
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Text to send
        #[arg(long)]
        text: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = SettingsService::new()?;
    let _log_guard = logging::init_logger(&settings.get().log_settings)?;

    let platform = profile::query_platform(
        cli.platform
            .as_deref()
            .or(settings.get().platform_override.as_deref()),
    );
    info!(
        "Platform {:?} -> {:?}",
        platform,
        profile::resolve(&platform)
    );

    if cli.simulate {
        let host = MockBleHost::with_printer("SIM:00:00:00:00:01", "JJKY-SIM")
            .with_write_latency(Duration::from_millis(15));
        return run(Arc::new(host), &cli, settings.get(), &platform).await;
    }
    run_hardware(&cli, settings.get(), &platform).await
}

#[cfg(feature = "btleplug")]
async fn run_hardware(cli: &Cli, settings: &Settings, platform: &str) -> Result<()> {
    use label_printer_ble::infrastructure::bluetooth::btleplug_host::BtleplugHost;

    let host = BtleplugHost::new().await?;
    run(Arc::new(host), cli, settings, platform).await
}

#[cfg(not(feature = "btleplug"))]
async fn run_hardware(_cli: &Cli, _settings: &Settings, _platform: &str) -> Result<()> {
    anyhow::bail!("built without Bluetooth hardware support; use --simulate or enable the `btleplug` feature")
}

async fn run<H: BleHost>(
    host: Arc<H>,
    cli: &Cli,
    settings: &Settings,
    platform: &str,
) -> Result<()> {
    let payload = match &cli.command {
        Command::Print { file, text, .. } => Some(load_payload(file.as_deref(), text.as_deref())?),
        Command::Scan { .. } => None,
    };

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut service = PrinterService::new(host, &settings.printer, platform, event_tx);

    service.initialize().await?;
    service.start_discovery().await;

    let result = match (&cli.command, payload) {
        (Command::Scan { seconds }, _) => scan(&mut service, Duration::from_secs(*seconds)).await,
        (Command::Print { device, .. }, payload) => {
            let payload = payload.unwrap_or_default();
            print(&mut service, &mut events, settings, device.as_deref(), &payload).await
        }
    };

    service.shutdown().await;
    while let Ok(event) = events.try_recv() {
        report(event);
    }
    result
}

/// Bytes to print: the file, else the text, else the built-in test label
fn load_payload(file: Option<&Path>, text: Option<&str>) -> Result<Vec<u8>> {
    match (file, text) {
        (Some(path), _) => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        (None, Some(text)) => Ok(text.as_bytes().to_vec()),
        (None, None) => Ok(protocol::TEST_LABEL.as_bytes().to_vec()),
    }
}

async fn scan<H: BleHost>(service: &mut PrinterService<H>, duration: Duration) -> Result<()> {
    tokio::time::sleep(duration).await;
    service.process_events();

    if service.candidate_devices().is_empty() {
        println!(
            "No printers found ({} other devices seen)",
            service.all_devices().len()
        );
    }
    for device in service.candidate_devices() {
        match device.rssi {
            Some(rssi) => println!("{}  {}  {} dBm", device.id, device.name, rssi),
            None => println!("{}  {}", device.id, device.name),
        }
    }
    Ok(())
}

async fn print<H: BleHost>(
    service: &mut PrinterService<H>,
    events: &mut mpsc::UnboundedReceiver<AppEvent>,
    settings: &Settings,
    device: Option<&str>,
    payload: &[u8],
) -> Result<()> {
    if service
        .wait_for_candidate(settings.printer.discovery_timeout())
        .await
        .is_none()
        && device.is_none()
    {
        anyhow::bail!("No printer found");
    }
    service.select_and_connect(device).await?;
    service.stop_discovery().await;

    let send = service.send_bytes(payload);
    tokio::pin!(send);
    let mut cancelled = false;
    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            Some(event) = events.recv() => report(event),
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                warn!("Interrupted, cancelling transfer");
                cancelled = true;
                service.cancel_transfer();
            }
        }
    };

    result?;
    println!("Sent {} bytes", payload.len());
    Ok(())
}

fn report(event: AppEvent) {
    match event {
        AppEvent::LogMessage(status) => match status.severity {
            MessageSeverity::Error => error!("{}", status.message),
            MessageSeverity::Warning => warn!("{}", status.message),
            MessageSeverity::Info | MessageSeverity::Success => info!("{}", status.message),
        },
        AppEvent::TransferProgress { sent, total } => info!("Sent {}/{} bytes", sent, total),
        AppEvent::CandidateFound(device) => info!("Printer found: {} ({})", device.name, device.id),
        AppEvent::ConnectionStatus(status) => info!("Connection: {:?}", status),
        AppEvent::AdapterState(state) => info!("Adapter: {:?}", state),
    }
}
