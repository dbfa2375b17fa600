use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use meteostick_etl::config::StationConfig;
use meteostick_etl::error::SessionError;
use meteostick_etl::meteostick::{sensitivity_to_threshold, MeteostickDriver};
use meteostick_etl::models::LoopPacket;
use meteostick_etl::utils::format_packet;

const PACKET_QUEUE_SIZE: usize = 64;

/// Blocking acquisition loop, run on a worker thread.
///
/// Stops when `stop` is set or the receiving side goes away; dropping the
/// driver closes the serial port.
fn acquire(
    config: StationConfig,
    tx: mpsc::Sender<LoopPacket>,
    stop: Arc<AtomicBool>,
) -> Result<(), SessionError> {
    match stream_packets(&config, &tx, &stop) {
        Ok(()) | Err(SessionError::Stopped) => {
            info!("Acquisition stopped");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn stream_packets(
    config: &StationConfig,
    tx: &mpsc::Sender<LoopPacket>,
    stop: &Arc<AtomicBool>,
) -> Result<(), SessionError> {
    let mut driver = MeteostickDriver::open(config, Arc::clone(stop))?;
    info!("Meteostick configured, reading records");

    while !stop.load(Ordering::Relaxed) && !tx.is_closed() {
        let Some(packet) = driver.next_packet()? else {
            continue;
        };
        if packet.is_empty() {
            debug!("Reading has no mapped fields, skipping");
            continue;
        }
        if tx.blocking_send(packet).is_err() {
            break;
        }
    }
    Ok(())
}

async fn consume(rx: &mut mpsc::Receiver<LoopPacket>) {
    let mut count: u64 = 0;
    while let Some(packet) = rx.recv().await {
        count += 1;
        info!("{}", format_packet(&packet));
    }
    if count == 0 {
        warn!("No packets received from the station!");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    info!("Starting Meteostick data collection service");

    // Load configuration
    let config = match StationConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    let sensitivity = sensitivity_to_threshold(config.rf_sensitivity);
    config.log_summary(sensitivity.actual, config.channels.transmitter_mask());

    let (tx, mut rx) = mpsc::channel(PACKET_QUEUE_SIZE);
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    let worker = tokio::task::spawn_blocking(move || acquire(config, tx, worker_stop));

    // Handle Ctrl+C gracefully
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = stop_tx.send(());
    });

    // Run until the worker ends or the user stops us
    tokio::select! {
        _ = consume(&mut rx) => {}
        _ = &mut stop_rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    // The worker notices within one read timeout, or sooner while it waits
    // between retries
    stop.store(true, Ordering::Relaxed);
    drop(rx);

    match worker.await {
        Ok(Ok(())) => {
            info!("Program completed successfully");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Fatal error: {}", e);
            Err(e.into())
        }
        Err(e) => {
            error!("Acquisition worker failed: {}", e);
            Err(e.into())
        }
    }
}
