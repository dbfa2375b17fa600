/// Turns decoded readings into loop packets keyed by external field names
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::config::{ChannelConfig, StationConfig};
use crate::error::SessionError;
use crate::meteostick::rain::RainAccumulator;
use crate::meteostick::rf_stats::RfStats;
use crate::meteostick::session::{DeviceSession, PollOutcome, SessionSettings};
use crate::meteostick::transport::{SerialTransport, Transport};
use crate::models::{LoopPacket, Observation, Reading, Source};

pub struct MeteostickDriver<T: Transport> {
    session: DeviceSession<T>,
    rain: RainAccumulator,
    sensor_map: HashMap<String, String>,
    channels: ChannelConfig,
    rf_stats: Option<RfStats>,
}

impl MeteostickDriver<SerialTransport> {
    /// Open the configured port and run the handshake. Setting `stop` makes
    /// the driver give up its waits with `SessionError::Stopped`.
    pub fn open(config: &StationConfig, stop: Arc<AtomicBool>) -> Result<Self, SessionError> {
        let transport = SerialTransport::open(&config.port, config.baudrate)?;
        let mut driver = Self::new(transport, config);
        driver.session.set_stop_flag(stop);
        driver.configure()?;
        Ok(driver)
    }
}

impl<T: Transport> MeteostickDriver<T> {
    pub fn new(transport: T, config: &StationConfig) -> Self {
        MeteostickDriver {
            session: DeviceSession::new(transport, SessionSettings::from_config(config)),
            rain: RainAccumulator::new(config.rain_bucket),
            sensor_map: config.sensor_map.clone(),
            channels: config.channels,
            rf_stats: config.rf_stats.then(RfStats::new),
        }
    }

    pub fn configure(&mut self) -> Result<(), SessionError> {
        self.session.configure()
    }

    pub fn session(&self) -> &DeviceSession<T> {
        &self.session
    }

    /// Read the next line. `Ok(None)` when it produced no reading; only
    /// retry exhaustion on the transport is returned as an error.
    pub fn next_packet(&mut self) -> Result<Option<LoopPacket>, SessionError> {
        let reading = match self.session.poll()? {
            PollOutcome::Reading(reading) => reading,
            PollOutcome::NoReading | PollOutcome::Diagnostic(_) => return Ok(None),
        };
        debug!("data: {:?}", reading);

        if let Some(stats) = self.rf_stats.as_mut() {
            if let Source::Transmitter { channel, rf_signal } = reading.source {
                stats.record(channel, rf_signal);
            }
            if stats.is_due() {
                stats.report(&self.channels);
                stats.reset();
            }
        }

        let packet = self.to_packet(&reading);
        debug!("packet: {:?}", packet);
        Ok(Some(packet))
    }

    /// Map observations to external fields. The rain counter always goes
    /// through the accumulator so the baseline stays current, even when no
    /// field is mapped for it.
    pub fn to_packet(&mut self, reading: &Reading) -> LoopPacket {
        let mut fields = BTreeMap::new();

        for obs in &reading.observations {
            let value = match obs {
                Observation::RainCount(count) => self.rain.rain_mm(*count),
                other => other.value(),
            };
            if let Some(field) = self.sensor_map.get(&*obs.name()) {
                fields.insert(field.clone(), value);
            }
        }

        LoopPacket {
            date_time: OffsetDateTime::now_utc(),
            fields,
        }
    }
}
