use log::{info, warn};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_RF_SENSITIVITY: i32 = 90;
const DEFAULT_MAX_TRIES: u32 = 10;
const DEFAULT_RETRY_WAIT_SECS: u64 = 10;
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

const DEFAULT_SENSOR_MAP: &[(&str, &str)] = &[
    ("pressure", "pressure"),
    ("in_temp", "inTemp"),
    ("wind_speed", "windSpeed"),
    ("wind_dir", "windDir"),
    ("temperature", "outTemp"),
    ("humidity", "outHumidity"),
    ("rain_count", "rain"),
    ("solar_radiation", "radiation"),
    ("uv", "UV"),
    ("pct_good", "rxCheckPercent"),
    ("solar_power", "extraTemp3"),
    ("soil_temp_1", "soilTemp1"),
    ("soil_temp_2", "soilTemp2"),
    ("soil_temp_3", "soilTemp3"),
    ("soil_temp_4", "soilTemp4"),
    ("soil_moisture_1", "soilMoist1"),
    ("soil_moisture_2", "soilMoist2"),
    ("soil_moisture_3", "soilMoist3"),
    ("soil_moisture_4", "soilMoist4"),
    ("leaf_wetness_1", "leafWet1"),
    ("leaf_wetness_2", "leafWet2"),
    ("temp_1", "extraTemp1"),
    ("temp_2", "extraTemp2"),
    ("humid_1", "extraHumid1"),
    ("humid_2", "extraHumid2"),
    ("bat_iss", "txBatteryStatus"),
    ("bat_anemometer", "windBatteryStatus"),
    ("bat_soil_leaf", "rainBatteryStatus"),
    ("bat_th_1", "outTempBatteryStatus"),
    ("bat_th_2", "inTempBatteryStatus"),
];

/// Radio band used between the transmitters and the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyBand {
    /// 915 MHz
    Us,
    /// 868.3 MHz
    Eu,
    /// 915 MHz with Australian hopping table
    Au,
}

impl FrequencyBand {
    /// Anything other than `EU` or `AU` selects the US band.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "EU" => FrequencyBand::Eu,
            "AU" => FrequencyBand::Au,
            "US" => FrequencyBand::Us,
            other => {
                warn!("Unknown frequency '{}', defaulting to US", other);
                FrequencyBand::Us
            }
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            FrequencyBand::Us => "US",
            FrequencyBand::Eu => "EU",
            FrequencyBand::Au => "AU",
        }
    }
}

/// Rain gauge bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RainBucket {
    /// 0.01 inch per tip
    Imperial,
    /// 0.2 mm per tip
    Metric,
}

impl RainBucket {
    pub fn from_type(bucket_type: u8) -> Result<Self, ConfigError> {
        match bucket_type {
            0 => Ok(RainBucket::Imperial),
            1 => Ok(RainBucket::Metric),
            other => Err(ConfigError::InvalidRainBucket(other)),
        }
    }

    /// Rain amount of one bucket tip in mm
    pub fn mm_per_tip(&self) -> f64 {
        match self {
            RainBucket::Imperial => 0.254,
            RainBucket::Metric => 0.2,
        }
    }
}

/// Receiver channel assigned to each transmitter. 0 means not present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub iss: u8,
    pub anemometer: u8,
    pub leaf_soil: u8,
    pub temp_hum_1: u8,
    pub temp_hum_2: u8,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            iss: 1,
            anemometer: 0,
            leaf_soil: 0,
            temp_hum_1: 0,
            temp_hum_2: 0,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_channel("METEOSTICK_ISS_CHANNEL", self.iss, 1)?;
        check_channel("METEOSTICK_ANEMOMETER_CHANNEL", self.anemometer, 0)?;
        check_channel("METEOSTICK_LEAF_SOIL_CHANNEL", self.leaf_soil, 0)?;
        check_channel("METEOSTICK_TEMP_HUM_1_CHANNEL", self.temp_hum_1, 0)?;
        check_channel("METEOSTICK_TEMP_HUM_2_CHANNEL", self.temp_hum_2, 0)
    }
}

fn check_channel(key: &'static str, value: u8, min: u8) -> Result<(), ConfigError> {
    if (min..=8).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ChannelOutOfRange {
            key,
            value,
            min,
            max: 8,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub port: String,
    pub baudrate: u32,
    pub frequency: FrequencyBand,
    pub rf_sensitivity: i32,
    pub channels: ChannelConfig,
    pub rain_bucket: RainBucket,
    pub max_tries: u32,
    pub retry_wait: Duration,
    pub handshake_timeout: Duration,
    /// Observation name -> external field name
    pub sensor_map: HashMap<String, String>,
    pub rf_stats: bool,
}

impl StationConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("METEOSTICK_PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
        let baudrate = number(&lookup, "METEOSTICK_BAUDRATE", DEFAULT_BAUDRATE)?;
        let frequency = lookup("METEOSTICK_FREQUENCY")
            .map(|tag| FrequencyBand::from_tag(&tag))
            .unwrap_or(FrequencyBand::Eu);
        let rf_sensitivity = number(&lookup, "METEOSTICK_RF_SENSITIVITY", DEFAULT_RF_SENSITIVITY)?;

        let channels = ChannelConfig {
            iss: number(&lookup, "METEOSTICK_ISS_CHANNEL", 1)?,
            anemometer: number(&lookup, "METEOSTICK_ANEMOMETER_CHANNEL", 0)?,
            leaf_soil: number(&lookup, "METEOSTICK_LEAF_SOIL_CHANNEL", 0)?,
            temp_hum_1: number(&lookup, "METEOSTICK_TEMP_HUM_1_CHANNEL", 0)?,
            temp_hum_2: number(&lookup, "METEOSTICK_TEMP_HUM_2_CHANNEL", 0)?,
        };
        channels.validate()?;

        let rain_bucket =
            RainBucket::from_type(number(&lookup, "METEOSTICK_RAIN_BUCKET_TYPE", 1)?)?;
        let max_tries = number(&lookup, "METEOSTICK_MAX_TRIES", DEFAULT_MAX_TRIES)?;
        let retry_wait = Duration::from_secs(number(
            &lookup,
            "METEOSTICK_RETRY_WAIT",
            DEFAULT_RETRY_WAIT_SECS,
        )?);
        let handshake_timeout = Duration::from_secs(number(
            &lookup,
            "METEOSTICK_HANDSHAKE_TIMEOUT",
            DEFAULT_HANDSHAKE_TIMEOUT_SECS,
        )?);

        let sensor_map = match lookup("METEOSTICK_SENSOR_MAP") {
            Some(pairs) => parse_sensor_map(&pairs)?,
            None => default_sensor_map(),
        };

        let rf_stats = lookup("METEOSTICK_RF_STATS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(StationConfig {
            port,
            baudrate,
            frequency,
            rf_sensitivity,
            channels,
            rain_bucket,
            max_tries,
            retry_wait,
            handshake_timeout,
            sensor_map,
            rf_stats,
        })
    }

    /// Log the resolved settings
    pub fn log_summary(&self, rf_sensitivity_actual: u32, transmitters: u8) {
        info!("using serial port {}", self.port);
        info!("using baudrate {}", self.baudrate);
        info!("using frequency {}", self.frequency.tag());
        info!(
            "using rf sensitivity {} (-{} dB)",
            self.rf_sensitivity, rf_sensitivity_actual
        );
        info!("using iss_channel {}", self.channels.iss);
        info!("using anemometer_channel {}", self.channels.anemometer);
        info!("using leaf_soil_channel {}", self.channels.leaf_soil);
        info!("using temp_hum_1_channel {}", self.channels.temp_hum_1);
        info!("using temp_hum_2_channel {}", self.channels.temp_hum_2);
        info!(
            "using rain bucket {:?} ({} mm per tip)",
            self.rain_bucket,
            self.rain_bucket.mm_per_tip()
        );
        info!("using transmitters {:02x}", transmitters);

        let mut entries: Vec<_> = self.sensor_map.iter().collect();
        entries.sort();
        info!("sensor map is: {:?}", entries);
    }
}

fn number<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(default),
    }
}

pub fn default_sensor_map() -> HashMap<String, String> {
    DEFAULT_SENSOR_MAP
        .iter()
        .map(|(obs, field)| (obs.to_string(), field.to_string()))
        .collect()
}

/// Parse `observation=field` pairs separated by commas
pub fn parse_sensor_map(pairs: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut map = HashMap::new();

    for pair in pairs.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((obs, field)) if !obs.trim().is_empty() && !field.trim().is_empty() => {
                map.insert(obs.trim().to_string(), field.trim().to_string());
            }
            _ => return Err(ConfigError::InvalidSensorMapEntry(pair.to_string())),
        }
    }

    Ok(map)
}
