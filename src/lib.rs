//! Meteostick receiver driver: configures the USB receiver for Davis weather
//! station transmitters and decodes its line output into readings.

pub mod config;
pub mod error;
pub mod meteostick;
pub mod models;
pub mod utils;

pub use config::{ChannelConfig, FrequencyBand, RainBucket, StationConfig};
pub use error::{ConfigError, ParseError, SessionError};
pub use models::{BatteryUnit, LoopPacket, Observation, Reading, Source};
