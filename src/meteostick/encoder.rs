/// Channel bitmask and RF threshold encoding for the receiver configuration
use crate::config::{ChannelConfig, DEFAULT_RF_SENSITIVITY};

/// Highest sensitivity the receiver accepts, in dB
const MAX_RF_SENSITIVITY: u32 = 125;

/// RF threshold sent to the device together with the sensitivity it represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensitivitySetting {
    /// Device-native threshold, twice the sensitivity
    pub threshold: u32,
    /// Sensitivity in (negative) dB after rounding to a 5 dB step
    pub actual: u32,
}

/// Build the transmitter bitmask: channel N sets bit N-1.
///
/// The ISS is always listened to. The other channels are skipped when 0.
/// Channels above 8 do not fit the receiver's mask and are dropped.
pub fn encode_transmitters(iss: u8, anemometer: u8, leaf_soil: u8, th1: u8, th2: u8) -> u8 {
    let mut transmitters = channel_bit(iss);
    for channel in [anemometer, leaf_soil, th1, th2] {
        if channel != 0 {
            transmitters |= channel_bit(channel);
        }
    }
    transmitters
}

fn channel_bit(channel: u8) -> u8 {
    channel
        .checked_sub(1)
        .and_then(|bit| 1u8.checked_shl(u32::from(bit)))
        .unwrap_or(0)
}

impl ChannelConfig {
    pub fn transmitter_mask(&self) -> u8 {
        encode_transmitters(
            self.iss,
            self.anemometer,
            self.leaf_soil,
            self.temp_hum_1,
            self.temp_hum_2,
        )
    }
}

/// Convert a requested sensitivity (either sign) to the device threshold.
///
/// The magnitude is rounded to the nearest 5 dB with ties going up, using
/// truncating division. Anything above 125 dB falls back to the default.
pub fn sensitivity_to_threshold(requested: i32) -> SensitivitySetting {
    let mut s = ((requested.unsigned_abs() + 2) / 5) * 5;
    if s > MAX_RF_SENSITIVITY {
        s = DEFAULT_RF_SENSITIVITY.unsigned_abs();
    }
    SensitivitySetting {
        threshold: s * 2,
        actual: s,
    }
}
