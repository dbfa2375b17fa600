/// Per-channel RF signal statistics for tuning the receiver sensitivity
use log::debug;
use std::time::{Duration, Instant};

use crate::config::ChannelConfig;

pub const REPORT_INTERVAL: Duration = Duration::from_secs(300);

const CHANNELS: usize = 9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub min: i32,
    pub max: i32,
    pub sum: i64,
    pub count: u32,
    pub last: i32,
}

impl ChannelStats {
    pub fn average(&self) -> i32 {
        if self.count == 0 {
            0
        } else {
            (self.sum / i64::from(self.count)) as i32
        }
    }
}

#[derive(Debug, Clone)]
pub struct RfStats {
    channels: [ChannelStats; CHANNELS],
    started: Instant,
}

impl Default for RfStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RfStats {
    pub fn new() -> Self {
        RfStats {
            channels: [ChannelStats::default(); CHANNELS],
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, channel: u8, signal: i32) {
        let Some(stats) = self.channels.get_mut(usize::from(channel)) else {
            return;
        };
        if stats.count == 0 {
            stats.min = signal;
            stats.max = signal;
        } else {
            stats.min = stats.min.min(signal);
            stats.max = stats.max.max(signal);
        }
        stats.sum += i64::from(signal);
        stats.count += 1;
        stats.last = signal;
    }

    pub fn channel(&self, channel: u8) -> Option<&ChannelStats> {
        self.channels.get(usize::from(channel))
    }

    pub fn is_due(&self) -> bool {
        self.started.elapsed() >= REPORT_INTERVAL
    }

    /// One row per configured station: max, min, average, last, count
    pub fn summary(&self, stations: &ChannelConfig) -> Vec<String> {
        [
            ("iss", stations.iss),
            ("wind", stations.anemometer),
            ("leaf_soil", stations.leaf_soil),
            ("temp_hum_1", stations.temp_hum_1),
            ("temp_hum_2", stations.temp_hum_2),
        ]
        .iter()
        .filter(|(_, ch)| *ch > 0)
        .filter_map(|(label, ch)| {
            self.channel(*ch).map(|s| {
                format!(
                    "{:<10} {:5} {:5} {:5} {:5} {:5}",
                    label,
                    s.max,
                    s.min,
                    s.average(),
                    s.last,
                    s.count
                )
            })
        })
        .collect()
    }

    pub fn report(&self, stations: &ChannelConfig) {
        debug!("RF summary (RF values in dB)");
        debug!("Station      max   min   avg  last count");
        for row in self.summary(stations) {
            debug!("{}", row);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
