/// Conversion of the ISS rain tip counter into rain amounts
use log::debug;

use crate::config::RainBucket;

/// The transmitter's tip counter wraps from 127 back to 0.
const COUNTER_MODULUS: i32 = 128;

/// Tracks the last raw tip counter and yields the tips since the previous call.
#[derive(Debug, Clone)]
pub struct RainAccumulator {
    last_raw_count: Option<u8>,
    mm_per_tip: f64,
}

impl RainAccumulator {
    pub fn new(bucket: RainBucket) -> Self {
        RainAccumulator {
            last_raw_count: None,
            mm_per_tip: bucket.mm_per_tip(),
        }
    }

    /// Number of tips since the previous count. The first call only sets the
    /// baseline and returns 0.
    pub fn apply(&mut self, raw_count: u8) -> i32 {
        let delta = match self.last_raw_count {
            Some(last) => {
                let mut delta = i32::from(raw_count) - i32::from(last);
                if delta < 0 {
                    delta += COUNTER_MODULUS;
                }
                delta
            }
            None => 0,
        };
        self.last_raw_count = Some(raw_count);

        debug!(
            "rain_count={} last_rain_count={:?} delta={}",
            raw_count, self.last_raw_count, delta
        );
        delta
    }

    /// Rain in mm since the previous count
    pub fn rain_mm(&mut self, raw_count: u8) -> f64 {
        f64::from(self.apply(raw_count)) * self.mm_per_tip
    }

    pub fn last_raw_count(&self) -> Option<u8> {
        self.last_raw_count
    }
}
