use std::borrow::Cow;
use std::collections::BTreeMap;

use time::OffsetDateTime;

/// Where a line came from: the receiver itself or one of the radio transmitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    BaseStation,
    Transmitter { channel: u8, rf_signal: i32 },
}

/// Transmitter unit a battery flag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatteryUnit {
    Iss,
    Anemometer,
    SoilLeaf,
    TempHum1,
    TempHum2,
}

/// One decoded observation. Units are metric: °C, hPa, m/s, degrees, %,
/// cbar, W/m².
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    InTemp(f64),
    Pressure(f64),
    PctGood(f64),
    WindSpeed(f64),
    WindDir(f64),
    Temperature(f64),
    Humidity(f64),
    Temp1(f64),
    Humid1(f64),
    Temp2(f64),
    Humid2(f64),
    LeafWetness { sensor: u8, value: f64 },
    SoilMoisture { sensor: u8, value: f64 },
    SoilTemp { sensor: u8, value: f64 },
    /// Raw rain bucket tip counter, not an amount
    RainCount(u8),
    SolarRadiation(f64),
    Uv(f64),
    SolarPower(f64),
    Battery { unit: BatteryUnit, low: bool },
}

impl Observation {
    /// Observation name as used in sensor maps, e.g. `soil_temp_2`
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Observation::InTemp(_) => "in_temp".into(),
            Observation::Pressure(_) => "pressure".into(),
            Observation::PctGood(_) => "pct_good".into(),
            Observation::WindSpeed(_) => "wind_speed".into(),
            Observation::WindDir(_) => "wind_dir".into(),
            Observation::Temperature(_) => "temperature".into(),
            Observation::Humidity(_) => "humidity".into(),
            Observation::Temp1(_) => "temp_1".into(),
            Observation::Humid1(_) => "humid_1".into(),
            Observation::Temp2(_) => "temp_2".into(),
            Observation::Humid2(_) => "humid_2".into(),
            Observation::LeafWetness { sensor, .. } => format!("leaf_wetness_{}", sensor).into(),
            Observation::SoilMoisture { sensor, .. } => format!("soil_moisture_{}", sensor).into(),
            Observation::SoilTemp { sensor, .. } => format!("soil_temp_{}", sensor).into(),
            Observation::RainCount(_) => "rain_count".into(),
            Observation::SolarRadiation(_) => "solar_radiation".into(),
            Observation::Uv(_) => "uv".into(),
            Observation::SolarPower(_) => "solar_power".into(),
            Observation::Battery { unit, .. } => match unit {
                BatteryUnit::Iss => "bat_iss".into(),
                BatteryUnit::Anemometer => "bat_anemometer".into(),
                BatteryUnit::SoilLeaf => "bat_soil_leaf".into(),
                BatteryUnit::TempHum1 => "bat_th_1".into(),
                BatteryUnit::TempHum2 => "bat_th_2".into(),
            },
        }
    }

    /// Numeric value; battery flags are 1.0 when low
    pub fn value(&self) -> f64 {
        match *self {
            Observation::InTemp(v)
            | Observation::Pressure(v)
            | Observation::PctGood(v)
            | Observation::WindSpeed(v)
            | Observation::WindDir(v)
            | Observation::Temperature(v)
            | Observation::Humidity(v)
            | Observation::Temp1(v)
            | Observation::Humid1(v)
            | Observation::Temp2(v)
            | Observation::Humid2(v)
            | Observation::SolarRadiation(v)
            | Observation::Uv(v)
            | Observation::SolarPower(v) => v,
            Observation::LeafWetness { value, .. }
            | Observation::SoilMoisture { value, .. }
            | Observation::SoilTemp { value, .. } => value,
            Observation::RainCount(count) => f64::from(count),
            Observation::Battery { low, .. } => {
                if low {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// The decoded content of one line from the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub source: Source,
    pub observations: Vec<Observation>,
}

impl Reading {
    /// Transmitter channel, 0 for the base station
    pub fn channel(&self) -> u8 {
        match self.source {
            Source::BaseStation => 0,
            Source::Transmitter { channel, .. } => channel,
        }
    }

    /// Received signal strength in dB, 0 for the base station
    pub fn rf_signal(&self) -> i32 {
        match self.source {
            Source::BaseStation => 0,
            Source::Transmitter { rf_signal, .. } => rf_signal,
        }
    }

    /// Look up an observation value by name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.observations
            .iter()
            .find(|obs| obs.name() == name)
            .map(Observation::value)
    }

    pub fn rain_count(&self) -> Option<u8> {
        self.observations.iter().find_map(|obs| match obs {
            Observation::RainCount(count) => Some(*count),
            _ => None,
        })
    }
}

/// A reading translated to external field names, ready for a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopPacket {
    pub date_time: OffsetDateTime,
    pub fields: BTreeMap<String, f64>,
}

impl LoopPacket {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
