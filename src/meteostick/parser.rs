//! Decoding of the Meteostick machine-readable output lines
//!
//! Each line is a record tag followed by space separated fields:
//!
//! | Tag | Fields | Source |
//! |-----|--------|--------|
//! | `B` | temp pressure [pct_bad%] | receiver (base station) |
//! | `W` | ch speed dir rf [L] | anemometer or ISS |
//! | `T` | ch temp humid rf [L] | ISS or temperature/humidity station |
//! | `L`/`M`/`O` | ch sensor value rf [L] | leaf/soil station |
//! | `R`/`S`/`U`/`P` | ch value rf [L] | ISS (rain, solar, UV, solar power) |
//! | `#` | free text | receiver status |
//!
//! A trailing `L` marks a low transmitter battery.

use log::{error, info};
use std::str::FromStr;

use crate::config::ChannelConfig;
use crate::error::ParseError;
use crate::models::{BatteryUnit, Observation, Reading, Source};

/// Stateless decoder bound to the channel roles of one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineParser {
    iss_channel: u8,
    th1_channel: u8,
    th2_channel: u8,
}

impl LineParser {
    pub fn new(channels: &ChannelConfig) -> Self {
        LineParser {
            iss_channel: channels.iss,
            th1_channel: channels.temp_hum_1,
            th2_channel: channels.temp_hum_2,
        }
    }

    pub fn parse(&self, raw: &str) -> Result<Option<Reading>, ParseError> {
        parse_line(raw, self.iss_channel, self.th1_channel, self.th2_channel)
    }
}

/// Decode one trimmed line.
///
/// Returns `Ok(None)` for lines that carry no reading: empty input, status
/// comments and records with too few fields. Unknown tags and non-numeric
/// fields are reported as `ParseError`.
pub fn parse_line(
    raw: &str,
    iss_channel: u8,
    th1_channel: u8,
    th2_channel: u8,
) -> Result<Option<Reading>, ParseError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let parts: Vec<&str> = raw.split(' ').collect();
    let result = match parts[0] {
        "B" => parse_base_station(raw, &parts),
        "W" | "T" => parse_wind_temp(raw, &parts, iss_channel, th1_channel, th2_channel),
        "L" | "M" | "O" => parse_leaf_soil(raw, &parts),
        "R" | "S" | "U" | "P" => parse_iss_extra(raw, &parts),
        "#" => {
            info!("{}", raw);
            Ok(None)
        }
        tag => Err(ParseError::UnknownTag {
            tag: tag.to_string(),
            line: raw.to_string(),
        }),
    };

    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

fn parse_base_station(raw: &str, parts: &[&str]) -> Result<Option<Reading>, ParseError> {
    if parts.len() < 3 {
        return not_enough_parts("B", raw, parts.len());
    }

    let mut observations = vec![
        Observation::InTemp(number("temperature", parts[1], raw)?),
        Observation::Pressure(number("pressure", parts[2], raw)?),
    ];
    if let Some(bad) = parts.get(3) {
        let pct_bad: f64 = number("percent bad", bad.trim_matches('%'), raw)?;
        observations.push(Observation::PctGood(100.0 - pct_bad));
    }

    Ok(Some(Reading {
        source: Source::BaseStation,
        observations,
    }))
}

fn parse_wind_temp(
    raw: &str,
    parts: &[&str],
    iss_channel: u8,
    th1_channel: u8,
    th2_channel: u8,
) -> Result<Option<Reading>, ParseError> {
    if parts.len() < 5 {
        return not_enough_parts("WT", raw, parts.len());
    }

    let channel: u8 = number("channel", parts[1], raw)?;
    let source = Source::Transmitter {
        channel,
        rf_signal: number("rf signal", parts[4], raw)?,
    };
    let low = battery_low(parts, 5);
    let first: f64 = number("value", parts[2], raw)?;
    let second: f64 = number("value", parts[3], raw)?;

    let observations = if parts[0] == "W" {
        let unit = if iss_channel != 0 && channel == iss_channel {
            BatteryUnit::Iss
        } else {
            BatteryUnit::Anemometer
        };
        vec![
            Observation::Battery { unit, low },
            Observation::WindSpeed(first),
            Observation::WindDir(second),
        ]
    } else if th1_channel != 0 && channel == th1_channel {
        vec![
            Observation::Battery {
                unit: BatteryUnit::TempHum1,
                low,
            },
            Observation::Temp1(first),
            Observation::Humid1(second),
        ]
    } else if th2_channel != 0 && channel == th2_channel {
        vec![
            Observation::Battery {
                unit: BatteryUnit::TempHum2,
                low,
            },
            Observation::Temp2(first),
            Observation::Humid2(second),
        ]
    } else {
        vec![
            Observation::Battery {
                unit: BatteryUnit::Iss,
                low,
            },
            Observation::Temperature(first),
            Observation::Humidity(second),
        ]
    };

    Ok(Some(Reading {
        source,
        observations,
    }))
}

fn parse_leaf_soil(raw: &str, parts: &[&str]) -> Result<Option<Reading>, ParseError> {
    if parts.len() < 5 {
        return not_enough_parts("LMO", raw, parts.len());
    }

    let source = transmitter(raw, parts[1], parts[4])?;
    let sensor: u8 = number("sensor", parts[2], raw)?;
    let value: f64 = number("value", parts[3], raw)?;

    let observation = match parts[0] {
        "L" => Observation::LeafWetness { sensor, value },
        "M" => Observation::SoilMoisture { sensor, value },
        _ => Observation::SoilTemp { sensor, value },
    };

    Ok(Some(Reading {
        source,
        observations: vec![
            Observation::Battery {
                unit: BatteryUnit::SoilLeaf,
                low: battery_low(parts, 5),
            },
            observation,
        ],
    }))
}

fn parse_iss_extra(raw: &str, parts: &[&str]) -> Result<Option<Reading>, ParseError> {
    if parts.len() < 4 {
        return not_enough_parts("RSUP", raw, parts.len());
    }

    let source = transmitter(raw, parts[1], parts[3])?;
    let observation = match parts[0] {
        "R" => Observation::RainCount(number("rain count", parts[2], raw)?),
        "S" => Observation::SolarRadiation(number("value", parts[2], raw)?),
        "U" => Observation::Uv(number("value", parts[2], raw)?),
        _ => Observation::SolarPower(number("value", parts[2], raw)?),
    };

    Ok(Some(Reading {
        source,
        observations: vec![
            Observation::Battery {
                unit: BatteryUnit::Iss,
                low: battery_low(parts, 4),
            },
            observation,
        ],
    }))
}

fn transmitter(raw: &str, channel: &str, rf_signal: &str) -> Result<Source, ParseError> {
    Ok(Source::Transmitter {
        channel: number("channel", channel, raw)?,
        rf_signal: number("rf signal", rf_signal, raw)?,
    })
}

fn battery_low(parts: &[&str], index: usize) -> bool {
    parts.get(index).map_or(false, |flag| *flag == "L")
}

fn not_enough_parts(group: &str, raw: &str, n: usize) -> Result<Option<Reading>, ParseError> {
    info!("{}: not enough parts ({}) in '{}'", group, n, raw);
    Ok(None)
}

fn number<T: FromStr>(field: &'static str, token: &str, raw: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        token: token.to_string(),
        line: raw.to_string(),
    })
}
