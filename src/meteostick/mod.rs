pub mod driver;
pub mod encoder;
pub mod parser;
pub mod rain;
pub mod rf_stats;
pub mod session;
pub mod transport;

pub use driver::MeteostickDriver;
pub use encoder::{encode_transmitters, sensitivity_to_threshold, SensitivitySetting};
pub use parser::{parse_line, LineParser};
pub use rain::RainAccumulator;
pub use session::{DeviceSession, PollOutcome, SessionSettings, SessionState};
pub use transport::{SerialTransport, Transport};
