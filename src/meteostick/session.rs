/// Configuration handshake and line reading for a Meteostick receiver
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::config::{ChannelConfig, FrequencyBand, StationConfig};
use crate::error::{ParseError, SessionError};
use crate::meteostick::encoder::sensitivity_to_threshold;
use crate::meteostick::parser::LineParser;
use crate::meteostick::transport::Transport;
use crate::models::Reading;

// Receiver command set
const CMD_RESET: &str = "r\n";
const CMD_FILTER_CHANNEL_1: &str = "f1\r";
const CMD_MACHINE_READABLE: &str = "o1\r";

/// The receiver prints this once it has restarted
const RESET_PROMPT: u8 = b'?';

const SETTLE_DELAY: Duration = Duration::from_millis(200);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Longest stretch a retry wait sleeps before looking at the stop flag
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStep {
    Threshold,
    Transmitters,
    Filter,
    OutputMode,
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Resetting,
    Configuring(ConfigStep),
    Streaming,
}

/// Result of reading one line while streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Reading(Reading),
    /// Timeout, status line or incomplete record
    NoReading,
    /// The line could not be decoded; reading continues with the next one
    Diagnostic(ParseError),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub rf_threshold: u32,
    pub transmitters: u8,
    pub frequency: FrequencyBand,
    pub channels: ChannelConfig,
    pub max_tries: u32,
    pub retry_wait: Duration,
    /// Upper bound on the wait for the reset prompt
    pub handshake_timeout: Duration,
    /// Pause after each command before collecting the echo
    pub settle_delay: Duration,
    /// Pause between checks for the reset prompt
    pub poll_interval: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &StationConfig) -> Self {
        SessionSettings {
            rf_threshold: sensitivity_to_threshold(config.rf_sensitivity).threshold,
            transmitters: config.channels.transmitter_mask(),
            frequency: config.frequency,
            channels: config.channels,
            max_tries: config.max_tries,
            retry_wait: config.retry_wait,
            handshake_timeout: config.handshake_timeout,
            settle_delay: SETTLE_DELAY,
            poll_interval: POLL_INTERVAL,
        }
    }
}

pub fn frequency_command(band: FrequencyBand) -> &'static str {
    match band {
        FrequencyBand::Au => "m2\r",
        FrequencyBand::Eu => "m1\r",
        FrequencyBand::Us => "m0\r",
    }
}

/// Owns the transport for the lifetime of the acquisition.
pub struct DeviceSession<T: Transport> {
    transport: T,
    settings: SessionSettings,
    parser: LineParser,
    state: SessionState,
    stop: Arc<AtomicBool>,
}

impl<T: Transport> DeviceSession<T> {
    pub fn new(transport: T, settings: SessionSettings) -> Self {
        let parser = LineParser::new(&settings.channels);
        DeviceSession {
            transport,
            settings,
            parser,
            state: SessionState::Unconfigured,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a flag that, once set, makes waits in the session give up with
    /// `SessionError::Stopped`.
    pub fn set_stop_flag(&mut self, stop: Arc<AtomicBool>) {
        self.stop = stop;
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Sleep for `wait`, waking early if the stop flag is set. Returns false
    /// when stopped.
    fn pause(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            if self.stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            sleep((deadline - now).min(STOP_CHECK_INTERVAL));
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reset the receiver and put it into logger mode. Afterwards it sends
    /// records continuously.
    pub fn configure(&mut self) -> Result<(), SessionError> {
        debug!("set station to logger mode");
        self.reset()?;

        self.state = SessionState::Configuring(ConfigStep::Threshold);
        self.send_command(&format!("x{}\r", self.settings.rf_threshold))?;

        self.state = SessionState::Configuring(ConfigStep::Transmitters);
        self.send_command(&format!("t{}\r", self.settings.transmitters))?;

        self.state = SessionState::Configuring(ConfigStep::Filter);
        self.send_command(CMD_FILTER_CHANNEL_1)?;

        self.state = SessionState::Configuring(ConfigStep::OutputMode);
        self.send_command(CMD_MACHINE_READABLE)?;

        self.state = SessionState::Configuring(ConfigStep::Frequency);
        self.send_command(frequency_command(self.settings.frequency))?;

        self.state = SessionState::Streaming;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Resetting;
        self.transport.flush_input()?;
        self.transport.write(CMD_RESET.as_bytes())?;

        let started = Instant::now();
        let timeout = self.settings.handshake_timeout;
        let mut response = Vec::new();
        'wait: loop {
            if !self.pause(self.settings.poll_interval) {
                return Err(SessionError::Stopped);
            }
            // A device that never stops talking must not hold us past the deadline
            while started.elapsed() < timeout && self.transport.bytes_available()? > 0 {
                let bytes = self.transport.read(1)?;
                match bytes.first() {
                    Some(&RESET_PROMPT) => break 'wait,
                    Some(&b) => response.push(b),
                    None => break,
                }
            }
            if started.elapsed() >= timeout {
                let received = String::from_utf8_lossy(&response).into_owned();
                error!("no reset prompt from device, received: {:?}", received);
                return Err(SessionError::SentinelTimeout {
                    waited: started.elapsed(),
                    received,
                });
            }
        }

        let response = String::from_utf8_lossy(&response);
        info!(
            "cmd: {:?}: {}",
            CMD_RESET,
            response.split('\n').next().unwrap_or_default().trim()
        );
        debug!("full response to reset: {:?}", response);

        // Discard whatever the device prints after the prompt
        sleep(self.settings.settle_delay);
        self.transport.flush_input()?;
        Ok(())
    }

    /// Send one command and log the echo. The receiver has no
    /// acknowledgement, so the echo is not checked.
    fn send_command(&mut self, cmd: &str) -> Result<String, SessionError> {
        self.transport.write(cmd.as_bytes())?;
        sleep(self.settings.settle_delay);
        let waiting = self.transport.bytes_available()?;
        let echo = self.transport.read(waiting)?;
        let echo = String::from_utf8_lossy(&echo).trim().to_string();
        info!("cmd: {:?}: {}", cmd, echo);
        self.transport.flush_input()?;
        Ok(echo)
    }

    /// Read one trimmed line, retrying transport errors up to `max_tries`
    /// times with `retry_wait` in between. An empty string means the read
    /// timed out. Setting the stop flag cuts the retry wait short.
    pub fn read_line_with_retry(&mut self) -> Result<String, SessionError> {
        let max_tries = self.settings.max_tries;
        for attempt in 1..=max_tries {
            if self.stopped() {
                return Err(SessionError::Stopped);
            }
            match self.transport.read_line() {
                Ok(buf) => {
                    if !buf.is_empty() {
                        trace!(
                            "station said: {}",
                            buf.iter()
                                .map(|b| format!("{:02X}", b))
                                .collect::<Vec<_>>()
                                .join(" ")
                        );
                    }
                    return Ok(String::from_utf8_lossy(&buf).trim().to_string());
                }
                Err(e) => {
                    warn!(
                        "Failed attempt {} of {} to get readings: {}",
                        attempt, max_tries, e
                    );
                    if !self.pause(self.settings.retry_wait) {
                        return Err(SessionError::Stopped);
                    }
                }
            }
        }

        error!("Max retries ({}) exceeded for readings", max_tries);
        Err(SessionError::RetriesExceeded { max_tries })
    }

    /// Read and decode the next line.
    pub fn poll(&mut self) -> Result<PollOutcome, SessionError> {
        if self.state != SessionState::Streaming {
            return Err(SessionError::NotStreaming);
        }

        let line = self.read_line_with_retry()?;
        debug!("readings: {:?}", line);
        Ok(match self.parser.parse(&line) {
            Ok(Some(reading)) => PollOutcome::Reading(reading),
            Ok(None) => PollOutcome::NoReading,
            Err(e) => PollOutcome::Diagnostic(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meteostick::transport::mock::ScriptedTransport;
    use std::io;

    fn settings() -> SessionSettings {
        SessionSettings {
            rf_threshold: 180,
            transmitters: 0b101,
            frequency: FrequencyBand::Eu,
            channels: ChannelConfig::default(),
            max_tries: 3,
            retry_wait: Duration::ZERO,
            handshake_timeout: Duration::from_secs(1),
            settle_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
        }
    }

    fn device() -> ScriptedTransport {
        ScriptedTransport::with_replies(&[
            "\r\nMeteostick Version 2.3b1\r\n?",
            "x180\r\n",
            "t5\r\n",
            "f1\r\n",
            "o1\r\n",
            "m1\r\n",
        ])
    }

    fn streaming_session(transport: ScriptedTransport) -> DeviceSession<ScriptedTransport> {
        let mut session = DeviceSession::new(transport, settings());
        session.configure().unwrap();
        session
    }

    #[test]
    fn test_handshake_command_sequence() {
        let mut session = DeviceSession::new(device(), settings());
        assert_eq!(session.state(), SessionState::Unconfigured);

        session.configure().unwrap();

        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(
            session.transport().written_commands(),
            vec!["r\n", "x180\r", "t5\r", "f1\r", "o1\r", "m1\r"]
        );
        // Before reset, after reset, and after each of the five commands
        assert_eq!(session.transport().flushes, 7);
    }

    #[test]
    fn test_frequency_commands() {
        assert_eq!(frequency_command(FrequencyBand::Au), "m2\r");
        assert_eq!(frequency_command(FrequencyBand::Eu), "m1\r");
        assert_eq!(frequency_command(FrequencyBand::Us), "m0\r");
    }

    #[test]
    fn test_missing_reset_prompt_times_out() {
        let transport = ScriptedTransport::with_replies(&["garbage without prompt"]);
        let mut session = DeviceSession::new(
            transport,
            SessionSettings {
                handshake_timeout: Duration::from_millis(50),
                ..settings()
            },
        );

        match session.configure() {
            Err(SessionError::SentinelTimeout { received, .. }) => {
                assert_eq!(received, "garbage without prompt")
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Resetting);
    }

    /// Always has another byte waiting and never sends the prompt
    struct ChattyDevice;

    impl Transport for ChattyDevice {
        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn read_line(&mut self) -> io::Result<Vec<u8>> {
            Ok(b"x\n".to_vec())
        }

        fn bytes_available(&mut self) -> io::Result<usize> {
            Ok(1)
        }

        fn read(&mut self, _n: usize) -> io::Result<Vec<u8>> {
            Ok(vec![b'x'])
        }

        fn flush_input(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_endless_output_without_prompt_times_out() {
        let mut session = DeviceSession::new(
            ChattyDevice,
            SessionSettings {
                handshake_timeout: Duration::from_millis(50),
                ..settings()
            },
        );

        let started = Instant::now();
        match session.configure() {
            Err(SessionError::SentinelTimeout { received, .. }) => {
                assert!(!received.is_empty());
                assert!(received.bytes().all(|b| b == b'x'));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_stop_flag_interrupts_retry_wait() {
        let mut transport = device();
        for _ in 0..3 {
            transport.push_error(io::ErrorKind::BrokenPipe);
        }
        let mut session = DeviceSession::new(
            transport,
            SessionSettings {
                retry_wait: Duration::from_secs(60),
                ..settings()
            },
        );
        session.configure().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        session.set_stop_flag(Arc::clone(&stop));
        let stopper = std::thread::spawn(move || {
            sleep(Duration::from_millis(50));
            stop.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        assert!(matches!(session.poll(), Err(SessionError::Stopped)));
        assert!(started.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();
    }

    #[test]
    fn test_stop_flag_checked_before_read() {
        let mut transport = device();
        transport.push_line("R 1 12 -60\n");
        let mut session = streaming_session(transport);

        let stop = Arc::new(AtomicBool::new(true));
        session.set_stop_flag(stop);
        assert!(matches!(session.poll(), Err(SessionError::Stopped)));
    }

    #[test]
    fn test_poll_before_configure() {
        let mut session = DeviceSession::new(ScriptedTransport::default(), settings());
        assert!(matches!(session.poll(), Err(SessionError::NotStreaming)));
    }

    #[test]
    fn test_poll_outcomes() {
        let mut transport = device();
        transport.push_line("W 1 3.5 270 -62\r\n");
        transport.push_line("# status ok\r\n");
        transport.push_line("Z 1 2 3\r\n");
        let mut session = streaming_session(transport);

        match session.poll().unwrap() {
            PollOutcome::Reading(reading) => {
                assert_eq!(reading.channel(), 1);
                assert_eq!(reading.get("wind_speed"), Some(3.5));
            }
            other => panic!("expected reading, got {:?}", other),
        }
        assert_eq!(session.poll().unwrap(), PollOutcome::NoReading);
        assert!(matches!(
            session.poll().unwrap(),
            PollOutcome::Diagnostic(ParseError::UnknownTag { .. })
        ));
        // Script exhausted: the read times out with nothing
        assert_eq!(session.poll().unwrap(), PollOutcome::NoReading);
    }

    #[test]
    fn test_transport_errors_are_retried() {
        let mut transport = device();
        transport.push_error(io::ErrorKind::BrokenPipe);
        transport.push_error(io::ErrorKind::BrokenPipe);
        transport.push_line("R 1 12 -60\n");
        let mut session = streaming_session(transport);

        assert_eq!(session.read_line_with_retry().unwrap(), "R 1 12 -60");
    }

    #[test]
    fn test_retries_exceeded() {
        let mut transport = device();
        for _ in 0..3 {
            transport.push_error(io::ErrorKind::BrokenPipe);
        }
        let mut session = streaming_session(transport);

        assert!(matches!(
            session.poll(),
            Err(SessionError::RetriesExceeded { max_tries: 3 })
        ));
    }

    #[test]
    fn test_settings_from_config() {
        let config = StationConfig::from_lookup(|key| match key {
            "METEOSTICK_RF_SENSITIVITY" => Some("-93".to_string()),
            "METEOSTICK_ANEMOMETER_CHANNEL" => Some("2".to_string()),
            _ => None,
        })
        .unwrap();
        let settings = SessionSettings::from_config(&config);
        assert_eq!(settings.rf_threshold, 190);
        assert_eq!(settings.transmitters, 0b11);
        assert_eq!(settings.frequency, FrequencyBand::Eu);
    }
}
