/// Byte and line level access to the receiver's serial port
use log::debug;
use serialport::{ClearBuffer, FlowControl, SerialPort};
use std::io::{self, Read, Write};
use std::mem;
use std::time::Duration;

/// Read timeout of the serial port; a line read returns empty after this.
pub const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// What the session needs from the link to the receiver.
///
/// Closing is done by dropping the transport.
pub trait Transport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Bytes up to and including `\n`, or whatever arrived before the read
    /// timeout (possibly nothing).
    fn read_line(&mut self) -> io::Result<Vec<u8>>;

    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Up to `n` bytes; fewer if the read times out.
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>>;

    /// Discard everything received but not yet read
    fn flush_input(&mut self) -> io::Result<()>;
}

/// Bytes read from a port but not yet handed out. The port is read in
/// chunks, so a chunk can end mid-line or carry more than one line.
#[derive(Debug, Default)]
struct PendingBytes {
    buf: Vec<u8>,
}

impl PendingBytes {
    /// One read from the port into the buffer. Returns false on timeout or
    /// end of stream.
    fn fill<R: Read + ?Sized>(&mut self, port: &mut R) -> io::Result<bool> {
        let mut chunk = [0u8; 64];
        match port.read(&mut chunk) {
            Ok(0) => Ok(false),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_line<R: Read + ?Sized>(&mut self, port: &mut R) -> io::Result<Vec<u8>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                return Ok(self.buf.drain(..=pos).collect());
            }
            if !self.fill(port)? {
                return Ok(mem::take(&mut self.buf));
            }
        }
    }

    fn read<R: Read + ?Sized>(&mut self, port: &mut R, n: usize) -> io::Result<Vec<u8>> {
        while self.buf.len() < n {
            if !self.fill(port)? {
                break;
            }
        }
        let take = n.min(self.buf.len());
        Ok(self.buf.drain(..take).collect())
    }

    /// Buffered bytes plus `waiting` still held by the port
    fn available(&self, waiting: u32) -> usize {
        self.buf.len() + waiting as usize
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

pub struct SerialTransport {
    name: String,
    port: Box<dyn SerialPort>,
    pending: PendingBytes,
}

impl SerialTransport {
    pub fn open(path: &str, baudrate: u32) -> io::Result<Self> {
        debug!("open serial port {}", path);
        let port = serialport::new(path, baudrate)
            .timeout(READ_TIMEOUT)
            .flow_control(FlowControl::None)
            .open()?;

        Ok(SerialTransport {
            name: path.to_string(),
            port,
            pending: PendingBytes::default(),
        })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        self.pending.read_line(&mut *self.port)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let waiting = self.port.bytes_to_read()?;
        Ok(self.pending.available(waiting))
    }

    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        self.pending.read(&mut *self.port, n)
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        debug!("close serial port {}", self.name);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Serves one scripted chunk per read, then times out like an idle port
    struct ChunkedPort {
        chunks: VecDeque<io::Result<Vec<u8>>>,
        reads: usize,
    }

    impl ChunkedPort {
        fn new(chunks: &[&str]) -> Self {
            ChunkedPort {
                chunks: chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect(),
                reads: 0,
            }
        }
    }

    impl Read for ChunkedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "idle")),
            }
        }
    }

    #[test]
    fn test_two_lines_in_one_chunk() {
        let mut port = ChunkedPort::new(&["W 1 3.5 270 -62\nT 1 12.5 80 -60\n"]);
        let mut pending = PendingBytes::default();

        assert_eq!(pending.read_line(&mut port).unwrap(), b"W 1 3.5 270 -62\n");
        assert_eq!(pending.read_line(&mut port).unwrap(), b"T 1 12.5 80 -60\n");
        // The second line came from the buffer, not another read
        assert_eq!(port.reads, 1);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut port = ChunkedPort::new(&["R 1 ", "12 -60\r", "\nS 1"]);
        let mut pending = PendingBytes::default();

        assert_eq!(pending.read_line(&mut port).unwrap(), b"R 1 12 -60\r\n");
        assert_eq!(pending.available(0), 3);
    }

    #[test]
    fn test_partial_line_returned_on_timeout() {
        let mut port = ChunkedPort::new(&["B 22.1 10"]);
        let mut pending = PendingBytes::default();

        assert_eq!(pending.read_line(&mut port).unwrap(), b"B 22.1 10");
        assert_eq!(pending.available(0), 0);
        assert!(pending.read_line(&mut port).unwrap().is_empty());
    }

    #[test]
    fn test_partial_line_returned_at_end_of_stream() {
        let mut port = Cursor::new(b"first\nsecond".to_vec());
        let mut pending = PendingBytes::default();

        assert_eq!(pending.read_line(&mut port).unwrap(), b"first\n");
        assert_eq!(pending.read_line(&mut port).unwrap(), b"second");
        assert!(pending.read_line(&mut port).unwrap().is_empty());
    }

    #[test]
    fn test_read_uses_buffered_bytes_first() {
        let mut port = ChunkedPort::new(&["ab\ncd", "ef"]);
        let mut pending = PendingBytes::default();
        pending.read_line(&mut port).unwrap();

        assert_eq!(pending.read(&mut port, 3).unwrap(), b"cde");
        assert_eq!(pending.available(0), 1);
        assert_eq!(pending.read(&mut port, 1).unwrap(), b"f");
        assert_eq!(port.reads, 2);
    }

    #[test]
    fn test_read_returns_fewer_on_timeout() {
        let mut port = ChunkedPort::new(&["?"]);
        let mut pending = PendingBytes::default();

        assert_eq!(pending.read(&mut port, 10).unwrap(), b"?");
        assert!(pending.read(&mut port, 1).unwrap().is_empty());
    }

    #[test]
    fn test_available_counts_buffer_and_port() {
        let mut port = ChunkedPort::new(&["x1\nx2"]);
        let mut pending = PendingBytes::default();
        assert_eq!(pending.available(4), 4);

        pending.read_line(&mut port).unwrap();
        assert_eq!(pending.available(0), 2);
        assert_eq!(pending.available(5), 7);
    }

    #[test]
    fn test_clear_drops_buffered_bytes() {
        let mut port = ChunkedPort::new(&["o1\r\nleftover"]);
        let mut pending = PendingBytes::default();
        pending.read_line(&mut port).unwrap();

        pending.clear();
        assert_eq!(pending.available(0), 0);
        assert!(pending.read_line(&mut port).unwrap().is_empty());
    }

    #[test]
    fn test_port_errors_are_returned() {
        let mut port = ChunkedPort::new(&["partial"]);
        port.chunks
            .push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        let mut pending = PendingBytes::default();

        let err = pending.read_line(&mut port).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        // What arrived before the failure is kept for the next read
        assert_eq!(pending.available(0), 7);
    }
}
