//! # Serial Communication Module
//!
//! Handles the GPS receiver's UART.
//!
//! This module handles:
//! - Opening the serial port at the configured baud rate (8N1)
//! - Writing the one-time output format sentence (`$PMTK314`)
//! - Reading raw bytes on a background task and forwarding them in chunks
//!   to the main loop, where the NMEA parser consumes them without blocking

pub mod port_trait;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::sensor::gps::ChannelByteSource;
use crate::sensor::nmea::GPS_OUTPUT_FORMAT;
use port_trait::{SerialPortIO, TokioSerialPort};

/// Read buffer size per serial read
const READ_CHUNK_BYTES: usize = 256;

/// Chunks buffered between the reader task and the main loop
const CHANNEL_DEPTH: usize = 64;

/// GPS serial port handler
pub struct GpsSerial<P: SerialPortIO = TokioSerialPort> {
    port: P,
    device_path: String,
}

impl<P: SerialPortIO> std::fmt::Debug for GpsSerial<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpsSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl GpsSerial {
    /// Open the GPS receiver's serial port
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud` - Receiver baud rate
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Serial`] if the port cannot be opened
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        debug!("Trying to open GPS serial port: {}", path);
        let port = tokio_serial::new(path, baud)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| TelemetryError::Serial(format!("Failed to open {}: {}", path, e)))?;

        info!("Opened GPS receiver at {} ({} baud)", path, baud);
        Ok(Self::with_port(TokioSerialPort::new(port), path))
    }
}

impl<P: SerialPortIO + 'static> GpsSerial<P> {
    /// Wrap an already opened port
    pub fn with_port(port: P, device_path: &str) -> Self {
        Self {
            port,
            device_path: device_path.to_string(),
        }
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Select which sentences the receiver emits (RMC and GGA only)
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Serial`] if the write fails
    pub async fn configure(&mut self) -> Result<()> {
        let sentence = format!("{}\r\n", GPS_OUTPUT_FORMAT);

        self.port
            .write_all(sentence.as_bytes())
            .await
            .map_err(|e| TelemetryError::Serial(format!("Failed to write GPS config: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| TelemetryError::Serial(format!("Failed to flush serial port: {}", e)))?;

        debug!("Sent GPS output format sentence");
        Ok(())
    }

    /// Move the port onto a background reader task
    ///
    /// Returns the byte source for the NMEA parser and the task handle.
    pub fn spawn_reader(self) -> (ChannelByteSource, JoinHandle<u64>) {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let handle = tokio::spawn(read_loop(self.port, self.device_path, tx));
        (ChannelByteSource::new(rx), handle)
    }
}

/// Forward serial bytes until the port closes, fails, or the receiver is gone
///
/// Returns the number of bytes forwarded.
async fn read_loop<P: SerialPortIO>(mut port: P, device_path: String, tx: mpsc::Sender<Bytes>) -> u64 {
    let mut buf = [0u8; READ_CHUNK_BYTES];
    let mut forwarded = 0u64;

    loop {
        match port.read(&mut buf).await {
            Ok(0) => {
                warn!("GPS serial port {} closed", device_path);
                break;
            }
            Ok(n) => {
                if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    debug!("GPS byte consumer dropped, stopping reader");
                    break;
                }
                forwarded += n as u64;
            }
            Err(e) => {
                warn!("GPS serial read failed on {}: {}", device_path, e);
                break;
            }
        }
    }

    forwarded
}

#[cfg(test)]
mod tests {
    use super::port_trait::mocks::MockSerialPort;
    use super::*;
    use crate::sensor::gps::ByteSource;

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = GpsSerial::open("/dev/nonexistent_serial_device_12345", 9600);

        match result {
            Err(TelemetryError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_configure_writes_output_format() {
        let mock = MockSerialPort::new();
        let mut serial = GpsSerial::with_port(mock.clone(), "/dev/mock");

        serial.configure().await.unwrap();

        let written = mock.get_written_data();
        assert_eq!(written.len(), 1);
        assert_eq!(
            written[0],
            b"$PMTK314,0,1,0,1,0,0,0,0,0,0,0,0,0,0,0,0,0*28\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_configure_write_error() {
        let mock = MockSerialPort::new();
        mock.set_write_error(std::io::ErrorKind::BrokenPipe);
        let mut serial = GpsSerial::with_port(mock, "/dev/mock");

        assert!(matches!(serial.configure().await, Err(TelemetryError::Serial(_))));
    }

    #[tokio::test]
    async fn test_reader_forwards_bytes_until_eof() {
        let mock = MockSerialPort::new();
        mock.queue_incoming(b"$GPGGA,");
        mock.queue_incoming(b"123519*");

        let serial = GpsSerial::with_port(mock, "/dev/mock");
        let (mut source, handle) = serial.spawn_reader();

        assert_eq!(handle.await.unwrap(), 14);

        let mut received = Vec::new();
        while let Some(byte) = source.read_byte_if_available() {
            received.push(byte);
        }
        assert_eq!(received, b"$GPGGA,123519*".to_vec());
    }

    #[tokio::test]
    async fn test_reader_stops_on_read_error() {
        let mock = MockSerialPort::new();
        mock.set_read_error(std::io::ErrorKind::TimedOut);

        let serial = GpsSerial::with_port(mock, "/dev/mock");
        let (_source, handle) = serial.spawn_reader();
        assert_eq!(handle.await.unwrap(), 0);
    }

    #[test]
    fn test_debug_hides_port() {
        let serial = GpsSerial::with_port(MockSerialPort::new(), "/dev/mock");
        let debug = format!("{:?}", serial);
        assert!(debug.contains("/dev/mock"));
    }
}
