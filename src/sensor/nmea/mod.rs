//! # NMEA 0183 Module
//!
//! Incremental parsing of the GPS receiver's serial stream.
//!
//! This module handles:
//! - Byte-at-a-time sentence framing (`$...*hh\r\n`)
//! - XOR checksum validation
//! - Length limits (82-byte sentences, 256-byte accumulation buffer)
//! - Decoding `GGA` and `RMC` sentences into a [`GpsFix`]

pub mod checksum;
pub mod parser;
pub mod sentence;

use thiserror::Error;

pub use parser::{NmeaParser, ParserState, MAX_NMEA_BUFFER_BYTES, MAX_NMEA_MSG_BYTES};
pub use sentence::GpsFix;

/// Receiver configuration: emit only RMC and GGA sentences
pub const GPS_OUTPUT_FORMAT: &str = "$PMTK314,0,1,0,1,0,0,0,0,0,0,0,0,0,0,0,0,0*28";

/// Why a sentence was discarded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NmeaError {
    /// Sentence ran past the maximum sentence length
    #[error("sentence exceeds {limit} bytes")]
    TooLong { limit: usize },

    /// Sentence ran past the accumulation buffer
    #[error("accumulation buffer overflow")]
    BufferOverflow,

    /// A new `$` arrived before the previous sentence finished
    #[error("sentence interrupted by a new start delimiter")]
    Interrupted,

    /// Line ended without a `*hh` checksum
    #[error("sentence has no checksum")]
    MissingChecksum,

    /// Non-hex character in the checksum field
    #[error("invalid checksum digit 0x{0:02X}")]
    BadChecksumDigit(u8),

    /// Checksum field does not match the computed XOR
    #[error("checksum mismatch: computed 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch { expected: u8, received: u8 },

    /// Something other than CR/LF after the checksum
    #[error("unexpected byte 0x{0:02X} after checksum")]
    UnexpectedByte(u8),

    /// A recognised sentence carried an unparseable field
    #[error("invalid {field} field in {sentence} sentence")]
    InvalidField {
        sentence: &'static str,
        field: &'static str,
    },
}
