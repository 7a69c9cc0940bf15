//! # NMEA Stream Parser
//!
//! Byte-oriented state machine over the GPS serial stream.
//!
//! ```text
//!             '$'                '*'                  hh [CR] LF
//! AwaitStart ─────> ReadField ─────> ValidateChecksum ───────────> commit | discard
//!     ^                 │                   │                            │
//!     └─────────────────┴─── error ─────────┴────────────────────────────┘
//! ```
//!
//! The parser never blocks and never allocates: the sentence body accumulates
//! in a fixed 256-byte buffer, and any sentence longer than 82 bytes (from `$`
//! through `LF`) is discarded. A sentence that fails any check leaves the last
//! committed fix untouched.

use heapless::Vec;

use super::checksum::hex_value;
use super::sentence::{self, GpsFix, SentenceKind};
use super::NmeaError;

/// Longest valid NMEA 0183 sentence, `$` through `LF`
pub const MAX_NMEA_MSG_BYTES: usize = 82;

/// Accumulation buffer size, independent of the sentence limit
pub const MAX_NMEA_BUFFER_BYTES: usize = 256;

/// Upper bound on comma-separated fields in one sentence
const MAX_FIELDS: usize = 32;

/// Where the parser is within the current sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Skipping bytes until a `$`
    AwaitStart,
    /// Accumulating body bytes up to `*`
    ReadField,
    /// Reading checksum digits and the line terminator
    ValidateChecksum(ChecksumStage),
}

/// Position within the `hh\r\n` trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStage {
    High,
    Low,
    LineEnd,
    LineFeed,
}

/// Incremental NMEA parse state plus the last committed fix
#[derive(Debug)]
pub struct NmeaParser {
    state: ParserState,
    body: Vec<u8, MAX_NMEA_BUFFER_BYTES>,
    computed: u8,
    received: u8,
    sentence_len: usize,
    max_sentence_len: usize,
    fix: Option<GpsFix>,
    committed: u64,
    discarded: u64,
}

impl NmeaParser {
    /// Parser enforcing the standard 82-byte sentence limit
    pub fn new() -> Self {
        Self::with_max_sentence_len(MAX_NMEA_MSG_BYTES)
    }

    /// Parser with a custom sentence limit, capped by the accumulation buffer
    pub fn with_max_sentence_len(max_sentence_len: usize) -> Self {
        Self {
            state: ParserState::AwaitStart,
            body: Vec::new(),
            computed: 0,
            received: 0,
            sentence_len: 0,
            max_sentence_len: max_sentence_len.min(MAX_NMEA_BUFFER_BYTES),
            fix: None,
            committed: 0,
            discarded: 0,
        }
    }

    /// Current state machine position
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Most recently committed fix, if any sentence has been committed
    pub fn last_fix(&self) -> Option<&GpsFix> {
        self.fix.as_ref()
    }

    /// Position sentences committed so far
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Sentences discarded for framing, length, checksum or field errors
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn begin(&mut self) {
        self.state = ParserState::ReadField;
        self.body.clear();
        self.computed = 0;
        self.received = 0;
        self.sentence_len = 1;
    }

    fn reset(&mut self) {
        self.state = ParserState::AwaitStart;
        self.body.clear();
        self.sentence_len = 0;
    }

    fn discard(&mut self, error: NmeaError) -> Result<Option<GpsFix>, NmeaError> {
        self.reset();
        self.discarded += 1;
        Err(error)
    }

    /// Consume one byte from the serial stream
    ///
    /// # Returns
    ///
    /// * `Ok(Some(fix))` - a position sentence was committed
    /// * `Ok(None)` - more bytes needed, or a valid non-position sentence ended
    ///
    /// # Errors
    ///
    /// Returns the reason a sentence was discarded. The parser has already
    /// reset itself and is ready for the next `$`.
    pub fn feed(&mut self, byte: u8) -> Result<Option<GpsFix>, NmeaError> {
        if self.state != ParserState::AwaitStart {
            if byte == b'$' {
                // Resynchronise on the new sentence
                self.discarded += 1;
                self.begin();
                return Err(NmeaError::Interrupted);
            }

            self.sentence_len += 1;
            if self.sentence_len > self.max_sentence_len {
                return self.discard(NmeaError::TooLong {
                    limit: self.max_sentence_len,
                });
            }
        }

        match self.state {
            ParserState::AwaitStart => {
                if byte == b'$' {
                    self.begin();
                }
                Ok(None)
            }
            ParserState::ReadField => match byte {
                b'*' => {
                    self.state = ParserState::ValidateChecksum(ChecksumStage::High);
                    Ok(None)
                }
                b'\r' | b'\n' => self.discard(NmeaError::MissingChecksum),
                _ => {
                    if self.body.push(byte).is_err() {
                        return self.discard(NmeaError::BufferOverflow);
                    }
                    self.computed ^= byte;
                    Ok(None)
                }
            },
            ParserState::ValidateChecksum(stage) => self.feed_trailer(stage, byte),
        }
    }

    fn feed_trailer(&mut self, stage: ChecksumStage, byte: u8) -> Result<Option<GpsFix>, NmeaError> {
        match stage {
            ChecksumStage::High => match hex_value(byte) {
                Some(nibble) => {
                    self.received = nibble << 4;
                    self.state = ParserState::ValidateChecksum(ChecksumStage::Low);
                    Ok(None)
                }
                None => self.discard(NmeaError::BadChecksumDigit(byte)),
            },
            ChecksumStage::Low => match hex_value(byte) {
                Some(nibble) => {
                    self.received |= nibble;
                    self.state = ParserState::ValidateChecksum(ChecksumStage::LineEnd);
                    Ok(None)
                }
                None => self.discard(NmeaError::BadChecksumDigit(byte)),
            },
            ChecksumStage::LineEnd => match byte {
                b'\r' => {
                    self.state = ParserState::ValidateChecksum(ChecksumStage::LineFeed);
                    Ok(None)
                }
                b'\n' => self.finish(),
                other => self.discard(NmeaError::UnexpectedByte(other)),
            },
            ChecksumStage::LineFeed => match byte {
                b'\n' => self.finish(),
                other => self.discard(NmeaError::UnexpectedByte(other)),
            },
        }
    }

    /// Validate the completed sentence and commit or discard it
    fn finish(&mut self) -> Result<Option<GpsFix>, NmeaError> {
        if self.computed != self.received {
            let error = NmeaError::ChecksumMismatch {
                expected: self.computed,
                received: self.received,
            };
            return self.discard(error);
        }

        let previous = self.fix.unwrap_or_default();
        let decoded = decode_body(&self.body, &previous);

        match decoded {
            Ok(Some(fix)) => {
                self.reset();
                self.fix = Some(fix);
                self.committed += 1;
                Ok(Some(fix))
            }
            Ok(None) => {
                self.reset();
                Ok(None)
            }
            Err(error) => self.discard(error),
        }
    }
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a checksum-valid body; `None` for sentences that carry no position
fn decode_body(body: &[u8], previous: &GpsFix) -> Result<Option<GpsFix>, NmeaError> {
    let text = core::str::from_utf8(body).map_err(|_| NmeaError::InvalidField {
        sentence: "NMEA",
        field: "encoding",
    })?;

    let mut fields: Vec<&str, MAX_FIELDS> = Vec::new();
    for part in text.split(',') {
        fields.push(part).map_err(|_| NmeaError::InvalidField {
            sentence: "NMEA",
            field: "field count",
        })?;
    }

    let kind = sentence::sentence_kind(fields.first().copied().unwrap_or(""));
    if kind == SentenceKind::Other {
        return Ok(None);
    }

    sentence::apply(kind, &fields, previous).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::nmea::checksum::build_sentence;

    const GGA_BODY: &str = "GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
    const RMC_BODY: &str = "GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";

    /// Feed every byte, collecting committed fixes and errors
    fn feed_all(parser: &mut NmeaParser, bytes: &[u8]) -> (std::vec::Vec<GpsFix>, std::vec::Vec<NmeaError>) {
        let mut fixes = std::vec::Vec::new();
        let mut errors = std::vec::Vec::new();
        for &byte in bytes {
            match parser.feed(byte) {
                Ok(Some(fix)) => fixes.push(fix),
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }
        (fixes, errors)
    }

    /// Flip one hex digit of the checksum of a framed sentence
    fn corrupt_checksum(sentence: &str) -> String {
        let star = sentence.find('*').unwrap();
        let mut bytes = sentence.as_bytes().to_vec();
        bytes[star + 2] = if bytes[star + 2] == b'0' { b'1' } else { b'0' };
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_commits_valid_gga() {
        let mut parser = NmeaParser::new();
        let (fixes, errors) = feed_all(&mut parser, build_sentence(GGA_BODY).as_bytes());

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(fixes.len(), 1);
        assert!(fixes[0].valid);
        assert_eq!(fixes[0].satellites, 8);
        assert_eq!(parser.last_fix(), Some(&fixes[0]));
        assert_eq!(parser.state(), ParserState::AwaitStart);
        assert_eq!(parser.committed(), 1);
    }

    #[test]
    fn test_literal_sentence_with_known_checksum() {
        let mut parser = NmeaParser::new();
        let line = b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";
        let (fixes, errors) = feed_all(&mut parser, line);
        assert!(errors.is_empty());
        assert_eq!(fixes.len(), 1);
    }

    #[test]
    fn test_lowercase_checksum_and_bare_lf() {
        let mut parser = NmeaParser::new();
        let line = b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6a\n";
        let (fixes, errors) = feed_all(&mut parser, line);
        assert!(errors.is_empty());
        assert_eq!(fixes.len(), 1);
    }

    #[test]
    fn test_corrupt_checksum_preserves_last_fix() {
        let mut parser = NmeaParser::new();
        let good = build_sentence(GGA_BODY);
        let other_body = "GPGGA,123600,5107.038,N,00131.000,W,1,05,0.9,12.0,M,46.9,M,,";
        let bad = corrupt_checksum(&build_sentence(other_body));

        let mut stream = good.into_bytes();
        stream.extend_from_slice(bad.as_bytes());
        let (fixes, errors) = feed_all(&mut parser, &stream);

        assert_eq!(fixes.len(), 1);
        assert!(matches!(errors.as_slice(), [NmeaError::ChecksumMismatch { .. }]));
        let fix = parser.last_fix().unwrap();
        assert!((fix.latitude - 48.1173).abs() < 1e-4);
        assert_eq!(fix.satellites, 8);
        assert_eq!(parser.state(), ParserState::AwaitStart);
        assert_eq!(parser.discarded(), 1);
    }

    #[test]
    fn test_recovers_after_corrupt_sentence() {
        let mut parser = NmeaParser::new();
        let mut stream = corrupt_checksum(&build_sentence(GGA_BODY)).into_bytes();
        stream.extend_from_slice(build_sentence(RMC_BODY).as_bytes());

        let (fixes, errors) = feed_all(&mut parser, &stream);
        assert_eq!(errors.len(), 1);
        assert_eq!(fixes.len(), 1);
        assert!((fixes[0].speed_mps - 22.4 * sentence::KNOTS_TO_MPS).abs() < 1e-9);
    }

    #[test]
    fn test_every_corrupted_checksum_digit_is_rejected() {
        let good = build_sentence(GGA_BODY);
        let star = good.find('*').unwrap();
        for position in [star + 1, star + 2] {
            for replacement in b"0123456789ABCDEF" {
                let mut bytes = good.as_bytes().to_vec();
                if bytes[position] == *replacement {
                    continue;
                }
                bytes[position] = *replacement;

                let mut parser = NmeaParser::new();
                let (fixes, errors) = feed_all(&mut parser, &bytes);
                assert!(fixes.is_empty());
                assert_eq!(errors.len(), 1);
                assert!(parser.last_fix().is_none());
                assert_eq!(parser.state(), ParserState::AwaitStart);
            }
        }
    }

    #[test]
    fn test_overlong_sentence_is_discarded() {
        let mut parser = NmeaParser::new();
        let body = format!("GPGGA,{}", "9".repeat(90));
        let (fixes, errors) = feed_all(&mut parser, build_sentence(&body).as_bytes());

        assert!(fixes.is_empty());
        assert_eq!(errors, vec![NmeaError::TooLong { limit: MAX_NMEA_MSG_BYTES }]);
        assert_eq!(parser.state(), ParserState::AwaitStart);

        let (fixes, _) = feed_all(&mut parser, build_sentence(GGA_BODY).as_bytes());
        assert_eq!(fixes.len(), 1);
    }

    #[test]
    fn test_sentence_at_exact_limit_is_accepted() {
        // 82 bytes = '$' + body + '*' + 2 hex + CR + LF
        let filler_len = MAX_NMEA_MSG_BYTES - 6 - "GPTXT,".len();
        let body = format!("GPTXT,{}", "A".repeat(filler_len));
        let sentence = build_sentence(&body);
        assert_eq!(sentence.len(), MAX_NMEA_MSG_BYTES);

        let mut parser = NmeaParser::new();
        let (_, errors) = feed_all(&mut parser, sentence.as_bytes());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_buffer_limit_caps_custom_sentence_length() {
        let parser = NmeaParser::with_max_sentence_len(1000);
        assert_eq!(parser.max_sentence_len, MAX_NMEA_BUFFER_BYTES);
    }

    #[test]
    fn test_accumulation_buffer_overflow() {
        let mut parser = NmeaParser::with_max_sentence_len(MAX_NMEA_BUFFER_BYTES);
        let mut stream = vec![b'$'];
        stream.extend(std::iter::repeat(b'A').take(MAX_NMEA_BUFFER_BYTES + 10));
        let (_, errors) = feed_all(&mut parser, &stream);

        assert_eq!(errors.len(), 1);
        assert_eq!(parser.state(), ParserState::AwaitStart);
    }

    #[test]
    fn test_unrecognised_sentence_has_no_effect() {
        let mut parser = NmeaParser::new();
        let (fixes, errors) = feed_all(
            &mut parser,
            build_sentence("GPGSV,3,1,11,03,03,111,00,04,15,270,00,06,01,010,00,13,06,292,00").as_bytes(),
        );
        assert!(fixes.is_empty());
        assert!(errors.is_empty());
        assert!(parser.last_fix().is_none());
        assert_eq!(parser.committed(), 0);
    }

    #[test]
    fn test_new_start_interrupts_partial_sentence() {
        let mut parser = NmeaParser::new();
        let mut stream = b"$GPGGA,123519,48".to_vec();
        stream.extend_from_slice(build_sentence(GGA_BODY).as_bytes());

        let (fixes, errors) = feed_all(&mut parser, &stream);
        assert_eq!(errors, vec![NmeaError::Interrupted]);
        assert_eq!(fixes.len(), 1);
    }

    #[test]
    fn test_missing_checksum() {
        let mut parser = NmeaParser::new();
        let (fixes, errors) = feed_all(&mut parser, b"$GPGGA,123519\r\n");
        assert!(fixes.is_empty());
        assert_eq!(errors, vec![NmeaError::MissingChecksum]);
    }

    #[test]
    fn test_bad_checksum_digit() {
        let mut parser = NmeaParser::new();
        let (_, errors) = feed_all(&mut parser, b"$GPGGA,1*G1\r\n");
        assert_eq!(errors, vec![NmeaError::BadChecksumDigit(b'G')]);
    }

    #[test]
    fn test_garbage_between_sentences_is_ignored() {
        let mut parser = NmeaParser::new();
        let mut stream = b"\x00\xFFnoise\r\n".to_vec();
        stream.extend_from_slice(build_sentence(GGA_BODY).as_bytes());
        stream.extend_from_slice(b"junk");
        stream.extend_from_slice(build_sentence(RMC_BODY).as_bytes());

        let (fixes, errors) = feed_all(&mut parser, &stream);
        assert!(errors.is_empty());
        assert_eq!(fixes.len(), 2);
    }

    #[test]
    fn test_non_ascii_address_is_skipped() {
        let mut parser = NmeaParser::new();
        let mut stream = build_sentence("A\u{e9}GG,1,2").into_bytes();
        stream.extend_from_slice(build_sentence("\u{e9}GGA,1,2").as_bytes());
        stream.extend_from_slice(build_sentence(GGA_BODY).as_bytes());

        let (fixes, errors) = feed_all(&mut parser, &stream);

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].satellites, 8);
        assert_eq!(parser.state(), ParserState::AwaitStart);
    }

    #[test]
    fn test_nan_latitude_preserves_fix() {
        let mut parser = NmeaParser::new();
        feed_all(&mut parser, build_sentence(GGA_BODY).as_bytes());
        let before = *parser.last_fix().unwrap();

        let bad = "GPGGA,123520,nan,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        let (fixes, errors) = feed_all(&mut parser, build_sentence(bad).as_bytes());

        assert!(fixes.is_empty());
        assert!(matches!(errors.as_slice(), [NmeaError::InvalidField { .. }]));
        assert_eq!(parser.last_fix(), Some(&before));
    }

    #[test]
    fn test_invalid_field_preserves_fix() {
        let mut parser = NmeaParser::new();
        feed_all(&mut parser, build_sentence(GGA_BODY).as_bytes());
        let before = *parser.last_fix().unwrap();

        let bad = "GPGGA,123519,4807.038,Q,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        let (fixes, errors) = feed_all(&mut parser, build_sentence(bad).as_bytes());

        assert!(fixes.is_empty());
        assert!(matches!(errors.as_slice(), [NmeaError::InvalidField { .. }]));
        assert_eq!(parser.last_fix(), Some(&before));
    }
}
