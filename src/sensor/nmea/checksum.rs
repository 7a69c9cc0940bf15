//! # NMEA Checksum
//!
//! XOR of every byte between `$` and `*`, transmitted as two hex digits.

/// XOR checksum over a sentence body (excluding `$` and `*`)
///
/// # Examples
///
/// ```
/// use field_telemetry::sensor::nmea::checksum::nmea_checksum;
///
/// assert_eq!(nmea_checksum(b"PMTK314,0,1,0,1,0,0,0,0,0,0,0,0,0,0,0,0,0"), 0x28);
/// ```
pub fn nmea_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, &byte| acc ^ byte)
}

/// Value of an ASCII hex digit (either case)
pub fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

/// Frame `body` as a complete sentence: `$<body>*<hh>\r\n`
///
/// Used for the receiver configuration sentence and for test fixtures.
pub fn build_sentence(body: &str) -> String {
    format!("${}*{:02X}\r\n", body, nmea_checksum(body.as_bytes()))
}
