//! # NMEA Sentence Decoding
//!
//! Field-level decoding of position sentences.
//!
//! ## GGA (fix data)
//!
//! | Field | Content |
//! |-------|---------|
//! | 1 | UTC time |
//! | 2, 3 | Latitude `ddmm.mmmm`, `N`/`S` |
//! | 4, 5 | Longitude `dddmm.mmmm`, `E`/`W` |
//! | 6 | Fix quality (0 = invalid) |
//! | 7 | Satellites in use |
//! | 9 | Altitude above MSL (m) |
//!
//! ## RMC (recommended minimum)
//!
//! | Field | Content |
//! |-------|---------|
//! | 2 | Status (`A` = valid, `V` = warning) |
//! | 3, 4 | Latitude, hemisphere |
//! | 5, 6 | Longitude, hemisphere |
//! | 7 | Speed over ground (knots) |

use super::NmeaError;

/// Metres per second in one knot
pub const KNOTS_TO_MPS: f64 = 0.514_444;

/// Most recently committed position solution
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsFix {
    /// Latitude in signed decimal degrees (north positive)
    pub latitude: f64,

    /// Longitude in signed decimal degrees (east positive)
    pub longitude: f64,

    /// Altitude above mean sea level in metres
    pub altitude_m: f64,

    /// Speed over ground in metres per second
    pub speed_mps: f64,

    /// Whether the receiver reports a usable fix
    pub valid: bool,

    /// Satellites used in the solution
    pub satellites: u8,
}

/// Position sentences this parser understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceKind {
    Gga,
    Rmc,
    Other,
}

/// Classify a sentence by its address field (`GPGGA`, `GNRMC`, ...)
///
/// Proprietary sentences (`P...`) are never position sentences.
pub fn sentence_kind(address: &str) -> SentenceKind {
    let (talker, formatter) = match address.as_bytes() {
        [b'P', ..] => return SentenceKind::Other,
        [t1, t2, rest @ ..] if rest.len() == 3 => ([*t1, *t2], rest),
        _ => return SentenceKind::Other,
    };
    if !talker.iter().all(u8::is_ascii_uppercase) {
        return SentenceKind::Other;
    }
    match formatter {
        b"GGA" => SentenceKind::Gga,
        b"RMC" => SentenceKind::Rmc,
        _ => SentenceKind::Other,
    }
}

/// Apply a recognised sentence's fields on top of `previous`
///
/// `fields[0]` is the address field. Fields a sentence leaves empty keep the
/// previous value, so GGA and RMC complement each other. Returns the merged
/// fix; `previous` is never modified.
pub fn apply(kind: SentenceKind, fields: &[&str], previous: &GpsFix) -> Result<GpsFix, NmeaError> {
    match kind {
        SentenceKind::Gga => apply_gga(fields, previous),
        SentenceKind::Rmc => apply_rmc(fields, previous),
        SentenceKind::Other => Ok(*previous),
    }
}

fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

fn apply_gga(fields: &[&str], previous: &GpsFix) -> Result<GpsFix, NmeaError> {
    let invalid = |name| NmeaError::InvalidField {
        sentence: "GGA",
        field: name,
    };
    let mut fix = *previous;

    let quality: u8 = match field(fields, 6) {
        "" => 0,
        q => q.parse().map_err(|_| invalid("quality"))?,
    };
    fix.valid = quality > 0;

    fix.satellites = match field(fields, 7) {
        "" => 0,
        n => n.parse().map_err(|_| invalid("satellites"))?,
    };

    if let Some((lat, lon)) = position(fields, 2, "GGA")? {
        fix.latitude = lat;
        fix.longitude = lon;
    } else if fix.valid {
        return Err(invalid("position"));
    }

    match field(fields, 9) {
        "" => {}
        alt => fix.altitude_m = decimal(alt).ok_or(invalid("altitude"))?,
    }

    Ok(fix)
}

fn apply_rmc(fields: &[&str], previous: &GpsFix) -> Result<GpsFix, NmeaError> {
    let invalid = |name| NmeaError::InvalidField {
        sentence: "RMC",
        field: name,
    };
    let mut fix = *previous;

    fix.valid = match field(fields, 2) {
        "A" => true,
        "V" | "" => false,
        _ => return Err(invalid("status")),
    };

    if let Some((lat, lon)) = position(fields, 3, "RMC")? {
        fix.latitude = lat;
        fix.longitude = lon;
    } else if fix.valid {
        return Err(invalid("position"));
    }

    match field(fields, 7) {
        "" => {}
        knots => {
            let knots = decimal(knots).ok_or(invalid("speed"))?;
            fix.speed_mps = knots * KNOTS_TO_MPS;
        }
    }

    Ok(fix)
}

/// Finite decimal number; rejects `nan`, `inf` and friends
fn decimal(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Latitude/longitude starting at `first`; `None` if the fields are empty
fn position(
    fields: &[&str],
    first: usize,
    sentence: &'static str,
) -> Result<Option<(f64, f64)>, NmeaError> {
    let (lat, ns, lon, ew) = (
        field(fields, first),
        field(fields, first + 1),
        field(fields, first + 2),
        field(fields, first + 3),
    );
    if lat.is_empty() && lon.is_empty() {
        return Ok(None);
    }

    let latitude = coordinate(lat, ns, 'N', 'S', 90.0).ok_or(NmeaError::InvalidField {
        sentence,
        field: "latitude",
    })?;
    let longitude = coordinate(lon, ew, 'E', 'W', 180.0).ok_or(NmeaError::InvalidField {
        sentence,
        field: "longitude",
    })?;
    Ok(Some((latitude, longitude)))
}

/// Convert `[d]ddmm.mmmm` plus hemisphere into signed decimal degrees
///
/// Only plain digits with an optional decimal point are accepted; the result
/// must not exceed `max_degrees`.
pub fn coordinate(
    value: &str,
    hemisphere: &str,
    positive: char,
    negative: char,
    max_degrees: f64,
) -> Option<f64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    let raw: f64 = value.parse().ok()?;
    if !raw.is_finite() {
        return None;
    }
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    if minutes >= 60.0 {
        return None;
    }
    let decimal = degrees + minutes / 60.0;
    if decimal > max_degrees {
        return None;
    }

    let mut chars = hemisphere.chars();
    match (chars.next(), chars.next()) {
        (Some(h), None) if h == positive => Some(decimal),
        (Some(h), None) if h == negative => Some(-decimal),
        _ => None,
    }
}
