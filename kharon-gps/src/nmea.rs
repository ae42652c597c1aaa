//! NMEA sentence parsing, grounded on `gps_receiver/parsing.c` and
//! `receiver_logic.c`'s `parse_gga`/`parse_rmc`/`ident_nmea_message`.
//!
//! The source walks the sentence with a mutable char pointer, skipping a
//! malformed field and continuing on error. Splitting on `,` up front and
//! indexing by field number is equivalent and considerably more readable;
//! a malformed field is simply left unset, same as the source's recovery.

/// Which fields were successfully parsed out of a sentence, mirroring
/// `GPS_REC_AVAILABLE_*` in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Available {
    pub time: bool,
    pub date: bool,
    pub latitude: bool,
    pub longitude: bool,
    pub track: bool,
    pub speed: bool,
}

impl Available {
    /// `GPS_REC_MIN_DATA_FOR_PUBLISH`: time + lat + lon.
    pub fn publishable(&self) -> bool {
        self.time && self.latitude && self.longitude
    }
}

const KNOTS_TO_MPS: f64 = 0.514444;

/// Decoded fields from one NMEA sentence. Any field not present in the
/// sentence (or that failed to parse) is left at its default and absent
/// from `available`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NmeaFix {
    pub available: Available,
    pub utc_time: f64,
    pub utc_date: u32,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub course_deg: f64,
    pub speed_mps: f64,
}

/// `ddmm.mmmm` (or `dddmm.mmmm`) plus a hemisphere letter -> signed decimal
/// degrees, matching `read_latitude`/`read_longitude`.
fn dm_to_decimal(field: &str, positive: char, negative: char, hemi: &str) -> Option<f64> {
    let raw: f64 = field.parse().ok()?;
    let raw = raw / 100.0;
    let deg = raw.floor();
    let min = (raw - deg) * 100.0 / 60.0;
    let mut value = deg + min;
    let hemi = hemi.chars().next()?;
    if hemi == negative {
        value = -value;
    } else if hemi != positive {
        return None;
    }
    Some(value)
}

fn parse_gga(fields: &[&str], out: &mut NmeaFix) {
    if let Some(t) = fields.get(1).and_then(|s| s.parse::<f64>().ok()) {
        out.utc_time = t;
        out.available.time = true;
    }
    if let (Some(lat), Some(ns)) = (fields.get(2), fields.get(3)) {
        if let Some(v) = dm_to_decimal(lat, 'N', 'S', ns) {
            out.latitude_deg = v;
            out.available.latitude = true;
        }
    }
    if let (Some(lon), Some(ew)) = (fields.get(4), fields.get(5)) {
        if let Some(v) = dm_to_decimal(lon, 'E', 'W', ew) {
            out.longitude_deg = v;
            out.available.longitude = true;
        }
    }
}

fn parse_rmc(fields: &[&str], out: &mut NmeaFix) {
    if let Some(t) = fields.get(1).and_then(|s| s.parse::<f64>().ok()) {
        out.utc_time = t;
        out.available.time = true;
    }
    // fields[2] is the A/V validity flag; the source doesn't gate on it,
    // it only affects whether downstream fields are meaningful.
    if let (Some(lat), Some(ns)) = (fields.get(3), fields.get(4)) {
        if let Some(v) = dm_to_decimal(lat, 'N', 'S', ns) {
            out.latitude_deg = v;
            out.available.latitude = true;
        }
    }
    if let (Some(lon), Some(ew)) = (fields.get(5), fields.get(6)) {
        if let Some(v) = dm_to_decimal(lon, 'E', 'W', ew) {
            out.longitude_deg = v;
            out.available.longitude = true;
        }
    }
    if let Some(sog) = fields.get(7).and_then(|s| s.parse::<f64>().ok()) {
        out.speed_mps = sog * KNOTS_TO_MPS;
        out.available.speed = true;
    }
    if let Some(cog) = fields.get(8).and_then(|s| s.parse::<f64>().ok()) {
        out.course_deg = cog;
        out.available.track = true;
    }
    if let Some(date) = fields.get(9).and_then(|s| s.parse::<u32>().ok()) {
        out.utc_date = date;
        out.available.date = true;
    }
}

/// Identify and parse one NMEA sentence (no leading `$`, e.g.
/// `"GPGGA,161229.487,3723.2475,N,..."`). Returns `None` for an
/// unrecognized or too-short sentence, matching `ident_nmea_message`.
pub fn parse_sentence(sentence: &str) -> Option<NmeaFix> {
    if sentence.len() < 8 {
        return None;
    }
    let fields: Vec<&str> = sentence.split(',').collect();
    let head = fields[0];
    if head.len() < 5 {
        return None;
    }
    let kind = &head[2..5];
    let mut out = NmeaFix::default();
    match kind {
        "GGA" => parse_gga(&fields, &mut out),
        "RMC" => parse_rmc(&fields, &mut out),
        _ => return None,
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_gga_position() {
        let fix = parse_sentence("GPGGA,161229.487,3723.2475,N,12158.3416,W,1,07,1.0,9.0,M,,,,0000*18")
            .unwrap();
        assert!(fix.available.publishable());
        assert_relative_eq!(fix.latitude_deg, 37.387458, epsilon = 1e-4);
        assert_relative_eq!(fix.longitude_deg, -121.972360, epsilon = 1e-4);
    }

    #[test]
    fn parses_rmc_speed_and_course() {
        let fix =
            parse_sentence("GPRMC,161229.487,A,3723.2475,N,12158.3416,W,0.13,309.62,120598,,*10")
                .unwrap();
        assert!(fix.available.publishable());
        assert_relative_eq!(fix.speed_mps, 0.13 * KNOTS_TO_MPS, epsilon = 1e-9);
        assert_relative_eq!(fix.course_deg, 309.62, epsilon = 1e-6);
        assert_eq!(fix.utc_date, 120598);
    }

    #[test]
    fn southern_western_hemisphere_is_negative() {
        let fix = parse_sentence("GPGGA,000000.0,3723.2475,S,12158.3416,E,1,07,1.0,9.0,M,,,,0000")
            .unwrap();
        assert!(fix.latitude_deg < 0.0);
        assert!(fix.longitude_deg > 0.0);
    }

    #[test]
    fn unrecognized_sentence_returns_none() {
        assert!(parse_sentence("GPXYZ,1,2,3").is_none());
        assert!(parse_sentence("short").is_none());
    }

    #[test]
    fn malformed_field_leaves_availability_unset_but_parses_rest() {
        let fix = parse_sentence("GPGGA,not_a_number,3723.2475,N,12158.3416,W,1,07,1.0,9.0,M,,,,0000")
            .unwrap();
        assert!(!fix.available.time);
        assert!(fix.available.latitude);
        assert!(!fix.available.publishable());
    }
}
