//! Control-plane ("postmaster") request/response shapes (spec §6). The TCP
//! server itself is an external collaborator; these are the wire-level
//! request and the decoded command it carries.

/// BAM32 is a signed 32-bit binary angular measure: a full turn maps to
/// `[i32::MIN, i32::MAX]`. `SET_DESTINATION` carries longitude/latitude in
/// this form.
pub fn bam32_to_degrees(bam: i32) -> f64 {
    bam as f64 * (360.0 / 4_294_967_296.0)
}

pub fn degrees_to_bam32(deg: f64) -> i32 {
    (deg * (4_294_967_296.0 / 360.0)).round() as i32
}

/// Raw request as it arrives over the wire, field-by-field per
/// `read_request` in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_type: u32,
    pub header_bytes: u32,
    pub custom: [i32; 3],
    pub payload: Vec<u8>,
}

/// Response: echoes `request_type` back, or `0` on failure, with an
/// optional payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request_type: u32,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn ok(request_type: u32) -> Self {
        Response {
            request_type,
            payload: Vec::new(),
        }
    }

    pub fn failure() -> Self {
        Response {
            request_type: 0,
            payload: Vec::new(),
        }
    }
}

/// The decoded command a request represents.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Time-sync ping; no effect beyond acknowledging the round trip.
    Null,
    Annotation(String),
    Shutdown,
    AutopilotOn,
    AutopilotOff,
    ModuleResume(String),
    ModulePause(String),
    SetHeading { degrees: f64 },
    SetDestination {
        longitude_deg: f64,
        latitude_deg: f64,
        radius_m: f64,
    },
}

mod request_type {
    pub const NULL: u32 = 0;
    pub const ANNOTATION: u32 = 1;
    pub const SHUTDOWN: u32 = 2;
    pub const AUTOPILOT_ON: u32 = 3;
    pub const AUTOPILOT_OFF: u32 = 4;
    pub const MODULE_RESUME: u32 = 5;
    pub const MODULE_PAUSE: u32 = 6;
    pub const SET_HEADING: u32 = 7;
    pub const SET_DESTINATION: u32 = 8;
}

impl Command {
    pub fn decode(req: &Request) -> Option<Command> {
        use request_type::*;
        let payload_str = || String::from_utf8_lossy(&req.payload).into_owned();
        Some(match req.request_type {
            NULL => Command::Null,
            ANNOTATION => Command::Annotation(payload_str()),
            SHUTDOWN => Command::Shutdown,
            AUTOPILOT_ON => Command::AutopilotOn,
            AUTOPILOT_OFF => Command::AutopilotOff,
            MODULE_RESUME => Command::ModuleResume(payload_str()),
            MODULE_PAUSE => Command::ModulePause(payload_str()),
            SET_HEADING => Command::SetHeading {
                degrees: bam32_to_degrees(req.custom[0]),
            },
            SET_DESTINATION => Command::SetDestination {
                longitude_deg: bam32_to_degrees(req.custom[0]),
                latitude_deg: bam32_to_degrees(req.custom[1]),
                radius_m: req.custom[2] as f64,
            },
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bam32_round_trips_near_zero_and_half_turn() {
        assert!((bam32_to_degrees(degrees_to_bam32(90.0)) - 90.0).abs() < 1e-6);
        assert!((bam32_to_degrees(degrees_to_bam32(-45.0)) - (-45.0)).abs() < 1e-6);
    }

    #[test]
    fn decodes_set_heading() {
        let req = Request {
            request_type: 7,
            header_bytes: 0,
            custom: [degrees_to_bam32(123.0), 0, 0],
            payload: vec![],
        };
        match Command::decode(&req).unwrap() {
            Command::SetHeading { degrees } => assert!((degrees - 123.0).abs() < 1e-3),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_request_type_decodes_to_none() {
        let req = Request {
            request_type: 999,
            header_bytes: 0,
            custom: [0; 3],
            payload: vec![],
        };
        assert!(Command::decode(&req).is_none());
    }
}
