//! Wire protocol for the plotter board.
//!
//! The board speaks a line-oriented ASCII command set: a short mnemonic
//! followed by comma-separated decimal fields. Outbound lines are
//! newline-terminated; inbound lines arrive CR+LF-delimited. A command
//! yields at most one response line: an `OK` acknowledgement, a data
//! payload (version string, status token), or an error line with a
//! leading `!`. Ordering between commands and responses is not this
//! module's job; see the response correlator.

pub mod status;

pub use status::StatusFlags;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("status token {0:?} is not two hex digits")]
    BadStatusToken(String),
}

/// One logical board command. Each variant carries exactly the fields
/// its wire form needs, checked at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Clears board motion and queue state.
    Reset,
    /// Asks for the firmware identification string.
    QueryVersion,
    /// Asks for the status bit-field token.
    QueryStatus,
    /// Sets one persistent board parameter. Servo min/max height are
    /// parameters 4 and 5, servo rate is parameter 10.
    ConfigureMode { parameter: u8, value: u32 },
    /// Energizes or de-energizes each stepper axis independently.
    EnableMotors { motor1: bool, motor2: bool },
    /// Drives the servo to the raised or lowered position over `duration_ms`.
    SetPenState { up: bool, duration_ms: u32 },
    /// Coordinated move: both axes finish their step counts within the
    /// same duration, a straight line in step space.
    StepperMove {
        duration_ms: u32,
        steps1: i32,
        steps2: i32,
    },
    /// Moves to the logical origin at a fixed step rate.
    HomeMove { step_rate: u32 },
    /// Raw per-axis rate-accumulator move, reserved for advanced use.
    LowLevelMove {
        rate1: u32,
        steps1: i32,
        delta1: i32,
        rate2: u32,
        steps2: i32,
        delta2: i32,
        duration_ms: u32,
    },
}

impl Command {
    /// Wire form of the command, without the line terminator.
    pub fn encode(&self) -> String {
        match self {
            Command::Reset => "R".to_string(),
            Command::QueryVersion => "V".to_string(),
            Command::QueryStatus => "QG".to_string(),
            Command::ConfigureMode { parameter, value } => format!("SC,{parameter},{value}"),
            Command::EnableMotors { motor1, motor2 } => {
                format!("EM,{},{}", u8::from(*motor1), u8::from(*motor2))
            }
            Command::SetPenState { up, duration_ms } => {
                format!("SP,{},{duration_ms}", u8::from(*up))
            }
            Command::StepperMove {
                duration_ms,
                steps1,
                steps2,
            } => format!("SM,{duration_ms},{steps1},{steps2}"),
            Command::HomeMove { step_rate } => format!("HM,{step_rate}"),
            Command::LowLevelMove {
                rate1,
                steps1,
                delta1,
                rate2,
                steps2,
                delta2,
                duration_ms,
            } => format!("LM,{rate1},{steps1},{delta1},{rate2},{steps2},{delta2},{duration_ms}"),
        }
    }

    /// Mnemonic used for logging and error reporting.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Command::Reset => "R",
            Command::QueryVersion => "V",
            Command::QueryStatus => "QG",
            Command::ConfigureMode { .. } => "SC",
            Command::EnableMotors { .. } => "EM",
            Command::SetPenState { .. } => "SP",
            Command::StepperMove { .. } => "SM",
            Command::HomeMove { .. } => "HM",
            Command::LowLevelMove { .. } => "LM",
        }
    }

    /// Whether the board answers this command with a response line.
    /// Every command in the current set is acknowledged; a command that
    /// returns false here bypasses response correlation entirely.
    pub fn expects_response(&self) -> bool {
        true
    }

    /// Status polls are too chatty to log per exchange.
    pub fn loggable(&self) -> bool {
        !matches!(self, Command::QueryStatus)
    }
}

/// Classification of one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseLine {
    /// Plain acknowledgement.
    Ack,
    /// Query payload (version string, status token).
    Data(String),
    /// Board-reported error, leading `!` stripped.
    Fault(String),
}

pub fn classify(line: &str) -> ResponseLine {
    let line = line.trim();
    if line.eq_ignore_ascii_case("OK") {
        ResponseLine::Ack
    } else if let Some(message) = line.strip_prefix('!') {
        ResponseLine::Fault(message.trim().to_string())
    } else {
        ResponseLine::Data(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_parameterless_commands() {
        assert_eq!(Command::Reset.encode(), "R");
        assert_eq!(Command::QueryVersion.encode(), "V");
        assert_eq!(Command::QueryStatus.encode(), "QG");
    }

    #[test]
    fn encodes_field_order() {
        assert_eq!(
            Command::ConfigureMode {
                parameter: 4,
                value: 20_000
            }
            .encode(),
            "SC,4,20000"
        );
        assert_eq!(
            Command::EnableMotors {
                motor1: true,
                motor2: false
            }
            .encode(),
            "EM,1,0"
        );
        assert_eq!(
            Command::SetPenState {
                up: false,
                duration_ms: 150
            }
            .encode(),
            "SP,0,150"
        );
        assert_eq!(
            Command::StepperMove {
                duration_ms: 663,
                steps1: 4000,
                steps2: -250
            }
            .encode(),
            "SM,663,4000,-250"
        );
        assert_eq!(Command::HomeMove { step_rate: 15_000 }.encode(), "HM,15000");
        assert_eq!(
            Command::LowLevelMove {
                rate1: 1,
                steps1: 2,
                delta1: 3,
                rate2: 4,
                steps2: 5,
                delta2: 6,
                duration_ms: 7
            }
            .encode(),
            "LM,1,2,3,4,5,6,7"
        );
    }

    #[test]
    fn classifies_inbound_lines() {
        assert_eq!(classify("OK"), ResponseLine::Ack);
        assert_eq!(classify("ok\r"), ResponseLine::Ack);
        assert_eq!(
            classify("!8 Err: unknown command"),
            ResponseLine::Fault("8 Err: unknown command".to_string())
        );
        assert_eq!(
            classify("SIMBoard Firmware 1.0"),
            ResponseLine::Data("SIMBoard Firmware 1.0".to_string())
        );
        assert_eq!(classify(" 1F "), ResponseLine::Data("1F".to_string()));
    }
}
