//! Line protocol spoken with the motor-controller bridge.
//!
//! Every host command is one ASCII line and is answered by exactly one reply
//! line (`ok`, `error <text>` or, for the running query, `running <m> <0|1>`).
//! The board additionally emits an unsolicited `done <m> <unix_secs>` line
//! when a move finishes.

use std::fmt;

pub type MotorId = u8;

/// Commands sent from host to board.
#[derive(Debug, Clone, PartialEq)]
pub enum McuCommand {
    PinOutput { pin: u8 },
    PinWrite { pin: u8, high: bool },
    StepperConfig { motor: MotorId, pulse_pin: u8, direction_pin: u8 },
    SetPosition { motor: MotorId, position: i64 },
    MaxSpeed { motor: MotorId, speed: f64 },
    Acceleration { motor: MotorId, accel: f64 },
    MoveTo { motor: MotorId, position: i64 },
    MoveBy { motor: MotorId, delta: i64 },
    Run { motor: MotorId },
    IsRunning { motor: MotorId },
    Shutdown,
}

impl McuCommand {
    /// Encode as a wire line, without the trailing newline.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for McuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McuCommand::PinOutput { pin } => write!(f, "pin_output {}", pin),
            McuCommand::PinWrite { pin, high } => write!(f, "pin_write {} {}", pin, u8::from(*high)),
            McuCommand::StepperConfig { motor, pulse_pin, direction_pin } => {
                write!(f, "stepper_config {} {} {}", motor, pulse_pin, direction_pin)
            }
            McuCommand::SetPosition { motor, position } => {
                write!(f, "stepper_set_position {} {}", motor, position)
            }
            McuCommand::MaxSpeed { motor, speed } => write!(f, "stepper_max_speed {} {}", motor, speed),
            McuCommand::Acceleration { motor, accel } => write!(f, "stepper_accel {} {}", motor, accel),
            McuCommand::MoveTo { motor, position } => write!(f, "stepper_move_to {} {}", motor, position),
            McuCommand::MoveBy { motor, delta } => write!(f, "stepper_move {} {}", motor, delta),
            McuCommand::Run { motor } => write!(f, "stepper_run {}", motor),
            McuCommand::IsRunning { motor } => write!(f, "stepper_is_running {}", motor),
            McuCommand::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Lines received from the board.
#[derive(Debug, Clone, PartialEq)]
pub enum McuEvent {
    Ok,
    Error(String),
    Running { motor: MotorId, running: bool },
    Done { motor: MotorId, timestamp: i64 },
}

impl McuEvent {
    /// Whether this line answers a pending command.
    pub fn is_reply(&self) -> bool {
        !matches!(self, McuEvent::Done { .. })
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        match parts.next()? {
            "ok" => Some(McuEvent::Ok),
            "error" => {
                let text = line.trim().strip_prefix("error").unwrap_or("").trim();
                Some(McuEvent::Error(text.to_string()))
            }
            "running" => {
                let motor = parts.next()?.parse().ok()?;
                let running = match parts.next()? {
                    "1" => true,
                    "0" => false,
                    _ => return None,
                };
                Some(McuEvent::Running { motor, running })
            }
            "done" => {
                let motor = parts.next()?.parse().ok()?;
                let timestamp = parts.next()?.parse().ok()?;
                Some(McuEvent::Done { motor, timestamp })
            }
            _ => None,
        }
    }
}

impl fmt::Display for McuEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McuEvent::Ok => write!(f, "ok"),
            McuEvent::Error(text) => write!(f, "error {}", text),
            McuEvent::Running { motor, running } => write!(f, "running {} {}", motor, u8::from(*running)),
            McuEvent::Done { motor, timestamp } => write!(f, "done {} {}", motor, timestamp),
        }
    }
}

/// Parse a host command line. Used by the simulated board.
pub fn parse_command(line: &str) -> Option<McuCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let arg = |i: usize| parts.get(i).copied();
    let cmd = match *parts.first()? {
        "pin_output" => McuCommand::PinOutput { pin: arg(1)?.parse().ok()? },
        "pin_write" => McuCommand::PinWrite {
            pin: arg(1)?.parse().ok()?,
            high: arg(2)? == "1",
        },
        "stepper_config" => McuCommand::StepperConfig {
            motor: arg(1)?.parse().ok()?,
            pulse_pin: arg(2)?.parse().ok()?,
            direction_pin: arg(3)?.parse().ok()?,
        },
        "stepper_set_position" => McuCommand::SetPosition {
            motor: arg(1)?.parse().ok()?,
            position: arg(2)?.parse().ok()?,
        },
        "stepper_max_speed" => McuCommand::MaxSpeed {
            motor: arg(1)?.parse().ok()?,
            speed: arg(2)?.parse().ok()?,
        },
        "stepper_accel" => McuCommand::Acceleration {
            motor: arg(1)?.parse().ok()?,
            accel: arg(2)?.parse().ok()?,
        },
        "stepper_move_to" => McuCommand::MoveTo {
            motor: arg(1)?.parse().ok()?,
            position: arg(2)?.parse().ok()?,
        },
        "stepper_move" => McuCommand::MoveBy {
            motor: arg(1)?.parse().ok()?,
            delta: arg(2)?.parse().ok()?,
        },
        "stepper_run" => McuCommand::Run { motor: arg(1)?.parse().ok()? },
        "stepper_is_running" => McuCommand::IsRunning { motor: arg(1)?.parse().ok()? },
        "shutdown" => McuCommand::Shutdown,
        _ => return None,
    };
    Some(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_encoding() {
        let cmd = McuCommand::StepperConfig { motor: 0, pulse_pin: 3, direction_pin: 6 };
        assert_eq!(cmd.to_line(), "stepper_config 0 3 6");
        assert_eq!(McuCommand::PinWrite { pin: 8, high: true }.to_line(), "pin_write 8 1");
        assert_eq!(McuCommand::MoveBy { motor: 1, delta: -200 }.to_line(), "stepper_move 1 -200");
        assert_eq!(McuCommand::MaxSpeed { motor: 0, speed: 800.0 }.to_line(), "stepper_max_speed 0 800");
    }

    #[test]
    fn test_parse_replies() {
        assert_eq!(McuEvent::parse("ok"), Some(McuEvent::Ok));
        assert_eq!(
            McuEvent::parse("error pin 99 out of range"),
            Some(McuEvent::Error("pin 99 out of range".to_string()))
        );
        assert_eq!(
            McuEvent::parse("running 0 1"),
            Some(McuEvent::Running { motor: 0, running: true })
        );
    }

    #[test]
    fn test_parse_completion() {
        let event = McuEvent::parse("done 0 1700000000").unwrap();
        assert_eq!(event, McuEvent::Done { motor: 0, timestamp: 1_700_000_000 });
        assert!(!event.is_reply());
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(McuEvent::parse(""), None);
        assert_eq!(McuEvent::parse("running 0 maybe"), None);
        assert_eq!(McuEvent::parse("done x 12"), None);
        assert_eq!(McuEvent::parse("hello"), None);
    }

    #[test]
    fn test_parse_command_line() {
        assert_eq!(
            parse_command("stepper_move_to 0 2000"),
            Some(McuCommand::MoveTo { motor: 0, position: 2000 })
        );
        assert_eq!(parse_command("shutdown"), Some(McuCommand::Shutdown));
        assert_eq!(parse_command("stepper_run"), None);
    }
}
