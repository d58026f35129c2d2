//! Simulated motor bridge.
//!
//! Speaks the same line protocol as the firmware over an in-memory duplex
//! stream, so [`McuConnection`](super::McuConnection) can be attached to it
//! without hardware. Used by `panlapse stepper --simulate` and the motion
//! tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{mpsc, Notify};

use super::protocol::{parse_command, McuCommand, McuEvent, MotorId};

/// How a started move finishes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionMode {
    /// Finish after the time the move would take at the configured speed.
    Timed,
    /// Finish only when [`SimulatedBoard::finish_move`] is called.
    Manual,
}

/// Observable board state.
#[derive(Debug, Clone, Default)]
pub struct BoardState {
    /// Every command line received, in order.
    pub log: Vec<String>,
    pub outputs: HashSet<u8>,
    pub pin_levels: HashMap<u8, bool>,
    pub motors: HashMap<MotorId, (u8, u8)>,
    pub position: i64,
    pub target: i64,
    pub max_speed: f64,
    pub acceleration: f64,
    pub running: bool,
    pub completed_moves: u32,
    pub shutdown: bool,
}

impl BoardState {
    fn move_duration(&self) -> Duration {
        let distance = (self.target - self.position).unsigned_abs() as f64;
        let ramp = if self.acceleration > 0.0 { self.max_speed / self.acceleration } else { 0.0 };
        Duration::from_secs_f64(distance / self.max_speed + ramp).max(Duration::from_millis(10))
    }
}

/// Handle to a running simulated board.
#[derive(Clone)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
    finish: Arc<Notify>,
}

impl SimulatedBoard {
    /// Start the board task. Returns the handle and the host end of the link.
    pub fn spawn(mode: CompletionMode) -> (Self, DuplexStream) {
        let (host, board) = tokio::io::duplex(4096);
        let handle = Self {
            state: Arc::new(Mutex::new(BoardState::default())),
            finish: Arc::new(Notify::new()),
        };

        let (read_half, mut write_half) = tokio::io::split(board);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                if write_half.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let board_handle = handle.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = board_handle.handle_line(line.trim(), mode, &out_tx);
                if out_tx.send(reply.to_string()).is_err() {
                    break;
                }
            }
            tracing::debug!("Simulated board link closed");
        });

        (handle, host)
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the board state.
    pub fn state(&self) -> BoardState {
        self.lock().clone()
    }

    pub fn pin_level(&self, pin: u8) -> Option<bool> {
        self.lock().pin_levels.get(&pin).copied()
    }

    /// Complete the running move in [`CompletionMode::Manual`].
    pub fn finish_move(&self) {
        self.finish.notify_one();
    }

    fn handle_line(&self, line: &str, mode: CompletionMode, out: &mpsc::UnboundedSender<String>) -> McuEvent {
        let mut state = self.lock();
        state.log.push(line.to_string());

        let Some(command) = parse_command(line) else {
            return McuEvent::Error(format!("unknown command '{}'", line));
        };

        match command {
            McuCommand::PinOutput { pin } => {
                state.outputs.insert(pin);
            }
            McuCommand::PinWrite { pin, high } => {
                if !state.outputs.contains(&pin) {
                    return McuEvent::Error(format!("pin {} is not an output", pin));
                }
                state.pin_levels.insert(pin, high);
            }
            McuCommand::StepperConfig { motor, pulse_pin, direction_pin } => {
                state.motors.insert(motor, (pulse_pin, direction_pin));
            }
            McuCommand::SetPosition { motor, position } => {
                if !state.motors.contains_key(&motor) {
                    return McuEvent::Error(format!("motor {} not configured", motor));
                }
                state.position = position;
                state.target = position;
            }
            McuCommand::MaxSpeed { speed, .. } if speed <= 0.0 => {
                return McuEvent::Error("speed must be positive".to_string());
            }
            McuCommand::MaxSpeed { speed, .. } => state.max_speed = speed,
            McuCommand::Acceleration { accel, .. } if accel <= 0.0 => {
                return McuEvent::Error("acceleration must be positive".to_string());
            }
            McuCommand::Acceleration { accel, .. } => state.acceleration = accel,
            McuCommand::MoveTo { position, .. } => state.target = position,
            McuCommand::MoveBy { delta, .. } => state.target = state.position + delta,
            McuCommand::Run { motor } => {
                if state.max_speed <= 0.0 {
                    return McuEvent::Error("max speed not set".to_string());
                }
                if state.running {
                    return McuEvent::Error("already running".to_string());
                }
                state.running = true;
                let duration = state.move_duration();
                self.spawn_completion(motor, mode, duration, out.clone());
            }
            McuCommand::IsRunning { motor } => {
                return McuEvent::Running { motor, running: state.running };
            }
            McuCommand::Shutdown => state.shutdown = true,
        }
        McuEvent::Ok
    }

    fn spawn_completion(
        &self,
        motor: MotorId,
        mode: CompletionMode,
        duration: Duration,
        out: mpsc::UnboundedSender<String>,
    ) {
        let board = self.clone();
        tokio::spawn(async move {
            match mode {
                CompletionMode::Timed => tokio::time::sleep(duration).await,
                CompletionMode::Manual => board.finish.notified().await,
            }
            {
                let mut state = board.lock();
                state.position = state.target;
                state.running = false;
                state.completed_moves += 1;
            }
            let done = McuEvent::Done {
                motor,
                timestamp: chrono::Utc::now().timestamp(),
            };
            let _ = out.send(done.to_string());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_rejects_write_to_unconfigured_pin() {
        let (_board, host) = SimulatedBoard::spawn(CompletionMode::Manual);
        let (read_half, mut write_half) = tokio::io::split(host);
        write_half.write_all(b"pin_write 8 1\n").await.unwrap();
        let mut lines = BufReader::new(read_half).lines();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert!(reply.starts_with("error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_move_completes() {
        let (board, host) = SimulatedBoard::spawn(CompletionMode::Timed);
        let (read_half, mut write_half) = tokio::io::split(host);
        write_half
            .write_all(b"stepper_config 0 3 6\nstepper_max_speed 0 1000\nstepper_move_to 0 500\nstepper_run 0\n")
            .await
            .unwrap();
        let mut lines = BufReader::new(read_half).lines();
        for _ in 0..4 {
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "ok");
        }
        let done = lines.next_line().await.unwrap().unwrap();
        assert!(done.starts_with("done 0 "));
        let state = board.state();
        assert_eq!(state.position, 500);
        assert!(!state.running);
        assert_eq!(state.completed_moves, 1);
    }
}
