// src/hardware/serial.rs - Line-oriented connection to the motor bridge
use serial2_tokio::SerialPort;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use super::protocol::{McuCommand, McuEvent, MotorId};
use super::LinkError;

/// Serial connection statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkStats {
    pub commands_sent: u64,
    pub replies_received: u64,
    pub notifications_received: u64,
    pub dropped_lines: u64,
    pub timeouts: u64,
}

/// Waiters for inbound lines. Replies are matched to commands in send order.
#[derive(Default)]
struct Inbox {
    replies: VecDeque<oneshot::Sender<McuEvent>>,
    completion: Option<(MotorId, oneshot::Sender<i64>)>,
    closed: bool,
    stats: LinkStats,
}

impl Inbox {
    fn close(&mut self) {
        self.closed = true;
        // Dropping the senders wakes every waiter with an error.
        self.replies.clear();
        self.completion = None;
    }

    fn dispatch(&mut self, line: &str) {
        let Some(event) = McuEvent::parse(line) else {
            tracing::warn!("Dropping unparseable MCU line: {:?}", line);
            self.stats.dropped_lines += 1;
            return;
        };

        match event {
            McuEvent::Done { motor, timestamp } => {
                self.stats.notifications_received += 1;
                match self.completion.take() {
                    Some((expected, tx)) if expected == motor => {
                        let _ = tx.send(timestamp);
                    }
                    Some(other) => {
                        tracing::warn!("Completion for motor {} while waiting on motor {}", motor, other.0);
                        self.completion = Some(other);
                    }
                    None => tracing::warn!("Completion for motor {} with no move outstanding", motor),
                }
            }
            reply => {
                self.stats.replies_received += 1;
                match self.replies.pop_front() {
                    Some(tx) => {
                        // The waiter may have timed out; its slot still consumes this reply.
                        let _ = tx.send(reply);
                    }
                    None => {
                        tracing::warn!("Unsolicited MCU reply: {}", reply);
                        self.stats.dropped_lines += 1;
                    }
                }
            }
        }
    }
}

/// Serial communication handler for the motor bridge.
///
/// A reader task splits inbound bytes into lines and routes them to waiting
/// requests or to the pending completion; a writer task drains the outgoing
/// command queue.
pub struct McuConnection {
    command_tx: mpsc::UnboundedSender<String>,
    inbox: Arc<Mutex<Inbox>>,
}

impl McuConnection {
    /// Open a serial port and attach a connection to it.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, LinkError> {
        tracing::info!("Connecting to MCU on {} at {} baud", port_name, baud_rate);
        let port = SerialPort::open(port_name, baud_rate).map_err(|source| LinkError::Open {
            port: port_name.to_string(),
            source,
        })?;
        Ok(Self::from_stream(port))
    }

    /// Attach to any byte stream. Must be called inside a tokio runtime.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let inbox = Arc::new(Mutex::new(Inbox::default()));
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();

        let reader_inbox = inbox.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        tracing::debug!("Serial RX: {}", line);
                        lock(&reader_inbox).dispatch(line);
                    }
                    Ok(None) => {
                        tracing::info!("Serial connection closed by remote");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Serial read error: {}", e);
                        break;
                    }
                }
            }
            lock(&reader_inbox).close();
        });

        let writer_inbox = inbox.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                tracing::debug!("Serial TX: {}", command);
                let line = format!("{}\n", command);
                let written = async {
                    write_half.write_all(line.as_bytes()).await?;
                    write_half.flush().await
                };
                match timeout(Duration::from_secs(1), written).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!("Serial write error: {}", e);
                        break;
                    }
                    Err(_) => {
                        tracing::error!("Serial write timeout");
                        break;
                    }
                }
            }
            lock(&writer_inbox).close();
            tracing::debug!("Serial writer task terminated");
        });

        Self { command_tx, inbox }
    }

    fn inbox(&self) -> MutexGuard<'_, Inbox> {
        lock(&self.inbox)
    }

    /// Queue a command and return the receiver for its reply.
    pub fn send(&self, command: &McuCommand) -> Result<oneshot::Receiver<McuEvent>, LinkError> {
        let mut inbox = self.inbox();
        if inbox.closed {
            return Err(LinkError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        // Register before queueing so the reply can never overtake its waiter.
        inbox.replies.push_back(tx);
        if self.command_tx.send(command.to_line()).is_err() {
            inbox.close();
            return Err(LinkError::Closed);
        }
        inbox.stats.commands_sent += 1;
        Ok(rx)
    }

    /// Send a command and wait for its reply. `error` replies become
    /// [`LinkError::Rejected`].
    ///
    /// A timeout closes the link: replies carry no command id, so once one
    /// goes missing every later reply would be matched to the wrong waiter.
    pub async fn request(&self, command: &McuCommand, wait: Duration) -> Result<McuEvent, LinkError> {
        let rx = self.send(command)?;
        match timeout(wait, rx).await {
            Ok(Ok(McuEvent::Error(message))) => Err(LinkError::Rejected {
                command: command.to_line(),
                message,
            }),
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(LinkError::Closed),
            Err(_) => {
                let mut inbox = self.inbox();
                inbox.stats.timeouts += 1;
                inbox.close();
                drop(inbox);
                tracing::error!("Timeout after {:?} waiting for reply to '{}'; closing link", wait, command);
                Err(LinkError::Timeout {
                    after: wait,
                    command: command.to_line(),
                })
            }
        }
    }

    /// Send a command that must be acknowledged with a plain `ok`.
    pub async fn execute(&self, command: &McuCommand, wait: Duration) -> Result<(), LinkError> {
        match self.request(command, wait).await? {
            McuEvent::Ok => Ok(()),
            other => Err(LinkError::UnexpectedReply {
                command: command.to_line(),
                reply: other.to_string(),
            }),
        }
    }

    /// Queue a command without waiting for or tracking its reply.
    pub fn post(&self, command: &McuCommand) -> Result<(), LinkError> {
        let mut inbox = self.inbox();
        if inbox.closed {
            return Err(LinkError::Closed);
        }
        // Keep FIFO matching intact by reserving a slot nobody listens on.
        let (tx, _rx) = oneshot::channel();
        inbox.replies.push_back(tx);
        self.command_tx
            .send(command.to_line())
            .map_err(|_| LinkError::Closed)?;
        inbox.stats.commands_sent += 1;
        Ok(())
    }

    /// Register the single waiter for the next completion of `motor`.
    pub fn expect_completion(&self, motor: MotorId) -> Result<oneshot::Receiver<i64>, LinkError> {
        let mut inbox = self.inbox();
        if inbox.closed {
            return Err(LinkError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        inbox.completion = Some((motor, tx));
        Ok(rx)
    }

    /// Drop a registered completion waiter, e.g. when the run command failed.
    pub fn cancel_completion(&self) {
        self.inbox().completion = None;
    }

    /// True from `expect_completion` until the board reports `done` for that
    /// motor, the waiter is cancelled or the link closes. Dropping the
    /// receiver does not end the wait: the board is still moving.
    pub fn completion_pending(&self) -> bool {
        self.inbox().completion.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inbox().closed
    }

    /// Get connection statistics
    pub fn stats(&self) -> LinkStats {
        self.inbox().stats.clone()
    }
}

impl std::fmt::Debug for McuConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McuConnection")
            .field("stats", &self.stats())
            .finish()
    }
}

fn lock(inbox: &Mutex<Inbox>) -> MutexGuard<'_, Inbox> {
    inbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    const WAIT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_replies_match_commands_in_order() {
        let (host, board) = duplex(1024);
        let conn = McuConnection::from_stream(host);
        let (board_rx, mut board_tx) = tokio::io::split(board);

        tokio::spawn(async move {
            let mut lines = BufReader::new(board_rx).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = if line.starts_with("stepper_is_running") {
                    "running 0 1\n"
                } else {
                    "ok\n"
                };
                board_tx.write_all(reply.as_bytes()).await.unwrap();
            }
        });

        conn.execute(&McuCommand::PinOutput { pin: 8 }, WAIT).await.unwrap();
        let reply = conn.request(&McuCommand::IsRunning { motor: 0 }, WAIT).await.unwrap();
        assert_eq!(reply, McuEvent::Running { motor: 0, running: true });
        assert_eq!(conn.stats().commands_sent, 2);
        assert_eq!(conn.stats().replies_received, 2);
    }

    #[tokio::test]
    async fn test_error_reply_is_rejected() {
        let (host, mut board) = duplex(1024);
        let conn = McuConnection::from_stream(host);
        board.write_all(b"error bad pin\n").await.unwrap();
        let result = conn.execute(&McuCommand::PinOutput { pin: 99 }, WAIT).await;
        assert!(matches!(result, Err(LinkError::Rejected { message, .. }) if message == "bad pin"));
    }

    #[tokio::test]
    async fn test_completion_is_routed_once() {
        let (host, mut board) = duplex(1024);
        let conn = McuConnection::from_stream(host);
        let rx = conn.expect_completion(0).unwrap();
        assert!(conn.completion_pending());
        board.write_all(b"done 0 1700000000\ndone 0 1700000001\n").await.unwrap();
        assert_eq!(rx.await.unwrap(), 1_700_000_000);
        // Let the second notification arrive; it has nobody to go to.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!conn.completion_pending());
        assert_eq!(conn.stats().notifications_received, 2);
    }

    #[tokio::test]
    async fn test_timeout_when_board_is_silent() {
        let (host, _board) = duplex(1024);
        let conn = McuConnection::from_stream(host);
        let result = conn
            .request(&McuCommand::Run { motor: 0 }, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(LinkError::Timeout { .. })));
        assert_eq!(conn.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_late_reply_is_not_matched_to_next_command() {
        let (host, board) = duplex(1024);
        let conn = McuConnection::from_stream(host);
        let (board_rx, mut board_tx) = tokio::io::split(board);
        let mut lines = BufReader::new(board_rx).lines();

        let first = conn.request(&McuCommand::Run { motor: 0 }, Duration::from_millis(20)).await;
        assert!(matches!(first, Err(LinkError::Timeout { .. })));
        assert!(conn.is_closed());

        // The board answers the first line late; nothing may pick it up.
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "stepper_run 0");
        board_tx.write_all(b"ok\n").await.unwrap();
        let second = conn.request(&McuCommand::Shutdown, WAIT).await;
        assert!(matches!(second, Err(LinkError::Closed)));
    }

    #[tokio::test]
    async fn test_dropped_waiter_keeps_completion_pending() {
        let (host, mut board) = duplex(1024);
        let conn = McuConnection::from_stream(host);
        drop(conn.expect_completion(0).unwrap());
        assert!(conn.completion_pending());

        board.write_all(b"done 0 1700000000\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!conn.completion_pending());
        assert_eq!(conn.stats().notifications_received, 1);
    }

    #[tokio::test]
    async fn test_closed_link_fails_waiters() {
        let (host, board) = duplex(1024);
        let conn = McuConnection::from_stream(host);
        let completion = conn.expect_completion(0).unwrap();
        drop(board);
        assert!(completion.await.is_err());
        let result = conn.request(&McuCommand::Shutdown, WAIT).await;
        assert!(matches!(result, Err(LinkError::Closed)));
    }
}
