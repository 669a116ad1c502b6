//! Board controller: owns the transport, runs the initialization
//! handshake, and exposes the high-level motion, pen, and status
//! operations while tracking position, pen state, and motor enable.

pub mod correlator;
pub mod serial;

pub use serial::TransportHandle;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::config::PlotterConfig;
use crate::motion;
use crate::protocol::{self, Command, ProtocolError, ResponseLine, StatusFlags};
use correlator::{PendingCommand, ResponseCorrelator};

/// Servo stroke time for one pen raise or lower.
const PEN_STROKE_MS: u32 = 150;
/// Speed applied to direct moves until a caller overrides it.
const DEFAULT_SPEED_PERCENT: f64 = 50.0;
/// Response wait for commands issued after the handshake.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause between status polls while waiting for the board to go idle.
const IDLE_POLL_PERIOD: Duration = Duration::from_millis(50);
/// Rate-accumulator scale for low-level moves.
const RATE_FACTOR: f64 = 85_855.0;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("could not open serial port {path}")]
    PortOpen {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("no response from the board within {0} ms, check the connection")]
    ConnectTimeout(u64),
    #[error("timed out waiting for the {command} response")]
    ResponseTimeout { command: &'static str },
    #[error("board still busy after {0} ms")]
    IdleTimeout(u64),
    #[error("serial transport closed")]
    TransportClosed,
    #[error("controller shut down with the command outstanding")]
    Shutdown,
    #[error("board rejected {command}: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Lifecycle of one controller instance. A faulted controller is never
/// reused; callers build a new one against a fresh transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    Uninitialized,
    Connecting,
    Configuring,
    Ready,
    Faulted,
}

/// Drives the plotter board over a line transport. Cheap to clone; all
/// clones share the same link, correlator, and tracked state.
#[derive(Debug, Clone)]
pub struct BoardController {
    config: PlotterConfig,
    outbound: mpsc::UnboundedSender<String>,
    correlator: Arc<Mutex<ResponseCorrelator>>,
    state: Arc<Mutex<BoardState>>,
    /// Tracked position in steps. Advanced when a move is issued, not
    /// when it completes, so planning stays consistent with commands
    /// already in flight.
    position: Arc<Mutex<(i32, i32)>>,
    pen_down: Arc<AtomicBool>,
    motors_enabled: Arc<AtomicBool>,
    speed: Arc<Mutex<f64>>,
    clamped_moves: Arc<AtomicU64>,
}

impl BoardController {
    /// Takes ownership of the transport. The inbound half feeds the
    /// response dispatch task from here on; if the line stream ends,
    /// every outstanding command is failed and the controller faults.
    pub fn new(transport: TransportHandle, config: PlotterConfig) -> Self {
        let TransportHandle {
            outbound,
            mut inbound,
        } = transport;
        let correlator = Arc::new(Mutex::new(ResponseCorrelator::new()));
        let state = Arc::new(Mutex::new(BoardState::Uninitialized));

        let dispatch_correlator = correlator.clone();
        let dispatch_state = state.clone();
        tokio::spawn(async move {
            while let Some(line) = inbound.recv().await {
                dispatch_correlator.lock().await.on_line(&line);
            }
            tracing::info!("board line stream ended");
            dispatch_correlator
                .lock()
                .await
                .fail_all(|| BoardError::TransportClosed);
            *dispatch_state.lock().await = BoardState::Faulted;
        });

        Self {
            config,
            outbound,
            correlator,
            state,
            position: Arc::new(Mutex::new((0, 0))),
            pen_down: Arc::new(AtomicBool::new(false)),
            motors_enabled: Arc::new(AtomicBool::new(false)),
            speed: Arc::new(Mutex::new(DEFAULT_SPEED_PERCENT)),
            clamped_moves: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs the connect handshake and the fixed configuration sequence.
    /// The version query is the probe: its answer is the first line the
    /// board ever sends us, bounded by the configured connect timeout.
    pub async fn initialize(&self) -> Result<(), BoardError> {
        self.set_state(BoardState::Connecting).await;
        let connect_timeout = self.config.connect_timeout();
        let version = match self
            .transact(Command::QueryVersion, connect_timeout)
            .await
        {
            Ok(version) => version,
            Err(e) => {
                self.set_state(BoardState::Faulted).await;
                return Err(match e {
                    BoardError::ResponseTimeout { .. } => {
                        BoardError::ConnectTimeout(self.config.connect_timeout_ms)
                    }
                    other => other,
                });
            }
        };
        tracing::info!(version = version.as_str(), "board answered, configuring");

        self.set_state(BoardState::Configuring).await;
        if let Err(e) = self.configure().await {
            self.set_state(BoardState::Faulted).await;
            return Err(e);
        }
        self.set_state(BoardState::Ready).await;
        tracing::info!("board controller ready");
        Ok(())
    }

    async fn configure(&self) -> Result<(), BoardError> {
        self.transact(Command::Reset, RESPONSE_TIMEOUT).await?;
        self.transact(
            Command::ConfigureMode {
                parameter: 4,
                value: self.config.min_servo_height,
            },
            RESPONSE_TIMEOUT,
        )
        .await?;
        self.transact(
            Command::ConfigureMode {
                parameter: 5,
                value: self.config.max_servo_height,
            },
            RESPONSE_TIMEOUT,
        )
        .await?;
        self.transact(
            Command::ConfigureMode {
                parameter: 10,
                value: self.config.servo_rate,
            },
            RESPONSE_TIMEOUT,
        )
        .await?;
        self.transact(
            Command::EnableMotors {
                motor1: false,
                motor2: false,
            },
            RESPONSE_TIMEOUT,
        )
        .await?;
        self.motors_enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Clears board motion and queue state. The tracked pen and motor
    /// flags survive; a reset does not move the servo or the axes.
    pub async fn reset(&self) -> Result<(), BoardError> {
        if !self.ready_or_ignore("reset").await {
            return Ok(());
        }
        self.transact(Command::Reset, RESPONSE_TIMEOUT).await?;
        Ok(())
    }

    /// Moves to a target in millimeters. Targets outside the printable
    /// area are clamped to the edge, counted, and logged; a move with
    /// no displacement completes without issuing anything.
    pub async fn move_to(&self, x_mm: f64, y_mm: f64) -> Result<(), BoardError> {
        if !self.ready_or_ignore("move").await {
            return Ok(());
        }
        let (steps1, steps2, duration_ms) = self.plan_move(x_mm, y_mm).await;
        if steps1 == 0 && steps2 == 0 {
            tracing::trace!("zero-distance move, nothing to issue");
            return Ok(());
        }
        self.transact(
            Command::StepperMove {
                duration_ms,
                steps1,
                steps2,
            },
            RESPONSE_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    /// Raw rate-accumulator variant of [`move_to`](Self::move_to),
    /// reserved for advanced callers; the default flow never takes it.
    pub async fn low_level_move_to(&self, x_mm: f64, y_mm: f64) -> Result<(), BoardError> {
        if !self.ready_or_ignore("low-level move").await {
            return Ok(());
        }
        let (steps1, steps2, duration_ms) = self.plan_move(x_mm, y_mm).await;
        if steps1 == 0 && steps2 == 0 {
            return Ok(());
        }
        let seconds = f64::from(duration_ms) / 1000.0;
        let rate1 = (RATE_FACTOR * f64::from(steps1.abs()) / seconds).round() as u32;
        let rate2 = (RATE_FACTOR * f64::from(steps2.abs()) / seconds).round() as u32;
        self.transact(
            Command::LowLevelMove {
                rate1,
                steps1,
                delta1: 0,
                rate2,
                steps2,
                delta2: 0,
                duration_ms,
            },
            RESPONSE_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    /// Clamps the target, computes deltas and duration, and advances
    /// the tracked position to the issued target.
    async fn plan_move(&self, x_mm: f64, y_mm: f64) -> (i32, i32, u32) {
        let target_x = (x_mm * self.config.steps_per_mm).round() as i32;
        let target_y = (y_mm * self.config.steps_per_mm).round() as i32;
        let clamped_x = motion::clamp(target_x, 0, self.config.max_x_steps());
        let clamped_y = motion::clamp(target_y, 0, self.config.max_y_steps());
        if clamped_x != target_x || clamped_y != target_y {
            self.clamped_moves.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                target_x,
                target_y,
                clamped_x,
                clamped_y,
                "target outside the printable area, clamped"
            );
        }

        let speed = *self.speed.lock().await;
        let mut position = self.position.lock().await;
        let steps1 = motion::step_delta(position.0, clamped_x);
        let steps2 = motion::step_delta(position.1, clamped_y);
        let duration_ms = motion::duration_ms(
            speed,
            self.config.min_steps_per_ms,
            self.config.max_steps_per_ms,
            steps1,
            steps2,
        );
        *position = (clamped_x, clamped_y);
        (steps1, steps2, duration_ms)
    }

    pub async fn lower_brush(&self) -> Result<(), BoardError> {
        self.set_pen(true).await
    }

    pub async fn raise_brush(&self) -> Result<(), BoardError> {
        self.set_pen(false).await
    }

    /// Idempotent: the pen state is tracked in an internal flag, never
    /// re-queried from hardware, and a matching request is a no-op.
    async fn set_pen(&self, down: bool) -> Result<(), BoardError> {
        let operation = if down { "pen down" } else { "pen up" };
        if !self.ready_or_ignore(operation).await {
            return Ok(());
        }
        if self.pen_down.load(Ordering::SeqCst) == down {
            return Ok(());
        }
        self.transact(
            Command::SetPenState {
                up: !down,
                duration_ms: PEN_STROKE_MS,
            },
            RESPONSE_TIMEOUT,
        )
        .await?;
        self.pen_down.store(down, Ordering::SeqCst);
        Ok(())
    }

    pub async fn enable_stepper_motors(&self) -> Result<(), BoardError> {
        self.set_motors(true).await
    }

    pub async fn disable_stepper_motors(&self) -> Result<(), BoardError> {
        self.set_motors(false).await
    }

    async fn set_motors(&self, enabled: bool) -> Result<(), BoardError> {
        let operation = if enabled { "enable motors" } else { "disable motors" };
        if !self.ready_or_ignore(operation).await {
            return Ok(());
        }
        self.transact(
            Command::EnableMotors {
                motor1: enabled,
                motor2: enabled,
            },
            RESPONSE_TIMEOUT,
        )
        .await?;
        self.motors_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    /// Issues the home move and resets the tracked position to origin.
    pub async fn home(&self) -> Result<(), BoardError> {
        if !self.ready_or_ignore("home").await {
            return Ok(());
        }
        self.transact(
            Command::HomeMove {
                step_rate: self.config.home_step_rate(),
            },
            RESPONSE_TIMEOUT,
        )
        .await?;
        *self.position.lock().await = (0, 0);
        Ok(())
    }

    /// Asks the board for its status bits. Always a fresh query.
    pub async fn query_status(&self) -> Result<StatusFlags, BoardError> {
        let token = self.transact(Command::QueryStatus, RESPONSE_TIMEOUT).await?;
        Ok(StatusFlags::parse(&token)?)
    }

    /// Polls general status until the board reports idle, suspending
    /// between polls. Bounded by the configured wall-clock budget; a
    /// board that never drains is a connectivity fault, not a hang.
    pub async fn wait_until_idle(&self) -> Result<(), BoardError> {
        if !self.ready_or_ignore("wait until idle").await {
            return Ok(());
        }
        let budget = self.config.idle_timeout();
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            match self.query_status().await {
                Ok(status) if status.is_idle() => return Ok(()),
                Ok(_) => {}
                Err(BoardError::Protocol(e)) => {
                    // Garbled token: discard and let the next poll answer.
                    tracing::warn!(error = %e, "discarding malformed status line");
                }
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BoardError::IdleTimeout(self.config.idle_timeout_ms));
            }
            tokio::time::sleep(IDLE_POLL_PERIOD).await;
        }
    }

    /// Fails every outstanding command and faults the controller. Safe
    /// to call more than once.
    pub async fn shutdown(&self) {
        self.correlator.lock().await.fail_all(|| BoardError::Shutdown);
        *self.state.lock().await = BoardState::Faulted;
        tracing::info!("board controller shut down");
    }

    /// Sends one command and waits for its correlated response line.
    /// The correlator lock is held across enqueue and write so queue
    /// order always matches wire order under concurrent callers.
    async fn transact(&self, command: Command, timeout: Duration) -> Result<String, BoardError> {
        let line = command.encode();
        let kind = command.mnemonic();

        if !command.expects_response() {
            self.outbound
                .send(line)
                .map_err(|_| BoardError::TransportClosed)?;
            return Ok(String::new());
        }

        let (completion_tx, completion_rx) = oneshot::channel();
        {
            let mut correlator = self.correlator.lock().await;
            correlator.enqueue(PendingCommand {
                kind,
                expects_response: true,
                loggable: command.loggable(),
                completion: completion_tx,
            });
            if self.outbound.send(line).is_err() {
                correlator.fail_all(|| BoardError::TransportClosed);
                return Err(BoardError::TransportClosed);
            }
        }

        match tokio::time::timeout(timeout, completion_rx).await {
            Ok(Ok(result)) => {
                let line = result?;
                match protocol::classify(&line) {
                    ResponseLine::Fault(message) => Err(BoardError::Rejected {
                        command: kind,
                        message,
                    }),
                    ResponseLine::Ack => Ok(line),
                    ResponseLine::Data(payload) => Ok(payload),
                }
            }
            // Completion dropped without a send: dispatch task is gone.
            Ok(Err(_)) => Err(BoardError::TransportClosed),
            Err(_) => Err(BoardError::ResponseTimeout { command: kind }),
        }
    }

    /// Mutating operations outside Ready are ignored no-ops, never
    /// errors, so duplicate external requests cannot wedge a pipeline.
    async fn ready_or_ignore(&self, operation: &'static str) -> bool {
        let state = *self.state.lock().await;
        if state == BoardState::Ready {
            true
        } else {
            tracing::warn!(operation, ?state, "ignoring command while controller is not ready");
            false
        }
    }

    async fn set_state(&self, state: BoardState) {
        *self.state.lock().await = state;
    }

    pub async fn state(&self) -> BoardState {
        *self.state.lock().await
    }

    /// Tracked position in steps.
    pub async fn position(&self) -> (i32, i32) {
        *self.position.lock().await
    }

    pub fn pen_is_down(&self) -> bool {
        self.pen_down.load(Ordering::SeqCst)
    }

    pub fn motors_enabled(&self) -> bool {
        self.motors_enabled.load(Ordering::SeqCst)
    }

    pub async fn speed(&self) -> f64 {
        *self.speed.lock().await
    }

    pub async fn set_speed(&self, percent: f64) {
        *self.speed.lock().await = percent.clamp(0.0, 100.0);
    }

    pub async fn reset_speed(&self) {
        *self.speed.lock().await = DEFAULT_SPEED_PERCENT;
    }

    /// Number of moves whose target had to be clamped to the canvas.
    pub fn clamped_moves(&self) -> u64 {
        self.clamped_moves.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &PlotterConfig {
        &self.config
    }
}
