//! Ordered drawing-point queue drained through the board controller.
//!
//! One job at a time: `start` is single-flight, so a second submission
//! while a drain is running just adds points to the tail instead of
//! interleaving a second loop with the first.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::board::{BoardController, BoardError};
use crate::config::PlotterConfig;

/// One drawing instruction: where to go in millimeters, whether the
/// pen draws on the way there, and an optional speed override in
/// percent. Immutable once enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrintPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub pen: bool,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Cheap to clone; all clones share the same pending points and
/// single-flight guard.
#[derive(Debug, Clone)]
pub struct PrintQueue {
    board: BoardController,
    config: PlotterConfig,
    points: Arc<Mutex<VecDeque<PrintPoint>>>,
    running: Arc<AtomicBool>,
    runs_completed: Arc<AtomicU64>,
}

impl PrintQueue {
    pub fn new(board: BoardController, config: PlotterConfig) -> Self {
        Self {
            board,
            config,
            points: Arc::new(Mutex::new(VecDeque::new())),
            running: Arc::new(AtomicBool::new(false)),
            runs_completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Appends points in order. Allowed in any state; a running drain
    /// picks them up.
    pub async fn enqueue(&self, points: impl IntoIterator<Item = PrintPoint>) -> usize {
        let mut queue = self.points.lock().await;
        queue.extend(points);
        queue.len()
    }

    /// Drops every pending point and reports how many were dropped. A
    /// point already handed to the board still completes; stopping only
    /// prevents future points from being dequeued.
    pub async fn clear(&self) -> usize {
        let mut queue = self.points.lock().await;
        let dropped = queue.len();
        queue.clear();
        if dropped > 0 {
            tracing::info!(dropped, "print queue cleared");
        }
        dropped
    }

    /// Drains the queue until empty, then parks the plotter. A start
    /// while already running is an ignored no-op, so exactly one drain
    /// loop exists at any time.
    pub async fn start(&self) -> Result<(), BoardError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("print queue already running, ignoring start");
            return Ok(());
        }
        let result = self.drain().await;
        if let Err(ref e) = result {
            tracing::error!(error = %e, "print run aborted");
        }
        self.running.store(false, Ordering::SeqCst);
        self.runs_completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn drain(&self) -> Result<(), BoardError> {
        self.board.enable_stepper_motors().await?;
        loop {
            let point = self.points.lock().await.pop_front();
            let Some(point) = point else { break };

            if point.pen {
                self.board.lower_brush().await?;
            } else {
                self.board.raise_brush().await?;
            }
            let fallback = if point.pen {
                self.config.drawing_speed
            } else {
                self.config.moving_speed
            };
            self.board.set_speed(point.speed.unwrap_or(fallback)).await;
            self.board.move_to(point.x, point.y).await?;
        }

        // Park: pen up, let the board finish, return to origin, release.
        self.board.raise_brush().await?;
        self.board.wait_until_idle().await?;
        self.board.home().await?;
        self.board.wait_until_idle().await?;
        self.board.disable_stepper_motors().await?;
        self.board.reset_speed().await;
        tracing::info!("print queue drained");
        Ok(())
    }

    pub async fn pending(&self) -> usize {
        self.points.lock().await.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Count of finished drain loops, for observing single-flight.
    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &PlotterConfig {
        &self.config
    }
}
