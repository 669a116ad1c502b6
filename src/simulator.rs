//! In-process board double.
//!
//! Speaks the same wire protocol as the real board over the same
//! channel seam, so the controller cannot tell the difference. Used by
//! `plotter-host` when no serial port is available and by the
//! integration tests as the board side of the link. Stepper moves open
//! a busy window sized from the commanded duration, which is what the
//! status token's motor and queue bits report.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use crate::board::TransportHandle;

/// Firmware banner the simulator answers version queries with.
pub const SIM_VERSION: &str = "SIMBoard Firmware 1.0";

/// Per-mnemonic counters for assertions about issued traffic.
#[derive(Debug, Default)]
pub struct SimStats {
    pub resets: AtomicU32,
    pub mode_configs: AtomicU32,
    pub motor_commands: AtomicU32,
    pub pen_down_commands: AtomicU32,
    pub pen_up_commands: AtomicU32,
    pub stepper_moves: AtomicU32,
    pub low_level_moves: AtomicU32,
    pub home_moves: AtomicU32,
    pub status_queries: AtomicU32,
    pub unknown_commands: AtomicU32,
}

pub struct SimulatedBoard;

impl SimulatedBoard {
    /// Spawns the board task. The returned handle plugs into
    /// [`crate::board::BoardController::new`] exactly like a serial
    /// transport; the stats handle stays valid after the link closes.
    pub fn spawn() -> (TransportHandle, Arc<SimStats>) {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let stats = Arc::new(SimStats::default());
        let task_stats = stats.clone();

        tokio::spawn(async move {
            let mut pen_down = false;
            let mut busy_until = Instant::now();

            while let Some(line) = outbound_rx.recv().await {
                let line = line.trim().to_string();
                let fields: Vec<&str> = line.split(',').collect();
                let mnemonic = fields[0].trim().to_ascii_uppercase();

                let reply = match mnemonic.as_str() {
                    "V" => SIM_VERSION.to_string(),
                    "R" => {
                        task_stats.resets.fetch_add(1, Ordering::SeqCst);
                        busy_until = Instant::now();
                        "OK".to_string()
                    }
                    "SC" => {
                        task_stats.mode_configs.fetch_add(1, Ordering::SeqCst);
                        "OK".to_string()
                    }
                    "EM" => {
                        task_stats.motor_commands.fetch_add(1, Ordering::SeqCst);
                        "OK".to_string()
                    }
                    "SP" => {
                        pen_down = field_u32(&fields, 1) == 0;
                        if pen_down {
                            task_stats.pen_down_commands.fetch_add(1, Ordering::SeqCst);
                        } else {
                            task_stats.pen_up_commands.fetch_add(1, Ordering::SeqCst);
                        }
                        "OK".to_string()
                    }
                    "SM" => {
                        task_stats.stepper_moves.fetch_add(1, Ordering::SeqCst);
                        let duration = Duration::from_millis(u64::from(field_u32(&fields, 1)));
                        busy_until = busy_until.max(Instant::now()) + duration;
                        "OK".to_string()
                    }
                    "LM" => {
                        task_stats.low_level_moves.fetch_add(1, Ordering::SeqCst);
                        let duration = Duration::from_millis(u64::from(field_u32(&fields, 7)));
                        busy_until = busy_until.max(Instant::now()) + duration;
                        "OK".to_string()
                    }
                    "HM" => {
                        task_stats.home_moves.fetch_add(1, Ordering::SeqCst);
                        "OK".to_string()
                    }
                    "QG" => {
                        task_stats.status_queries.fetch_add(1, Ordering::SeqCst);
                        let mut bits = 0u8;
                        if pen_down {
                            bits |= 0x10;
                        }
                        if Instant::now() < busy_until {
                            // Both motors plus the queue bit while work remains.
                            bits |= 0x04 | 0x02 | 0x01;
                        }
                        format!("{bits:02X}")
                    }
                    _ => {
                        task_stats.unknown_commands.fetch_add(1, Ordering::SeqCst);
                        format!("!Err: unknown command {mnemonic}")
                    }
                };

                if inbound_tx.send(reply).is_err() {
                    break;
                }
            }
        });

        (
            TransportHandle {
                outbound: outbound_tx,
                inbound: inbound_rx,
            },
            stats,
        )
    }
}

fn field_u32(fields: &[&str], index: usize) -> u32 {
    fields
        .get(index)
        .and_then(|field| field.trim().parse().ok())
        .unwrap_or(0)
}
