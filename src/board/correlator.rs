//! Pairs outgoing commands with the response lines that answer them.
//!
//! The transport delivers an unstructured stream of lines; this queue
//! turns it into resolved completions in the order commands were sent.
//! The board does not echo any command identifier, so pairing is
//! strictly first-in-first-out: each inbound line answers the oldest
//! command still waiting. Resolving the most recently sent command
//! instead would break as soon as two callers interleave (a background
//! status poll during a move), so FIFO holds unconditionally.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use super::BoardError;

/// A command in flight: created when the command is transmitted,
/// destroyed when its response arrives or the controller tears down.
#[derive(Debug)]
pub struct PendingCommand {
    pub kind: &'static str,
    pub expects_response: bool,
    pub loggable: bool,
    pub completion: oneshot::Sender<Result<String, BoardError>>,
}

#[derive(Debug, Default)]
pub struct ResponseCorrelator {
    outstanding: VecDeque<PendingCommand>,
    orphan_lines: u64,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends at the moment the command is transmitted. The caller
    /// holds the correlator lock across enqueue and the actual write so
    /// queue order always matches wire order.
    pub fn enqueue(&mut self, pending: PendingCommand) {
        self.outstanding.push_back(pending);
    }

    /// Resolves the oldest outstanding command expecting a response
    /// with the trimmed line. A line with nothing outstanding is a
    /// protocol error: logged, counted, discarded.
    pub fn on_line(&mut self, line: &str) {
        let line = line.trim();
        while let Some(pending) = self.outstanding.pop_front() {
            if !pending.expects_response {
                // Fire-and-forget bookkeeping entry; nothing to resolve.
                continue;
            }
            if pending.loggable {
                tracing::debug!(command = pending.kind, response = line, "board response");
            }
            if pending.completion.send(Ok(line.to_string())).is_err() {
                tracing::debug!(command = pending.kind, "response arrived after the caller gave up");
            }
            return;
        }
        self.orphan_lines += 1;
        tracing::warn!(line, "response line with no outstanding command, discarding");
    }

    /// Fails every outstanding command. Callers must never be left
    /// hanging past teardown.
    pub fn fail_all(&mut self, error: impl Fn() -> BoardError) {
        while let Some(pending) = self.outstanding.pop_front() {
            tracing::debug!(command = pending.kind, "failing outstanding command");
            let _ = pending.completion.send(Err(error()));
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn orphan_lines(&self) -> u64 {
        self.orphan_lines
    }
}
