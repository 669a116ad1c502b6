//! Request and response bodies for the job-submission API.

use serde::{Deserialize, Serialize};

use crate::print_queue::PrintPoint;

/// A path to plot, in drawing order.
#[derive(Debug, Deserialize)]
pub struct PrintRequest {
    pub path: Vec<PrintPoint>,
}

#[derive(Debug, Serialize)]
pub struct PrintResponse {
    /// Identifier assigned to this submission, for log correlation.
    pub job: String,
    /// Pending points after the submission was appended.
    pub queued: usize,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// Points dropped from the pending queue.
    pub dropped: usize,
}

#[derive(Debug, Deserialize)]
pub struct LengthRequest {
    pub path: Vec<PrintPoint>,
}

#[derive(Debug, Serialize)]
pub struct LengthResponse {
    /// Pen-down travel of the path, in millimeters.
    pub length: f64,
}
