//! Channel messages between the web handlers and the plotter task.

use tokio::sync::oneshot;

use crate::config::PlotterConfig;
use crate::print_queue::PrintPoint;

/// A request sent from a web handler to the plotter task.
#[derive(Debug)]
pub enum PlotterRequest {
    /// Enqueue a path and make sure a drain is running.
    SubmitPath {
        points: Vec<PrintPoint>,
        respond_to: oneshot::Sender<usize>,
    },
    /// Drop all pending points. The in-flight point still completes.
    Stop { respond_to: oneshot::Sender<usize> },
    /// Read back the immutable plotter record.
    GetConfig {
        respond_to: oneshot::Sender<PlotterConfig>,
    },
}
