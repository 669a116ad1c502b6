use clap::Parser;
use tokio::sync::mpsc;
use tracing::Level;

use plotbot_rs::board::{BoardController, serial};
use plotbot_rs::config::{self, Config};
use plotbot_rs::print_queue::PrintQueue;
use plotbot_rs::simulator::SimulatedBoard;
use plotbot_rs::web::{api, plotter_channel::PlotterRequest};

/// Host-side controller and job server for a serial pen plotter.
#[derive(Debug, Parser)]
#[command(name = "plotter-host", version)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "plotter-config.json")]
    config: String,
    /// Serial port override (otherwise taken from the config file).
    #[arg(long)]
    port: Option<String>,
    /// Address for the job-submission API.
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: String,
    /// Run against the in-process simulated board.
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    let args = Args::parse();

    tracing::info!("starting plotter host");
    let config = match config::load_config(&args.config) {
        Ok(config) => config,
        Err(config::ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = args.config.as_str(), "config file not found, using defaults");
            Config::default()
        }
        Err(e) => {
            tracing::error!(path = args.config.as_str(), error = %e, "failed to load config");
            return Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>);
        }
    };
    let plotter = config.plotter.clone();
    tracing::info!(
        width_mm = plotter.max_width,
        height_mm = plotter.max_height,
        steps_per_mm = plotter.steps_per_mm,
        "plotter profile loaded"
    );

    let port = args.port.unwrap_or_else(|| config.serial.path.clone());
    let transport = if args.simulate || port.is_empty() {
        tracing::warn!("running in simulation mode");
        SimulatedBoard::spawn().0
    } else {
        match serial::open(&port, config.serial.baud) {
            Ok(transport) => {
                tracing::info!(port = port.as_str(), baud = config.serial.baud, "serial port opened");
                transport
            }
            Err(e) => {
                tracing::warn!(error = %e, "serial port unavailable, running in simulation mode");
                SimulatedBoard::spawn().0
            }
        }
    };

    let board = BoardController::new(transport, plotter.clone());
    board.initialize().await?;

    let queue = PrintQueue::new(board, plotter);

    // Channel between the axum handlers and the plotter task.
    let (plotter_tx, mut plotter_rx) = mpsc::channel::<PlotterRequest>(16);
    tokio::spawn(async move {
        while let Some(request) = plotter_rx.recv().await {
            match request {
                PlotterRequest::SubmitPath { points, respond_to } => {
                    let queued = queue.enqueue(points).await;
                    let runner = queue.clone();
                    tokio::spawn(async move {
                        if let Err(e) = runner.start().await {
                            tracing::error!(error = %e, "print run failed");
                        }
                    });
                    let _ = respond_to.send(queued);
                }
                PlotterRequest::Stop { respond_to } => {
                    let dropped = queue.clear().await;
                    let _ = respond_to.send(dropped);
                }
                PlotterRequest::GetConfig { respond_to } => {
                    let _ = respond_to.send(queue.config().clone());
                }
            }
        }
    });

    let app = api::create_router(plotter_tx);
    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    tracing::info!("job API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
