//! Integration tests for the board controller against the simulated
//! board, exercising the wire protocol on both sides of the link.

use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

use plotbot_rs::board::{BoardController, BoardError, BoardState, TransportHandle};
use plotbot_rs::simulator::SimulatedBoard;
use plotbot_rs::PlotterConfig;

fn test_config() -> PlotterConfig {
    PlotterConfig::default()
}

/// A transport whose board side stays open but never answers.
fn silent_transport() -> TransportHandle {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let _keep_line_open = inbound_tx;
        while outbound_rx.recv().await.is_some() {}
    });
    TransportHandle {
        outbound: outbound_tx,
        inbound: inbound_rx,
    }
}

#[tokio::test]
async fn initialization_runs_the_configuration_sequence() {
    let (transport, stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());

    board.initialize().await.unwrap();

    assert_eq!(board.state().await, BoardState::Ready);
    assert_eq!(stats.resets.load(Ordering::SeqCst), 1);
    // Servo min height, servo max height, servo rate.
    assert_eq!(stats.mode_configs.load(Ordering::SeqCst), 3);
    // Motors are left disabled until a job needs them.
    assert_eq!(stats.motor_commands.load(Ordering::SeqCst), 1);
    assert!(!board.motors_enabled());
    assert_eq!(board.position().await, (0, 0));
}

#[tokio::test]
async fn connect_timeout_faults_the_controller() {
    let mut config = test_config();
    config.connect_timeout_ms = 50;
    let board = BoardController::new(silent_transport(), config);

    let err = board.initialize().await.unwrap_err();

    assert!(matches!(err, BoardError::ConnectTimeout(50)));
    assert_eq!(board.state().await, BoardState::Faulted);
}

#[tokio::test]
async fn moves_convert_millimeters_and_track_position() {
    let (transport, stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());
    board.initialize().await.unwrap();
    board.enable_stepper_motors().await.unwrap();

    board.move_to(50.0, 50.0).await.unwrap();

    assert_eq!(board.position().await, (4000, 4000));
    assert_eq!(stats.stepper_moves.load(Ordering::SeqCst), 1);
    assert_eq!(board.clamped_moves(), 0);
}

#[tokio::test]
async fn out_of_canvas_targets_are_clamped_not_rejected() {
    let (transport, stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());
    board.initialize().await.unwrap();
    board.enable_stepper_motors().await.unwrap();

    board.move_to(1000.0, -5.0).await.unwrap();

    // 210 mm x 80 steps/mm wide; y saturates at the origin edge.
    assert_eq!(board.position().await, (16_800, 0));
    assert_eq!(board.clamped_moves(), 1);
    assert_eq!(stats.stepper_moves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_distance_moves_issue_nothing() {
    let (transport, stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());
    board.initialize().await.unwrap();
    board.enable_stepper_motors().await.unwrap();

    board.move_to(20.0, 20.0).await.unwrap();
    board.move_to(20.0, 20.0).await.unwrap();

    assert_eq!(stats.stepper_moves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pen_commands_are_idempotent() {
    let (transport, stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());
    board.initialize().await.unwrap();

    board.lower_brush().await.unwrap();
    board.lower_brush().await.unwrap();
    assert!(board.pen_is_down());
    board.raise_brush().await.unwrap();
    board.raise_brush().await.unwrap();
    assert!(!board.pen_is_down());

    assert_eq!(stats.pen_down_commands.load(Ordering::SeqCst), 1);
    assert_eq!(stats.pen_up_commands.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commands_before_ready_are_ignored() {
    let (transport, stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());

    // No initialize: every mutating call is a logged no-op.
    board.move_to(10.0, 10.0).await.unwrap();
    board.lower_brush().await.unwrap();
    board.enable_stepper_motors().await.unwrap();
    board.home().await.unwrap();

    assert_eq!(stats.stepper_moves.load(Ordering::SeqCst), 0);
    assert_eq!(stats.pen_down_commands.load(Ordering::SeqCst), 0);
    assert_eq!(stats.motor_commands.load(Ordering::SeqCst), 0);
    assert_eq!(stats.home_moves.load(Ordering::SeqCst), 0);
    assert_eq!(board.position().await, (0, 0));
}

#[tokio::test]
async fn home_resets_the_tracked_position() {
    let (transport, stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());
    board.initialize().await.unwrap();
    board.enable_stepper_motors().await.unwrap();
    board.move_to(30.0, 40.0).await.unwrap();

    board.home().await.unwrap();

    assert_eq!(board.position().await, (0, 0));
    assert_eq!(stats.home_moves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn status_is_queried_fresh_every_call() {
    let (transport, stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());
    board.initialize().await.unwrap();

    let first = board.query_status().await.unwrap();
    assert!(!first.pen_down);
    board.lower_brush().await.unwrap();
    let second = board.query_status().await.unwrap();
    assert!(second.pen_down);

    assert_eq!(stats.status_queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn wait_until_idle_returns_once_the_board_drains() {
    let (transport, _stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());
    board.initialize().await.unwrap();
    board.enable_stepper_motors().await.unwrap();
    board.set_speed(100.0).await;
    board.move_to(10.0, 0.0).await.unwrap();

    board.wait_until_idle().await.unwrap();

    let status = board.query_status().await.unwrap();
    assert!(status.is_idle());
}

#[tokio::test]
async fn wait_until_idle_is_bounded() {
    let (transport, _stats) = SimulatedBoard::spawn();
    let mut config = test_config();
    config.idle_timeout_ms = 100;
    let board = BoardController::new(transport, config);
    board.initialize().await.unwrap();
    board.enable_stepper_motors().await.unwrap();

    // At 0% speed this move keeps the simulated board busy for nearly
    // a minute, far past the 100 ms budget.
    board.set_speed(0.0).await;
    board.move_to(50.0, 50.0).await.unwrap();

    let err = board.wait_until_idle().await.unwrap_err();
    assert!(matches!(err, BoardError::IdleTimeout(100)));
}

#[tokio::test]
async fn low_level_move_is_issued_with_rate_terms() {
    let (transport, stats) = SimulatedBoard::spawn();
    let board = BoardController::new(transport, test_config());
    board.initialize().await.unwrap();
    board.enable_stepper_motors().await.unwrap();

    board.low_level_move_to(10.0, 5.0).await.unwrap();

    assert_eq!(stats.low_level_moves.load(Ordering::SeqCst), 1);
    assert_eq!(stats.stepper_moves.load(Ordering::SeqCst), 0);
    assert_eq!(board.position().await, (800, 400));
}

#[tokio::test]
async fn shutdown_fails_outstanding_commands() {
    let mut config = test_config();
    config.connect_timeout_ms = 5_000;
    let board = BoardController::new(silent_transport(), config);

    let waiting = {
        let board = board.clone();
        tokio::spawn(async move { board.initialize().await })
    };
    // Let the version query go out, then tear down underneath it.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    board.shutdown().await;

    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, BoardError::Shutdown));
    assert_eq!(board.state().await, BoardState::Faulted);
}

#[tokio::test]
async fn closed_transport_surfaces_a_connectivity_error() {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
    // Board side goes away entirely.
    drop(outbound_rx);
    drop(inbound_tx);
    let board = BoardController::new(
        TransportHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
        },
        test_config(),
    );

    let err = board.initialize().await.unwrap_err();
    assert!(matches!(err, BoardError::TransportClosed));
    assert_eq!(board.state().await, BoardState::Faulted);
}
