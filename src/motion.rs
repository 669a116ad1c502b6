//! Pure motion-planning math. Everything here works in integer step
//! units and plain milliseconds; the controller owns the mm-to-step
//! conversion and all I/O.

/// Saturates a coordinate into the printable area. Targets outside the
/// canvas degrade to drawing at the edge instead of failing; callers
/// keep a diagnostic count of adjusted moves.
pub fn clamp(value: i32, min: i32, max: i32) -> i32 {
    value.max(min).min(max)
}

/// Signed per-axis step difference. The absolute value is the number of
/// steps the axis must execute.
pub fn step_delta(current: i32, target: i32) -> i32 {
    target - current
}

/// Time for a coordinated move, in milliseconds.
///
/// `speed_percent` maps linearly onto `[min_steps_per_ms,
/// max_steps_per_ms]`; the axis with the larger step count finishes at
/// that rate and the other axis is driven slower within the same
/// window, so the move is a straight, non-accelerated line. A move with
/// no displacement takes zero time and is a valid degenerate case.
pub fn duration_ms(
    speed_percent: f64,
    min_steps_per_ms: f64,
    max_steps_per_ms: f64,
    steps1: i32,
    steps2: i32,
) -> u32 {
    let major = steps1.unsigned_abs().max(steps2.unsigned_abs());
    if major == 0 {
        return 0;
    }
    let fraction = speed_percent.clamp(0.0, 100.0) / 100.0;
    let rate = min_steps_per_ms + (max_steps_per_ms - min_steps_per_ms) * fraction;
    (f64::from(major) / rate).ceil() as u32
}
