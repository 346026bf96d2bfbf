//! Elapsed-time formulas.
//!
//! Every time-derived quantity — energy regeneration, cooldown expiry,
//! grace duration, hold milestones, passive hold scoring — is computed
//! from stored timestamps against a supplied `now_ms`, never accumulated
//! per tick. Tick frequency therefore cannot drift totals, and a milestone
//! is never awarded twice or missed.

/// Minimum grace window, in milliseconds.
pub const GRACE_MIN_MS: u64 = 30_000;

/// Maximum grace window, in milliseconds.
pub const GRACE_MAX_MS: u64 = 300_000;

/// Continuous-hold milestone thresholds, in milliseconds.
pub const HOLD_MILESTONES_MS: [u64; 2] = [5_000, 60_000];

/// Grace window granted when the first participant completes:
/// half the remaining time, clamped to `[30s, 300s]`.
#[must_use]
pub fn grace_duration_ms(remaining_ms: u64) -> u64 {
    (remaining_ms / 2).clamp(GRACE_MIN_MS, GRACE_MAX_MS)
}

/// Lazily computed current energy:
/// `min(max, stored + elapsed_seconds * regen_per_sec)`.
#[must_use]
pub fn energy_at(
    stored: f64,
    last_update_ms: u64,
    now_ms: u64,
    regen_per_sec: f64,
    max_energy: u32,
) -> f64 {
    let elapsed_ms = now_ms.saturating_sub(last_update_ms);
    #[allow(clippy::cast_precision_loss)]
    let regenerated = (elapsed_ms as f64 / 1000.0) * regen_per_sec;
    (stored + regenerated).min(f64::from(max_energy)).max(0.0)
}

/// Milliseconds until a stored cooldown expiry passes, or `None` when the
/// cooldown has expired (or was never set).
#[must_use]
pub const fn cooldown_remaining_ms(expiry_ms: u64, now_ms: u64) -> Option<u64> {
    if now_ms >= expiry_ms {
        None
    } else {
        Some(expiry_ms - now_ms)
    }
}

/// Whole seconds of passive hold scoring owed for a reign, given how many
/// seconds have already been credited. Integer arithmetic only.
#[must_use]
pub const fn uncredited_hold_seconds(
    crowned_at_ms: u64,
    now_ms: u64,
    credited_sec: u64,
) -> u64 {
    let elapsed_sec = now_ms.saturating_sub(crowned_at_ms) / 1000;
    elapsed_sec.saturating_sub(credited_sec)
}
