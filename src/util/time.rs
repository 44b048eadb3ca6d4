//! Time helpers. Kept separate from `chrono` call sites elsewhere so that
//! the rest of the crate can be tested without depending on wall-clock time.

use chrono::Utc;

/// Current time in milliseconds since the Unix epoch.
pub fn now_msec() -> u64 {
	Utc::now().timestamp_millis().max(0) as u64
}

/// `buffer_replay_policy` from the recognized configuration options: whether
/// a topic switch with no checkpointed offset rewinds from the
/// start-of-push or the end-of-push control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BufferReplayPolicy {
	RewindFromSop,
	RewindFromEop,
}

/// Computes the rewind-start timestamp for a topic switch whose
/// `rewind_start_timestamp` is `REWIND_TIME_DECIDED_BY_SERVER`:
/// `(eop_ts or sop_ts) - configured_rewind_ms`, per the store's buffer-replay
/// policy.
pub fn server_decided_rewind_start_ms(
	policy: BufferReplayPolicy,
	sop_ts_ms: Option<u64>,
	eop_ts_ms: Option<u64>,
	configured_rewind_ms: u64,
) -> u64 {
	let base = match policy {
		BufferReplayPolicy::RewindFromEop => eop_ts_ms.or(sop_ts_ms),
		BufferReplayPolicy::RewindFromSop => sop_ts_ms.or(eop_ts_ms),
	}
	.unwrap_or(0);
	base.saturating_sub(configured_rewind_ms)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rewind_from_eop_prefers_eop() {
		let ms = server_decided_rewind_start_ms(
			BufferReplayPolicy::RewindFromEop,
			Some(1_000),
			Some(5_000),
			2_000,
		);
		assert_eq!(ms, 3_000);
	}

	#[test]
	fn rewind_falls_back_when_preferred_ts_missing() {
		let ms = server_decided_rewind_start_ms(
			BufferReplayPolicy::RewindFromEop,
			Some(1_000),
			None,
			400,
		);
		assert_eq!(ms, 600);
	}

	#[test]
	fn rewind_saturates_at_zero() {
		let ms = server_decided_rewind_start_ms(
			BufferReplayPolicy::RewindFromSop,
			Some(100),
			None,
			500,
		);
		assert_eq!(ms, 0);
	}
}
