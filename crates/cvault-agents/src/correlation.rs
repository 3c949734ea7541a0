use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use uuid::Uuid;

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Identifier tying together every log line of one round.
///
/// `cv-{unix millis}-{random hex}{sequence hex}`; the sequence keeps ids
/// unique within a process even when two rounds start in the same
/// millisecond.
pub fn new_correlation_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "cv-{}-{}{:x}",
        Utc::now().timestamp_millis(),
        &random[..6],
        sequence
    )
}
