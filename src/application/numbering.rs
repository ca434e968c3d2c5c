use chrono::{DateTime, Utc};
use rand::Rng;

/// Builds a human-facing number such as `ORD-20261014-04217`.
///
/// The random suffix is not unique on its own; callers insert and
/// regenerate on a unique-constraint violation.
pub fn generate_number(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..100_000);
    format!("{}-{}-{:05}", prefix, now.format("%Y%m%d"), suffix)
}
