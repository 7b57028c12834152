//! Version command implementation.

use chrono::Utc;
use confsync_core::VersionNumber;

/// Computes the label that follows `latest`.
pub fn next_label(latest: Option<&str>) -> VersionNumber {
    let latest = latest.map(VersionNumber::from_label);
    VersionNumber::next_after(latest.as_ref(), Utc::now())
}

/// Runs the `version next` command.
pub fn next(latest: Option<&str>) {
    println!("{}", next_label(latest));
}
