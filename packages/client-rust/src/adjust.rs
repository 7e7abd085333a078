//! Channel-specific header rewriting of outbound signals.

use twinbus_core::headers::keys;
use twinbus_core::{Channel, Headers, Signal};

/// Headers a live-channel sender may not set; the backend computes them.
const SERVER_TRUSTED: [&str; 3] = [
    keys::READ_SUBJECTS,
    keys::AUTHORIZATION_CONTEXT,
    keys::RESPONSE_REQUIRED,
];

/// Marks `headers` as live and strips the server-trusted keys.
#[must_use]
pub fn adjust_headers_for_live(headers: &Headers) -> Headers {
    SERVER_TRUSTED
        .iter()
        .fold(headers.with_channel(Channel::Live), |acc, key| acc.without(key))
}

/// Rewrites `signal` for delivery over `channel`.
///
/// Live signals get `channel=live` and lose the server-trusted headers.
/// Twin and channel-less signals are returned unchanged.
#[must_use]
pub fn adjust_for_channel(signal: Signal, channel: Channel) -> Signal {
    match channel {
        Channel::Live => {
            let headers = adjust_headers_for_live(signal.headers());
            signal.with_headers(headers)
        }
        Channel::Twin | Channel::None => signal,
    }
}
