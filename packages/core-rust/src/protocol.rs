//! Plain-text protocol commands (`START-SEND-EVENTS`, `STOP-SEND-EVENTS`, ...).

use url::form_urlencoded;

pub const START_SEND_EVENTS: &str = "START-SEND-EVENTS";
pub const STOP_SEND_EVENTS: &str = "STOP-SEND-EVENTS";
pub const START_SEND_LIVE_COMMANDS: &str = "START-SEND-LIVE-COMMANDS";
pub const STOP_SEND_LIVE_COMMANDS: &str = "STOP-SEND-LIVE-COMMANDS";

/// Formats a protocol command with form-url-encoded parameters.
///
/// Returns `command` unchanged when there are no parameters, otherwise
/// `command?k1=v1&k2=v2` in the given order.
#[must_use]
pub fn build_protocol_command<'a, I>(command: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    if query.is_empty() {
        command.to_string()
    } else {
        format!("{command}?{query}")
    }
}
