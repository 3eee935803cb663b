//! Metric names recorded through the `metrics` facade.
//!
//! The library never installs a recorder; without one every call is a no-op.

/// Channels opened total (counter, labels: direction).
pub const CHANNELS_OPENED_TOTAL: &str = "wirelink_channels_opened_total";
/// Channels closed total (counter).
pub const CHANNELS_CLOSED_TOTAL: &str = "wirelink_channels_closed_total";
/// Open channels (gauge).
pub const CHANNELS_ACTIVE: &str = "wirelink_channels_active";
/// Channel lifetime in seconds (histogram).
pub const CHANNEL_DURATION_SECONDS: &str = "wirelink_channel_duration_seconds";
/// Data frames written (counter).
pub const FRAMES_SENT_TOTAL: &str = "wirelink_frames_sent_total";
/// Data frames read (counter).
pub const FRAMES_RECEIVED_TOTAL: &str = "wirelink_frames_received_total";
/// Frames dropped because they did not decode (counter).
pub const DECODE_FAILURES_TOTAL: &str = "wirelink_decode_failures_total";
/// Keepalive probes that went unanswered (counter).
pub const LIVENESS_FAILURES_TOTAL: &str = "wirelink_liveness_failures_total";
/// Outbound connection attempts that failed (counter).
pub const CONNECT_FAILURES_TOTAL: &str = "wirelink_connect_failures_total";
/// Inbound sockets rejected during TLS or WebSocket handshake (counter).
pub const HANDSHAKE_FAILURES_TOTAL: &str = "wirelink_handshake_failures_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_prefixed_and_unique() {
        let names = [
            CHANNELS_OPENED_TOTAL,
            CHANNELS_CLOSED_TOTAL,
            CHANNELS_ACTIVE,
            CHANNEL_DURATION_SECONDS,
            FRAMES_SENT_TOTAL,
            FRAMES_RECEIVED_TOTAL,
            DECODE_FAILURES_TOTAL,
            LIVENESS_FAILURES_TOTAL,
            CONNECT_FAILURES_TOTAL,
            HANDSHAKE_FAILURES_TOTAL,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(names.iter().all(|n| n.starts_with("wirelink_")));
    }
}
