//! Target origins for messages the board posts to its host.

use tutorboard_core::protocol::{FrameMessage, TargetOrigin};

/// Target for a message the board sends to its parent.
///
/// `ready` goes out before the host is known and is broadcast. Everything
/// else waits for the origin learned from the host's `init`.
pub fn board_target(message: &FrameMessage, host_origin: Option<&str>) -> Option<TargetOrigin> {
    match (message, host_origin) {
        (FrameMessage::Ready, _) => Some(TargetOrigin::Any),
        (_, Some(origin)) => Some(TargetOrigin::Exact(origin.to_string())),
        (_, None) => None,
    }
}
