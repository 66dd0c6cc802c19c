//! Capture channels — the two ways this process can ask the OS for a
//! screenshot, behind one action interface.
//!
//! The set is closed: a privileged-command channel, an assistive
//! in-process channel, and a no-op fallback that always fails.
//! External code selects through [`select_action`] and dispatches through
//! [`CaptureAction::capture`].

mod assistive;
mod channel;

pub use assistive::{AssistiveService, CompositorCapture};
pub use channel::{select_action, CaptureAction, ChannelSnapshot, PrivilegedCapture};
