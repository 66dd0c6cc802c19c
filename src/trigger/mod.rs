//! Trigger domain — the request snapshot and the pipeline that runs the
//! capture + automation flow for it.

mod request;
pub mod pipeline;

pub use pipeline::{
    FailureReason, PipelineConfig, PipelineListener, TriggerPipeline,
};
pub use request::{coerce_extras, TriggerEvent, TriggerRequest, ACTION_RUN_SCRIPT};

/// Origin tags carried on a request for scripts and diagnostics.
pub mod origin {
    pub const UNKNOWN: &str = "unknown";
    pub const APP: &str = "app";
    pub const THIRD_PARTY: &str = "third_party";
    pub const SHORTCUT_CAPTURE: &str = "shortcut_capture";
    pub const SHORTCUT_SCRIPT: &str = "shortcut_script";
    pub const CONFIG_TEST: &str = "config_test";
    pub const CLI: &str = "cli";
}
