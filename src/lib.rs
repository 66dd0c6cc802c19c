//! shotscript — capture-and-automate pipeline.
//!
//! One trigger runs one linear flow: debounce, channel preflight,
//! capture dispatch, artifact detection, then a sandboxed automation
//! script with the artifact bound into scope.
//!
//! Domains:
//! - `privileged` — retrying elevated-shell broker
//! - `capture`    — the two capture channels and the selector
//! - `media`      — screenshot index and artifact watcher
//! - `script`     — rhai engine, storage, capability APIs
//! - `trigger`    — request snapshot and the orchestrating pipeline
//! - `prefs`      — persisted capture preferences

pub mod capture;
pub mod media;
pub mod prefs;
pub mod privileged;
pub mod script;
pub mod trigger;
