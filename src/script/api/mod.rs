//! Capability surface bound into every script scope.
//!
//! Each capability is a plain Rust API plus a `module()` constructor that
//! wraps it into a rhai static module (`img::...`, `files::...`, ...).
//! Scripts only ever see the module functions.

pub mod files;
pub mod img;
pub mod shell;
pub mod ui;

pub use files::FilesApi;
pub use img::ImgApi;
pub use shell::ShellApi;
pub use ui::{HeadlessPrompter, Prompter, PromptResult, UiApi, UiRequest};
