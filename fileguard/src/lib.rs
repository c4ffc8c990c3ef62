//! fileguard: a tool-call hook that keeps agents away from protected files.
//!
//! The host runs `fileguard hook` before every tool call and feeds it one
//! JSON event on stdin. The hook answers with a block verdict on stdout, or
//! with nothing when the call may proceed.
//!
//! # Modules
//!
//! - [`hooks`]: the host's event and response shapes.
//! - [`handlers`]: the hook boundary, with fail-open/fail-closed handling.
//! - [`settings`]: plugin settings (file, environment, defaults).
//! - [`audit`]: optional JSON-lines record of blocked calls.
//!
//! Policy evaluation itself lives in the [`fileguard_policy`] crate.
//!
//! # Example
//!
//! ```no_run
//! use fileguard::handlers::respond;
//! use fileguard::settings::GuardSettings;
//!
//! let raw = std::io::read_to_string(std::io::stdin()).unwrap();
//! if let Some(response) = respond(&raw, GuardSettings::load(None)) {
//!     response.write_stdout().unwrap();
//! }
//! ```

pub mod audit;
pub mod errors;
pub mod handlers;
pub mod hooks;
pub mod settings;
pub mod style;
pub mod tracing_init;
