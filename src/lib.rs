use colored::Colorize;
use error_stack::fmt::{Charset, ColorMode};
use error_stack::Report;

pub mod config;
pub mod dialoguer;
pub mod engine;
pub mod errors;
pub mod events;
pub mod local;
pub mod reconcile;
pub mod removal;
pub mod sanitize;
pub mod spotify;
pub mod sync;

pub use engine::{RunOptions, SyncEngine, SyncPlan};
pub use errors::{SyncEngineError, SyncEngineResult};

/// Hint attached to a report telling the operator how to fix the problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion(pub String);

impl Suggestion {
    pub fn set_report() {
        Report::set_charset(Charset::Utf8);
        Report::set_color_mode(ColorMode::Color);
        Report::install_debug_hook::<Self>(|Self(value), context| {
            context.push_body(format!("{}: {value}", "suggestion".yellow()))
        });
    }
}
