//! Session transitions and their presentation.
//!
//! - [`SessionController`]: the single place records change
//! - [`TimerPresenter`]: per-surface command front end and view
//! - [`DisplayTicker`]: cosmetic countdown

mod controller;
mod display;
mod presenter;

pub use controller::{
    CompletionOutcome, SessionController, StartRequest, StopOptions, StopOutcome,
};
pub use display::{format_clock, DisplayTicker, TimerView, ViewStatus};
pub use presenter::TimerPresenter;
