#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Which terminal is shown in which split-layout panel.
//!
//! This is a pure data model owned by the UI layer. It stores terminal ids
//! only; it never owns processes and the session layer never reads it. A
//! panel may point at a terminal that has since exited.

mod error;
mod state;
mod template;

pub use error::LayoutError;
pub use state::PanelSlot;
pub use state::SplitLayoutState;
pub use template::LAYOUT_TEMPLATES;
pub use template::LayoutTemplate;
pub use template::SplitDirection;
pub use template::find_template;
pub use template::panel_id;

pub const RATIO_TOTAL: f64 = 100.0;
