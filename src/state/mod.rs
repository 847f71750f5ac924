//! State Module - Live preview state
//!
//! - **Variables** - Live variable values, signal-backed, with write subscribers
//! - **Bindings** - Effective value of a block property
//! - **Events** - Event surface the flow runtime listens on

mod bindings;
mod events;
mod variables;

pub use bindings::*;
pub use events::*;
pub use variables::*;
