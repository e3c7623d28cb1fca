// Module declarations for the library crate.

pub mod bind;
pub mod bridge;
pub mod buffer;
pub mod cli;
pub mod commands;
pub mod cursor;
pub mod fifo;
pub mod intercept;
pub mod keynames;
pub mod proto;
pub mod screen;
pub mod synth;

// Re-export the pieces an embedding application needs most.
pub use bridge::{Action, Bridge};
pub use commands::{Reader, SpeechCmd};
pub use synth::{Style, Synth};
