pub mod audio;
pub mod setup;
pub mod events;
mod content;

pub use content::{Blob, Content, Part};
pub use events::{ClientMessage, LiveEvent, ServerMessage};
pub use setup::{LiveConfig, Setup};
