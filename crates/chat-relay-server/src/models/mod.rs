pub mod frame;
pub mod gemini;

pub use frame::StreamFrame;
pub use gemini::{Content, Part, ReferenceHandle, SessionConfig};
