pub mod gemini;
pub mod reference_loader;
pub mod relay;
pub mod session_manager;
pub mod session_store;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod fakes;

pub use gemini::{ChatSession, GeminiClient, GenerativeService};
pub use reference_loader::{load_reference_context, Upstream};
pub use relay::{run_relay, ClientChannel, Inbound, RelayState};
pub use session_manager::SessionManager;
pub use session_store::SessionStore;
pub use supervisor::supervise;
