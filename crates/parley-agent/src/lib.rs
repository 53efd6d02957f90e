//! Session manager for realtime voice assistants.
//!
//! Owns one realtime connection per [`RealtimeSession`], drives sequential
//! turns over it, answers function calls from a [`ToolRegistry`], and keeps a
//! per-session Python kernel for the code tool. Wire shapes live in
//! `parley-realtime`.

pub mod config;
pub mod errors;
pub mod events;
pub mod execution;
pub mod kernel;
pub mod magic;
pub mod profiles;
pub mod session;
pub mod testing;
pub mod tools;
pub mod turn;

pub use config::*;
pub use errors::*;
pub use events::*;
pub use execution::*;
pub use kernel::*;
pub use magic::*;
pub use profiles::*;
pub use session::*;
pub use tools::*;
pub use turn::*;
