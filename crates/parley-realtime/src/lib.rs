//! Wire layer for realtime speech/text sessions.
//!
//! Client and server event shapes, session parameters, PCM16 audio helpers and
//! the duplex transport seam. [`WebSocketConnector`] dials the hosted endpoint;
//! [`testing::ScriptedConnector`] replays canned frames for tests.

pub mod audio;
pub mod errors;
pub mod events;
pub mod testing;
pub mod transport;
pub mod types;

pub use audio::*;
pub use errors::*;
pub use events::*;
pub use transport::*;
pub use types::*;
