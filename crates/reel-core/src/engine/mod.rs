//! The real-time mixing engine
//!
//! This module contains the playback side of Reel:
//! - ChannelCore: fader, mute/solo state, and meters shared by every channel
//! - Track: mixes its regions into the working buffers
//! - MasterBus: final gain and metering stage
//! - Timeline: session length, transport, and loop state
//! - Mixer: ties tracks, master, and timeline into the callback entry points

mod channel;
mod master;
mod mixer;
mod timeline;
mod track;

pub use channel::*;
pub use master::*;
pub use mixer::*;
pub use timeline::*;
pub use track::*;
