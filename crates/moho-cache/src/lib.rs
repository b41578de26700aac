//! # moho-cache
//!
//! Pure logic for the Moho packet cache: bounded per-channel packet history,
//! the capped channel collection with its blacklist, the timing/duplicate
//! admission sanitizer, and the Wiggins gap-aware resampler.
//!
//! No I/O lives here — the service crate wires these pieces to the pub/sub
//! feed and the reply socket.
//!
//! ## Crate structure
//!
//! - [`ring`] — bounded sorted packet history for one channel
//! - [`collection`] — channel-name → ring dictionary with blacklist
//! - [`sanitizer`] — duplicate/timing admission filter
//! - [`wiggins`] — weighted-average-slopes resampling with gap masks
//! - [`waveform`] — one- and three-component waveform assembly

pub mod collection;
pub mod ring;
pub mod sanitizer;
pub mod waveform;
pub mod wiggins;

pub use collection::CappedCollection;
pub use ring::ChannelRing;
pub use sanitizer::{BadDataCategory, PacketSanitizer, SanitizerOptions};
pub use waveform::{SingleComponentWaveform, ThreeComponentWaveform};
pub use wiggins::WigginsInterpolator;
