pub mod cache;
pub mod common;
pub mod config;
pub mod errors;
pub mod filter;
pub mod index;
pub mod library;
pub mod m3u;
pub mod playback;
pub mod playlists;
pub mod search;
pub mod sync;
pub mod track;

pub use config::Config;
pub use errors::{Result, WiredError};
pub use track::Track;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod cache_test;
#[cfg(test)]
mod playlists_test;
