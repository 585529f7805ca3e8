pub mod analysis;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod export;
pub mod market;
pub mod narrative;
pub mod pipeline;
pub mod playlist_ref;
pub mod stats;

/// Application name for XDG paths
pub const APP_NAME: &str = "playlist-dna";
