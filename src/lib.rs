pub mod streamer_core;
pub mod watchlist;
