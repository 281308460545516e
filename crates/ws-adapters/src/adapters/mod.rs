pub mod emby;
pub mod jellyfin;
pub mod jellyfin_emby;
pub mod plex;

pub use emby::EmbyAdapter;
pub use jellyfin::JellyfinAdapter;
pub use plex::PlexAdapter;
