pub mod confirm;
pub mod map;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

pub use confirm::{Confirmer, FixedAnswer};
pub use map::{MapSurface, OverlayId, VideoHandle};
pub use session::{session_keys, InMemorySessionStore, SessionStore};
