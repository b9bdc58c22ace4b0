pub mod file_store;
pub mod scene;

pub use file_store::FileSessionStore;
pub use scene::{Controls, SceneSurface};
