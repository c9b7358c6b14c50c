//! `worldcore`: the shared world and everything that talks to it.
//!
//! Areas and players live in a [`World`] owned by a single task; sessions reach
//! it through a [`WorldHandle`]. Records persist as bracket-tag text files under
//! a data directory (`areas/<id>.area`, `players/<name>.player`).

pub mod codec;
pub mod command;
pub mod direction;
pub mod help;
pub mod model;
pub mod registry;
pub mod session;
pub mod store;
pub mod validate;
pub mod world;

pub use model::{Area, AreaId, Player};
pub use registry::{WorldGone, WorldHandle};
pub use session::{run_session, SessionConfig};
pub use validate::PasswordPolicy;
pub use world::{World, WorldConfig};
