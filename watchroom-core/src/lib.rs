mod config;
mod identity;
mod link;
mod media;
mod membership;
mod playback;
mod transport;
mod util;

pub use config::*;
pub use identity::*;
pub use link::*;
pub use media::*;
pub use membership::*;
pub use playback::*;
pub use transport::*;
pub use util::*;
