mod id;
mod introspection;
mod time;
mod timers;

pub use id::*;
pub use introspection::*;
pub use time::*;
pub use timers::*;
