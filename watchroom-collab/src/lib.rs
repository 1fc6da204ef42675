mod chat;
mod driver;
mod events;
mod protocol;
mod relay;
mod session;
mod signaling;

pub use chat::*;
pub use driver::*;
pub use events::*;
pub use protocol::*;
pub use relay::*;
pub use session::*;
pub use signaling::*;
