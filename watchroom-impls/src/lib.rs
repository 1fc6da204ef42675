mod transport;
mod util;

pub use transport::*;
pub use util::*;
