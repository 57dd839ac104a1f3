pub mod error;
pub mod event;
pub mod options;
pub mod session;
pub mod tracer;
mod util;

pub use error::{Error, Result};
pub use event::*;
pub use options::*;
pub use session::*;
pub use tracer::*;
pub use util::*;
