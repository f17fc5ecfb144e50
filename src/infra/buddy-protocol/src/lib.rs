mod entry;
mod error;
mod event;
mod sse;
mod task;
mod thread;

pub use entry::*;
pub use error::*;
pub use event::*;
pub use sse::*;
pub use task::*;
pub use thread::*;
