mod machine;
mod service;
mod state;

pub use machine::{Applied, StreamSession};
pub use service::{ChatService, StreamTicket, TurnOutcome};
pub use state::SessionState;
