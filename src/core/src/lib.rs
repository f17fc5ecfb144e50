pub mod backend;
pub mod cache;
pub mod cancel;
pub mod config;
mod error;
pub mod outbound;
pub mod paths;
pub mod reconcile;
pub mod reconstruct;
pub mod session;
pub mod steps;
pub mod turn;

pub use backend::{Backend, ByteStream, HttpBackend};
pub use cache::{Transcript, TranscriptCache};
pub use cancel::{abort_pair, AbortHandle, AbortSignal, CancelCoordinator};
pub use config::{BuddyConfig, DebugConfig, ServerConfig, StreamConfig};
pub use error::ChatError;
pub use outbound::ChatUpdate;
pub use reconcile::Reconciler;
pub use reconstruct::reconstruct;
pub use session::{Applied, ChatService, SessionState, StreamSession, StreamTicket, TurnOutcome};
pub use steps::{AgentSteps, StepRecord, TaskStep};
pub use turn::{Turn, TurnEnd, UserMessage, CANCELLED_MESSAGE};
