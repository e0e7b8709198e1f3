//! WebSocket relay: admission, per-connection session and message routing

mod admission;
mod handler;
mod message;
mod relay;
mod session;

pub use admission::{admit, AdmissionError};
pub use handler::ws_handler;
pub use message::{close_frame, close_reason, AuthMessage, FrameKind};
pub use relay::{MessageRelay, Persistence, RelayOutcome, RelayReport, RelayStats};
pub use session::{run_session, CloseCause, SessionContext};
