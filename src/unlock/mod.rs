//! Lead-gated unlock: the prompt state machine, the two lead sinks, and the
//! session store that remembers an unlock.

pub mod controller;
pub mod session;
pub mod sinks;

pub use controller::{
    DEFAULT_AUTO_PROMPT_DELAY, RenderedItinerary, SubmissionOutcome, SubmissionTicket,
    UnlockController, UnlockError, UnlockState,
};
pub use session::{
    FileSessionStore, MemorySessionStore, SessionError, SessionSnapshot, SessionStore,
};
pub use sinks::{
    ContactEmailSink, LeadRecordSink, LeadSinks, LeadStoreSink, LeadSubmission, SinkError,
    Web3FormsSink,
};
