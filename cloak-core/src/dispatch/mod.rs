mod dispatcher;
mod readiness;

pub use dispatcher::{
    DegradedSendWarning, Envelope, MessageDispatcher, ReceiveOutcome, SendOutcome,
    UndecryptableReason,
};
pub use readiness::{KeyReadiness, ReadinessEvent};
