//! Wire protocol shared with agents: the envelope and its typed payloads.

pub mod envelope;
pub mod payloads;

pub use envelope::{Envelope, MessageType};
pub use payloads::{
    PaymentSettledPayload, PnlReportPayload, StatusUpdatePayload, TaskAssignmentPayload,
    TaskResultPayload, RESULT_STATUS_COMPLETED,
};
