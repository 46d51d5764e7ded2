//! Session and queue orchestration core for a rich-communications
//! messaging stack.
//!
//! This crate defines the session lifecycle state machine, the outbound
//! dequeue scheduler, the observer fan-out with failure isolation, and the
//! store/transmission seams the surrounding services implement.

/// Error taxonomy shared across the core.
pub mod error;
/// Observer event vocabulary and raw-event validation.
pub mod events;
/// Observer registration and broadcast with failure isolation.
pub mod fanout;
/// In-memory session index and conversation locks.
pub mod registry;
/// Transfer-resume metadata layer.
pub mod resume;
/// Outbound dequeue scheduler and its collaborator seams.
pub mod scheduler;
/// HTTP transfer session lifecycle.
pub mod session;
/// Inbound protocol callback surface.
pub mod service;
/// Environment-backed runtime settings.
pub mod settings;
/// Persistent queue store contract.
pub mod store;
/// Domain records, states and reason codes.
pub mod types;

pub use error::{
    DispatchError, InvalidCode, ObserverError, ResolveError, StoreError, TransferError,
    TransferErrorCode,
};
pub use events::{ParticipantInfo, RawEvent, SessionEvent, validate_raw_event};
pub use fanout::{EventFanout, ObserverId, SessionEventObserver};
pub use registry::SessionRegistry;
pub use resume::{TransferResumeInfo, TransferResumeStore};
pub use scheduler::{ContentResolver, DequeueGate, DequeueScheduler, DispatchTarget, DrainReport};
pub use session::{AbortDisposition, HttpTransferSession, TransferMedia, abort_disposition};
pub use service::MessagingService;
pub use settings::{MessagingSettings, SettingsError};
pub use store::QueueStore;
pub use types::{
    ChatMessage, Direction, FileContent, FileTransferRecord, GroupDeliveryStatus, MessageStatus,
    QueueEntry, QueuedFileTransfer, QueuedMessage, ReasonCode, SessionDescriptor, SessionKind,
    SessionState, SessionStateKind, TerminationReason, TransferState, unix_time_ms,
};
