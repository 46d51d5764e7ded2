use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::InvalidCode;

/// Kind of messaging session tracked by the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionKind {
    /// One-to-one chat session.
    OneToOne,
    /// Group chat session.
    Group,
    /// File transfer carried over a content-server upload/download.
    HttpTransfer,
}

/// Why a session is being terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TerminationReason {
    /// Terminated by the local stack (connectivity loss, service shutdown).
    System,
    /// Terminated on explicit user request.
    User,
    /// Terminated by the remote peer.
    Remote,
    /// Terminated after a protocol timeout.
    Timeout,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionState {
    /// Invited, not yet accepted.
    Pending,
    /// Media/session active.
    Established,
    /// HTTP transfer interrupted but resumable.
    Paused,
    /// Terminal state with the reason that ended the session.
    Terminated(TerminationReason),
}

/// Coarse session state carried in `StateChanged` events.
///
/// This is the closed vocabulary validated at the fan-out boundary; the
/// lower layer reports it as an integer code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionStateKind {
    Pending,
    Established,
    Paused,
    Terminated,
}

impl SessionStateKind {
    pub fn from_code(code: i32) -> Result<Self, InvalidCode> {
        match code {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Established),
            2 => Ok(Self::Paused),
            3 => Ok(Self::Terminated),
            other => Err(InvalidCode::new("session state", other)),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Established => 1,
            Self::Paused => 2,
            Self::Terminated => 3,
        }
    }
}

/// Direction of a file transfer relative to the local user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    /// Whether the transfer was initiated locally.
    pub fn is_locally_initiated(self) -> bool {
        matches!(self, Self::Outgoing)
    }
}

/// Persisted state of a file transfer record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferState {
    /// Invitation received, not yet accepted.
    Invited,
    /// Waiting in the outbound queue.
    Queued,
    /// Upload/download in progress (or uploaded, peer not yet notified).
    Started,
    /// Interrupted but resumable.
    Paused,
    /// Content fully transferred.
    Transferred,
    /// Terminal failure.
    Failed,
}

impl TransferState {
    pub fn from_code(code: i32) -> Result<Self, InvalidCode> {
        match code {
            0 => Ok(Self::Invited),
            1 => Ok(Self::Queued),
            2 => Ok(Self::Started),
            3 => Ok(Self::Paused),
            4 => Ok(Self::Transferred),
            5 => Ok(Self::Failed),
            other => Err(InvalidCode::new("transfer state", other)),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Invited => 0,
            Self::Queued => 1,
            Self::Started => 2,
            Self::Paused => 3,
            Self::Transferred => 4,
            Self::Failed => 5,
        }
    }
}

/// Delivery status of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageStatus {
    Queued,
    Sending,
    Sent,
    Delivered,
    Displayed,
    Failed,
}

impl MessageStatus {
    pub fn from_code(code: i32) -> Result<Self, InvalidCode> {
        match code {
            0 => Ok(Self::Queued),
            1 => Ok(Self::Sending),
            2 => Ok(Self::Sent),
            3 => Ok(Self::Delivered),
            4 => Ok(Self::Displayed),
            5 => Ok(Self::Failed),
            other => Err(InvalidCode::new("message status", other)),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Queued => 0,
            Self::Sending => 1,
            Self::Sent => 2,
            Self::Delivered => 3,
            Self::Displayed => 4,
            Self::Failed => 5,
        }
    }
}

/// Enumerated cause accompanying a state change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReasonCode {
    Unspecified,
    /// Policy or authorization rejected the send; terminal.
    FailedNotAllowedToSend,
    /// Transport-level transfer failure.
    FailedTransfer,
    PausedBySystem,
    PausedByUser,
    AbortedBySystem,
    AbortedByUser,
    AbortedByRemote,
}

impl ReasonCode {
    pub fn from_code(code: i32) -> Result<Self, InvalidCode> {
        match code {
            0 => Ok(Self::Unspecified),
            1 => Ok(Self::FailedNotAllowedToSend),
            2 => Ok(Self::FailedTransfer),
            3 => Ok(Self::PausedBySystem),
            4 => Ok(Self::PausedByUser),
            5 => Ok(Self::AbortedBySystem),
            6 => Ok(Self::AbortedByUser),
            7 => Ok(Self::AbortedByRemote),
            other => Err(InvalidCode::new("reason code", other)),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Unspecified => 0,
            Self::FailedNotAllowedToSend => 1,
            Self::FailedTransfer => 2,
            Self::PausedBySystem => 3,
            Self::PausedByUser => 4,
            Self::AbortedBySystem => 5,
            Self::AbortedByUser => 6,
            Self::AbortedByRemote => 7,
        }
    }
}

impl From<TerminationReason> for ReasonCode {
    fn from(reason: TerminationReason) -> Self {
        match reason {
            TerminationReason::System | TerminationReason::Timeout => Self::AbortedBySystem,
            TerminationReason::User => Self::AbortedByUser,
            TerminationReason::Remote => Self::AbortedByRemote,
        }
    }
}

/// Per-participant delivery status in a group conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GroupDeliveryStatus {
    NotDelivered,
    Delivered,
    Displayed,
    Failed,
}

impl GroupDeliveryStatus {
    pub fn from_code(code: i32) -> Result<Self, InvalidCode> {
        match code {
            0 => Ok(Self::NotDelivered),
            1 => Ok(Self::Delivered),
            2 => Ok(Self::Displayed),
            3 => Ok(Self::Failed),
            other => Err(InvalidCode::new("group delivery status", other)),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::NotDelivered => 0,
            Self::Delivered => 1,
            Self::Displayed => 2,
            Self::Failed => 3,
        }
    }
}

/// Registry entry describing an active session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescriptor {
    /// Conversation identifier; unique within the registry.
    pub id: String,
    pub kind: SessionKind,
    /// Remote participant(s); one entry for one-to-one sessions.
    pub participants: Vec<String>,
    /// Protocol-level correlation id tying the session to a conversation thread.
    pub contribution_id: String,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at: u64,
}

/// A chat message as persisted and dispatched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub mime_type: String,
    pub content: String,
    pub status: MessageStatus,
    pub reason_code: ReasonCode,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub timestamp: u64,
    /// Send timestamp; equals `timestamp` for locally originated messages,
    /// which have no network round-trip before dispatch.
    pub timestamp_sent: u64,
}

impl ChatMessage {
    /// Build a locally originated outbound message.
    pub fn outgoing(
        id: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            mime_type: mime_type.into(),
            content: content.into(),
            status: MessageStatus::Queued,
            reason_code: ReasonCode::Unspecified,
            timestamp,
            timestamp_sent: timestamp,
        }
    }
}

/// Persisted file transfer record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileTransferRecord {
    pub id: String,
    pub chat_id: String,
    pub direction: Direction,
    pub state: TransferState,
    pub reason_code: ReasonCode,
    pub file_size: u64,
    /// Bytes confirmed transferred so far; drives resume offsets.
    pub bytes_transferred: u64,
    /// Durable handle of an in-progress upload, required to resume it.
    pub upload_transaction_id: Option<String>,
    /// Reference to the file icon content, when one exists.
    pub file_icon_ref: Option<String>,
}

/// Resolved content handle for a file or file icon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileContent {
    pub reference: String,
    pub mime_type: String,
    pub size: u64,
}

/// A message pending dispatch, as read back from the queue store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub id: String,
    pub mime_type: String,
    pub content: String,
}

/// A file transfer pending dispatch, as read back from the queue store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFileTransfer {
    pub id: String,
    pub state: TransferState,
    /// Reference to the file content.
    pub file_ref: String,
    pub file_icon_ref: Option<String>,
    pub file_size: u64,
}

/// One pending outbound item, discriminated by the provider that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEntry {
    Message(QueuedMessage),
    FileTransfer(QueuedFileTransfer),
}

impl QueueEntry {
    pub fn id(&self) -> &str {
        match self {
            Self::Message(message) => &message.id,
            Self::FileTransfer(transfer) => &transfer.id,
        }
    }
}

/// Current wall-clock time in milliseconds since Unix epoch.
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
