use serde::{Deserialize, Serialize};

use crate::{
    error::{InvalidCode, TransferError},
    types::{GroupDeliveryStatus, MessageStatus, ReasonCode, SessionKind, SessionStateKind},
};

/// Participant metadata carried by participant-info events.
///
/// Passed through without enum validation; it carries no status/reason
/// code pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub contact: String,
    pub display_name: Option<String>,
}

/// Validated event vocabulary delivered to registered observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new chat or transfer invitation arrived.
    NewInvitation {
        chat_id: String,
        kind: SessionKind,
        contact: String,
        display_name: Option<String>,
        subject: Option<String>,
    },
    /// Session lifecycle transition.
    StateChanged {
        chat_id: String,
        state: SessionStateKind,
        reason: ReasonCode,
    },
    /// A participant started or stopped composing.
    ComposingEvent {
        chat_id: String,
        contact: String,
        active: bool,
    },
    /// Delivery status change for a chat message.
    MessageStatusChanged {
        chat_id: String,
        mime_type: String,
        msg_id: String,
        status: MessageStatus,
        reason: ReasonCode,
    },
    /// Per-participant delivery info change in a group conversation.
    GroupDeliveryInfoChanged {
        chat_id: String,
        contact: String,
        msg_id: String,
        status: GroupDeliveryStatus,
        reason: ReasonCode,
    },
    /// Participant metadata change in a group conversation.
    ParticipantInfoChanged {
        chat_id: String,
        participant: ParticipantInfo,
    },
    /// Transfer byte-count progress.
    TransferProgress {
        chat_id: String,
        transfer_id: String,
        contact: String,
        current_bytes: u64,
        total_bytes: u64,
    },
    /// Transfer started; session established.
    TransferStarted {
        chat_id: String,
        transfer_id: String,
        contact: String,
    },
    TransferPausedByUser {
        chat_id: String,
        transfer_id: String,
        contact: String,
    },
    /// Transfer interrupted by the stack but resumable.
    TransferPausedBySystem {
        chat_id: String,
        transfer_id: String,
        contact: String,
    },
    TransferResumed {
        chat_id: String,
        transfer_id: String,
        contact: String,
    },
    /// Policy rejected the send before any dispatch.
    TransferNotAllowedToSend {
        chat_id: String,
        transfer_id: String,
        contact: String,
    },
    /// Content fully transferred.
    TransferCompleted {
        chat_id: String,
        transfer_id: String,
        contact: String,
    },
    /// Transfer failed with a mapped error object.
    TransferError {
        chat_id: String,
        transfer_id: String,
        contact: String,
        error: TransferError,
    },
}

/// Event as produced by the remote peer or lower protocol layer, with
/// enumerated fields still carried as integer codes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RawEvent {
    StateChanged {
        chat_id: String,
        state: i32,
        reason: i32,
    },
    ComposingEvent {
        chat_id: String,
        contact: String,
        active: bool,
    },
    MessageStatusChanged {
        chat_id: String,
        mime_type: String,
        msg_id: String,
        status: i32,
        reason: i32,
    },
    GroupDeliveryInfoChanged {
        chat_id: String,
        contact: String,
        msg_id: String,
        status: i32,
        reason: i32,
    },
    ParticipantInfoChanged {
        chat_id: String,
        participant: ParticipantInfo,
    },
}

/// Validate a raw event against the closed enumerations.
///
/// A newer peer or stack build may emit values this build does not know;
/// those events fail validation and must be dropped at the fan-out
/// boundary rather than partially delivered.
pub fn validate_raw_event(raw: RawEvent) -> Result<SessionEvent, InvalidCode> {
    match raw {
        RawEvent::StateChanged {
            chat_id,
            state,
            reason,
        } => Ok(SessionEvent::StateChanged {
            chat_id,
            state: SessionStateKind::from_code(state)?,
            reason: ReasonCode::from_code(reason)?,
        }),
        RawEvent::ComposingEvent {
            chat_id,
            contact,
            active,
        } => Ok(SessionEvent::ComposingEvent {
            chat_id,
            contact,
            active,
        }),
        RawEvent::MessageStatusChanged {
            chat_id,
            mime_type,
            msg_id,
            status,
            reason,
        } => Ok(SessionEvent::MessageStatusChanged {
            chat_id,
            mime_type,
            msg_id,
            status: MessageStatus::from_code(status)?,
            reason: ReasonCode::from_code(reason)?,
        }),
        RawEvent::GroupDeliveryInfoChanged {
            chat_id,
            contact,
            msg_id,
            status,
            reason,
        } => Ok(SessionEvent::GroupDeliveryInfoChanged {
            chat_id,
            contact,
            msg_id,
            status: GroupDeliveryStatus::from_code(status)?,
            reason: ReasonCode::from_code(reason)?,
        }),
        RawEvent::ParticipantInfoChanged {
            chat_id,
            participant,
        } => Ok(SessionEvent::ParticipantInfoChanged {
            chat_id,
            participant,
        }),
    }
}
