use limnocore::model::MeasurementKey;
use limnocore::{StatusLevel, StatusMessage, ViewMode};
use serde::{Deserialize, Serialize};

/// Viewer event posted to `/command`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BridgeCommand {
    Next,
    Prev,
    SelectTile { timestamp: String },
    ViewMode { mode: ViewMode },
    Opacity { value: f64 },
    Bandwidth { value: f64 },
    ReferencePoints { visible: bool },
    Generate,
    /// The viewer asks for confirmation itself and sends its answer.
    Delete {
        #[serde(flatten)]
        key: MeasurementKey,
        confirmed: bool,
    },
    Export,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Error,
    Cancelled,
}

/// File handed back by an export, base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandReply {
    pub status: ReplyStatus,
    pub level: Option<StatusLevel>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl CommandReply {
    pub fn from_status(status: ReplyStatus, message: Option<&StatusMessage>) -> Self {
        Self {
            status,
            level: message.map(|m| m.level),
            text: message.map(|m| m.text.clone()).unwrap_or_default(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}
