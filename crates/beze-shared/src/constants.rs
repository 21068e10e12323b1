/// Topic carrying every message that must reach live sessions.
pub const DELIVERY_TOPIC: &str = "xb.msg.pub";

/// Topic carrying freshly uploaded voice notes awaiting transcription.
pub const RAW_VOICE_TOPIC: &str = "xb.voice.new";

/// Topic carrying attachments awaiting study-material classification.
pub const ATTACHMENT_TOPIC: &str = "xb.study_material.attachments";

/// Object storage bucket holding voice clips.
pub const VOICE_MESSAGES_BUCKET: &str = "voice-messages";

/// Object storage bucket holding message attachments.
pub const ATTACHMENTS_BUCKET: &str = "attachments";

/// Number of preceding message texts shipped with an attachment for context.
pub const MAX_PREV_MESSAGE_TEXTS: usize = 5;

/// Maximum inbound frame size in bytes (256 KiB)
pub const MAX_FRAME_SIZE: usize = 262_144;

/// Default HTTP port of the chat service
pub const DEFAULT_HTTP_PORT: u16 = 8080;
