// JSON body of a queued notification, sent with CONTENT_TYPE

use calendar_core::NotificationMsg;

use crate::channel::ChannelError;

pub fn encode(msg: &NotificationMsg) -> Result<Vec<u8>, ChannelError> {
    serde_json::to_vec(msg).map_err(ChannelError::Encode)
}

pub fn decode(payload: &[u8]) -> Result<NotificationMsg, ChannelError> {
    serde_json::from_slice(payload).map_err(ChannelError::Decode)
}
