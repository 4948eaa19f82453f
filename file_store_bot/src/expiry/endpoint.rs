use std::future::Future;

use teloxide::{requests::Requester, types::ChatId, Bot, RequestError};

use crate::types::MessageLocation;

/// Whatever messages can be copied around and deleted through.
/// That's the bot itself, save for tests.
pub trait MessagingEndpoint: Clone + Send + Sync + 'static {
    /// Copy a message into another chat, returning where the copy ended up.
    fn send_copy(
        &self,
        from: MessageLocation,
        to: ChatId,
    ) -> impl Future<Output = Result<MessageLocation, RequestError>> + Send;

    /// Delete a message.
    fn delete(
        &self,
        location: MessageLocation,
    ) -> impl Future<Output = Result<(), RequestError>> + Send;
}

impl MessagingEndpoint for Bot {
    async fn send_copy(
        &self,
        from: MessageLocation,
        to: ChatId,
    ) -> Result<MessageLocation, RequestError> {
        let message_id = self
            .copy_message(to, from.chat_id, from.message_id)
            .await?;
        Ok(MessageLocation::new(to, message_id))
    }

    async fn delete(&self, location: MessageLocation) -> Result<(), RequestError> {
        self.delete_message(location.chat_id, location.message_id)
            .await?;
        Ok(())
    }
}
