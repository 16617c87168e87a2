//! Message handlers for the Telegram bot.
//!
//! Everything reaching these handlers already passed [`authorized`].

use std::sync::Arc;

use teloxide::{
    payloads::SendMessageSetters,
    prelude::*,
    types::{Me, ReplyParameters},
    utils::command::BotCommands,
    Bot,
};

use crate::{
    format::{MsgStart, MSG_HELP, MSG_NOT_VIDEO},
    relay::{self, VideoAttachment, VideoRequest},
    state::State,
    transport::TelegramTransport,
    Command,
};

/// Drop updates from users outside the allow list without a trace in the chat.
pub fn authorized(msg: Message, state: Arc<State>) -> bool {
    let ok = state.allow_list.permits_message(&msg);
    if !ok {
        tracing::debug!(
            "Ignore message from unauthorized user {:?} in chat {}",
            msg.from.as_ref().map(|u| u.id),
            msg.chat.id
        );
    }
    ok
}

/// Handle incoming messages from Telegram.
///
/// Commands are answered directly; video-like attachments go through the relay.
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    me: Me,
    state: Arc<State>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(cmd) = msg
        .text()
        .and_then(|text| BotCommands::parse(text, me.username()).ok())
    {
        match cmd {
            Command::Help => {
                bot.send_message(msg.chat.id, format!("{MSG_HELP}\n\n{}", Command::descriptions()))
                    .reply_parameters(ReplyParameters::new(msg.id))
                    .await?;
            }
            Command::Start => {
                let text = MsgStart {
                    format: state.transcoder.format(),
                    bitrate: state.transcoder.bitrate(),
                    self_hosted: state.self_hosted,
                };
                bot.send_message(msg.chat.id, text.to_string()).await?;
            }
        }
        return Ok(());
    }

    if let Some(attachment) = VideoAttachment::from_message(&msg) {
        let transport = TelegramTransport::new(bot, state.write_timeout);
        let req = VideoRequest {
            sender: msg.from.as_ref().map(|u| u.id.0),
            chat_id: msg.chat.id,
            message_id: msg.id,
            attachment,
        };
        relay::handle_video(&transport, &state, req).await;
        return Ok(());
    }

    if msg.document().is_some() {
        bot.send_message(msg.chat.id, MSG_NOT_VIDEO)
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
    }
    Ok(())
}
