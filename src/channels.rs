use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{Chat, ChatMemberKind, MessageId, MessageOrigin, UserId};
use tracing::{debug, info, warn};

use crate::db::{Channel, Db};

pub const NO_PERMISSION: &str =
    "You must have change channel info permissions to change the default image caption.";
pub const NO_CHANNELS: &str =
    "No channels added yet. To add one forward any message from that channel.";

/// Outcome of checking the bot and a user against a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAccess {
    Granted,
    BotNotAdmin,
    BotCannotPost,
    UserCannotEdit,
}

impl ChannelAccess {
    pub fn evaluate(bot: &ChatMemberKind, user: &ChatMemberKind) -> Self {
        if !bot.is_privileged() {
            ChannelAccess::BotNotAdmin
        } else if !bot.can_post_messages() {
            ChannelAccess::BotCannotPost
        } else if !can_edit_channel(user) {
            ChannelAccess::UserCannotEdit
        } else {
            ChannelAccess::Granted
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ChannelAccess::Granted => "Access granted",
            ChannelAccess::BotNotAdmin => "I have to be an administrator of the channel.",
            ChannelAccess::BotCannotPost => "I need the permission to post messages in the channel.",
            ChannelAccess::UserCannotEdit => NO_PERMISSION,
        }
    }
}

/// Owners and admins with the "change channel info" right manage the caption.
pub fn can_edit_channel(kind: &ChatMemberKind) -> bool {
    match kind {
        ChatMemberKind::Owner(_) => true,
        ChatMemberKind::Administrator(admin) => admin.can_change_info,
        _ => false,
    }
}

/// `Some(None)` turns forwarding off.
pub fn parse_forward_target(raw: &str) -> Option<Option<i64>> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("off") {
        Some(None)
    } else {
        raw.parse::<i64>().ok().map(Some)
    }
}

async fn check_access(
    bot: &Bot,
    channel_id: i64,
    user: UserId,
) -> Result<ChannelAccess, teloxide::RequestError> {
    let me = bot.get_me().await?;
    let bot_member = bot.get_chat_member(ChatId(channel_id), me.id).await?;
    let user_member = bot.get_chat_member(ChatId(channel_id), user).await?;
    Ok(ChannelAccess::evaluate(&bot_member.kind, &user_member.kind))
}

/// Checks the bot and `user` on the channel, replying to `reply_to` when access is refused.
pub async fn verify_access(
    bot: &Bot,
    reply_to: ChatId,
    channel_id: i64,
    user: UserId,
) -> Result<bool> {
    match check_access(bot, channel_id, user).await {
        Ok(ChannelAccess::Granted) => Ok(true),
        Ok(denied) => {
            warn!(channel_id, user_id = user.0, access = ?denied, "Channel access denied");
            bot.send_message(reply_to, denied.message()).await?;
            Ok(false)
        }
        Err(err) => {
            warn!(channel_id, user_id = user.0, error = %err, "Channel access check failed");
            bot.send_message(reply_to, format!("Error: {}", err)).await?;
            Ok(false)
        }
    }
}

fn channel_from_chat(chat: &Chat, added_by: i64) -> Channel {
    Channel {
        channel_id: chat.id.0,
        title: chat.title().map(str::to_string),
        username: chat.username().map(str::to_string),
        added_by: Some(added_by),
    }
}

/// Any message forwarded from a channel in a private chat adds that channel.
pub async fn handle_forwarded(bot: Bot, msg: Message, db: Arc<Db>) -> Result<()> {
    let Some(MessageOrigin::Channel { chat, .. }) = msg.forward_origin() else {
        return Ok(());
    };
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if !msg.chat.is_private() || !chat.is_channel() {
        return Ok(());
    }
    info!(user_id = user.id.0, channel_id = chat.id.0, "Forwarded channel message");

    if !verify_access(&bot, msg.chat.id, chat.id.0, user.id).await? {
        return Ok(());
    }
    let user_id = user.id.0 as i64;
    let added = db.add_channel(channel_from_chat(chat, user_id), user_id).await?;
    info!(user_id, channel_id = chat.id.0, added, "Channel stored");
    let reply = if added { "Channel was added" } else { "Channel was updated" };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Refreshes title and username of every channel of the user.
pub async fn update_channels(bot: &Bot, db: &Db, reply_to: ChatId, user_id: i64) -> Result<()> {
    let channels = db.user_channels(user_id).await?;
    if channels.is_empty() {
        bot.send_message(reply_to, "No channels added yet.").await?;
        return Ok(());
    }
    for channel in channels {
        match bot.get_chat(ChatId(channel.channel_id)).await {
            Ok(info) => {
                db.update_channel_info(
                    channel.channel_id,
                    info.title().map(str::to_string),
                    info.username().map(str::to_string),
                )
                .await?;
            }
            Err(err) => {
                warn!(channel_id = channel.channel_id, error = %err, "Channel refresh failed");
                bot.send_message(
                    reply_to,
                    format!("Channel {} could not be updated", channel.display_name()),
                )
                .await?;
            }
        }
    }
    bot.send_message(reply_to, "Channels updated").await?;
    Ok(())
}

/// Forwarding failures are logged, never propagated.
pub async fn forward_post(bot: &Bot, target: i64, channel: ChatId, message_id: MessageId) {
    match bot.forward_message(ChatId(target), channel, message_id).await {
        Ok(_) => debug!(target, channel_id = channel.0, "Post forwarded"),
        Err(err) => warn!(target, channel_id = channel.0, error = %err, "Forward failed"),
    }
}

pub async fn handle_channel_post(bot: Bot, msg: Message, db: Arc<Db>) -> Result<()> {
    let settings = db.channel_settings(msg.chat.id.0).await?;
    if let Some(target) = settings.forward_to {
        forward_post(&bot, target, msg.chat.id, msg.id).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn member(value: serde_json::Value) -> ChatMemberKind {
        serde_json::from_value(value).unwrap()
    }

    fn owner() -> ChatMemberKind {
        member(json!({"status": "creator", "is_anonymous": false}))
    }

    fn admin(can_change_info: bool, can_post_messages: bool) -> ChatMemberKind {
        member(json!({
            "status": "administrator",
            "is_anonymous": false,
            "can_be_edited": false,
            "can_manage_chat": true,
            "can_change_info": can_change_info,
            "can_post_messages": can_post_messages,
            "can_delete_messages": false,
            "can_manage_video_chats": false,
            "can_invite_users": false,
            "can_restrict_members": false,
            "can_promote_members": false
        }))
    }

    fn plain_member() -> ChatMemberKind {
        member(json!({"status": "member"}))
    }

    #[test]
    fn only_owner_and_info_admins_edit() {
        assert!(can_edit_channel(&owner()));
        assert!(can_edit_channel(&admin(true, false)));
        assert!(!can_edit_channel(&admin(false, true)));
        assert!(!can_edit_channel(&plain_member()));
        assert!(!can_edit_channel(&ChatMemberKind::Left));
    }

    #[test]
    fn bot_is_checked_before_user() {
        let posting_bot = admin(false, true);
        assert_eq!(
            ChannelAccess::evaluate(&plain_member(), &owner()),
            ChannelAccess::BotNotAdmin
        );
        assert_eq!(
            ChannelAccess::evaluate(&admin(true, false), &owner()),
            ChannelAccess::BotCannotPost
        );
        assert_eq!(
            ChannelAccess::evaluate(&posting_bot, &admin(false, true)),
            ChannelAccess::UserCannotEdit
        );
        assert_eq!(
            ChannelAccess::evaluate(&posting_bot, &plain_member()),
            ChannelAccess::UserCannotEdit
        );
        assert_eq!(ChannelAccess::evaluate(&posting_bot, &owner()), ChannelAccess::Granted);
        assert_eq!(
            ChannelAccess::evaluate(&posting_bot, &admin(true, false)),
            ChannelAccess::Granted
        );
        assert_eq!(ChannelAccess::UserCannotEdit.message(), NO_PERMISSION);
    }

    #[test]
    fn parses_forward_targets() {
        assert_eq!(parse_forward_target(" OFF "), Some(None));
        assert_eq!(parse_forward_target("-1001"), Some(Some(-1001)));
        assert_eq!(parse_forward_target("@channel"), None);
        assert_eq!(parse_forward_target(""), None);
    }

    #[test]
    fn channel_from_forwarded_chat() {
        let chat: Chat = serde_json::from_value(json!({
            "id": -1001,
            "type": "channel",
            "title": "Art",
            "username": "art_channel"
        }))
        .unwrap();
        let channel = channel_from_chat(&chat, 42);
        assert_eq!(channel.channel_id, -1001);
        assert_eq!(channel.title.as_deref(), Some("Art"));
        assert_eq!(channel.username.as_deref(), Some("art_channel"));
        assert_eq!(channel.added_by, Some(42));
        assert!(chat.is_channel());
    }
}
