use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::types::{InputFile, PhotoSize, User};
use teloxide::utils::command::BotCommands as _;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::channels::{
    can_edit_channel, forward_post, parse_forward_target, update_channels, verify_access,
    NO_CHANNELS, NO_PERMISSION,
};
use crate::config::Config;
use crate::db::{Channel, ChannelSettings, Db};
use crate::menus::{
    channel_menu_keyboard, channels_keyboard, font_keyboard, position_keyboard,
    remove_confirm_keyboard, remove_prompt, settings_text, MenuCallback,
};
use crate::watermark::{
    font_sample, pangram, watermark_text, FontChoice, FontRegistry, ImageInput, OutputSink,
    WatermarkError, WatermarkOptions,
};

pub type ConfigStorage = Arc<RwLock<Config>>;

const NO_CHANNEL: &str = "No channel selected. Forward any message from your channel to add it, \
     or use /set_channel -1001234567890.";
const NOT_YOUR_CHANNEL: &str = "This channel is not in your list. Use /channels.";

#[derive(Debug, teloxide::macros::BotCommands, Clone)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
pub enum BotCommand {
    #[command(description = "Show this help")]
    Help,
    #[command(description = "Check the bot is alive")]
    Start,
    #[command(description = "Add a channel and make it the default: /set_channel -1001234567890")]
    SetChannel(String),
    #[command(description = "List your channels")]
    Channels,
    #[command(description = "Show settings of the current channel")]
    Settings,
    #[command(description = "Set the image caption, /caption clear removes it")]
    Caption(String),
    #[command(description = "Choose where the caption is placed")]
    Position,
    #[command(description = "Choose the caption font")]
    Font,
    #[command(description = "Caption opacity in percent: /opacity 75")]
    Opacity(String),
    #[command(description = "Forward channel posts to a chat: /forward_to -1001234567890, /forward_to off")]
    ForwardTo(String),
    #[command(description = "Remove the current channel from your list")]
    RemoveChannel,
}

/// Watermark settings for a channel's photos.
pub fn caption_options(settings: &ChannelSettings) -> WatermarkOptions {
    WatermarkOptions {
        position: Some(settings.caption_position.into()),
        font: settings.caption_font.clone().map(FontChoice::Id),
        alpha: Some(settings.alpha_u8()),
        ..Default::default()
    }
}

/// `None` for an empty reply, `Some(None)` to clear the caption.
fn parse_caption(raw: &str) -> Option<Option<String>> {
    let caption = raw.trim();
    if caption.is_empty() {
        None
    } else if caption.eq_ignore_ascii_case("clear") {
        Some(None)
    } else {
        Some(Some(caption.to_string()))
    }
}

fn parse_opacity(raw: &str) -> Option<u8> {
    raw.trim()
        .trim_end_matches('%')
        .parse::<u8>()
        .ok()
        .filter(|alpha| *alpha <= 100)
}

fn user_key(user: &User) -> i64 {
    user.id.0 as i64
}

/// Current channel of `user` when they may change its caption, otherwise the reason.
async fn editable_channel(bot: &Bot, db: &Db, user: &User) -> Result<Result<i64, String>> {
    let Some(channel_id) = db.current_channel(user_key(user)).await? else {
        return Ok(Err(NO_CHANNEL.to_string()));
    };
    match bot.get_chat_member(ChatId(channel_id), user.id).await {
        Ok(member) if can_edit_channel(&member.kind) => Ok(Ok(channel_id)),
        Ok(_) => {
            warn!(user_id = user.id.0, channel_id, "Caption change denied");
            Ok(Err(NO_PERMISSION.to_string()))
        }
        Err(err) => {
            warn!(user_id = user.id.0, channel_id, error = %err, "Member lookup failed");
            Ok(Err(format!("Error: {}", err)))
        }
    }
}

/// Same as [`editable_channel`], replying with the reason when there is none.
async fn editable_channel_or_reply(bot: &Bot, db: &Db, msg: &Message) -> Result<Option<i64>> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(None);
    };
    match editable_channel(bot, db, user).await? {
        Ok(channel_id) => Ok(Some(channel_id)),
        Err(reason) => {
            bot.send_message(msg.chat.id, reason).await?;
            Ok(None)
        }
    }
}

async fn editable_channel_or_answer(bot: &Bot, db: &Db, q: &CallbackQuery) -> Result<Option<i64>> {
    match editable_channel(bot, db, &q.from).await? {
        Ok(channel_id) => Ok(Some(channel_id)),
        Err(reason) => {
            bot.answer_callback_query(q.id.clone()).text(reason).await?;
            Ok(None)
        }
    }
}

async fn channel_overview(db: &Db, fonts: &FontRegistry, channel_id: i64) -> Result<String> {
    let settings = db.channel_settings(channel_id).await?;
    let channel = db.channel(channel_id).await?;
    let posts = db.post_count(channel_id).await?;
    Ok(settings_text(&settings, channel.as_ref(), fonts, posts))
}

async fn channel_name(db: &Db, channel_id: i64) -> Result<String> {
    Ok(db
        .channel(channel_id)
        .await?
        .map(|channel| channel.display_name())
        .unwrap_or_else(|| channel_id.to_string()))
}

async fn send_position_menu(bot: &Bot, chat: ChatId, db: &Db, channel_id: i64) -> Result<()> {
    let settings = db.channel_settings(channel_id).await?;
    bot.send_message(chat, "Where do you want the caption to be placed?")
        .reply_markup(position_keyboard(settings.caption_position))
        .await?;
    Ok(())
}

async fn send_font_menu(
    bot: &Bot,
    chat: ChatId,
    db: &Db,
    fonts: &FontRegistry,
    channel_id: i64,
) -> Result<()> {
    let settings = db.channel_settings(channel_id).await?;
    let current = fonts.get(settings.caption_font.as_deref());
    bot.send_message(chat, "Which font do you want?")
        .reply_markup(font_keyboard(fonts, &current.id))
        .await?;
    Ok(())
}

pub async fn handle_commands(
    bot: Bot,
    msg: Message,
    cmd: BotCommand,
    cfg: ConfigStorage,
    db: Arc<Db>,
    fonts: Arc<FontRegistry>,
) -> Result<()> {
    info!(chat_id = %msg.chat.id, from = ?msg.from.as_ref().map(|u| u.id.0), command = ?cmd, "Command received");
    match cmd {
        BotCommand::Help => {
            let text = BotCommand::descriptions().to_string();
            debug!(len = text.len(), "Sending help");
            bot.send_message(msg.chat.id, text).await?;
        }
        BotCommand::Start => {
            bot.send_message(
                msg.chat.id,
                "Ready. Forward any message from your channel to add it, \
                 then send me a photo and I will post it there with its image caption.",
            )
            .await?;
        }
        BotCommand::SetChannel(raw) => {
            let Some(user) = msg.from.as_ref() else {
                return Ok(());
            };
            let trimmed = raw.trim();
            // Require numeric chat id for reliability (-100...)
            let Ok(id) = trimmed.parse::<i64>() else {
                warn!(chat_id = %msg.chat.id, value = trimmed, "Invalid channel id format");
                bot.send_message(
                    msg.chat.id,
                    "Give the numeric channel id (for example -1001234567890).",
                )
                .await?;
                return Ok(());
            };
            if !verify_access(&bot, msg.chat.id, id, user.id).await? {
                return Ok(());
            }
            let info = bot.get_chat(ChatId(id)).await.ok();
            let channel = Channel {
                channel_id: id,
                title: info.as_ref().and_then(|c| c.title()).map(str::to_string),
                username: info.as_ref().and_then(|c| c.username()).map(str::to_string),
                added_by: Some(user_key(user)),
            };
            db.add_channel(channel, user_key(user)).await?;
            db.set_default_channel_id(id).await?;
            {
                let mut guard = cfg.write().await;
                guard.channel_id = Some(id);
                guard.save()?;
            }
            info!(chat_id = %msg.chat.id, user_id = user.id.0, channel_id = id, "Channel set");
            bot.send_message(msg.chat.id, format!("Channel set: {}", trimmed))
                .await?;
        }
        BotCommand::Channels => {
            let Some(user) = msg.from.as_ref() else {
                return Ok(());
            };
            let channels = db.user_channels(user_key(user)).await?;
            if channels.is_empty() {
                bot.send_message(msg.chat.id, NO_CHANNELS).await?;
                return Ok(());
            }
            let current = db.current_channel(user_key(user)).await?;
            bot.send_message(msg.chat.id, "Which channel do you want to manage?")
                .reply_markup(channels_keyboard(&channels, current))
                .await?;
        }
        BotCommand::Settings => {
            let Some(user) = msg.from.as_ref() else {
                return Ok(());
            };
            let Some(channel_id) = db.current_channel(user_key(user)).await? else {
                bot.send_message(msg.chat.id, NO_CHANNEL).await?;
                return Ok(());
            };
            let text = channel_overview(&db, &fonts, channel_id).await?;
            debug!(chat_id = %msg.chat.id, channel_id, "Sending settings");
            bot.send_message(msg.chat.id, text)
                .reply_markup(channel_menu_keyboard(channel_id))
                .await?;
        }
        BotCommand::Caption(raw) => {
            let Some(channel_id) = editable_channel_or_reply(&bot, &db, &msg).await? else {
                return Ok(());
            };
            let Some(caption) = parse_caption(&raw) else {
                bot.send_message(msg.chat.id, "You have to send me some text.").await?;
                return Ok(());
            };
            db.set_image_caption(channel_id, caption.clone()).await?;
            info!(channel_id, cleared = caption.is_none(), "Image caption updated");
            let reply = match caption {
                Some(caption) => format!("The image caption was set to:\n{}", caption),
                None => "Image caption cleared".to_string(),
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        BotCommand::Position => {
            let Some(channel_id) = editable_channel_or_reply(&bot, &db, &msg).await? else {
                return Ok(());
            };
            send_position_menu(&bot, msg.chat.id, &db, channel_id).await?;
        }
        BotCommand::Font => {
            let Some(channel_id) = editable_channel_or_reply(&bot, &db, &msg).await? else {
                return Ok(());
            };
            send_font_menu(&bot, msg.chat.id, &db, &fonts, channel_id).await?;
        }
        BotCommand::Opacity(raw) => {
            let Some(channel_id) = editable_channel_or_reply(&bot, &db, &msg).await? else {
                return Ok(());
            };
            let Some(alpha) = parse_opacity(&raw) else {
                bot.send_message(msg.chat.id, "You have to give me an integer between 100 and 0")
                    .await?;
                return Ok(());
            };
            db.set_caption_alpha(channel_id, alpha).await?;
            info!(channel_id, alpha, "Caption opacity updated");
            bot.send_message(msg.chat.id, format!("The opacity was set to {}%", alpha))
                .await?;
        }
        BotCommand::ForwardTo(raw) => {
            let Some(channel_id) = editable_channel_or_reply(&bot, &db, &msg).await? else {
                return Ok(());
            };
            let Some(target) = parse_forward_target(&raw) else {
                bot.send_message(
                    msg.chat.id,
                    "Give the numeric chat id to forward to, or \"off\".",
                )
                .await?;
                return Ok(());
            };
            db.set_forward_to(channel_id, target).await?;
            info!(channel_id, target = ?target, "Forwarding updated");
            let reply = match target {
                Some(id) => format!("Posts will be forwarded to {}", id),
                None => "Forwarders removed".to_string(),
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        BotCommand::RemoveChannel => {
            let Some(user) = msg.from.as_ref() else {
                return Ok(());
            };
            let Some(channel_id) = db.current_channel(user_key(user)).await? else {
                bot.send_message(msg.chat.id, NO_CHANNEL).await?;
                return Ok(());
            };
            if !db.user_has_channel(user_key(user), channel_id).await? {
                bot.send_message(msg.chat.id, NOT_YOUR_CHANNEL).await?;
                return Ok(());
            }
            let name = channel_name(&db, channel_id).await?;
            bot.send_message(msg.chat.id, remove_prompt(&name))
                .reply_markup(remove_confirm_keyboard(channel_id))
                .await?;
        }
    }
    Ok(())
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    db: Arc<Db>,
    fonts: Arc<FontRegistry>,
) -> Result<()> {
    let action = q.data.as_deref().and_then(MenuCallback::parse);
    let (Some(action), Some(message)) = (action, q.regular_message()) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let user_id = user_key(&q.from);
    info!(user_id, action = ?action, "Menu action");

    match action {
        MenuCallback::SelectChannel(channel_id) => {
            if !db.user_has_channel(user_id, channel_id).await? {
                bot.answer_callback_query(q.id.clone()).text(NOT_YOUR_CHANNEL).await?;
                return Ok(());
            }
            db.set_current_channel(user_id, channel_id).await?;
            let text = channel_overview(&db, &fonts, channel_id).await?;
            bot.answer_callback_query(q.id.clone()).await?;
            bot.edit_message_text(message.chat.id, message.id, text)
                .reply_markup(channel_menu_keyboard(channel_id))
                .await?;
        }
        MenuCallback::UpdateChannels => {
            bot.answer_callback_query(q.id.clone()).await?;
            update_channels(&bot, &db, message.chat.id, user_id).await?;
        }
        MenuCallback::PositionMenu => {
            let Some(channel_id) = editable_channel_or_answer(&bot, &db, &q).await? else {
                return Ok(());
            };
            bot.answer_callback_query(q.id.clone()).await?;
            send_position_menu(&bot, message.chat.id, &db, channel_id).await?;
        }
        MenuCallback::FontMenu => {
            let Some(channel_id) = editable_channel_or_answer(&bot, &db, &q).await? else {
                return Ok(());
            };
            bot.answer_callback_query(q.id.clone()).await?;
            send_font_menu(&bot, message.chat.id, &db, &fonts, channel_id).await?;
        }
        MenuCallback::RemoveChannel(channel_id) => {
            if !db.user_has_channel(user_id, channel_id).await? {
                bot.answer_callback_query(q.id.clone()).text(NOT_YOUR_CHANNEL).await?;
                return Ok(());
            }
            let name = channel_name(&db, channel_id).await?;
            bot.answer_callback_query(q.id.clone()).await?;
            bot.edit_message_text(message.chat.id, message.id, remove_prompt(&name))
                .reply_markup(remove_confirm_keyboard(channel_id))
                .await?;
        }
        MenuCallback::ConfirmRemove(channel_id) => {
            if !db.user_has_channel(user_id, channel_id).await? {
                bot.answer_callback_query(q.id.clone()).text(NOT_YOUR_CHANNEL).await?;
                return Ok(());
            }
            let reset = db.remove_channel(channel_id, user_id).await?;
            info!(user_id, channel_id, reset, "Channel removed");
            bot.answer_callback_query(q.id.clone()).await?;
            bot.edit_message_text(message.chat.id, message.id, "Channel was removed")
                .await?;
        }
        MenuCallback::CancelRemove => {
            bot.answer_callback_query(q.id.clone()).await?;
            bot.edit_message_text(message.chat.id, message.id, "Channel was not removed")
                .await?;
        }
        MenuCallback::RemoveForwarders(channel_id) => {
            if !db.user_has_channel(user_id, channel_id).await? {
                bot.answer_callback_query(q.id.clone()).text(NOT_YOUR_CHANNEL).await?;
                return Ok(());
            }
            db.set_forward_to(channel_id, None).await?;
            info!(user_id, channel_id, "Forwarders removed");
            bot.answer_callback_query(q.id.clone())
                .text("Forwarders removed")
                .await?;
        }
        MenuCallback::Position(tag) => {
            let Some(channel_id) = editable_channel_or_answer(&bot, &db, &q).await? else {
                return Ok(());
            };
            let settings = db.channel_settings(channel_id).await?;
            if tag == settings.caption_position {
                bot.answer_callback_query(q.id.clone()).await?;
                return Ok(());
            }
            db.set_caption_position(channel_id, tag).await?;
            info!(channel_id, position = %tag, "Caption position updated");
            bot.answer_callback_query(q.id.clone()).await?;
            bot.edit_message_reply_markup(message.chat.id, message.id)
                .reply_markup(position_keyboard(tag))
                .await?;
        }
        MenuCallback::Font(id) => {
            let Some(channel_id) = editable_channel_or_answer(&bot, &db, &q).await? else {
                return Ok(());
            };
            if !fonts.contains(&id) {
                bot.answer_callback_query(q.id.clone())
                    .text("This font is no longer available")
                    .await?;
                return Ok(());
            }
            let settings = db.channel_settings(channel_id).await?;
            let current = fonts.get(settings.caption_font.as_deref());
            if current.id == id {
                bot.answer_callback_query(q.id.clone())
                    .text("You are already using this font")
                    .await?;
                return Ok(());
            }
            let font = fonts.get(Some(id.as_str())).clone();
            let text = pangram(message.id.0.unsigned_abs() as usize);
            let sample_font = font.clone();
            let png = tokio::task::spawn_blocking(move || font_sample(&sample_font, text))
                .await
                .context("font sample task failed")??;

            bot.send_photo(message.chat.id, InputFile::memory(png).file_name("font.png"))
                .caption(format!("Font set to \"{}\"\nAbove text \"{}\"", font.name, text))
                .await?;
            db.set_caption_font(channel_id, &font.id).await?;
            info!(channel_id, font = %font.id, "Caption font updated");
            bot.answer_callback_query(q.id.clone()).text("Font changed").await?;
            bot.edit_message_reply_markup(message.chat.id, message.id)
                .reply_markup(font_keyboard(&fonts, &font.id))
                .await?;
        }
    }
    Ok(())
}

/// Photos sent in a private chat go to the sender's current channel.
pub async fn handle_photo(
    bot: Bot,
    msg: Message,
    db: Arc<Db>,
    fonts: Arc<FontRegistry>,
) -> Result<()> {
    let Some(photos) = msg.photo() else { return Ok(()); };
    if !msg.chat.is_private() {
        debug!(chat_id = %msg.chat.id, "Ignoring photo outside a private chat");
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else { return Ok(()); };

    // Choose the biggest photo variant
    let Some(best) = photos
        .iter()
        .max_by_key(|p| p.width as i64 * p.height as i64)
    else {
        return Ok(());
    };

    info!(
        chat_id = %msg.chat.id,
        from = user.id.0,
        count = photos.len(),
        chosen_w = best.width,
        chosen_h = best.height,
        file_id = %best.file.id,
        "Photo received"
    );

    let channel_id = match editable_channel(&bot, &db, user).await? {
        Ok(channel_id) => channel_id,
        Err(reason) => {
            warn!(chat_id = %msg.chat.id, user_id = user.id.0, "Photo not posted");
            bot.send_message(msg.chat.id, reason).await?;
            return Ok(());
        }
    };
    let settings = db.channel_settings(channel_id).await?;

    let photo = match settings.image_caption.clone() {
        Some(caption) => {
            let bytes = download_photo(&bot, best).await?;
            let options = caption_options(&settings);
            let fonts = fonts.clone();
            let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, WatermarkError> {
                let mut out = Vec::new();
                let placement = watermark_text(
                    &fonts,
                    ImageInput::Bytes(&bytes[..]),
                    OutputSink::Writer {
                        writer: &mut out,
                        file_extension: Some("png"),
                    },
                    &caption,
                    &options,
                )?;
                debug!(?placement, "Caption applied");
                Ok(out)
            })
            .await
            .context("caption task failed")?
            .context("failed to caption photo")?;
            InputFile::memory(png).file_name("photo.png")
        }
        // No caption configured: re-post the same file_id to avoid re-upload
        None => InputFile::file_id(best.file.id.clone()),
    };

    info!(channel_id, captioned = settings.image_caption.is_some(), "Posting to channel");
    let mut request = bot.send_photo(ChatId(channel_id), photo);
    if let Some(text) = msg.caption() {
        request = request.caption(text.to_string());
    }
    let sent = request.await?;
    info!(channel_id, "Posted to channel");

    let file_id = sent
        .photo()
        .and_then(|v| v.last())
        .map(|p| p.file.id.to_string());
    db.log_post(
        channel_id,
        Some(sent.id.0 as i64),
        file_id,
        settings.image_caption.clone(),
    )
    .await?;

    // The bot gets no channel_post update for its own messages
    if let Some(target) = settings.forward_to {
        forward_post(&bot, target, ChatId(channel_id), sent.id).await;
    }

    bot.send_message(msg.chat.id, "Posted to the channel.").await?;
    Ok(())
}

async fn download_photo(bot: &Bot, photo: &PhotoSize) -> Result<Vec<u8>> {
    let file = bot.get_file(photo.file.id.clone()).await?;
    let file_url = format!("https://api.telegram.org/file/bot{}/{}", bot.token(), file.path);
    debug!(file_path = %file.path, "Downloading image");
    let bytes = reqwest::Client::new()
        .get(file_url)
        .send()
        .await
        .context("failed to download image")?
        .error_for_status()
        .context("telegram refused the download")?
        .bytes()
        .await
        .context("failed to read image bytes")?;
    debug!(size = bytes.len(), "Image downloaded");
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::Compass;

    #[test]
    fn parses_caption_replies() {
        assert_eq!(parse_caption("   "), None);
        assert_eq!(parse_caption("Clear"), Some(None));
        assert_eq!(parse_caption(" @my_channel "), Some(Some("@my_channel".to_string())));
    }

    #[test]
    fn parses_opacity() {
        assert_eq!(parse_opacity("75"), Some(75));
        assert_eq!(parse_opacity(" 100% "), Some(100));
        assert_eq!(parse_opacity("0"), Some(0));
        assert_eq!(parse_opacity("101"), None);
        assert_eq!(parse_opacity("-1"), None);
        assert_eq!(parse_opacity("half"), None);
    }

    #[test]
    fn caption_options_follow_settings() {
        let mut settings = ChannelSettings::new(-1);
        settings.caption_position = Compass::North;
        settings.caption_font = Some("serif".to_string());
        settings.caption_alpha = 50;

        let options = caption_options(&settings);
        assert_eq!(options.position, Some(Compass::North.into()));
        assert_eq!(options.alpha, Some(127));
        assert!(matches!(options.font, Some(FontChoice::Id(ref id)) if id == "serif"));
        assert!(options.font_size.is_none() && options.font_size_percentage.is_none());
    }

    #[test]
    fn help_lists_commands() {
        let help = BotCommand::descriptions().to_string();
        for command in [
            "/set_channel",
            "/channels",
            "/caption",
            "/position",
            "/font",
            "/opacity",
            "/forward_to",
            "/remove_channel",
        ] {
            assert!(help.contains(command), "{command} missing from help");
        }
    }
}
