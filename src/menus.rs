use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::db::{Channel, ChannelSettings};
use crate::watermark::{Compass, FontRegistry};

const SELECT_CHANNEL_PREFIX: &str = "change_settings_menu:";
const UPDATE_CHANNELS: &str = "update_channels";
const POSITION_MENU: &str = "image_caption_menu:position";
const FONT_MENU: &str = "image_caption_menu:font";
const REMOVE_PREFIX: &str = "remove_channel:";
const REMOVE_CONFIRM_PREFIX: &str = "remove_channel_confirm:";
const REMOVE_CANCEL: &str = "remove_channel_cancel";
const REMOVE_FORWARDERS_PREFIX: &str = "remove_forwarders:";
const POSITION_PREFIX: &str = "set_image_caption_position:";
const FONT_PREFIX: &str = "set_image_caption_font:";

/// Inline keyboard callbacks of the channel and caption menus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCallback {
    SelectChannel(i64),
    UpdateChannels,
    PositionMenu,
    FontMenu,
    RemoveChannel(i64),
    ConfirmRemove(i64),
    CancelRemove,
    RemoveForwarders(i64),
    Position(Compass),
    Font(String),
}

impl MenuCallback {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            UPDATE_CHANNELS => return Some(MenuCallback::UpdateChannels),
            POSITION_MENU => return Some(MenuCallback::PositionMenu),
            FONT_MENU => return Some(MenuCallback::FontMenu),
            REMOVE_CANCEL => return Some(MenuCallback::CancelRemove),
            _ => {}
        }
        if let Some(tag) = data.strip_prefix(POSITION_PREFIX) {
            return tag.parse().ok().map(MenuCallback::Position);
        }
        if let Some(id) = data.strip_prefix(FONT_PREFIX) {
            return (!id.is_empty()).then(|| MenuCallback::Font(id.to_string()));
        }
        let channel = |prefix: &str| data.strip_prefix(prefix).and_then(|id| id.parse::<i64>().ok());
        if let Some(id) = channel(SELECT_CHANNEL_PREFIX) {
            Some(MenuCallback::SelectChannel(id))
        } else if let Some(id) = channel(REMOVE_PREFIX) {
            Some(MenuCallback::RemoveChannel(id))
        } else if let Some(id) = channel(REMOVE_CONFIRM_PREFIX) {
            Some(MenuCallback::ConfirmRemove(id))
        } else {
            channel(REMOVE_FORWARDERS_PREFIX).map(MenuCallback::RemoveForwarders)
        }
    }

    pub fn data(&self) -> String {
        match self {
            MenuCallback::SelectChannel(id) => format!("{}{}", SELECT_CHANNEL_PREFIX, id),
            MenuCallback::UpdateChannels => UPDATE_CHANNELS.to_string(),
            MenuCallback::PositionMenu => POSITION_MENU.to_string(),
            MenuCallback::FontMenu => FONT_MENU.to_string(),
            MenuCallback::RemoveChannel(id) => format!("{}{}", REMOVE_PREFIX, id),
            MenuCallback::ConfirmRemove(id) => format!("{}{}", REMOVE_CONFIRM_PREFIX, id),
            MenuCallback::CancelRemove => REMOVE_CANCEL.to_string(),
            MenuCallback::RemoveForwarders(id) => format!("{}{}", REMOVE_FORWARDERS_PREFIX, id),
            MenuCallback::Position(tag) => format!("{}{}", POSITION_PREFIX, tag),
            MenuCallback::Font(id) => format!("{}{}", FONT_PREFIX, id),
        }
    }
}

fn button(label: impl Into<String>, action: MenuCallback) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, action.data())
}

fn marked(label: &str, current: bool) -> String {
    if current {
        format!("[{}]", label)
    } else {
        label.to_string()
    }
}

/// 3×3 compass grid, the current tag in brackets.
pub fn position_keyboard(current: Compass) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(Compass::ALL.chunks(3).map(|row| {
        row.iter()
            .map(|tag| {
                let label = marked(&tag.as_str().to_uppercase(), *tag == current);
                button(label, MenuCallback::Position(*tag))
            })
            .collect::<Vec<_>>()
    }))
}

/// Registry fonts in two columns, the current one in brackets.
pub fn font_keyboard(fonts: &FontRegistry, current: &str) -> InlineKeyboardMarkup {
    let buttons: Vec<_> = fonts
        .iter()
        .map(|font| {
            button(
                marked(&font.name, font.id == current),
                MenuCallback::Font(font.id.clone()),
            )
        })
        .collect();
    InlineKeyboardMarkup::new(buttons.chunks(2).map(|row| row.to_vec()))
}

/// One channel per row plus the "Update Channels" footer.
pub fn channels_keyboard(channels: &[Channel], current: Option<i64>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = channels
        .iter()
        .map(|channel| {
            vec![button(
                marked(&channel.display_name(), current == Some(channel.channel_id)),
                MenuCallback::SelectChannel(channel.channel_id),
            )]
        })
        .collect();
    rows.push(vec![button("Update Channels", MenuCallback::UpdateChannels)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn channel_menu_keyboard(channel_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("Position", MenuCallback::PositionMenu),
            button("Font", MenuCallback::FontMenu),
        ],
        vec![
            button("Remove", MenuCallback::RemoveChannel(channel_id)),
            button("Remove Forwarders", MenuCallback::RemoveForwarders(channel_id)),
        ],
    ])
}

pub fn remove_confirm_keyboard(channel_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("Yes", MenuCallback::ConfirmRemove(channel_id)),
        button("No", MenuCallback::CancelRemove),
    ]])
}

pub fn remove_prompt(name: &str) -> String {
    format!(
        "Are you sure you want to remove {}?\n\
         If nobody else manages this channel through the bot, its image caption settings are reset.",
        name
    )
}

pub fn settings_text(
    settings: &ChannelSettings,
    channel: Option<&Channel>,
    fonts: &FontRegistry,
    posts: i64,
) -> String {
    let font = fonts.get(settings.caption_font.as_deref());
    let name = channel
        .map(Channel::display_name)
        .unwrap_or_else(|| settings.channel_id.to_string());
    let forward_to = settings
        .forward_to
        .map(|id| id.to_string())
        .unwrap_or_else(|| "off".to_string());
    format!(
        "Channel: {}\nCaption: {}\nPosition: {}\nFont: {}\nOpacity: {}%\nForward to: {}\nPosts: {}",
        name,
        settings.image_caption.as_deref().unwrap_or("not set"),
        settings.caption_position.as_str().to_uppercase(),
        font.name,
        settings.caption_alpha,
        forward_to,
        posts
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::fonts::tests::test_registry;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callback_data(button: &InlineKeyboardButton) -> &str {
        match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => data,
            other => panic!("unexpected button kind {:?}", other),
        }
    }

    fn channel(id: i64, title: &str) -> Channel {
        Channel {
            channel_id: id,
            title: Some(title.to_string()),
            username: None,
            added_by: None,
        }
    }

    #[test]
    fn parses_callbacks() {
        assert_eq!(
            MenuCallback::parse("set_image_caption_position:ne"),
            Some(MenuCallback::Position(Compass::NorthEast))
        );
        assert_eq!(
            MenuCallback::parse("set_image_caption_font:serif"),
            Some(MenuCallback::Font("serif".to_string()))
        );
        assert_eq!(
            MenuCallback::parse("change_settings_menu:-1001"),
            Some(MenuCallback::SelectChannel(-1001))
        );
        assert_eq!(
            MenuCallback::parse("remove_channel:-5"),
            Some(MenuCallback::RemoveChannel(-5))
        );
        assert_eq!(
            MenuCallback::parse("remove_channel_confirm:-5"),
            Some(MenuCallback::ConfirmRemove(-5))
        );
        assert_eq!(MenuCallback::parse("update_channels"), Some(MenuCallback::UpdateChannels));
        assert_eq!(MenuCallback::parse("set_image_caption_position:nsc"), None);
        assert_eq!(MenuCallback::parse("set_image_caption_font:"), None);
        assert_eq!(MenuCallback::parse("change_settings_menu:abc"), None);
        assert_eq!(MenuCallback::parse("home"), None);
    }

    #[test]
    fn position_keyboard_marks_current() {
        let keyboard = position_keyboard(Compass::SouthWest);
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert!(keyboard.inline_keyboard.iter().all(|row| row.len() == 3));

        let labels: Vec<_> = keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(labels, vec!["NW", "N", "NE", "W", "C", "E", "[SW]", "S", "SE"]);

        for button in keyboard.inline_keyboard.iter().flatten() {
            assert!(matches!(
                MenuCallback::parse(callback_data(button)),
                Some(MenuCallback::Position(_))
            ));
        }
    }

    #[test]
    fn font_keyboard_marks_current() {
        let fonts = test_registry();
        let keyboard = font_keyboard(&fonts, "serif");
        assert_eq!(keyboard.inline_keyboard.len(), 1);
        let row = &keyboard.inline_keyboard[0];
        assert_eq!(row[0].text, "DejaVu Sans");
        assert_eq!(row[1].text, "[DejaVu Serif]");
        assert_eq!(callback_data(&row[1]), "set_image_caption_font:serif");
    }

    #[test]
    fn channels_keyboard_has_update_footer() {
        let channels = vec![channel(-1, "Art"), channel(-2, "News")];
        let keyboard = channels_keyboard(&channels, Some(-2));
        let rows = &keyboard.inline_keyboard;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0].text, "Art");
        assert_eq!(rows[1][0].text, "[News]");
        assert_eq!(callback_data(&rows[1][0]), "change_settings_menu:-2");
        assert_eq!(rows[2][0].text, "Update Channels");
        assert_eq!(callback_data(&rows[2][0]), "update_channels");
    }

    #[test]
    fn channel_menu_targets_channel() {
        let keyboard = channel_menu_keyboard(-7);
        let actions: Vec<_> = keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| MenuCallback::parse(callback_data(b)))
            .collect();
        assert_eq!(
            actions,
            vec![
                MenuCallback::PositionMenu,
                MenuCallback::FontMenu,
                MenuCallback::RemoveChannel(-7),
                MenuCallback::RemoveForwarders(-7),
            ]
        );

        let confirm = remove_confirm_keyboard(-7);
        assert_eq!(callback_data(&confirm.inline_keyboard[0][0]), "remove_channel_confirm:-7");
        assert_eq!(callback_data(&confirm.inline_keyboard[0][1]), "remove_channel_cancel");
    }

    #[test]
    fn settings_text_falls_back_to_default_font() {
        let fonts = test_registry();
        let mut settings = ChannelSettings::new(-100);
        settings.caption_font = Some("gone".to_string());
        let text = settings_text(&settings, None, &fonts, 3);
        assert!(text.contains("Channel: -100"));
        assert!(text.contains("Caption: not set"));
        assert!(text.contains("Position: SE"));
        assert!(text.contains("Font: DejaVu Sans"));
        assert!(text.contains("Forward to: off"));
        assert!(text.contains("Posts: 3"));

        settings.forward_to = Some(-200);
        let named = channel(-100, "Art");
        let text = settings_text(&settings, Some(&named), &fonts, 0);
        assert!(text.contains("Channel: Art"));
        assert!(text.contains("Forward to: -200"));
    }
}
