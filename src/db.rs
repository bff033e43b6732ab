use anyhow::{Context, Result};
use tokio_rusqlite::Connection;

use crate::watermark::Compass;

/// Настройки подписи на изображениях для одного канала.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub channel_id: i64,
    pub image_caption: Option<String>,
    pub caption_position: Compass,
    /// `None`: шрифт по умолчанию из реестра.
    pub caption_font: Option<String>,
    /// Непрозрачность в процентах, 0..=100.
    pub caption_alpha: u8,
    /// Чат, в который пересылаются посты канала.
    pub forward_to: Option<i64>,
}

impl ChannelSettings {
    pub fn new(channel_id: i64) -> Self {
        Self {
            channel_id,
            image_caption: None,
            caption_position: Compass::SouthEast,
            caption_font: None,
            caption_alpha: 100,
            forward_to: None,
        }
    }

    /// Непрозрачность в шкале альфа-канала 0..=255.
    pub fn alpha_u8(&self) -> u8 {
        (self.caption_alpha.min(100) as u32 * 255 / 100) as u8
    }
}

/// Канал, добавленный хотя бы одним пользователем.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub channel_id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    pub added_by: Option<i64>,
}

impl Channel {
    /// Название для кнопок и сообщений: заголовок, `@username` или id.
    pub fn display_name(&self) -> String {
        match (&self.title, &self.username) {
            (Some(title), _) if !title.is_empty() => title.clone(),
            (_, Some(username)) => format!("@{}", username),
            _ => self.channel_id.to_string(),
        }
    }
}

/// Колонки `channel_settings`, которые можно менять по одной.
#[derive(Debug, Clone, Copy)]
enum SettingsColumn {
    ImageCaption,
    CaptionPosition,
    CaptionFont,
    CaptionAlpha,
    ForwardTo,
}

impl SettingsColumn {
    fn name(self) -> &'static str {
        match self {
            SettingsColumn::ImageCaption => "image_caption",
            SettingsColumn::CaptionPosition => "caption_position",
            SettingsColumn::CaptionFont => "caption_font",
            SettingsColumn::CaptionAlpha => "caption_alpha",
            SettingsColumn::ForwardTo => "forward_to",
        }
    }
}

#[derive(Clone)]
pub struct Db {
    conn: Connection,
}

impl Db {
/// Открывает (или создаёт) базу SQLite по пути `path` и гарантирует наличие схемы.
    pub async fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).await?;
        let db = Self { conn };
        db.init().await?;
        Ok(db)
    }

/// Инициализирует схему БД (идемпотентно):
/// - `config` — ключ/значение, хранит канал по умолчанию (`channel_id`);
/// - `channels` — добавленные каналы;
/// - `channel_users` — какие пользователи управляют какими каналами;
/// - `user_state` — текущий выбранный канал пользователя;
/// - `channel_settings` — подпись, позиция, шрифт, прозрачность и пересылка;
/// - `posts`  — лог опубликованных сообщений.
    async fn init(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode = WAL;
                    CREATE TABLE IF NOT EXISTS config (
                        key TEXT PRIMARY KEY,
                        value TEXT
                    );
                    CREATE TABLE IF NOT EXISTS channels (
                        channel_id INTEGER PRIMARY KEY,
                        title TEXT,
                        username TEXT,
                        added_by INTEGER
                    );
                    CREATE TABLE IF NOT EXISTS channel_users (
                        channel_id INTEGER NOT NULL,
                        user_id INTEGER NOT NULL,
                        PRIMARY KEY (channel_id, user_id)
                    );
                    CREATE TABLE IF NOT EXISTS user_state (
                        user_id INTEGER PRIMARY KEY,
                        current_channel_id INTEGER
                    );
                    CREATE TABLE IF NOT EXISTS channel_settings (
                        channel_id INTEGER PRIMARY KEY,
                        image_caption TEXT,
                        caption_position TEXT NOT NULL DEFAULT 'se',
                        caption_font TEXT,
                        caption_alpha INTEGER NOT NULL DEFAULT 100,
                        forward_to INTEGER
                    );
                    CREATE TABLE IF NOT EXISTS posts (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        channel_id INTEGER NOT NULL,
                        message_id INTEGER,
                        file_id TEXT,
                        caption TEXT,
                        created_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
                    );
                    "#,
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

/// Возвращает канал по умолчанию из таблицы `config`.
/// Если ещё не задан, вернёт `Ok(None)`.
    pub async fn default_channel_id(&self) -> Result<Option<i64>> {
        let val: Option<String> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT value FROM config WHERE key = 'channel_id'")?;
                let mut rows = stmt.query([])?;
                if let Some(row) = rows.next()? {
                    let v: String = row.get(0)?;
                    Ok(Some(v))
                } else {
                    Ok(None)
                }
            })
            .await?;

        Ok(match val {
            Some(s) => s.parse::<i64>().ok(),
            None => None,
        })
    }

/// Обновляет или добавляет канал по умолчанию в таблицу `config`.
    pub async fn set_default_channel_id(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO config(key, value) VALUES('channel_id', ?1) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    [id.to_string()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

/// Добавляет канал пользователю и делает его текущим.
/// Возвращает `true`, если пользователь ещё не был привязан к каналу
/// («Channel was added»), `false`, если только обновлены данные канала.
    pub async fn add_channel(&self, channel: Channel, user_id: i64) -> Result<bool> {
        let linked = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO channels(channel_id, title, username, added_by) VALUES(?1, ?2, ?3, ?4) \
                     ON CONFLICT(channel_id) DO UPDATE SET \
                        title = excluded.title, \
                        username = excluded.username, \
                        added_by = COALESCE(channels.added_by, excluded.added_by)",
                    rusqlite::params![channel.channel_id, channel.title, channel.username, channel.added_by],
                )?;
                let linked = tx.execute(
                    "INSERT OR IGNORE INTO channel_users(channel_id, user_id) VALUES(?1, ?2)",
                    [channel.channel_id, user_id],
                )?;
                tx.execute(
                    "INSERT INTO user_state(user_id, current_channel_id) VALUES(?1, ?2) \
                     ON CONFLICT(user_id) DO UPDATE SET current_channel_id = excluded.current_channel_id",
                    [user_id, channel.channel_id],
                )?;
                tx.commit()?;
                Ok(linked > 0)
            })
            .await?;
        Ok(linked)
    }

/// Каналы пользователя, по названию.
    pub async fn user_channels(&self, user_id: i64) -> Result<Vec<Channel>> {
        let channels = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.channel_id, c.title, c.username, c.added_by \
                     FROM channels c JOIN channel_users u ON u.channel_id = c.channel_id \
                     WHERE u.user_id = ?1 \
                     ORDER BY COALESCE(c.title, c.username, ''), c.channel_id",
                )?;
                let rows = stmt.query_map([user_id], |row| {
                    Ok(Channel {
                        channel_id: row.get(0)?,
                        title: row.get(1)?,
                        username: row.get(2)?,
                        added_by: row.get(3)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(channels)
    }

    pub async fn channel(&self, channel_id: i64) -> Result<Option<Channel>> {
        let channel = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT channel_id, title, username, added_by FROM channels WHERE channel_id = ?1",
                )?;
                let mut rows = stmt.query([channel_id])?;
                if let Some(row) = rows.next()? {
                    Ok(Some(Channel {
                        channel_id: row.get(0)?,
                        title: row.get(1)?,
                        username: row.get(2)?,
                        added_by: row.get(3)?,
                    }))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(channel)
    }

    pub async fn user_has_channel(&self, user_id: i64, channel_id: i64) -> Result<bool> {
        let found = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM channel_users WHERE user_id = ?1 AND channel_id = ?2",
                    [user_id, channel_id],
                    |row| row.get(0),
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(found)
    }

/// Обновляет название и username канала (кнопка «Update Channels»).
    pub async fn update_channel_info(
        &self,
        channel_id: i64,
        title: Option<String>,
        username: Option<String>,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE channels SET title = ?2, username = ?3 WHERE channel_id = ?1",
                    rusqlite::params![channel_id, title, username],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

/// Отвязывает канал от пользователя.
/// Если у канала не осталось пользователей, его настройки сбрасываются;
/// в этом случае возвращает `true`.
    pub async fn remove_channel(&self, channel_id: i64, user_id: i64) -> Result<bool> {
        let reset = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM channel_users WHERE channel_id = ?1 AND user_id = ?2",
                    [channel_id, user_id],
                )?;
                tx.execute(
                    "UPDATE user_state SET current_channel_id = NULL \
                     WHERE user_id = ?1 AND current_channel_id = ?2",
                    [user_id, channel_id],
                )?;
                let remaining: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM channel_users WHERE channel_id = ?1",
                    [channel_id],
                    |row| row.get(0),
                )?;
                if remaining == 0 {
                    tx.execute("DELETE FROM channel_settings WHERE channel_id = ?1", [channel_id])?;
                }
                tx.commit()?;
                Ok(remaining == 0)
            })
            .await?;
        Ok(reset)
    }

    pub async fn set_current_channel(&self, user_id: i64, channel_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO user_state(user_id, current_channel_id) VALUES(?1, ?2) \
                     ON CONFLICT(user_id) DO UPDATE SET current_channel_id = excluded.current_channel_id",
                    [user_id, channel_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

/// Канал, с которым сейчас работает пользователь.
/// Если пользователь ничего не выбрал, канал по умолчанию.
    pub async fn current_channel(&self, user_id: i64) -> Result<Option<i64>> {
        let selected: Option<i64> = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT current_channel_id FROM user_state WHERE user_id = ?1")?;
                let mut rows = stmt.query([user_id])?;
                match rows.next()? {
                    Some(row) => Ok(row.get(0)?),
                    None => Ok(None),
                }
            })
            .await?;
        match selected {
            Some(id) => Ok(Some(id)),
            None => self.default_channel_id().await,
        }
    }

/// Читает настройки подписи канала.
/// Если строки ещё нет — возвращает значения по умолчанию.
    pub async fn channel_settings(&self, channel_id: i64) -> Result<ChannelSettings> {
        type Row = (Option<String>, String, Option<String>, i64, Option<i64>);
        let row: Option<Row> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT image_caption, caption_position, caption_font, caption_alpha, forward_to \
                     FROM channel_settings WHERE channel_id = ?1",
                )?;
                let mut rows = stmt.query([channel_id])?;
                if let Some(row) = rows.next()? {
                    Ok(Some((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)))
                } else {
                    Ok(None)
                }
            })
            .await?;

        let Some((image_caption, position, caption_font, alpha, forward_to)) = row else {
            return Ok(ChannelSettings::new(channel_id));
        };
        let caption_position = position
            .parse::<Compass>()
            .with_context(|| format!("bad caption_position for channel {}", channel_id))?;
        Ok(ChannelSettings {
            channel_id,
            image_caption,
            caption_position,
            caption_font,
            caption_alpha: alpha.clamp(0, 100) as u8,
            forward_to,
        })
    }

/// Сохраняет подпись; `None` очищает её.
    pub async fn set_image_caption(&self, channel_id: i64, caption: Option<String>) -> Result<()> {
        self.upsert_setting(channel_id, SettingsColumn::ImageCaption, rusqlite::types::Value::from(caption))
            .await
    }

    pub async fn set_caption_position(&self, channel_id: i64, position: Compass) -> Result<()> {
        self.upsert_setting(
            channel_id,
            SettingsColumn::CaptionPosition,
            rusqlite::types::Value::from(position.as_str().to_string()),
        )
        .await
    }

    pub async fn set_caption_font(&self, channel_id: i64, font_id: &str) -> Result<()> {
        self.upsert_setting(
            channel_id,
            SettingsColumn::CaptionFont,
            rusqlite::types::Value::from(font_id.to_string()),
        )
        .await
    }

/// Прозрачность в процентах, значения больше 100 обрезаются.
    pub async fn set_caption_alpha(&self, channel_id: i64, alpha: u8) -> Result<()> {
        self.upsert_setting(
            channel_id,
            SettingsColumn::CaptionAlpha,
            rusqlite::types::Value::from(alpha.min(100) as i64),
        )
        .await
    }

/// Куда пересылать посты канала; `None` отключает пересылку.
    pub async fn set_forward_to(&self, channel_id: i64, target: Option<i64>) -> Result<()> {
        self.upsert_setting(channel_id, SettingsColumn::ForwardTo, rusqlite::types::Value::from(target))
            .await
    }

    async fn upsert_setting(
        &self,
        channel_id: i64,
        column: SettingsColumn,
        value: rusqlite::types::Value,
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO channel_settings(channel_id, {col}) VALUES(?1, ?2) \
             ON CONFLICT(channel_id) DO UPDATE SET {col} = excluded.{col}",
            col = column.name()
        );
        self.conn
            .call(move |conn| {
                conn.execute(&sql, rusqlite::params![channel_id, value])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

/// Добавляет запись о публикации в таблицу `posts` (для аудита и отладки).
    pub async fn log_post(&self, channel_id: i64, message_id: Option<i64>, file_id: Option<String>, caption: Option<String>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO posts(channel_id, message_id, file_id, caption) VALUES(?1, ?2, ?3, ?4)",
                    rusqlite::params![channel_id, message_id, file_id, caption],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

/// Количество записей в `posts` по каналу.
    pub async fn post_count(&self, channel_id: i64) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM posts WHERE channel_id = ?1",
                    [channel_id],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await?;
        Ok(count)
    }
}
