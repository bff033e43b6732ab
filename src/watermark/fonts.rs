//! Font registry.
//!
//! Fonts are declared per platform in a JSON file:
//!
//! ```json
//! { "linux": { "default": "dejavu_sans",
//!              "fonts": { "dejavu_sans": { "name": "DejaVu Sans", "path": "fonts/DejaVuSans.ttf" } } } }
//! ```
//!
//! Each declared font is parsed and test-rendered once at load time. Fonts that do
//! not render are dropped; a missing default is a configuration error.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{Font as _, FontVec, PxScale};
use serde::Deserialize;
use tracing::{debug, warn};

use super::WatermarkError;

const CHECK_GLYPH: char = 'A';
const CHECK_SIZE: f32 = 14.0;

/// A usable font. Identity is `id`.
#[derive(Clone)]
pub struct Font {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    face: Arc<FontVec>,
}

impl Font {
    /// Read a font file and check that it renders.
    pub fn load(
        id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, WatermarkError> {
        let path = path.into();
        let failed = |reason: String| WatermarkError::FontLoad {
            path: path.clone(),
            reason,
        };
        let data = std::fs::read(&path).map_err(|e| failed(e.to_string()))?;
        let face = FontVec::try_from_vec(data).map_err(|e| failed(e.to_string()))?;

        let glyph = face
            .glyph_id(CHECK_GLYPH)
            .with_scale(PxScale::from(CHECK_SIZE));
        if face.outline_glyph(glyph).is_none() {
            return Err(failed(format!("no outline for glyph '{CHECK_GLYPH}'")));
        }

        Ok(Self {
            id: id.into(),
            name: name.into(),
            path,
            face: Arc::new(face),
        })
    }

    pub(crate) fn face(&self) -> &FontVec {
        &self.face
    }
}

impl fmt::Debug for Font {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Font")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl PartialEq for Font {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Either a font id to look up or an already resolved font.
#[derive(Debug, Clone)]
pub enum FontChoice {
    Id(String),
    Font(Font),
}

impl From<&str> for FontChoice {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for FontChoice {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<Font> for FontChoice {
    fn from(font: Font) -> Self {
        Self::Font(font)
    }
}

#[derive(Debug, Deserialize)]
struct PlatformFonts {
    default: Option<String>,
    #[serde(default)]
    fonts: BTreeMap<String, FontEntry>,
}

#[derive(Debug, Deserialize)]
struct FontEntry {
    name: String,
    path: PathBuf,
}

/// Immutable set of usable fonts with a guaranteed default.
#[derive(Debug)]
pub struct FontRegistry {
    fonts: BTreeMap<String, Font>,
    default: String,
}

impl FontRegistry {
    /// Load the fonts declared for `platform` in the JSON file at `config_path`.
    ///
    /// Relative font paths are resolved against the directory holding the
    /// config file. Fonts that fail to load are skipped.
    pub fn load(config_path: impl AsRef<Path>, platform: &str) -> Result<Self, WatermarkError> {
        let config_path = config_path.as_ref();
        let raw = std::fs::read_to_string(config_path).map_err(|source| {
            WatermarkError::FontConfigRead {
                path: config_path.to_path_buf(),
                source,
            }
        })?;
        let mut by_platform: HashMap<String, PlatformFonts> =
            serde_json::from_str(&raw).map_err(|source| WatermarkError::FontConfigParse {
                path: config_path.to_path_buf(),
                source,
            })?;

        let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let declared = by_platform.remove(platform).unwrap_or(PlatformFonts {
            default: None,
            fonts: BTreeMap::new(),
        });

        let mut fonts = BTreeMap::new();
        for (id, entry) in declared.fonts {
            let path = if entry.path.is_absolute() {
                entry.path
            } else {
                base_dir.join(entry.path)
            };
            match Font::load(id.clone(), entry.name, &path) {
                Ok(font) => {
                    debug!(font_id = %id, path = ?path, "font loaded");
                    fonts.insert(id, font);
                }
                Err(err) => {
                    warn!(font_id = %id, error = %err, "font unavailable, skipping");
                }
            }
        }

        Self::from_fonts(fonts, declared.default, platform)
    }

    fn from_fonts(
        fonts: BTreeMap<String, Font>,
        default: Option<String>,
        platform: &str,
    ) -> Result<Self, WatermarkError> {
        match default {
            Some(id) if fonts.contains_key(&id) => Ok(Self { fonts, default: id }),
            _ => Err(WatermarkError::DefaultFontUnavailable {
                platform: platform.to_string(),
            }),
        }
    }

    /// Font for `id`, or the default font when `id` is absent or unknown.
    pub fn get(&self, id: Option<&str>) -> &Font {
        id.and_then(|id| self.fonts.get(id))
            .unwrap_or_else(|| self.default_font())
    }

    pub fn default_font(&self) -> &Font {
        // `default` is checked against `fonts` at construction.
        &self.fonts[&self.default]
    }

    pub fn resolve(&self, choice: Option<&FontChoice>) -> Font {
        match choice {
            Some(FontChoice::Font(font)) => font.clone(),
            Some(FontChoice::Id(id)) => self.get(Some(id)).clone(),
            None => self.default_font().clone(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fonts.contains_key(id)
    }

    /// Fonts ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Font> {
        self.fonts.values()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn fonts_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("assets").join("fonts")
    }

    pub(crate) fn test_registry() -> FontRegistry {
        let dir = fonts_dir();
        let config = serde_json::json!({
            "test": {
                "default": "sans",
                "fonts": {
                    "sans": { "name": "DejaVu Sans", "path": dir.join("DejaVuSans.ttf") },
                    "serif": { "name": "DejaVu Serif", "path": dir.join("DejaVuSerif.ttf") }
                }
            }
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", config).unwrap();
        FontRegistry::load(file.path(), "test").unwrap()
    }

    fn write_config(dir: &Path, body: serde_json::Value) -> PathBuf {
        let path = dir.join("fonts.json");
        std::fs::write(&path, body.to_string()).unwrap();
        path
    }

    #[test]
    fn test_load_skips_broken_font_and_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken.ttf"), b"not a font").unwrap();
        let good = fonts_dir().join("DejaVuSans.ttf");
        let config = write_config(
            tmp.path(),
            serde_json::json!({
                "linux": {
                    "default": "good",
                    "fonts": {
                        "good": { "name": "Good", "path": good },
                        "broken": { "name": "Broken", "path": "broken.ttf" }
                    }
                }
            }),
        );

        let registry = FontRegistry::load(&config, "linux").unwrap();
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains("broken"));
        assert_eq!(registry.get(Some("unknown")).id, "good");
        assert_eq!(registry.get(Some("broken")).id, "good");
        assert_eq!(registry.get(None).id, "good");
    }

    #[test]
    fn test_font_load_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let broken = tmp.path().join("broken.ttf");
        std::fs::write(&broken, b"not a font").unwrap();

        let err = Font::load("broken", "Broken", &broken).unwrap_err();
        assert!(matches!(err, WatermarkError::FontLoad { ref path, .. } if path == &broken));

        let missing = tmp.path().join("missing.ttf");
        let err = Font::load("missing", "Missing", &missing).unwrap_err();
        assert!(matches!(err, WatermarkError::FontLoad { ref path, .. } if path == &missing));

        let font = Font::load("sans", "DejaVu Sans", fonts_dir().join("DejaVuSans.ttf")).unwrap();
        assert_eq!(font.id, "sans");
    }

    #[test]
    fn test_load_fails_when_default_is_broken() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken.ttf"), b"not a font").unwrap();
        let good = fonts_dir().join("DejaVuSans.ttf");
        let config = write_config(
            tmp.path(),
            serde_json::json!({
                "linux": {
                    "default": "broken",
                    "fonts": {
                        "good": { "name": "Good", "path": good },
                        "broken": { "name": "Broken", "path": "broken.ttf" }
                    }
                }
            }),
        );

        let err = FontRegistry::load(&config, "linux").unwrap_err();
        assert!(matches!(err, WatermarkError::DefaultFontUnavailable { .. }));
    }

    #[test]
    fn test_load_fails_for_unknown_platform() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_config(
            tmp.path(),
            serde_json::json!({ "linux": { "default": "x", "fonts": {} } }),
        );
        let err = FontRegistry::load(&config, "windows").unwrap_err();
        assert!(matches!(err, WatermarkError::DefaultFontUnavailable { .. }));
    }

    #[test]
    fn test_load_fails_without_default_key() {
        let tmp = tempfile::tempdir().unwrap();
        let good = fonts_dir().join("DejaVuSans.ttf");
        let config = write_config(
            tmp.path(),
            serde_json::json!({ "linux": { "fonts": { "good": { "name": "Good", "path": good } } } }),
        );
        assert!(FontRegistry::load(&config, "linux").is_err());
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let config = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("assets")
            .join("fonts.json");
        let registry = FontRegistry::load(&config, "linux").unwrap();
        assert_eq!(registry.default_font().id, "dejavu_sans");
        assert!(registry.default_font().path.ends_with("fonts/DejaVuSans.ttf"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_and_invalid_config() {
        let tmp = tempfile::tempdir().unwrap();
        let err = FontRegistry::load(tmp.path().join("absent.json"), "linux").unwrap_err();
        assert!(matches!(err, WatermarkError::FontConfigRead { .. }));

        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = FontRegistry::load(&path, "linux").unwrap_err();
        assert!(matches!(err, WatermarkError::FontConfigParse { .. }));
    }

    #[test]
    fn test_resolve_font_choice() {
        let registry = test_registry();
        let serif = registry.get(Some("serif")).clone();

        assert_eq!(registry.resolve(None).id, "sans");
        assert_eq!(registry.resolve(Some(&FontChoice::from("serif"))).id, "serif");
        assert_eq!(registry.resolve(Some(&FontChoice::from("nope"))).id, "sans");
        assert_eq!(registry.resolve(Some(&FontChoice::from(serif))).id, "serif");
    }

    #[test]
    fn test_iter_is_ordered_by_id() {
        let registry = test_registry();
        let ids: Vec<_> = registry.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["sans", "serif"]);
    }
}
