//! Caption placement on a 3×3 compass grid.
//!
//! ```text
//! nw  n  ne
//!  w  c  e
//! sw  s  se
//! ```
//!
//! West column and north row sit `MARGIN` pixels from the edge, east column
//! and south row `MARGIN` pixels from the far edge, the middle column/row is
//! centred.

use std::fmt;
use std::str::FromStr;

pub const MARGIN: i32 = 5;

/// One of the nine compass tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compass {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

impl Compass {
    pub const ALL: [Compass; 9] = [
        Compass::NorthWest,
        Compass::North,
        Compass::NorthEast,
        Compass::West,
        Compass::Center,
        Compass::East,
        Compass::SouthWest,
        Compass::South,
        Compass::SouthEast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Compass::NorthWest => "nw",
            Compass::North => "n",
            Compass::NorthEast => "ne",
            Compass::West => "w",
            Compass::Center => "c",
            Compass::East => "e",
            Compass::SouthWest => "sw",
            Compass::South => "s",
            Compass::SouthEast => "se",
        }
    }

    fn column(self) -> Axis {
        match self {
            Compass::NorthWest | Compass::West | Compass::SouthWest => Axis::Near,
            Compass::North | Compass::Center | Compass::South => Axis::Middle,
            Compass::NorthEast | Compass::East | Compass::SouthEast => Axis::Far,
        }
    }

    fn row(self) -> Axis {
        match self {
            Compass::NorthWest | Compass::North | Compass::NorthEast => Axis::Near,
            Compass::West | Compass::Center | Compass::East => Axis::Middle,
            Compass::SouthWest | Compass::South | Compass::SouthEast => Axis::Far,
        }
    }

    /// Horizontal alignment used for multi-line captions.
    pub fn alignment(self) -> Alignment {
        match self {
            Compass::North | Compass::South => Alignment::Center,
            Compass::NorthEast | Compass::SouthEast => Alignment::Right,
            _ => Alignment::Left,
        }
    }
}

impl fmt::Display for Compass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown position '{0}', expected one of nw,n,ne,w,c,e,sw,s,se")]
pub struct UnknownCompass(pub String);

impl FromStr for Compass {
    type Err = UnknownCompass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Compass::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCompass(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Near,
    Middle,
    Far,
}

impl Axis {
    fn offset(self, image: u32, text: u32) -> i32 {
        let (image, text) = (image as i32, text as i32);
        match self {
            Axis::Near => MARGIN,
            Axis::Middle => (image - text).div_euclid(2),
            Axis::Far => image - text - MARGIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Where a caption goes: a compass tag, or a verbatim top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Compass(Compass),
    Explicit { x: i32, y: i32 },
}

impl Default for Position {
    fn default() -> Self {
        Position::Explicit { x: 0, y: 0 }
    }
}

impl From<Compass> for Position {
    fn from(tag: Compass) -> Self {
        Position::Compass(tag)
    }
}

/// Top-left drawing point plus line alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub x: i32,
    pub y: i32,
    pub align: Alignment,
}

/// Resolve `position` for a text box of `text_size` on an image of `image_size`.
///
/// Coordinates may be negative when the text is larger than the image.
pub fn get_text_position(position: Position, image_size: (u32, u32), text_size: (u32, u32)) -> Anchor {
    match position {
        Position::Explicit { x, y } => Anchor {
            x,
            y,
            align: Alignment::Left,
        },
        Position::Compass(tag) => Anchor {
            x: tag.column().offset(image_size.0, text_size.0),
            y: tag.row().offset(image_size.1, text_size.1),
            align: tag.alignment(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: (u32, u32) = (800, 600);
    const TEXT: (u32, u32) = (100, 50);

    fn at(tag: &str) -> Anchor {
        get_text_position(Position::Compass(tag.parse().unwrap()), IMAGE, TEXT)
    }

    // Every tag, locked in. Two-letter tags must not pick up the rules of
    // the single letters they contain.
    #[test]
    fn test_all_nine_tags() {
        let expected = [
            ("nw", 5, 5, Alignment::Left),
            ("n", 350, 5, Alignment::Center),
            ("ne", 695, 5, Alignment::Right),
            ("w", 5, 275, Alignment::Left),
            ("c", 350, 275, Alignment::Left),
            ("e", 695, 275, Alignment::Left),
            ("sw", 5, 545, Alignment::Left),
            ("s", 350, 545, Alignment::Center),
            ("se", 695, 545, Alignment::Right),
        ];
        for (tag, x, y, align) in expected {
            assert_eq!(at(tag), Anchor { x, y, align }, "tag {tag}");
        }
    }

    #[test]
    fn test_all_tags_stay_inside_image() {
        for tag in Compass::ALL {
            let anchor = get_text_position(tag.into(), IMAGE, TEXT);
            assert!(anchor.x >= 0 && anchor.y >= 0, "{tag}");
            assert!(anchor.x + TEXT.0 as i32 <= IMAGE.0 as i32, "{tag}");
            assert!(anchor.y + TEXT.1 as i32 <= IMAGE.1 as i32, "{tag}");
        }
    }

    #[test]
    fn test_corners_are_never_centred() {
        let centre_x = (IMAGE.0 as i32 - TEXT.0 as i32) / 2;
        let centre_y = (IMAGE.1 as i32 - TEXT.1 as i32) / 2;
        for tag in ["nw", "ne", "sw", "se"] {
            let anchor = at(tag);
            assert_ne!(anchor.x, centre_x, "{tag}");
            assert_ne!(anchor.y, centre_y, "{tag}");
        }
    }

    #[test]
    fn test_explicit_position_is_verbatim() {
        let anchor = get_text_position(Position::Explicit { x: 17, y: -3 }, IMAGE, TEXT);
        assert_eq!(
            anchor,
            Anchor {
                x: 17,
                y: -3,
                align: Alignment::Left
            }
        );
        assert_eq!(Position::default(), Position::Explicit { x: 0, y: 0 });
    }

    #[test]
    fn test_oversized_text_goes_negative() {
        let anchor = get_text_position(Compass::Center.into(), (100, 100), (121, 10));
        assert_eq!(anchor.x, -11);
        let anchor = get_text_position(Compass::East.into(), (100, 100), (121, 10));
        assert_eq!(anchor.x, -26);
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!("SE".parse::<Compass>(), Ok(Compass::SouthEast));
        assert_eq!(" c ".parse::<Compass>(), Ok(Compass::Center));
        assert!("nsc".parse::<Compass>().is_err());
        assert!("".parse::<Compass>().is_err());
        for tag in Compass::ALL {
            assert_eq!(tag.as_str().parse::<Compass>(), Ok(tag));
        }
    }
}
