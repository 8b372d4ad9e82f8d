use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

/// Row and column of a grid space, in the host's offset coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridOffset {
    pub i: i32,
    pub j: i32,
}

impl GridOffset {
    pub const fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }

    /// Canonical storage key, `"{i}_{j}"`.
    pub fn key(self) -> String {
        offset_key(self)
    }
}

impl fmt::Display for GridOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.i, self.j)
    }
}

impl From<(i32, i32)> for GridOffset {
    fn from((i, j): (i32, i32)) -> Self {
        Self { i, j }
    }
}

/// Key used both for persisted grid data and for de-duplicating pending updates.
pub fn offset_key(offset: GridOffset) -> String {
    format!("{}_{}", offset.i, offset.j)
}

/// Point in scene (pixel) coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Grows the rectangle by `margin` on every side.
    pub fn padded(&self, margin: f64) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.width + 2. * margin,
            self.height + 2. * margin,
        )
    }

    /// Half open: the left and top edges are inside, the right and bottom edges are not.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0. && self.height > 0.)
    }
}

/// Closed polygon, hexagons are the largest cells we expect.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Polygon {
    pub points: SmallVec<[Point; 6]>,
}

impl Polygon {
    pub fn new(points: impl IntoIterator<Item = Point>) -> Self {
        Self {
            points: points.into_iter().collect(),
        }
    }
}

/// Reveal state of a single grid space.
///
/// Persisted as `true` for revealed and `"partial"` for partially revealed. Hidden spaces
/// have no entry at all, but a stored `false` is also read back as hidden.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RevealState {
    Hidden,
    Partial,
    Revealed,
}

impl RevealState {
    pub const fn is_hidden(self) -> bool {
        matches!(self, Self::Hidden)
    }
}

impl Default for RevealState {
    fn default() -> Self {
        Self::Hidden
    }
}

impl Serialize for RevealState {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        match self {
            Self::Hidden => serializer.serialize_bool(false),
            Self::Partial => serializer.serialize_str("partial"),
            Self::Revealed => serializer.serialize_bool(true),
        }
    }
}

impl<'de> Deserialize<'de> for RevealState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Named(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Self::Revealed,
            Raw::Flag(false) => Self::Hidden,
            Raw::Named(name) => match name.as_str() {
                "partial" => Self::Partial,
                "reveal" | "revealed" => Self::Revealed,
                _ => Self::Hidden,
            },
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridEntry {
    pub offset: GridOffset,
    pub reveal: RevealState,
}

impl GridEntry {
    pub const fn new(offset: GridOffset, reveal: RevealState) -> Self {
        Self { offset, reveal }
    }
}

/// Full persisted exploration state of a scene, keyed by [`offset_key`].
pub type RevealMap = BTreeMap<String, GridEntry>;

/// Either pixel coordinates that still need to be resolved against the grid, or an offset.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CoordsOrOffset {
    pub coords: Option<Point>,
    pub offset: Option<GridOffset>,
}

impl From<Point> for CoordsOrOffset {
    fn from(coords: Point) -> Self {
        Self {
            coords: Some(coords),
            offset: None,
        }
    }
}

impl From<GridOffset> for CoordsOrOffset {
    fn from(offset: GridOffset) -> Self {
        Self {
            coords: None,
            offset: Some(offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offset_key_uses_row_then_column() {
        assert_eq!(GridOffset::new(3, 12).key(), "3_12");
        assert_eq!(GridOffset::new(-1, 0).key(), "-1_0");
    }

    #[test]
    fn reveal_state_uses_persisted_representation() {
        let entry = GridEntry::new(GridOffset::new(0, 1), RevealState::Partial);
        assert_eq!(
            serde_json::to_value(entry).unwrap(),
            json!({ "offset": { "i": 0, "j": 1 }, "reveal": "partial" })
        );

        let offset = json!({ "i": 2, "j": 2 });
        let revealed: GridEntry =
            serde_json::from_value(json!({ "offset": offset, "reveal": true })).unwrap();
        assert_eq!(revealed.reveal, RevealState::Revealed);

        let hidden: GridEntry =
            serde_json::from_value(json!({ "offset": offset, "reveal": false })).unwrap();
        assert_eq!(hidden.reveal, RevealState::Hidden);
    }

    #[test]
    fn padded_rect_is_half_open() {
        let rect = Rect::new(0., 0., 200., 200.).padded(50.);
        assert!(rect.contains(Point::new(-50., 249.)));
        assert!(!rect.contains(Point::new(-50.5, 10.)));
        assert!(!rect.contains(Point::new(10., 250.)));
        assert!(!rect.contains(Point::new(250., 10.)));
    }
}
