use serde_json::{Map, Value};

use crate::config::GRID_DATA_KEY;
use crate::*;

/// Read-only snapshot of a scene's reveal map.
///
/// Rebuilt wholesale whenever the scene flags change, never patched in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridDataMap {
    data: RevealMap,
    revealed: Vec<GridEntry>,
    partials: Vec<GridEntry>,
}

impl GridDataMap {
    pub fn new(data: RevealMap) -> Self {
        let revealed = data
            .values()
            .filter(|entry| entry.reveal == RevealState::Revealed)
            .copied()
            .collect();
        let partials = data
            .values()
            .filter(|entry| entry.reveal == RevealState::Partial)
            .copied()
            .collect();
        Self {
            data,
            revealed,
            partials,
        }
    }

    /// Reads the map out of the flag namespace, skipping entries that do not parse.
    pub fn from_flags(flags: &Map<String, Value>) -> Self {
        let Some(Value::Object(raw)) = flags.get(GRID_DATA_KEY) else {
            return Self::default();
        };

        let data = raw
            .iter()
            .filter_map(|(key, value)| match serde_json::from_value::<GridEntry>(value.clone()) {
                Ok(entry) => Some((key.clone(), entry)),
                Err(err) => {
                    log::debug!("skipping malformed grid entry {}: {}", key, err);
                    None
                }
            })
            .collect();
        Self::new(data)
    }

    pub fn revealed(&self) -> &[GridEntry] {
        &self.revealed
    }

    pub fn partials(&self) -> &[GridEntry] {
        &self.partials
    }

    pub fn data(&self) -> &RevealMap {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Looks up the entry of a grid space. Coordinates are resolved through `grid`, an
    /// explicit offset wins over coordinates. Hidden spaces usually have no entry.
    pub fn get(
        &self,
        grid: &dyn GridGeometry,
        position: impl Into<CoordsOrOffset>,
    ) -> Option<GridEntry> {
        let position = position.into();
        let offset = match (position.offset, position.coords) {
            (Some(offset), _) => offset,
            (None, Some(coords)) => grid.offset_at(coords),
            (None, None) => return None,
        };
        self.get_offset(offset)
    }

    pub fn get_offset(&self, offset: GridOffset) -> Option<GridEntry> {
        self.data.get(&offset_key(offset)).copied()
    }

    /// Reveal state of a grid space, absent entries are hidden.
    pub fn state_at(&self, offset: GridOffset) -> RevealState {
        self.get_offset(offset)
            .map_or(RevealState::Hidden, |entry| entry.reveal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SquareGrid;
    use serde_json::json;

    #[test]
    fn partitions_entries_by_state() {
        let flags = json!({
            "gridData": {
                "0_0": { "offset": { "i": 0, "j": 0 }, "reveal": true },
                "0_1": { "offset": { "i": 0, "j": 1 }, "reveal": "partial" },
                "1_1": { "offset": { "i": 1, "j": 1 }, "reveal": false },
                "bogus": 42,
            }
        });
        let map = GridDataMap::from_flags(flags.as_object().unwrap());

        assert_eq!(map.len(), 3);
        assert_eq!(map.revealed(), &[GridEntry::new(GridOffset::new(0, 0), RevealState::Revealed)]);
        assert_eq!(map.partials(), &[GridEntry::new(GridOffset::new(0, 1), RevealState::Partial)]);
        assert_eq!(map.state_at(GridOffset::new(1, 1)), RevealState::Hidden);
        assert_eq!(map.state_at(GridOffset::new(3, 3)), RevealState::Hidden);
    }

    #[test]
    fn get_resolves_coordinates_through_the_grid() {
        let grid = SquareGrid::new(Rect::new(0., 0., 200., 200.), 50.);
        let mut data = RevealMap::new();
        data.insert("1_2".into(), GridEntry::new(GridOffset::new(1, 2), RevealState::Revealed));
        let map = GridDataMap::new(data);

        // rows follow y, columns follow x
        let entry = map.get(&grid, Point::new(120., 60.)).unwrap();
        assert_eq!(entry.offset, GridOffset::new(1, 2));
        assert_eq!(map.get(&grid, GridOffset::new(2, 1)), None);
        assert_eq!(map.get(&grid, CoordsOrOffset::default()), None);
    }
}
