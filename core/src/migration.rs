//! Upgrades reveal data stored by older releases.
//!
//! Each step lifts the flag namespace by exactly one version. Steps work on a scratch copy
//! of the flags, the result is written back as a single patch that deletes the legacy keys,
//! so a failure half way never leaves mixed representations behind.

use serde_json::{Map, Value};

use crate::config::{CURRENT_FLAGS_VERSION, FLAGS_VERSION_KEY, GRID_DATA_KEY};
use crate::*;

/// Pixel coordinates of revealed spaces, `[[x, y], ...]`.
pub const PIXELS_KEY: &str = "revealed";
/// Row and column of revealed spaces, `[[i, j], ...]`.
pub const POSITIONS_KEY: &str = "revealedPositions";
/// Row, column and state, `[[i, j, "reveal" | "partial"], ...]`.
pub const GRID_POSITIONS_KEY: &str = "gridPositions";

const LEGACY_KEYS: [&str; 3] = [PIXELS_KEY, POSITIONS_KEY, GRID_POSITIONS_KEY];

type Step = fn(&mut Map<String, Value>, &dyn GridGeometry, Rect);

/// Ordered by the version each step produces.
const MIGRATIONS: &[(u32, Step)] = &[
    (1, pixels_to_positions),
    (2, positions_to_grid_positions),
    (3, grid_positions_to_grid_data),
];

/// Version of the stored data. Scenes from before versioning are recognized by their keys,
/// scenes without any reveal data count as current.
pub fn stored_version(flags: &Map<String, Value>) -> u32 {
    if let Some(version) = flags.get(FLAGS_VERSION_KEY).and_then(Value::as_u64) {
        return u32::try_from(version).unwrap_or(u32::MAX);
    }
    if flags.contains_key(PIXELS_KEY) {
        0
    } else if flags.contains_key(POSITIONS_KEY) {
        1
    } else if flags.contains_key(GRID_POSITIONS_KEY) {
        2
    } else {
        CURRENT_FLAGS_VERSION
    }
}

/// Computes the patch lifting `flags` to the current version, `None` when nothing needs to
/// change. Without a scene rectangle nothing can be validated and the data is left alone.
pub fn migrate(flags: &Map<String, Value>, grid: &dyn GridGeometry) -> Result<Option<ScenePatch>> {
    let version = stored_version(flags);
    if version >= CURRENT_FLAGS_VERSION {
        return Ok(None);
    }
    let bounds = padded_scene_rect(grid)?;

    let mut scratch = flags.clone();
    for &(target, step) in MIGRATIONS {
        if target > version {
            log::debug!("migrating explorer flags to version {}", target);
            step(&mut scratch, grid, bounds);
        }
    }

    let grid_data = match scratch.remove(GRID_DATA_KEY) {
        Some(Value::Object(data)) => data,
        Some(other) => {
            return Err(ExplorerError::InvalidFlags(format!(
                "{GRID_DATA_KEY} is not a map: {other}"
            )));
        }
        None => Map::new(),
    };
    log::info!(
        "migrated explorer flags from version {} to {} ({} entries)",
        version,
        CURRENT_FLAGS_VERSION,
        grid_data.len()
    );

    let mut patch = ScenePatch::new();
    for key in LEGACY_KEYS {
        if flags.contains_key(key) {
            patch.push_delete(key);
        }
    }
    Ok(Some(
        patch
            .replace(GRID_DATA_KEY, Value::Object(grid_data))
            .set(FLAGS_VERSION_KEY, CURRENT_FLAGS_VERSION.into()),
    ))
}

fn take_array(flags: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match flags.remove(key) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            log::debug!("ignoring malformed {}: {}", key, other);
            Vec::new()
        }
    }
}

fn append(flags: &mut Map<String, Value>, key: &str, items: Vec<Value>) {
    match flags.get_mut(key) {
        Some(Value::Array(existing)) => existing.extend(items),
        _ => {
            flags.insert(key.into(), Value::Array(items));
        }
    }
}

fn pair<T: serde::de::DeserializeOwned>(value: &Value) -> Option<(T, T)> {
    match value.as_array()?.as_slice() {
        [a, b, ..] => Some((
            serde_json::from_value(a.clone()).ok()?,
            serde_json::from_value(b.clone()).ok()?,
        )),
        _ => None,
    }
}

fn pixels_to_positions(flags: &mut Map<String, Value>, grid: &dyn GridGeometry, _bounds: Rect) {
    let positions = take_array(flags, PIXELS_KEY)
        .iter()
        .filter_map(pair::<f64>)
        .map(|(x, y)| {
            let offset = grid.offset_at(Point::new(x, y));
            Value::from(vec![offset.i, offset.j])
        })
        .collect();
    append(flags, POSITIONS_KEY, positions);
}

fn positions_to_grid_positions(
    flags: &mut Map<String, Value>,
    _grid: &dyn GridGeometry,
    _bounds: Rect,
) {
    let positions = take_array(flags, POSITIONS_KEY)
        .iter()
        .filter_map(pair::<i32>)
        .map(|(i, j)| Value::from(vec![Value::from(i), Value::from(j), Value::from("reveal")]))
        .collect();
    append(flags, GRID_POSITIONS_KEY, positions);
}

fn grid_positions_to_grid_data(
    flags: &mut Map<String, Value>,
    grid: &dyn GridGeometry,
    bounds: Rect,
) {
    let mut data = match flags.remove(GRID_DATA_KEY) {
        Some(Value::Object(data)) => data,
        _ => Map::new(),
    };

    for position in take_array(flags, GRID_POSITIONS_KEY) {
        let Some((i, j)) = pair::<i32>(&position) else {
            log::debug!("skipping malformed grid position {}", position);
            continue;
        };
        let offset = GridOffset::new(i, j);
        // scenes may have shrunk since the data was captured
        if !bounds.contains(grid.center_point(offset)) {
            log::trace!("dropping {} outside of the scene", offset);
            continue;
        }
        let reveal = match position.get(2).and_then(Value::as_str) {
            Some("partial") => RevealState::Partial,
            _ => RevealState::Revealed,
        };
        data.insert(offset_key(offset), entry_value(GridEntry::new(offset, reveal)));
    }

    flags.insert(GRID_DATA_KEY.into(), Value::Object(data));
}
