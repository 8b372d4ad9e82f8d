use core::cell::RefCell;
use core::mem;
use core::time::Duration;
use hashbrown::HashMap;
use serde_json::{Map, Value};
use std::rc::Rc;
use web_time::Instant;

use crate::config::{FLUSH_INTERVAL, GRID_DATA_KEY};
use crate::*;

/// Options for [`SceneUpdater::clear`]. Without either flag the whole scene is hidden.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClearOptions {
    pub reveal: bool,
    pub partial: bool,
}

impl ClearOptions {
    pub const fn target_state(self) -> RevealState {
        if self.reveal {
            RevealState::Revealed
        } else if self.partial {
            RevealState::Partial
        } else {
            RevealState::Hidden
        }
    }
}

/// Intent for a single grid space that has not been written yet.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PendingUpdate {
    pub offset: GridOffset,
    pub reveal: RevealState,
}

/// Trailing throttle: at most one scheduled run, runs at least `interval` apart.
#[derive(Clone, Debug)]
pub struct Throttle {
    interval: Duration,
    last_run: Option<Instant>,
    scheduled: bool,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            scheduled: false,
        }
    }

    /// Asks for a run. Returns the delay to schedule it with, or `None` when a run is already
    /// scheduled and will pick the request up.
    pub fn request(&mut self, now: Instant) -> Option<Duration> {
        if self.scheduled {
            return None;
        }
        self.scheduled = true;
        Some(match self.last_run {
            Some(last_run) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last_run)),
            None => Duration::ZERO,
        })
    }

    /// Marks the scheduled run as started.
    pub fn start(&mut self, now: Instant) {
        self.scheduled = false;
        self.last_run = Some(now);
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }
}

#[derive(Debug)]
struct UpdaterState {
    pending: HashMap<String, PendingUpdate>,
    in_flight: bool,
    throttle: Throttle,
}

struct Inner {
    grid: Rc<dyn GridGeometry>,
    store: Rc<dyn SceneStore>,
    scheduler: Rc<dyn Scheduler>,
    state: RefCell<UpdaterState>,
}

/// Clears the in-flight flag however the write ends, including the future being dropped.
struct InFlightGuard<'a>(&'a Inner);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.state.borrow_mut().in_flight = false;
    }
}

/// Coalesces reveal changes into throttled scene writes.
///
/// Every change is keyed by its grid space, so only the latest intent per space is written.
/// At most one write is in flight at a time, changes staged meanwhile are written by a
/// follow-up flush once it completes.
#[derive(Clone)]
pub struct SceneUpdater {
    inner: Rc<Inner>,
}

impl SceneUpdater {
    pub fn new(
        grid: Rc<dyn GridGeometry>,
        store: Rc<dyn SceneStore>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                grid,
                store,
                scheduler,
                state: RefCell::new(UpdaterState {
                    pending: HashMap::new(),
                    in_flight: false,
                    throttle: Throttle::new(FLUSH_INTERVAL),
                }),
            }),
        }
    }

    pub fn reveal(&self, position: impl Into<CoordsOrOffset>) -> bool {
        self.stage(position.into(), RevealState::Revealed)
    }

    pub fn partial(&self, position: impl Into<CoordsOrOffset>) -> bool {
        self.stage(position.into(), RevealState::Partial)
    }

    pub fn hide(&self, position: impl Into<CoordsOrOffset>) -> bool {
        self.stage(position.into(), RevealState::Hidden)
    }

    /// Stages a change and requests a flush. Returns false when the position was rejected.
    pub fn stage(&self, position: CoordsOrOffset, reveal: RevealState) -> bool {
        let offset = match self.resolve(position) {
            Ok(offset) => offset,
            Err(err) => {
                log::trace!("not staging {:?}: {}", reveal, err);
                return false;
            }
        };

        self.inner
            .state
            .borrow_mut()
            .pending
            .insert(offset_key(offset), PendingUpdate { offset, reveal });
        self.request_flush();
        true
    }

    /// Drops all pending changes and overwrites the whole reveal map in a single write.
    pub fn clear(&self, options: ClearOptions) {
        self.inner.state.borrow_mut().pending.clear();

        let state = options.target_state();
        let mut data = Map::new();
        if !state.is_hidden() {
            let offsets = match scene_offsets(self.inner.grid.as_ref()) {
                Ok(offsets) => offsets,
                Err(err) => {
                    log::warn!("cannot clear scene: {}", err);
                    return;
                }
            };
            for offset in offsets {
                data.insert(offset_key(offset), entry_value(GridEntry::new(offset, state)));
            }
        }
        log::debug!("clearing scene to {:?} ({} entries)", state, data.len());

        self.write_now(ScenePatch::new().replace(GRID_DATA_KEY, Value::Object(data)));
    }

    /// Writes a patch right away, bypassing the pending changes and the throttle.
    pub fn write_now(&self, patch: ScenePatch) {
        let store = Rc::clone(&self.inner.store);
        self.inner.scheduler.schedule(
            Duration::ZERO,
            Box::pin(async move {
                if let Err(err) = store.update(patch).await {
                    log::warn!("scene write failed: {}", err);
                }
            }),
        );
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    pub fn pending(&self, offset: GridOffset) -> Option<PendingUpdate> {
        self.inner.state.borrow().pending.get(&offset_key(offset)).copied()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.state.borrow().in_flight
    }

    fn resolve(&self, position: CoordsOrOffset) -> Result<GridOffset> {
        let grid = self.inner.grid.as_ref();
        let bounds = padded_scene_rect(grid)?;
        let (offset, point) = match (position.offset, position.coords) {
            (Some(offset), _) => (offset, grid.center_point(offset)),
            (None, Some(coords)) => (grid.offset_at(coords), coords),
            (None, None) => return Err(ExplorerError::MissingPosition),
        };
        if bounds.contains(point) {
            Ok(offset)
        } else {
            Err(ExplorerError::OutOfBounds(offset))
        }
    }

    fn request_flush(&self) {
        let delay = self
            .inner
            .state
            .borrow_mut()
            .throttle
            .request(Instant::now());
        let Some(delay) = delay else {
            log::trace!("flush already scheduled");
            return;
        };

        let inner = Rc::clone(&self.inner);
        self.inner
            .scheduler
            .schedule(delay, Box::pin(Self::flush(inner)));
    }

    async fn flush(inner: Rc<Inner>) {
        let batch = {
            let mut state = inner.state.borrow_mut();
            state.throttle.start(Instant::now());
            if state.in_flight {
                log::trace!("write in flight, deferring {} updates", state.pending.len());
                return;
            }
            if state.pending.is_empty() {
                return;
            }
            state.in_flight = true;
            mem::take(&mut state.pending)
        };

        let patch = grid_patch(batch.into_values());
        log::debug!("writing {} grid updates", patch.len());
        let result = {
            let _guard = InFlightGuard(&inner);
            inner.store.update(patch).await
        };
        if let Err(err) = result {
            log::warn!("grid update failed: {}", err);
        }

        if !inner.state.borrow().pending.is_empty() {
            SceneUpdater { inner }.request_flush();
        }
    }
}

/// Hidden spaces are removed from the map, everything else is set.
fn grid_patch(updates: impl IntoIterator<Item = PendingUpdate>) -> ScenePatch {
    let mut updates: Vec<_> = updates.into_iter().collect();
    updates.sort_by_key(|update| update.offset);

    let mut patch = ScenePatch::new();
    for PendingUpdate { offset, reveal } in updates {
        let path = format!("{GRID_DATA_KEY}.{}", offset_key(offset));
        match reveal {
            RevealState::Hidden => patch.push_delete(path),
            _ => patch.push_set(path, entry_value(GridEntry::new(offset, reveal))),
        }
    }
    patch
}

/// Persisted form of a grid entry, as serialized by [`GridEntry`].
pub fn entry_value(entry: GridEntry) -> Value {
    // integer offsets and a bool or string state always serialize
    serde_json::to_value(entry).unwrap_or(Value::Null)
}

/// Scene rectangle grown by one grid space, positions outside of it are never stored.
pub fn padded_scene_rect(grid: &dyn GridGeometry) -> Result<Rect> {
    let rect = grid.scene_rect().ok_or(ExplorerError::MissingSceneRect)?;
    Ok(rect.padded(grid.cell_size()))
}

/// Every offset covering the scene rectangle. Hex grids get an extra row and column on each
/// side since their spaces straddle the edges.
pub fn scene_offsets(grid: &dyn GridGeometry) -> Result<Vec<GridOffset>> {
    let rect = grid.scene_rect().ok_or(ExplorerError::MissingSceneRect)?;
    if rect.is_empty() {
        return Ok(Vec::new());
    }

    let mut start = grid.offset_at(Point::new(rect.x, rect.y));
    let mut end = grid.offset_at(Point::new(rect.right() - 1., rect.bottom() - 1.));
    if grid.is_hexagonal() {
        start = GridOffset::new(start.i - 1, start.j - 1);
        end = GridOffset::new(end.i + 1, end.j + 1);
    }

    let mut offsets = Vec::new();
    for i in start.i..=end.i {
        for j in start.j..=end.j {
            offsets.push(GridOffset::new(i, j));
        }
    }
    Ok(offsets)
}
