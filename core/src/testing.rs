//! In-memory host used by the unit tests.

use core::cell::{Cell, RefCell};
use core::time::Duration;
use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use futures_util::future::LocalBoxFuture;
use serde_json::{Map, Value};
use std::rc::Rc;

use crate::*;

/// Square grid whose offsets are counted from the canvas origin.
#[derive(Clone, Debug)]
pub struct SquareGrid {
    pub scene_rect: Option<Rect>,
    pub size: f64,
    pub hexagonal: bool,
}

impl SquareGrid {
    pub fn new(scene_rect: Rect, size: f64) -> Self {
        Self {
            scene_rect: Some(scene_rect),
            size,
            hexagonal: false,
        }
    }
}

impl GridGeometry for SquareGrid {
    fn offset_at(&self, point: Point) -> GridOffset {
        GridOffset::new((point.y / self.size).floor() as i32, (point.x / self.size).floor() as i32)
    }

    fn center_point(&self, offset: GridOffset) -> Point {
        self.top_left_point(offset).translate(self.size / 2., self.size / 2.)
    }

    fn top_left_point(&self, offset: GridOffset) -> Point {
        Point::new(offset.j as f64 * self.size, offset.i as f64 * self.size)
    }

    fn vertices(&self, offset: GridOffset) -> Polygon {
        let Point { x, y } = self.top_left_point(offset);
        let s = self.size;
        Polygon::new([
            Point::new(x, y),
            Point::new(x + s, y),
            Point::new(x + s, y + s),
            Point::new(x, y + s),
        ])
    }

    fn is_hexagonal(&self) -> bool {
        self.hexagonal
    }

    fn cell_size(&self) -> f64 {
        self.size
    }

    fn distance(&self) -> f64 {
        5.
    }

    fn scene_rect(&self) -> Option<Rect> {
        self.scene_rect
    }
}

/// Scene flags in memory, records every update and can hold writes open.
#[derive(Default)]
pub struct MemoryScene {
    pub flags: RefCell<Map<String, Value>>,
    pub updates: RefCell<Vec<ScenePatch>>,
    pub hold_writes: Cell<bool>,
    /// Rejects writes issued while set.
    pub fail_writes: Cell<bool>,
    held: RefCell<Vec<oneshot::Sender<()>>>,
}

impl MemoryScene {
    pub fn with_flags(flags: Value) -> Rc<Self> {
        let scene = Self::default();
        if let Value::Object(flags) = flags {
            *scene.flags.borrow_mut() = flags;
        }
        Rc::new(scene)
    }

    pub fn update_count(&self) -> usize {
        self.updates.borrow().len()
    }

    pub fn grid_data(&self) -> Value {
        self.flags
            .borrow()
            .get(config::GRID_DATA_KEY)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Completes every held write.
    pub fn release(&self) {
        for sender in self.held.borrow_mut().drain(..) {
            let _ = sender.send(());
        }
    }
}

impl SceneStore for Rc<MemoryScene> {
    fn flags(&self) -> Map<String, Value> {
        self.flags.borrow().clone()
    }

    fn update(&self, patch: ScenePatch) -> LocalBoxFuture<'static, Result<()>> {
        self.updates.borrow_mut().push(patch.clone());
        let scene = Rc::clone(self);
        let fail = self.fail_writes.get();
        let held = if self.hold_writes.get() {
            let (sender, receiver) = oneshot::channel();
            self.held.borrow_mut().push(sender);
            Some(receiver)
        } else {
            None
        };
        Box::pin(async move {
            if let Some(receiver) = held {
                let _ = receiver.await;
            }
            if fail {
                return Err(ExplorerError::Persistence("rejected".into()));
            }
            patch.apply_to(&mut scene.flags.borrow_mut());
            Ok(())
        })
    }
}

/// Spawns scheduled tasks on a [`LocalPool`] right away, recording the requested delays.
pub struct PoolScheduler {
    spawner: LocalSpawner,
    pub delays: RefCell<Vec<Duration>>,
}

impl PoolScheduler {
    pub fn new(pool: &LocalPool) -> Rc<Self> {
        Rc::new(Self {
            spawner: pool.spawner(),
            delays: RefCell::new(Vec::new()),
        })
    }
}

impl Scheduler for PoolScheduler {
    fn schedule(&self, delay: Duration, task: LocalBoxFuture<'static, ()>) {
        self.delays.borrow_mut().push(delay);
        self.spawner
            .spawn_local(task)
            .expect("test pool must be alive");
    }
}

#[derive(Default)]
pub struct StaticTokens {
    pub tokens: RefCell<Vec<TokenView>>,
}

impl TokenSource for StaticTokens {
    fn tokens(&self) -> Vec<TokenView> {
        self.tokens.borrow().clone()
    }

    fn light_radius(&self, _token: &TokenView, units: f64) -> f64 {
        // 5 units per 50px space, plus half a token width
        units * 10. + 25.
    }
}

pub fn token(
    id: &str,
    center: Point,
    disposition: TokenDisposition,
    has_player_owner: bool,
) -> TokenView {
    TokenView {
        id: id.into(),
        center,
        disposition,
        has_player_owner,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderCall {
    Initialize(Rect, f64),
    Mask(MaskTarget, MaskGraphic),
    Appearance(LayerAppearance),
    Background(Background),
    Visible(bool),
    Clear,
    ClearHighlight,
    Highlight(Point, Color),
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
}

impl RecordingRenderer {
    pub fn last_mask(&self, target: MaskTarget) -> Option<&MaskGraphic> {
        self.calls.iter().rev().find_map(|call| match call {
            RenderCall::Mask(t, graphic) if *t == target => Some(graphic),
            _ => None,
        })
    }

    pub fn last_highlight(&self) -> Option<&RenderCall> {
        self.calls
            .iter()
            .rev()
            .find(|call| matches!(call, RenderCall::Highlight(..) | RenderCall::ClearHighlight))
    }
}

impl MaskRenderer for RecordingRenderer {
    fn initialize(&mut self, scene_rect: Rect, resolution: f64) {
        self.calls.push(RenderCall::Initialize(scene_rect, resolution));
    }

    fn render_mask(&mut self, target: MaskTarget, graphic: &MaskGraphic) {
        self.calls.push(RenderCall::Mask(target, graphic.clone()));
    }

    fn apply_appearance(&mut self, appearance: &LayerAppearance) {
        self.calls.push(RenderCall::Appearance(appearance.clone()));
    }

    fn set_background(&mut self, background: Background) {
        self.calls.push(RenderCall::Background(background));
    }

    fn set_visible(&mut self, visible: bool) {
        self.calls.push(RenderCall::Visible(visible));
    }

    fn clear(&mut self) {
        self.calls.push(RenderCall::Clear);
    }

    fn clear_highlight(&mut self) {
        self.calls.push(RenderCall::ClearHighlight);
    }

    fn highlight(&mut self, top_left: Point, color: Color, _border: Color) {
        self.calls.push(RenderCall::Highlight(top_left, color));
    }
}
