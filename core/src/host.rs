//! Seams towards the virtual tabletop that hosts the explorer layer.
//!
//! Everything the engine needs from the outside world (grid math, scene flags, rendering,
//! timers and tokens) goes through these traits, so the engine can run against an in-memory
//! host in tests.

use core::time::Duration;
use futures_util::future::LocalBoxFuture;
use serde_json::{Map, Value};

use crate::*;

/// Grid geometry of the active scene. Must be deterministic for a given scene.
pub trait GridGeometry {
    /// Offset of the grid space containing `point`.
    fn offset_at(&self, point: Point) -> GridOffset;

    fn center_point(&self, offset: GridOffset) -> Point;

    fn top_left_point(&self, offset: GridOffset) -> Point;

    /// Outline of the grid space, in scene coordinates.
    fn vertices(&self, offset: GridOffset) -> Polygon;

    fn is_hexagonal(&self) -> bool;

    /// Size of a grid space in pixels.
    fn cell_size(&self) -> f64;

    /// Horizontal size of a grid space in pixels, differs from [`Self::cell_size`] on hex grids.
    fn cell_width(&self) -> f64 {
        self.cell_size()
    }

    /// Scene distance units covered by one grid space.
    fn distance(&self) -> f64;

    /// Playable bounds of the scene, excluding canvas padding.
    fn scene_rect(&self) -> Option<Rect>;
}

/// Persistence of the scene document's flags.
pub trait SceneStore {
    /// Current contents of the flag namespace, empty when nothing was ever stored.
    fn flags(&self) -> Map<String, Value>;

    /// Applies a batched update to the scene document.
    fn update(&self, patch: ScenePatch) -> LocalBoxFuture<'static, Result<()>>;
}

/// Single-threaded task scheduling on the host's event loop.
pub trait Scheduler {
    /// Runs `task` once at least `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: LocalBoxFuture<'static, ()>);
}

/// Disposition of a token towards the players.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenDisposition {
    Secret,
    Hostile,
    Neutral,
    Friendly,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TokenView {
    pub id: String,
    pub center: Point,
    pub disposition: TokenDisposition,
    pub has_player_owner: bool,
}

impl TokenView {
    /// Whether this token clears fog around itself.
    pub fn grants_reveal(&self) -> bool {
        self.disposition == TokenDisposition::Friendly || self.has_player_owner
    }
}

pub trait TokenSource {
    fn tokens(&self) -> Vec<TokenView>;

    /// Converts a radius in scene distance units to pixels the way the host sizes light
    /// sources for `token`.
    fn light_radius(&self, token: &TokenView, units: f64) -> f64;
}

/// Which mask render target a graphic is drawn into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MaskTarget {
    Hidden,
    Partial,
}

/// What fills the hidden tiles sprite.
#[derive(Clone, Debug, PartialEq)]
pub enum Background {
    /// Nothing is shown, the layer is disabled.
    None,
    /// Plain white texture, tinted by the hide color.
    Solid,
    /// Image asset, shown untinted.
    Image(String),
}

/// Display surface of the explorer layer.
///
/// Implementations own the two mask render textures and overwrite them on every render.
pub trait MaskRenderer {
    /// Allocates the sprites and mask render targets covering `scene_rect`.
    fn initialize(&mut self, scene_rect: Rect, resolution: f64);

    fn render_mask(&mut self, target: MaskTarget, graphic: &MaskGraphic);

    fn apply_appearance(&mut self, appearance: &LayerAppearance);

    /// Switches the hidden tiles texture. Image loads may complete asynchronously, a failed
    /// load leaves the layer blank.
    fn set_background(&mut self, background: Background);

    fn set_visible(&mut self, visible: bool);

    /// Removes all layer content, used when the layer is disabled.
    fn clear(&mut self);

    fn clear_highlight(&mut self);

    fn highlight(&mut self, top_left: Point, color: Color, border: Color);
}
