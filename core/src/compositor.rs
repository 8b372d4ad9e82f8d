use serde::Serialize;
use serde::ser::{SerializeSeq, Serializer};

use crate::config::IMAGE_PARTIAL_MASK_ALPHA;
use crate::*;

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Fill {
    #[serde(serialize_with = "color_number")]
    pub color: Color,
    pub alpha: f64,
}

impl Fill {
    /// Covers: the masked layer shows through at `alpha`.
    pub const fn cover(alpha: f64) -> Self {
        Self {
            color: Color::WHITE,
            alpha,
        }
    }

    /// Punches a fully transparent hole.
    pub const fn punch() -> Self {
        Self {
            color: Color::BLACK,
            alpha: 1.,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Shape {
    Rect(Rect),
    Polygon {
        #[serde(serialize_with = "flat_points")]
        points: Polygon,
    },
    Circle { center: Point, radius: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DrawCommand {
    pub fill: Fill,
    pub shape: Shape,
}

/// Vector drawing for one mask render target. Commands are in scene coordinates and the
/// renderer translates them by `origin` so the scene rectangle lands at the texture origin.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MaskGraphic {
    pub origin: Point,
    pub commands: Vec<DrawCommand>,
}

impl MaskGraphic {
    pub fn new(scene_rect: Rect) -> Self {
        Self {
            origin: Point::new(-scene_rect.x, -scene_rect.y),
            commands: Vec::new(),
        }
    }

    pub fn draw(&mut self, fill: Fill, shape: Shape) {
        self.commands.push(DrawCommand { fill, shape });
    }

    pub fn polygon(&mut self, fill: Fill, points: Polygon) {
        self.draw(fill, Shape::Polygon { points });
    }

    pub fn circle(&mut self, fill: Fill, center: Point, radius: f64) {
        self.draw(fill, Shape::Circle { center, radius });
    }
}

/// The two masks of one frame, the partial mask only exists while partial tiles are shown.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskFrame {
    pub hidden: MaskGraphic,
    pub partial: Option<MaskGraphic>,
}

/// Tint and ordering of the layer's sprites.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerAppearance {
    #[serde(serialize_with = "color_number")]
    pub hidden_tint: Color,
    #[serde(serialize_with = "color_number")]
    pub partial_tint: Color,
    pub partial_layer_alpha: f64,
    pub show_partial_tiles: bool,
    pub sort_layer: u32,
    /// `None` stands for "above everything".
    pub elevation: Option<f64>,
}

impl LayerAppearance {
    pub fn new(settings: &ExplorerSettings, viewer: Viewer) -> Self {
        let show_partial_tiles = settings.show_partial_tiles(viewer);
        let (hidden_tint, partial_tint, partial_layer_alpha) =
            match (&settings.image, settings.partial_color) {
                (None, partial_color) => {
                    (settings.color, partial_color.unwrap_or(settings.color), 1.)
                }
                // GMs keep their partial color on image maps
                (Some(_), Some(partial_color)) if show_partial_tiles => {
                    (Color::WHITE, partial_color, 1.)
                }
                (Some(_), _) => (Color::WHITE, Color::WHITE, 0.),
            };
        let elevation = settings.position.elevation();
        Self {
            hidden_tint,
            partial_tint,
            partial_layer_alpha,
            show_partial_tiles,
            sort_layer: settings.position.sort_layer(),
            elevation: elevation.is_finite().then_some(elevation),
        }
    }
}

/// Builds the hidden and partial masks of a scene.
pub struct MaskCompositor<'a> {
    pub grid: &'a dyn GridGeometry,
    pub settings: &'a ExplorerSettings,
    pub viewer: Viewer,
}

impl<'a> MaskCompositor<'a> {
    pub fn new(grid: &'a dyn GridGeometry, settings: &'a ExplorerSettings, viewer: Viewer) -> Self {
        Self {
            grid,
            settings,
            viewer,
        }
    }

    /// Composes the masks from a snapshot of the reveal map and the tokens on the scene.
    /// `tokens` pairs every token with its reveal radius in pixels.
    pub fn compose(
        &self,
        grid_data: &GridDataMap,
        tokens: &[(TokenView, f64)],
    ) -> Result<MaskFrame> {
        let scene_rect = self.grid.scene_rect().ok_or(ExplorerError::MissingSceneRect)?;
        let has_image = self.settings.has_image();
        let hidden_alpha = self.settings.hidden_alpha(self.viewer);
        let partial_alpha = self.settings.partial_alpha(self.viewer);

        let mut hidden = MaskGraphic::new(scene_rect);
        let mut partial = self
            .settings
            .show_partial_tiles(self.viewer)
            .then(|| MaskGraphic::new(scene_rect));

        // everything starts out hidden
        hidden.draw(Fill::cover(hidden_alpha), Shape::Rect(scene_rect));

        // no reveal radius on partials, overlapping translucent circles look terrible
        let partial_fill = Fill::cover(if has_image {
            IMAGE_PARTIAL_MASK_ALPHA
        } else {
            partial_alpha
        });
        for entry in grid_data.partials() {
            let poly = self.grid.vertices(entry.offset);
            hidden.polygon(Fill::punch(), poly.clone());
            if has_image {
                // images are dimmed, not cut out
                hidden.polygon(Fill::cover(partial_alpha), poly.clone());
            }
            if let Some(partial) = partial.as_mut() {
                partial.polygon(partial_fill, poly);
            }
        }

        // revealed spaces go after partials so their circles win
        let radius = grid_reveal_radius(self.grid, self.settings.grid_reveal_radius);
        for entry in grid_data.revealed() {
            if radius > 0. {
                let center = self.grid.center_point(entry.offset);
                hidden.circle(Fill::punch(), center, radius);
                if let Some(partial) = partial.as_mut() {
                    partial.circle(Fill::punch(), center, radius);
                }
            } else {
                hidden.polygon(Fill::punch(), self.grid.vertices(entry.offset));
            }
        }

        for (token, radius) in tokens {
            if !token.grants_reveal() || !(*radius > 0.) {
                continue;
            }
            hidden.circle(Fill::punch(), token.center, *radius);
            if let Some(partial) = partial.as_mut() {
                partial.circle(Fill::punch(), token.center, *radius);
            }
        }

        Ok(MaskFrame { hidden, partial })
    }
}

/// Converts the grid reveal radius from distance units into pixels, measured from the center
/// of a space like the host does for light sources.
pub fn grid_reveal_radius(grid: &dyn GridGeometry, units: f64) -> f64 {
    if !(units > 0.) || !(grid.distance() > 0.) {
        return 0.;
    }
    let half_width = grid.cell_width() / 2.;
    ((units.abs() / grid.distance()) * grid.cell_size() + half_width) * units.signum()
}

/// Mask textures shrink on very large scenes to keep memory bounded.
pub fn texture_resolution(scene_rect: Rect) -> f64 {
    let area = scene_rect.area();
    if area > 16000f64.powi(2) {
        0.25
    } else if area > 8000f64.powi(2) {
        0.5
    } else {
        1.
    }
}

fn color_number<S: Serializer>(
    color: &Color,
    serializer: S,
) -> core::result::Result<S::Ok, S::Error> {
    serializer.serialize_u32(color.0)
}

/// Polygons go out as `[x0, y0, x1, y1, ...]`.
fn flat_points<S: Serializer>(
    polygon: &Polygon,
    serializer: S,
) -> core::result::Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(polygon.points.len() * 2))?;
    for point in &polygon.points {
        seq.serialize_element(&point.x)?;
        seq.serialize_element(&point.y)?;
    }
    seq.end()
}
