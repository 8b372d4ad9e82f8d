//! Rendering through the layer object created by the module's JavaScript side.
//!
//! The JavaScript layer owns the PIXI sprites and render textures. Mask graphics cross over
//! as JSON command lists and are replayed into the persistent render targets there.

use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use world_explorer_core::{
    Background, Color, ExplorerError, LayerAppearance, MaskGraphic, MaskRenderer, MaskTarget,
    Point, Rect,
};

use crate::foundry::{js_error, to_js};

#[wasm_bindgen]
extern "C" {
    /// Display surface of the explorer layer, implemented in JavaScript.
    #[derive(Clone, Debug)]
    pub type ExplorerSurface;

    #[wasm_bindgen(method)]
    fn initialize(this: &ExplorerSurface, x: f64, y: f64, width: f64, height: f64, resolution: f64);

    #[wasm_bindgen(method, js_name = renderMask)]
    fn render_mask(this: &ExplorerSurface, target: &str, graphic: JsValue);

    #[wasm_bindgen(method, js_name = applyAppearance)]
    fn apply_appearance(this: &ExplorerSurface, appearance: JsValue);

    #[wasm_bindgen(method, js_name = loadTexture, catch)]
    fn load_texture(this: &ExplorerSurface, src: &str) -> Result<js_sys::Promise, JsValue>;

    /// `null` removes the texture, `undefined` selects the plain white one.
    #[wasm_bindgen(method, js_name = setTexture)]
    fn set_texture(this: &ExplorerSurface, texture: &JsValue);

    #[wasm_bindgen(method, js_name = setVisible)]
    fn set_visible(this: &ExplorerSurface, visible: bool);

    #[wasm_bindgen(method)]
    fn clear(this: &ExplorerSurface);

    #[wasm_bindgen(method, js_name = clearHighlight)]
    fn clear_highlight(this: &ExplorerSurface);

    #[wasm_bindgen(method)]
    fn highlight(this: &ExplorerSurface, x: f64, y: f64, color: u32, border: u32);
}

pub fn target_name(target: MaskTarget) -> &'static str {
    match target {
        MaskTarget::Hidden => "hidden",
        MaskTarget::Partial => "partial",
    }
}

pub struct SurfaceRenderer {
    surface: ExplorerSurface,
}

impl SurfaceRenderer {
    pub fn new(surface: ExplorerSurface) -> Self {
        Self { surface }
    }

    fn load_image(&self, src: String) {
        let surface = self.surface.clone();
        spawn_local(async move {
            let texture = match surface.load_texture(&src) {
                Ok(promise) => JsFuture::from(promise).await,
                Err(err) => Err(err),
            };
            surface.set_texture(&texture_or_blank(&src, texture));
        });
    }
}

/// Loaded texture, or `null` so a failed image leaves the layer blank instead of stale.
pub fn texture_or_blank(src: &str, texture: Result<JsValue, JsValue>) -> JsValue {
    match texture {
        Ok(texture) => texture,
        Err(err) => {
            log::warn!("{}", ExplorerError::AssetLoad(format!("{src}: {}", js_error(err))));
            JsValue::NULL
        }
    }
}

impl MaskRenderer for SurfaceRenderer {
    fn initialize(&mut self, scene_rect: Rect, resolution: f64) {
        self.surface.initialize(
            scene_rect.x,
            scene_rect.y,
            scene_rect.width,
            scene_rect.height,
            resolution,
        );
    }

    fn render_mask(&mut self, target: MaskTarget, graphic: &MaskGraphic) {
        match to_js(graphic) {
            Ok(graphic) => self.surface.render_mask(target_name(target), graphic),
            Err(err) => log::error!("cannot pass mask to renderer: {}", js_error(err)),
        }
    }

    fn apply_appearance(&mut self, appearance: &LayerAppearance) {
        match to_js(appearance) {
            Ok(appearance) => self.surface.apply_appearance(appearance),
            Err(err) => log::error!("cannot pass appearance to renderer: {}", js_error(err)),
        }
    }

    fn set_background(&mut self, background: Background) {
        match background {
            Background::None => self.surface.set_texture(&JsValue::NULL),
            Background::Solid => self.surface.set_texture(&JsValue::UNDEFINED),
            Background::Image(src) => self.load_image(src),
        }
    }

    fn set_visible(&mut self, visible: bool) {
        self.surface.set_visible(visible);
    }

    fn clear(&mut self) {
        self.surface.clear();
    }

    fn clear_highlight(&mut self) {
        self.surface.clear_highlight();
    }

    fn highlight(&mut self, top_left: Point, color: Color, border: Color) {
        self.surface.highlight(top_left.x, top_left.y, color.0, border.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn failed_image_loads_fall_back_to_blank() {
        let texture = JsValue::from_str("texture");
        assert_eq!(texture_or_blank("maps/cave.webp", Ok(texture.clone())), texture);

        let failed = texture_or_blank("maps/missing.webp", Err(js_sys::Error::new("404").into()));
        assert!(failed.is_null());
    }

    #[wasm_bindgen_test]
    fn mask_targets_have_stable_names() {
        assert_eq!(target_name(MaskTarget::Hidden), "hidden");
        assert_eq!(target_name(MaskTarget::Partial), "partial");
    }
}
