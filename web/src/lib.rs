use clap::Parser;
use core::cell::{Cell, RefCell};
use serde_json::{Map, Value};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use world_explorer_core::{ClearOptions, ExplorerLayer, HostContext, Point, Tool, Viewer};

use crate::foundry::{
    FoundryGrid, FoundryScene, FoundryTokens, WebScheduler, from_js, get, global, to_js,
    token_view,
};
use crate::surface::{ExplorerSurface, SurfaceRenderer};

mod foundry;
mod input;
mod surface;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// What log level to use
    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>,
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = Hooks, js_name = on)]
    fn hooks_on(hook: &str, callback: &Closure<dyn Fn(JsValue, JsValue)>);
}

thread_local! {
    static LAYER: RefCell<Option<ExplorerLayer<SurfaceRenderer>>> = const { RefCell::new(None) };
    static SCENE_ID: RefCell<JsValue> = RefCell::new(JsValue::UNDEFINED);
    static LISTENING: Cell<bool> = const { Cell::new(false) };
}

/// Runs `f` on the layer of the active scene, if the canvas has been drawn.
fn with_layer<T>(f: impl FnOnce(&mut ExplorerLayer<SurfaceRenderer>) -> T) -> Option<T> {
    LAYER.with(|layer| match layer.try_borrow_mut() {
        Ok(mut layer) => layer.as_mut().map(f),
        Err(_) => {
            log::warn!("explorer layer is busy, dropping call");
            None
        }
    })
}

fn on_hook(hook: &str, callback: impl Fn(JsValue, JsValue) + 'static) {
    let callback = Closure::<dyn Fn(JsValue, JsValue)>::new(callback);
    hooks_on(hook, &callback);
    callback.forget();
}

#[wasm_bindgen(start)]
pub fn run_app() {
    use gloo::utils::window;

    #[cfg(feature = "console_error_panic_hook")]
    {
        console_error_panic_hook::set_once();
    }

    let location_hash = window()
        .location()
        .hash()
        .unwrap_or_else(|_| "".to_string());

    let args = Args::try_parse_from(location_hash.split(['#', '&'])).expect("Could not parse args");
    if let Some(log_level) = args.verbose.log_level() {
        console_log::init_with_level(log_level).expect("Error initializing logger");
    }

    on_hook("updateScene", |scene, data| {
        let is_active = SCENE_ID.with(|id| *id.borrow() == get(&scene, "id"));
        let flags = get(&data, "flags");
        let touches_flags = !get(&flags, world_explorer_core::config::MODULE).is_undefined();
        if is_active && touches_flags {
            with_layer(|layer| layer.update());
        }
    });
    on_hook("createToken", |document, _| {
        if let Some(token) = token_view(&get(&document, "object")) {
            with_layer(|layer| layer.token_created(&token));
        }
    });
    on_hook("updateToken", |document, changes| {
        let moved = !get(&changes, "x").is_undefined() || !get(&changes, "y").is_undefined();
        if !moved {
            return;
        }
        if let Some(token) = token_view(&get(&document, "object")) {
            with_layer(|layer| layer.token_moved(&token));
        }
    });
    on_hook("deleteToken", |_, _| {
        with_layer(|layer| layer.token_deleted());
    });

    log::debug!("world explorer started");
}

/// Called by the layer's JavaScript side once its sprites exist for the new canvas.
#[wasm_bindgen(js_name = canvasReady)]
pub fn canvas_ready(surface: ExplorerSurface) {
    let scene = FoundryScene::current();
    SCENE_ID.with(|id| *id.borrow_mut() = get(&global("canvas.scene"), "id"));

    let host = HostContext {
        grid: Rc::new(FoundryGrid::current()),
        scene: Rc::new(scene),
        scheduler: Rc::new(WebScheduler),
        tokens: Rc::new(FoundryTokens),
        viewer: Viewer::from_is_gm(global("game.user.isGM").is_truthy()),
    };
    let mut layer = ExplorerLayer::new(host, SurfaceRenderer::new(surface));
    if let Err(err) = layer.draw() {
        log::error!("cannot draw explorer layer: {}", err);
        return;
    }

    LAYER.with(|slot| slot.replace(Some(layer)));
    // the stage outlives scene changes, listen once
    if !LISTENING.with(|listening| listening.replace(true)) {
        input::listen(|input| {
            with_layer(|layer| layer.handle_pointer(input));
        });
    }
}

#[wasm_bindgen(js_name = canvasTearDown)]
pub fn canvas_tear_down() {
    LAYER.with(|slot| slot.replace(None));
}

#[wasm_bindgen(js_name = startEditing)]
pub fn start_editing(tool: &str) -> bool {
    let Ok(tool) = serde_json::from_value::<Tool>(Value::String(tool.into())) else {
        log::warn!("unknown explorer tool {}", tool);
        return false;
    };
    with_layer(|layer| layer.start_editing(tool)).unwrap_or(false)
}

#[wasm_bindgen(js_name = stopEditing)]
pub fn stop_editing() {
    with_layer(|layer| layer.stop_editing());
}

#[wasm_bindgen]
pub fn editing() -> bool {
    with_layer(|layer| layer.editing()).unwrap_or(false)
}

#[wasm_bindgen]
pub fn reveal(x: f64, y: f64) -> bool {
    with_layer(|layer| layer.reveal(Point::new(x, y))).unwrap_or(false)
}

#[wasm_bindgen]
pub fn partial(x: f64, y: f64) -> bool {
    with_layer(|layer| layer.partial(Point::new(x, y))).unwrap_or(false)
}

#[wasm_bindgen]
pub fn unreveal(x: f64, y: f64) -> bool {
    with_layer(|layer| layer.unreveal(Point::new(x, y))).unwrap_or(false)
}

/// Clears the scene, `{ reveal: true }` or `{ partial: true }` fill it instead.
#[wasm_bindgen]
pub fn clear(options: JsValue) {
    let options = ClearOptions {
        reveal: get(&options, "reveal").is_truthy(),
        partial: get(&options, "partial").is_truthy(),
    };
    with_layer(|layer| layer.clear(options));
}

#[wasm_bindgen(js_name = isRevealed)]
pub fn is_revealed(x: f64, y: f64) -> bool {
    with_layer(|layer| layer.is_revealed(Point::new(x, y))).unwrap_or(false)
}

#[wasm_bindgen(js_name = isPartial)]
pub fn is_partial(x: f64, y: f64) -> bool {
    with_layer(|layer| layer.is_partial(Point::new(x, y))).unwrap_or(false)
}

#[wasm_bindgen(js_name = setEnabled)]
pub fn set_enabled(enabled: bool) {
    with_layer(|layer| layer.set_enabled(enabled));
}

/// Previews unsaved settings from the configuration form, `null` ends the preview.
#[wasm_bindgen(js_name = setPreview)]
pub fn set_preview(preview: JsValue) {
    let preview = if preview.is_null() || preview.is_undefined() {
        Map::new()
    } else {
        from_js(&preview).unwrap_or_else(|err| {
            log::warn!("ignoring settings preview: {:?}", err);
            Map::new()
        })
    };
    with_layer(|layer| layer.set_preview(preview));
}

/// Effective settings of the active scene, with the derived GM partial opacity.
#[wasm_bindgen]
pub fn settings() -> JsValue {
    with_layer(|layer| {
        let settings = layer.settings();
        let mut value = serde_json::to_value(settings).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("partialOpacityGM".into(), settings.partial_opacity_gm().into());
            map.insert("sortLayer".into(), layer.sort_layer().into());
        }
        to_js(&value).unwrap_or(JsValue::NULL)
    })
    .unwrap_or(JsValue::NULL)
}
