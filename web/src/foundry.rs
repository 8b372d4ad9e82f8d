//! Host traits implemented on top of the tabletop's JavaScript objects.

use core::time::Duration;
use futures_util::future::LocalBoxFuture;
use gloo::timers::callback::Timeout;
use js_sys::{Array, Function, JSON, Reflect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use world_explorer_core::config::MODULE;
use world_explorer_core::{
    ExplorerError, GridGeometry, GridOffset, Point, Polygon, Rect, Result, ScenePatch, SceneStore,
    Scheduler, TokenDisposition, TokenSource, TokenView,
};

pub(crate) fn get(target: &JsValue, key: &str) -> JsValue {
    Reflect::get(target, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

/// Follows a dotted path starting from the global object.
pub(crate) fn global(path: &str) -> JsValue {
    path.split('.')
        .fold(js_sys::global().into(), |target: JsValue, key| {
            if target.is_undefined() || target.is_null() {
                target
            } else {
                get(&target, key)
            }
        })
}

pub(crate) fn call(
    target: &JsValue,
    method: &str,
    args: &[&JsValue],
) -> core::result::Result<JsValue, JsValue> {
    let function: Function = get(target, method).dyn_into()?;
    let args: Array = args.iter().copied().collect();
    function.apply(target, &args)
}

pub(crate) fn to_js<T: Serialize>(value: &T) -> core::result::Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(|err| JsValue::from_str(&err.to_string()))?;
    JSON::parse(&json)
}

pub(crate) fn from_js<T: DeserializeOwned>(value: &JsValue) -> core::result::Result<T, JsValue> {
    let json: String = JSON::stringify(value)?.into();
    serde_json::from_str(&json).map_err(|err| JsValue::from_str(&err.to_string()))
}

fn number(target: &JsValue, key: &str) -> f64 {
    get(target, key).as_f64().unwrap_or_default()
}

fn js_point(point: Point) -> JsValue {
    let object = js_sys::Object::new();
    let _ = Reflect::set(&object, &"x".into(), &point.x.into());
    let _ = Reflect::set(&object, &"y".into(), &point.y.into());
    object.into()
}

fn js_offset(offset: GridOffset) -> JsValue {
    let object = js_sys::Object::new();
    let _ = Reflect::set(&object, &"i".into(), &offset.i.into());
    let _ = Reflect::set(&object, &"j".into(), &offset.j.into());
    object.into()
}

fn rust_point(value: &JsValue) -> Point {
    Point::new(number(value, "x"), number(value, "y"))
}

pub(crate) fn js_error(err: JsValue) -> String {
    err.as_string()
        .or_else(|| get(&err, "message").as_string())
        .unwrap_or_else(|| format!("{:?}", err))
}

/// `canvas.grid` of the active scene, with the dimensions captured when the canvas was drawn.
pub struct FoundryGrid {
    grid: JsValue,
    scene_rect: Option<Rect>,
}

impl FoundryGrid {
    pub fn current() -> Self {
        let rect = global("canvas.dimensions.sceneRect");
        let scene_rect = (!rect.is_undefined() && !rect.is_null()).then(|| {
            Rect::new(
                number(&rect, "x"),
                number(&rect, "y"),
                number(&rect, "width"),
                number(&rect, "height"),
            )
        });
        Self {
            grid: global("canvas.grid"),
            scene_rect,
        }
    }

    fn call_grid(&self, method: &str, arg: &JsValue) -> JsValue {
        call(&self.grid, method, &[arg]).unwrap_or_else(|err| {
            log::error!("canvas.grid.{} failed: {}", method, js_error(err));
            JsValue::UNDEFINED
        })
    }
}

impl GridGeometry for FoundryGrid {
    fn offset_at(&self, point: Point) -> GridOffset {
        let offset = self.call_grid("getOffset", &js_point(point));
        GridOffset::new(number(&offset, "i") as i32, number(&offset, "j") as i32)
    }

    fn center_point(&self, offset: GridOffset) -> Point {
        rust_point(&self.call_grid("getCenterPoint", &js_offset(offset)))
    }

    fn top_left_point(&self, offset: GridOffset) -> Point {
        rust_point(&self.call_grid("getTopLeftPoint", &js_offset(offset)))
    }

    fn vertices(&self, offset: GridOffset) -> Polygon {
        let vertices = self.call_grid("getVertices", &js_offset(offset));
        let vertices: Array = vertices.dyn_into().unwrap_or_else(|_| Array::new());
        Polygon::new(vertices.iter().map(|vertex| rust_point(&vertex)))
    }

    fn is_hexagonal(&self) -> bool {
        get(&self.grid, "isHexagonal").is_truthy()
    }

    fn cell_size(&self) -> f64 {
        number(&self.grid, "size")
    }

    fn cell_width(&self) -> f64 {
        match get(&self.grid, "sizeX").as_f64() {
            Some(width) if width > 0. => width,
            _ => self.cell_size(),
        }
    }

    fn distance(&self) -> f64 {
        number(&self.grid, "distance")
    }

    fn scene_rect(&self) -> Option<Rect> {
        self.scene_rect
    }
}

/// Scene document, flags are read fresh on every call.
pub struct FoundryScene {
    scene: JsValue,
}

impl FoundryScene {
    pub fn current() -> Self {
        Self {
            scene: global("canvas.scene"),
        }
    }
}

impl SceneStore for FoundryScene {
    fn flags(&self) -> Map<String, Value> {
        let flags = get(&get(&self.scene, "flags"), MODULE);
        if flags.is_undefined() || flags.is_null() {
            return Map::new();
        }
        from_js(&flags).unwrap_or_else(|err| {
            log::warn!("unreadable scene flags: {}", js_error(err));
            Map::new()
        })
    }

    fn update(&self, patch: ScenePatch) -> LocalBoxFuture<'static, Result<()>> {
        let scene = self.scene.clone();
        Box::pin(async move {
            let rejected = |err: JsValue| ExplorerError::Persistence(js_error(err));
            let data = to_js(&patch.to_update_data()).map_err(rejected)?;
            let promise = call(&scene, "update", &[&data]).map_err(rejected)?;
            JsFuture::from(js_sys::Promise::resolve(&promise))
                .await
                .map_err(rejected)?;
            Ok(())
        })
    }
}

/// Runs tasks on the browser event loop.
pub struct WebScheduler;

impl Scheduler for WebScheduler {
    fn schedule(&self, delay: Duration, task: LocalBoxFuture<'static, ()>) {
        if delay.is_zero() {
            spawn_local(task);
            return;
        }
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        Timeout::new(millis, move || spawn_local(task)).forget();
    }
}

pub fn disposition(value: f64) -> TokenDisposition {
    match value as i32 {
        -2 => TokenDisposition::Secret,
        -1 => TokenDisposition::Hostile,
        1 => TokenDisposition::Friendly,
        _ => TokenDisposition::Neutral,
    }
}

/// Reads a token placeable into the engine's view of it.
pub fn token_view(placeable: &JsValue) -> Option<TokenView> {
    let document = get(placeable, "document");
    let id = get(&document, "id").as_string()?;
    let has_player_owner = get(&get(&document, "actor"), "hasPlayerOwner").is_truthy()
        || get(placeable, "hasPlayerOwner").is_truthy();
    Some(TokenView {
        id,
        center: rust_point(&get(placeable, "center")),
        disposition: disposition(number(&document, "disposition")),
        has_player_owner,
    })
}

/// Token placeables of the active canvas.
pub struct FoundryTokens;

impl TokenSource for FoundryTokens {
    fn tokens(&self) -> Vec<TokenView> {
        let placeables: Array = global("canvas.tokens.placeables")
            .dyn_into()
            .unwrap_or_else(|_| Array::new());
        placeables.iter().filter_map(|p| token_view(&p)).collect()
    }

    fn light_radius(&self, token: &TokenView, units: f64) -> f64 {
        let placeable = call(&global("canvas.tokens"), "get", &[&JsValue::from_str(&token.id)])
            .unwrap_or(JsValue::UNDEFINED);
        let radius = call(&placeable, "getLightRadius", &[&JsValue::from_f64(units)]).ok();
        match radius.and_then(|radius| radius.as_f64()) {
            Some(radius) => radius,
            None => {
                let grid = global("canvas.grid");
                let distance = number(&grid, "distance");
                if distance > 0. {
                    units / distance * number(&grid, "size")
                } else {
                    0.
                }
            }
        }
    }
}
