use wasm_bindgen::prelude::*;
use world_explorer_core::{MouseButtons, Point, PointerInput, PointerKind};

use crate::foundry::{call, get, global};

/// Only the main board canvas counts, not UI elements stacked over it.
pub fn is_board(tag_name: &str, id: &str) -> bool {
    tag_name.eq_ignore_ascii_case("canvas") && id == "board"
}

pub fn pointer_kind(event_type: &str) -> Option<PointerKind> {
    match event_type {
        "pointerdown" => Some(PointerKind::Down),
        "pointermove" => Some(PointerKind::Move),
        "pointerup" => Some(PointerKind::Up),
        _ => None,
    }
}

pub fn buttons(mask: f64) -> MouseButtons {
    MouseButtons::from_bits_truncate(mask as u16)
}

fn originates_on_board(event: &JsValue) -> bool {
    let native = get(event, "nativeEvent");
    let Some(target) = native
        .dyn_ref::<web_sys::Event>()
        .and_then(|event| event.target())
        .and_then(|target| target.dyn_into::<web_sys::Element>().ok())
    else {
        return false;
    };
    is_board(&target.tag_name(), &target.id())
}

/// Decodes a canvas stage pointer event into scene coordinates.
pub fn decode(kind: PointerKind, event: &JsValue) -> PointerInput {
    let stage = global("canvas.stage");
    let position = call(event, "getLocalPosition", &[&stage]).unwrap_or(JsValue::UNDEFINED);
    PointerInput {
        kind,
        position: Point::new(
            get(&position, "x").as_f64().unwrap_or_default(),
            get(&position, "y").as_f64().unwrap_or_default(),
        ),
        button: get(event, "button").as_f64().unwrap_or(-1.) as i16,
        buttons: buttons(get(event, "buttons").as_f64().unwrap_or_default()),
        on_board: originates_on_board(event),
    }
}

/// Forwards pointer events of the canvas stage for the lifetime of the page.
pub fn listen(handler: impl Fn(PointerInput) + Clone + 'static) {
    let stage = global("canvas.stage");
    for event_type in ["pointerdown", "pointermove", "pointerup"] {
        let Some(kind) = pointer_kind(event_type) else {
            continue;
        };
        let handler = handler.clone();
        let listener =
            Closure::<dyn Fn(JsValue)>::new(move |event: JsValue| handler(decode(kind, &event)));
        let name = JsValue::from_str(event_type);
        if let Err(err) = call(&stage, "addListener", &[&name, listener.as_ref()]) {
            log::error!("cannot listen to {}: {:?}", event_type, err);
        }
        listener.forget();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn only_the_board_canvas_starts_edits() {
        assert!(is_board("CANVAS", "board"));
        assert!(!is_board("CANVAS", "minimap"));
        assert!(!is_board("DIV", "board"));
    }

    #[wasm_bindgen_test]
    fn button_masks_decode() {
        assert_eq!(buttons(1.), MouseButtons::LEFT);
        assert_eq!(buttons(3.), MouseButtons::LEFT | MouseButtons::RIGHT);
        assert_eq!(buttons(0.), MouseButtons::empty());
        assert_eq!(pointer_kind("pointermove"), Some(PointerKind::Move));
        assert_eq!(pointer_kind("click"), None);
    }
}
