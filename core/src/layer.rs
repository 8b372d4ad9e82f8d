use core::mem;
use serde_json::{Map, Value};
use std::rc::Rc;

use crate::config::HIGHLIGHT_BORDER;
use crate::*;

/// Handles to the host the layer runs in.
#[derive(Clone)]
pub struct HostContext {
    pub grid: Rc<dyn GridGeometry>,
    pub scene: Rc<dyn SceneStore>,
    pub scheduler: Rc<dyn Scheduler>,
    pub tokens: Rc<dyn TokenSource>,
    pub viewer: Viewer,
}

/// Exploration overlay of the active scene.
///
/// Owns the cached reveal map and the paint session, and drives the renderer from host
/// lifecycle events. Reveal changes go through the [`SceneUpdater`] and only show up once the
/// scene update comes back through [`ExplorerLayer::update`].
pub struct ExplorerLayer<R> {
    host: HostContext,
    renderer: R,
    settings: ExplorerSettings,
    preview: Map<String, Value>,
    grid_data: GridDataMap,
    updater: SceneUpdater,
    paint: PaintSession,
}

impl<R: MaskRenderer> ExplorerLayer<R> {
    pub fn new(host: HostContext, renderer: R) -> Self {
        let updater = SceneUpdater::new(
            Rc::clone(&host.grid),
            Rc::clone(&host.scene),
            Rc::clone(&host.scheduler),
        );
        Self {
            host,
            renderer,
            settings: ExplorerSettings::default(),
            preview: Map::new(),
            grid_data: GridDataMap::default(),
            updater,
            paint: PaintSession::new(),
        }
    }

    /// Canvas is ready: sets up the render targets and draws everything from scratch.
    pub fn draw(&mut self) -> Result<()> {
        let scene_rect = self
            .host
            .grid
            .scene_rect()
            .ok_or(ExplorerError::MissingSceneRect)?;
        self.paint = PaintSession::new();

        let flags = self.host.scene.flags();
        self.migrate(&flags);
        self.settings = ExplorerSettings::from_flags_with_preview(&flags, &self.preview);
        self.grid_data = GridDataMap::from_flags(&flags);
        log::debug!(
            "drawing explorer layer, enabled: {}, {} grid entries",
            self.settings.enabled,
            self.grid_data.len()
        );

        self.renderer
            .initialize(scene_rect, texture_resolution(scene_rect));
        self.renderer.set_visible(self.settings.enabled);
        self.refresh_appearance();
        self.refresh_image();
        self.refresh_masks();
        Ok(())
    }

    /// Scene flags changed. Migrations take precedence, their write triggers another update.
    pub fn update(&mut self) {
        let flags = self.host.scene.flags();
        if self.migrate(&flags) {
            return;
        }
        self.grid_data = GridDataMap::from_flags(&flags);
        let settings = ExplorerSettings::from_flags_with_preview(&flags, &self.preview);
        self.apply_settings(settings);
    }

    /// Shows unsaved settings on top of the stored ones, an empty map ends the preview.
    pub fn set_preview(&mut self, preview: Map<String, Value>) {
        self.preview = preview;
        let flags = self.host.scene.flags();
        let settings = ExplorerSettings::from_flags_with_preview(&flags, &self.preview);
        self.apply_settings(settings);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
        self.renderer.set_visible(enabled);
        if enabled {
            self.refresh_appearance();
            self.refresh_masks();
        } else {
            self.renderer.clear();
        }
    }

    fn apply_settings(&mut self, settings: ExplorerSettings) {
        let previous = mem::replace(&mut self.settings, settings);
        let enabled = self.settings.enabled;
        let image_changed = previous.image != self.settings.image;
        let became_enabled = !previous.enabled && enabled;

        self.renderer.set_visible(enabled);
        self.refresh_appearance();
        self.refresh_masks();
        if image_changed || !enabled || became_enabled {
            self.refresh_image();
        }
    }

    /// Returns true when a migration was written.
    fn migrate(&self, flags: &Map<String, Value>) -> bool {
        // players cannot write the scene, they render whatever is current
        if !self.host.viewer.is_gm() {
            return false;
        }
        match migration::migrate(flags, self.host.grid.as_ref()) {
            Ok(Some(patch)) => {
                self.updater.write_now(patch);
                true
            }
            Ok(None) => false,
            Err(err) => {
                log::warn!("leaving explorer data as is: {}", err);
                false
            }
        }
    }

    pub fn refresh_appearance(&mut self) {
        let viewer = self.host.viewer;
        let transparent =
            self.settings.hidden_alpha(viewer) == 0. && self.settings.partial_alpha(viewer) == 0.;
        if !self.settings.enabled || transparent {
            return;
        }
        self.renderer
            .apply_appearance(&LayerAppearance::new(&self.settings, viewer));
    }

    pub fn refresh_image(&mut self) {
        let background = match (&self.settings.image, self.settings.enabled) {
            (Some(image), true) => Background::Image(image.clone()),
            (None, true) => Background::Solid,
            (_, false) => Background::None,
        };
        self.renderer.set_background(background);
    }

    /// Recomposes both masks from the current reveal map and tokens.
    pub fn refresh_masks(&mut self) {
        if !self.settings.enabled {
            return;
        }
        let tokens: Vec<_> = self
            .host
            .tokens
            .tokens()
            .into_iter()
            .map(|token| {
                let radius = self.token_radius(&token);
                (token, radius)
            })
            .collect();

        let compositor =
            MaskCompositor::new(self.host.grid.as_ref(), &self.settings, self.host.viewer);
        match compositor.compose(&self.grid_data, &tokens) {
            Ok(frame) => {
                self.renderer.render_mask(MaskTarget::Hidden, &frame.hidden);
                if let Some(partial) = &frame.partial {
                    self.renderer.render_mask(MaskTarget::Partial, partial);
                }
            }
            Err(err) => log::warn!("cannot compose explorer masks: {}", err),
        }
    }

    fn token_radius(&self, token: &TokenView) -> f64 {
        if self.settings.reveal_radius > 0. {
            self.host
                .tokens
                .light_radius(token, self.settings.reveal_radius)
        } else {
            0.
        }
    }

    pub fn token_created(&mut self, token: &TokenView) {
        if token.grants_reveal() {
            self.refresh_masks();
        }
    }

    pub fn token_moved(&mut self, token: &TokenView) {
        if !token.grants_reveal() {
            return;
        }
        self.persist_explored(token);
        self.refresh_masks();
    }

    pub fn token_deleted(&mut self) {
        self.refresh_masks();
    }

    /// Permanently reveals the spaces around a token, GM side only so a single client writes.
    fn persist_explored(&self, token: &TokenView) {
        if !self.settings.enabled
            || !self.settings.persist_explored_areas
            || !self.host.viewer.is_gm()
        {
            return;
        }
        let grid = self.host.grid.as_ref();
        let radius = self.token_radius(token);
        if !(radius > 0.) {
            let offset = grid.offset_at(token.center);
            if self.current_state(offset) != RevealState::Revealed {
                self.updater.reveal(offset);
            }
            return;
        }

        let a = grid.offset_at(token.center.translate(-radius, -radius));
        let b = grid.offset_at(token.center.translate(radius, radius));
        let mut staged = 0;
        for i in a.i.min(b.i)..=a.i.max(b.i) {
            for j in a.j.min(b.j)..=a.j.max(b.j) {
                let offset = GridOffset::new(i, j);
                let center = grid.center_point(offset);
                let inside = (center.x - token.center.x).hypot(center.y - token.center.y) <= radius;
                if inside
                    && self.current_state(offset) != RevealState::Revealed
                    && self.updater.reveal(offset)
                {
                    staged += 1;
                }
            }
        }
        log::trace!("token {} explored {} new spaces", token.id, staged);
    }

    /// Activates a paint tool. Only GMs edit, returns false for everyone else.
    pub fn start_editing(&mut self, tool: Tool) -> bool {
        if !self.host.viewer.is_gm() {
            return false;
        }
        self.paint.start(tool);
        if self.settings.enabled {
            self.renderer.clear_highlight();
        }
        true
    }

    pub fn stop_editing(&mut self) {
        self.paint.stop();
        if self.settings.enabled {
            self.renderer.clear_highlight();
        }
    }

    pub fn editing(&self) -> bool {
        self.settings.enabled && self.paint.is_editing()
    }

    /// Runs a pointer event through the paint session and stages what it asks for.
    pub fn handle_pointer(&mut self, input: PointerInput) {
        let offset = self.host.grid.offset_at(input.position);
        let state = self.current_state(offset);
        let outcome = self
            .paint
            .handle(&input, offset, state, self.settings.enabled);

        let staged = match outcome.intent {
            Some(intent) => self
                .updater
                .stage(intent.position.into(), intent.action.resulting_state()),
            None => true,
        };

        match outcome.highlight {
            Highlight::Keep => {}
            Highlight::Show { offset, color } if staged && self.in_bounds(offset) => {
                let top_left = self.host.grid.top_left_point(offset);
                self.renderer.clear_highlight();
                self.renderer.highlight(top_left, color, HIGHLIGHT_BORDER);
            }
            Highlight::Show { .. } | Highlight::Clear => self.renderer.clear_highlight(),
        }
    }

    /// Whether a space lies in the padded scene, the only spaces that can ever be stored.
    fn in_bounds(&self, offset: GridOffset) -> bool {
        let grid = self.host.grid.as_ref();
        padded_scene_rect(grid).is_ok_and(|bounds| bounds.contains(grid.center_point(offset)))
    }

    /// State of a space including changes that were staged but not written yet.
    fn current_state(&self, offset: GridOffset) -> RevealState {
        self.updater
            .pending(offset)
            .map_or_else(|| self.grid_data.state_at(offset), |update| update.reveal)
    }

    pub fn reveal(&self, position: impl Into<CoordsOrOffset>) -> bool {
        self.settings.enabled && self.updater.reveal(position)
    }

    pub fn partial(&self, position: impl Into<CoordsOrOffset>) -> bool {
        self.settings.enabled && self.updater.partial(position)
    }

    pub fn unreveal(&self, position: impl Into<CoordsOrOffset>) -> bool {
        self.settings.enabled && self.updater.hide(position)
    }

    pub fn clear(&self, options: ClearOptions) {
        self.updater.clear(options);
    }

    pub fn is_revealed(&self, position: impl Into<CoordsOrOffset>) -> bool {
        self.entry_state(position) == RevealState::Revealed
    }

    pub fn is_partial(&self, position: impl Into<CoordsOrOffset>) -> bool {
        self.entry_state(position) == RevealState::Partial
    }

    fn entry_state(&self, position: impl Into<CoordsOrOffset>) -> RevealState {
        self.grid_data
            .get(self.host.grid.as_ref(), position)
            .map_or(RevealState::Hidden, |entry| entry.reveal)
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn settings(&self) -> &ExplorerSettings {
        &self.settings
    }

    pub fn grid_data(&self) -> &GridDataMap {
        &self.grid_data
    }

    pub fn sort_layer(&self) -> u32 {
        self.settings.position.sort_layer()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HIGHLIGHT_HIDE, HIGHLIGHT_REVEAL};
    use crate::testing::*;
    use futures::executor::LocalPool;
    use serde_json::json;

    struct Fixture {
        pool: LocalPool,
        scene: Rc<MemoryScene>,
        tokens: Rc<StaticTokens>,
        layer: ExplorerLayer<RecordingRenderer>,
    }

    impl Fixture {
        fn new(viewer: Viewer, flags: Value) -> Self {
            let pool = LocalPool::new();
            let scene = MemoryScene::with_flags(flags);
            let tokens = Rc::new(StaticTokens::default());
            let host = HostContext {
                grid: Rc::new(SquareGrid::new(Rect::new(0., 0., 200., 200.), 50.)),
                scene: Rc::new(Rc::clone(&scene)),
                scheduler: PoolScheduler::new(&pool),
                tokens: tokens.clone(),
                viewer,
            };
            let mut layer = ExplorerLayer::new(host, RecordingRenderer::default());
            layer.draw().unwrap();
            Self {
                pool,
                scene,
                tokens,
                layer,
            }
        }

        /// Lets pending writes complete and feeds the result back like the host's update hook.
        fn settle(&mut self) {
            self.pool.run_until_stalled();
            self.layer.update();
        }

        fn press(&mut self, x: f64, y: f64) {
            let events = [
                (PointerKind::Down, MouseButtons::LEFT),
                (PointerKind::Up, MouseButtons::empty()),
            ];
            for (kind, buttons) in events {
                self.layer.handle_pointer(PointerInput {
                    kind,
                    position: Point::new(x, y),
                    button: 0,
                    buttons,
                    on_board: true,
                });
            }
        }
    }

    #[test]
    fn paint_then_erase_then_reveal_everything() {
        let mut fx = Fixture::new(Viewer::Gm, json!({ "enabled": true }));

        assert!(fx.layer.start_editing(Tool::Reveal));
        fx.press(10., 10.);
        assert_eq!(
            fx.layer.renderer().last_highlight(),
            Some(&RenderCall::Highlight(Point::new(0., 0.), HIGHLIGHT_REVEAL))
        );
        fx.settle();
        assert_eq!(
            fx.scene.grid_data(),
            json!({ "0_0": { "offset": { "i": 0, "j": 0 }, "reveal": true } })
        );
        assert!(fx.layer.is_revealed(Point::new(10., 10.)));

        fx.layer.start_editing(Tool::Hide);
        fx.press(10., 10.);
        assert_eq!(
            fx.layer.renderer().last_highlight(),
            Some(&RenderCall::Highlight(Point::new(0., 0.), HIGHLIGHT_HIDE))
        );
        fx.settle();
        assert_eq!(fx.scene.grid_data(), json!({}));
        assert!(!fx.layer.is_revealed(Point::new(10., 10.)));

        fx.layer.clear(ClearOptions {
            reveal: true,
            ..Default::default()
        });
        fx.settle();
        assert_eq!(fx.layer.grid_data().revealed().len(), 16);
        for i in 0..4 {
            for j in 0..4 {
                assert!(fx.layer.is_revealed(GridOffset::new(i, j)));
            }
        }
    }

    #[test]
    fn spaces_past_the_margin_are_not_highlighted() {
        let mut fx = Fixture::new(Viewer::Gm, json!({ "enabled": true }));
        fx.layer.start_editing(Tool::Reveal);

        fx.press(260., 10.);
        let highlighted = |fx: &Fixture| {
            fx.layer
                .renderer()
                .calls
                .iter()
                .any(|call| matches!(call, RenderCall::Highlight(..)))
        };
        assert!(!highlighted(&fx));
        assert_eq!(fx.layer.renderer().last_highlight(), Some(&RenderCall::ClearHighlight));
        fx.settle();
        assert_eq!(fx.scene.update_count(), 0);

        // the margin itself is still paintable
        fx.press(-10., 10.);
        assert!(highlighted(&fx));
    }

    #[test]
    fn created_and_deleted_tokens_refresh_the_hidden_mask() {
        let mut fx = Fixture::new(Viewer::Player, json!({ "enabled": true, "revealRadius": 5 }));
        let masks = |fx: &Fixture| {
            fx.layer
                .renderer()
                .calls
                .iter()
                .filter(|call| matches!(call, RenderCall::Mask(MaskTarget::Hidden, _)))
                .count()
        };
        let before = masks(&fx);

        let goblin = token("goblin", Point::new(25., 25.), TokenDisposition::Hostile, false);
        fx.tokens.tokens.borrow_mut().push(goblin.clone());
        fx.layer.token_created(&goblin);
        assert_eq!(masks(&fx), before);

        let scout = token("scout", Point::new(100., 100.), TokenDisposition::Friendly, false);
        fx.tokens.tokens.borrow_mut().push(scout.clone());
        fx.layer.token_created(&scout);
        assert_eq!(masks(&fx), before + 1);
        let hidden = fx.layer.renderer().last_mask(MaskTarget::Hidden).cloned();

        fx.tokens.tokens.borrow_mut().retain(|token| token.id != "scout");
        fx.layer.token_deleted();
        assert_eq!(masks(&fx), before + 2);
        assert_ne!(fx.layer.renderer().last_mask(MaskTarget::Hidden).cloned(), hidden);
    }

    #[test]
    fn draw_sets_up_renderer_from_settings() {
        let fx = Fixture::new(
            Viewer::Player,
            json!({ "enabled": true, "image": "maps/cave.webp" }),
        );
        let calls = &fx.layer.renderer().calls;

        assert_eq!(calls[0], RenderCall::Initialize(Rect::new(0., 0., 200., 200.), 1.));
        let image = Background::Image("maps/cave.webp".into());
        assert!(calls.contains(&RenderCall::Background(image)));
        assert!(fx.layer.renderer().last_mask(MaskTarget::Hidden).is_some());
        // players never see partial tiles on image maps
        assert!(fx.layer.renderer().last_mask(MaskTarget::Partial).is_none());
    }

    #[test]
    fn disabled_layers_stay_blank_and_ignore_edits() {
        let mut fx = Fixture::new(Viewer::Gm, json!({}));
        let calls = &fx.layer.renderer().calls;
        assert!(calls.contains(&RenderCall::Background(Background::None)));
        assert!(fx.layer.renderer().last_mask(MaskTarget::Hidden).is_none());

        fx.layer.start_editing(Tool::Reveal);
        assert!(!fx.layer.editing());
        fx.press(10., 10.);
        assert!(!fx.layer.reveal(Point::new(60., 60.)));
        fx.settle();
        assert_eq!(fx.scene.update_count(), 0);
    }

    #[test]
    fn enabling_through_scene_update_refreshes_everything() {
        let mut fx = Fixture::new(Viewer::Gm, json!({}));
        fx.scene
            .flags
            .borrow_mut()
            .insert("enabled".into(), Value::Bool(true));
        fx.layer.update();

        let renderer = fx.layer.renderer();
        assert_eq!(renderer.calls.last(), Some(&RenderCall::Background(Background::Solid)));
        assert!(renderer.last_mask(MaskTarget::Hidden).is_some());
        assert!(renderer.last_mask(MaskTarget::Partial).is_some());

        fx.layer.set_enabled(false);
        assert_eq!(fx.layer.renderer().calls.last(), Some(&RenderCall::Clear));
    }

    #[test]
    fn players_cannot_edit() {
        let mut fx = Fixture::new(Viewer::Player, json!({ "enabled": true }));
        assert!(!fx.layer.start_editing(Tool::Toggle));
        fx.press(10., 10.);
        fx.settle();
        assert_eq!(fx.scene.update_count(), 0);
    }

    #[test]
    fn toggle_clicks_see_their_own_staged_changes() {
        let mut fx = Fixture::new(Viewer::Gm, json!({ "enabled": true }));
        fx.layer.start_editing(Tool::Toggle);
        fx.scene.hold_writes.set(true);

        fx.press(10., 10.);
        fx.press(60., 10.);
        fx.press(10., 10.);
        fx.scene.release();
        fx.settle();
        fx.scene.release();
        fx.settle();

        assert!(!fx.layer.is_revealed(GridOffset::new(0, 0)));
        assert!(fx.layer.is_revealed(GridOffset::new(0, 1)));
    }

    #[test]
    fn legacy_data_is_migrated_before_use() {
        let mut fx = Fixture::new(
            Viewer::Gm,
            json!({ "enabled": true, "revealedPositions": [[1, 1]] }),
        );
        fx.settle();

        assert_eq!(fx.scene.update_count(), 1);
        assert!(!fx.scene.flags.borrow().contains_key("revealedPositions"));
        assert!(fx.layer.is_revealed(GridOffset::new(1, 1)));

        fx.settle();
        assert_eq!(fx.scene.update_count(), 1);
    }

    #[test]
    fn moving_tokens_persist_explored_spaces() {
        let mut fx = Fixture::new(
            Viewer::Gm,
            json!({ "enabled": true, "persistExploredAreas": true, "revealRadius": 5 }),
        );
        let scout = token("scout", Point::new(100., 100.), TokenDisposition::Friendly, false);
        fx.tokens.tokens.borrow_mut().push(scout.clone());

        fx.layer.token_moved(&scout);
        fx.settle();

        let revealed: Vec<_> = fx
            .layer
            .grid_data()
            .revealed()
            .iter()
            .map(|entry| entry.offset)
            .collect();
        assert_eq!(
            revealed,
            [(1, 1), (1, 2), (2, 1), (2, 2)].map(GridOffset::from)
        );

        // hostile tokens never explore
        let count = fx.scene.update_count();
        let goblin = token("goblin", Point::new(25., 25.), TokenDisposition::Hostile, false);
        fx.layer.token_moved(&goblin);
        fx.settle();
        assert_eq!(fx.scene.update_count(), count);
    }

    #[test]
    fn preview_changes_appearance_without_writing() {
        let mut fx = Fixture::new(Viewer::Gm, json!({ "enabled": true }));
        let mut preview = Map::new();
        preview.insert("position".into(), json!("front"));
        preview.insert("color".into(), json!("#ff0000"));
        fx.layer.set_preview(preview);

        assert_eq!(fx.layer.sort_layer(), 1000);
        assert_eq!(fx.layer.settings().color, Color(0xFF0000));
        assert_eq!(fx.scene.update_count(), 0);

        fx.layer.set_preview(Map::new());
        assert_eq!(fx.layer.settings().color, Color::BLACK);
    }
}
