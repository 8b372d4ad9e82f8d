use core::fmt;
use core::str::FromStr;
use serde::de::DeserializeOwned;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::*;

/// Packed `0xRRGGBB` color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFFFFFF);
    pub const BLACK: Color = Color(0x000000);
}

impl FromStr for Color {
    type Err = ExplorerError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || ExplorerError::InvalidFlags(format!("not a color: {s:?}"));
        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        match hex.len() {
            6 => Ok(Color(value)),
            3 => {
                let (r, g, b) = ((value >> 8) & 0xF, (value >> 4) & 0xF, value & 0xF);
                Ok(Color((r * 0x11) << 16 | (g * 0x11) << 8 | b * 0x11))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where the explorer layer sits relative to the other scene content.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayerPosition {
    Back,
    BehindDrawings,
    BehindTokens,
    Front,
}

impl LayerPosition {
    /// Host sort order, tokens are 700, drawings 600 and tiles 500.
    pub const fn sort_layer(self) -> u32 {
        use LayerPosition::*;
        match self {
            Front => 1000,
            BehindTokens => 650,
            BehindDrawings => 550,
            Back => 0,
        }
    }

    pub const fn elevation(self) -> f64 {
        match self {
            Self::Front => f64::INFINITY,
            _ => 0.,
        }
    }
}

impl Default for LayerPosition {
    fn default() -> Self {
        Self::BehindDrawings
    }
}

/// Who is looking at the scene.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Viewer {
    Gm,
    Player,
}

impl Viewer {
    pub const fn from_is_gm(is_gm: bool) -> Self {
        if is_gm { Self::Gm } else { Self::Player }
    }

    pub const fn is_gm(self) -> bool {
        matches!(self, Self::Gm)
    }
}

/// Per scene configuration, read from the [`config::MODULE`] flag namespace.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerSettings {
    pub color: Color,
    pub partial_color: Option<Color>,
    pub reveal_radius: f64,
    pub grid_reveal_radius: f64,
    #[serde(rename = "opacityGM")]
    pub opacity_gm: f64,
    pub opacity_player: f64,
    pub partial_opacity_player: f64,
    pub persist_explored_areas: bool,
    pub position: LayerPosition,
    pub image: Option<String>,
    pub enabled: bool,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            partial_color: None,
            reveal_radius: 0.,
            grid_reveal_radius: 0.,
            opacity_gm: 0.7,
            opacity_player: 1.,
            partial_opacity_player: 0.3,
            persist_explored_areas: false,
            position: LayerPosition::default(),
            image: None,
            enabled: false,
        }
    }
}

impl ExplorerSettings {
    /// Reads settings out of a raw flag bag, every key falls back to its default when it is
    /// missing or malformed.
    pub fn from_flags(flags: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            color: color(flags, "color").unwrap_or(defaults.color),
            partial_color: color(flags, "partialColor"),
            reveal_radius: number(flags, "revealRadius")
                .unwrap_or(defaults.reveal_radius)
                .max(0.),
            grid_reveal_radius: number(flags, "gridRevealRadius")
                .unwrap_or(defaults.grid_reveal_radius)
                .max(0.),
            opacity_gm: opacity(flags, "opacityGM").unwrap_or(defaults.opacity_gm),
            opacity_player: opacity(flags, "opacityPlayer").unwrap_or(defaults.opacity_player),
            partial_opacity_player: opacity(flags, "partialOpacityPlayer")
                .unwrap_or(defaults.partial_opacity_player),
            persist_explored_areas: field(flags, "persistExploredAreas")
                .unwrap_or(defaults.persist_explored_areas),
            position: field(flags, "position").unwrap_or(defaults.position),
            image: field::<String>(flags, "image").filter(|image| !image.trim().is_empty()),
            enabled: field(flags, "enabled").unwrap_or(defaults.enabled),
        }
    }

    /// Reads settings with a set of previewed (not yet saved) values layered on top.
    pub fn from_flags_with_preview(
        flags: &Map<String, Value>,
        preview: &Map<String, Value>,
    ) -> Self {
        if preview.is_empty() {
            return Self::from_flags(flags);
        }
        let mut merged = flags.clone();
        merged.extend(preview.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::from_flags(&merged)
    }

    /// Partial tile opacity for GMs, derived from the other three opacities.
    pub fn partial_opacity_gm(&self) -> f64 {
        gm_partial_opacity(self.opacity_player, self.opacity_gm, self.partial_opacity_player)
    }

    /// Opacity of fully hidden spaces.
    pub fn hidden_alpha(&self, viewer: Viewer) -> f64 {
        match viewer {
            Viewer::Gm => self.opacity_gm,
            Viewer::Player => self.opacity_player,
        }
    }

    /// Opacity of partially revealed spaces.
    pub fn partial_alpha(&self, viewer: Viewer) -> f64 {
        match viewer {
            Viewer::Gm => self.partial_opacity_gm(),
            Viewer::Player => self.partial_opacity_player,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Partial tiles get their own layer unless an image is shown, and the GM still sees them
    /// on images when a partial color was picked.
    pub fn show_partial_tiles(&self, viewer: Viewer) -> bool {
        !self.has_image() || (self.partial_color.is_some() && viewer.is_gm())
    }
}

/// Scales the player's partial-to-full ratio onto the GM opacity, then averages it with the
/// partial opacity, weighing closer to it the lower the alpha. Never exceeds `opacity_gm`.
pub fn gm_partial_opacity(opacity_player: f64, opacity_gm: f64, opacity_partial: f64) -> f64 {
    if opacity_player == 0. {
        return opacity_partial;
    }
    let partial_ratio = opacity_partial / opacity_player;
    let new_alpha = partial_ratio * opacity_gm;
    opacity_gm.min(opacity_partial * (1. - partial_ratio) + new_alpha * partial_ratio)
}

fn field<T: DeserializeOwned>(flags: &Map<String, Value>, key: &str) -> Option<T> {
    let value = flags.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            log::debug!("ignoring malformed flag {}: {}", key, err);
            None
        }
    }
}

/// Accepts numbers and numeric strings, form inputs tend to store the latter.
fn number(flags: &Map<String, Value>, key: &str) -> Option<f64> {
    match flags.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn opacity(flags: &Map<String, Value>, key: &str) -> Option<f64> {
    number(flags, key).map(|n| n.clamp(0., 1.))
}

fn color(flags: &Map<String, Value>, key: &str) -> Option<Color> {
    let raw = flags.get(key)?.as_str()?;
    if raw.trim().is_empty() {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flags(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_flags_use_defaults() {
        let settings = ExplorerSettings::from_flags(&Map::new());
        assert_eq!(settings, ExplorerSettings::default());
        assert_eq!(settings.position.sort_layer(), 550);
    }

    #[test]
    fn flags_are_validated_at_the_boundary() {
        let settings = ExplorerSettings::from_flags(&flags(json!({
            "color": "#336699",
            "partialColor": "",
            "revealRadius": "15",
            "gridRevealRadius": -5,
            "opacityGM": 3,
            "opacityPlayer": "nope",
            "position": "front",
            "image": "  ",
            "enabled": true,
        })));

        assert_eq!(settings.color, Color(0x336699));
        assert_eq!(settings.partial_color, None);
        assert_eq!(settings.reveal_radius, 15.);
        assert_eq!(settings.grid_reveal_radius, 0.);
        assert_eq!(settings.opacity_gm, 1.);
        assert_eq!(settings.opacity_player, 1.);
        assert_eq!(settings.position, LayerPosition::Front);
        assert_eq!(settings.position.elevation(), f64::INFINITY);
        assert_eq!(settings.image, None);
        assert!(settings.enabled);
    }

    #[test]
    fn preview_overrides_persisted_flags() {
        let persisted = flags(json!({ "color": "#000000", "opacityGM": 0.5 }));
        let preview = flags(json!({ "color": "#fff" }));
        let settings = ExplorerSettings::from_flags_with_preview(&persisted, &preview);
        assert_eq!(settings.color, Color::WHITE);
        assert_eq!(settings.opacity_gm, 0.5);
    }

    #[test]
    fn gm_partial_opacity_never_exceeds_gm_opacity() {
        let steps = [0., 0.1, 0.25, 0.3, 0.5, 0.75, 0.9, 1.];
        for &player in &steps[1..] {
            for &gm in &steps {
                for &partial in &steps {
                    let derived = gm_partial_opacity(player, gm, partial);
                    assert!(derived <= gm + f64::EPSILON, "{player} {gm} {partial} -> {derived}");
                }
            }
        }
    }

    #[test]
    fn gm_partial_opacity_handles_transparent_player_overlay() {
        assert_eq!(gm_partial_opacity(0., 0.7, 0.3), 0.3);
    }

    #[test]
    fn partial_tiles_hidden_from_players_on_image_maps() {
        let mut settings = ExplorerSettings {
            image: Some("maps/fog.webp".into()),
            ..Default::default()
        };
        assert!(!settings.show_partial_tiles(Viewer::Player));
        assert!(!settings.show_partial_tiles(Viewer::Gm));

        settings.partial_color = Some(Color(0x00FF00));
        assert!(settings.show_partial_tiles(Viewer::Gm));
        assert!(!settings.show_partial_tiles(Viewer::Player));
    }
}
