//! Exploration masks for virtual tabletop scenes.
//!
//! Tracks which grid spaces of a scene are hidden, partially revealed or revealed, composes
//! the overlay masks from that state and lets a GM paint it, persisting changes through
//! throttled, coalesced scene writes. The host tabletop is only reached through traits such
//! as [`GridGeometry`], [`SceneStore`] and [`MaskRenderer`].

pub use compositor::*;
pub use error::*;
pub use grid_data::*;
pub use host::*;
pub use layer::*;
pub use paint::*;
pub use patch::*;
pub use settings::*;
pub use types::*;
pub use updater::*;

pub mod config;
pub mod migration;

mod compositor;
mod error;
mod grid_data;
mod host;
mod layer;
mod paint;
mod patch;
mod settings;
mod types;
mod updater;

#[cfg(test)]
pub(crate) mod testing;
