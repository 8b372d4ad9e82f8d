use core::time::Duration;

use crate::Color;

/// Flag namespace the scene stores all exploration data under.
pub const MODULE: &str = "world-explorer";

/// Flag holding the offset keyed reveal map.
pub const GRID_DATA_KEY: &str = "gridData";

/// Flag holding the schema version of the data stored under [`MODULE`].
pub const FLAGS_VERSION_KEY: &str = "flagsVersion";

/// Schema version written by this crate, see [`crate::migration`].
pub const CURRENT_FLAGS_VERSION: u32 = 3;

/// Minimum delay between two coalesced scene writes.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

pub const HIGHLIGHT_REVEAL: Color = Color(0x0022FF);
pub const HIGHLIGHT_HIDE: Color = Color(0xFF0000);
pub const HIGHLIGHT_PARTIAL: Color = Color(0x7F7FFF);
pub const HIGHLIGHT_BORDER: Color = Color(0xFF0000);

/// Alpha used on the partial mask to tint partially revealed parts of an image for the GM.
pub const IMAGE_PARTIAL_MASK_ALPHA: f64 = 0.5;
