//! Danmaku - period-windowed scheduling and lane layout for scrolling comments
//!
//! The playback clock is cut into fixed-length periods. The scheduler loads
//! the current and upcoming periods through an injected loader, reveals a
//! period's items once it becomes current, lays them out on lanes and moves
//! the period surface across the viewport in step with elapsed time.

pub mod engine;
pub mod settings;

pub use engine::{
    DanmakuPlayer, Geometry, LoadError, Loader, Period, PlayerEvent, PositionedItem, RawItem,
    RenderedPeriod,
};
pub use settings::{ConfigError, DanmakuConfig, RetryPolicy, SeekCachePolicy, Settings};
