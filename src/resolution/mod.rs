//! Resolution negotiation.
//!
//! Requests come in one of four unit systems ([`Units`]). The resolver
//! converts them into per-level scale factors, picks the level to decode
//! and plans the read so the final image has exactly the requested size.

mod resolver;
mod units;

pub use resolver::{
    find_optimal_level_and_downsample, find_read_bounds_params, find_read_rect_params,
    relative_level_scales, LevelScales, LevelSelection, ReadPlan, ResolutionWarning,
    SCALE_PRECISION,
};
pub use units::{Resolution, Scale, Units};
