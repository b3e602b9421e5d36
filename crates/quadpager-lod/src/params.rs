//! Sampling parameters shared by the walker and the loading scheduler.

use quadpager_tile::TileId;

/// Invalid sampling parameter. Setters that fail leave the previous value in place.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    /// A count that must be positive was zero.
    #[error("{name} must be greater than zero")]
    Zero {
        /// Parameter name.
        name: &'static str,
    },

    /// Importance scale was zero, negative, NaN or infinite.
    #[error("importance scale must be finite and positive, got {0}")]
    ImportanceScale(f64),

    /// Minimum importance was negative or not finite.
    #[error("min importance must be finite and non-negative, got {0}")]
    MinImportance(f64),

    /// `min_zoom > max_zoom` or `max_zoom` beyond the deepest pyramid level.
    #[error("zoom range {min}..={max} is invalid")]
    ZoomRange {
        /// Requested minimum zoom.
        min: u32,
        /// Requested maximum zoom.
        max: u32,
    },

    /// A multi-level load offset pointed below the target level.
    #[error("multi-level offset {0} must be zero or negative")]
    MultiLevelOffset(i32),

    /// Target zoom override outside the zoom range.
    #[error("target zoom {zoom} outside {min}..={max}")]
    TargetZoom {
        /// Requested level.
        zoom: u32,
        /// Current minimum zoom.
        min: u32,
        /// Current maximum zoom.
        max: u32,
    },

    /// Frame priority list length did not match the image depth.
    #[error("expected {expected} frame priorities, got {got}")]
    FramePriorities {
        /// Current image depth.
        expected: usize,
        /// Length supplied.
        got: usize,
    },

    /// A fraction was outside `[0, 1]`.
    #[error("{name} must be within [0, 1], got {value}")]
    Fraction {
        /// Parameter name.
        name: &'static str,
        /// Value supplied.
        value: f64,
    },

    /// Displayed frame index beyond the image depth.
    #[error("frame {frame} out of range for image depth {depth}")]
    FrameIndex {
        /// Requested frame.
        frame: usize,
        /// Current image depth.
        depth: usize,
    },
}

/// Parameters controlling which tiles are targeted and how they are loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingParams {
    /// Shallowest level that carries data. Coarser levels are only walked through.
    pub min_zoom: u32,
    /// Deepest level the walker will target.
    pub max_zoom: u32,
    /// Frames per tile (image stack depth for time series).
    pub num_frames: usize,
    /// Restrict the target set to one uniform level.
    pub single_level: bool,
    /// Multiplier applied to every importance value.
    pub importance_scale: f64,
    /// Resident tile budget.
    pub max_tiles: usize,
    /// Maximum in-flight fetches.
    pub simultaneous_fetches: usize,
    /// Tiles scoring below this are rejected along with their subtree.
    pub min_importance: f64,
    /// Edge length of a tile image in pixels.
    pub tile_size: u32,
    /// Fraction of frames loaded after which an in-flight tile is protected from eviction.
    pub near_completion: f64,
    /// Extra coarser levels loaded in single-level mode, as offsets (<= 0) from the target level.
    pub multi_level_loads: Vec<i32>,
    /// Force the single-level target to this level.
    pub target_zoom_override: Option<u32>,
    /// When false no new frame loads are issued.
    pub allow_frame_loading: bool,
    /// Per-frame load priority. Higher loads first; negative frames are not loaded.
    pub frame_priorities: Option<Vec<i32>>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 18,
            num_frames: 1,
            single_level: false,
            importance_scale: 1.0,
            max_tiles: 128,
            simultaneous_fetches: 8,
            min_importance: 1e-3,
            tile_size: 256,
            near_completion: 0.75,
            multi_level_loads: Vec::new(),
            target_zoom_override: None,
            allow_frame_loading: true,
            frame_priorities: None,
        }
    }
}

impl SamplingParams {
    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.max_tiles == 0 {
            return Err(ParamError::Zero { name: "max_tiles" });
        }
        if self.simultaneous_fetches == 0 {
            return Err(ParamError::Zero {
                name: "simultaneous_fetches",
            });
        }
        if self.num_frames == 0 {
            return Err(ParamError::Zero { name: "num_frames" });
        }
        if self.tile_size == 0 {
            return Err(ParamError::Zero { name: "tile_size" });
        }
        if !self.importance_scale.is_finite() || self.importance_scale <= 0.0 {
            return Err(ParamError::ImportanceScale(self.importance_scale));
        }
        if !self.min_importance.is_finite() || self.min_importance < 0.0 {
            return Err(ParamError::MinImportance(self.min_importance));
        }
        if self.min_zoom > self.max_zoom || self.max_zoom > TileId::MAX_LEVEL {
            return Err(ParamError::ZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if !(0.0..=1.0).contains(&self.near_completion) {
            return Err(ParamError::Fraction {
                name: "near_completion",
                value: self.near_completion,
            });
        }
        if let Some(&offset) = self.multi_level_loads.iter().find(|&&o| o > 0) {
            return Err(ParamError::MultiLevelOffset(offset));
        }
        if let Some(zoom) = self.target_zoom_override
            && !(self.min_zoom..=self.max_zoom).contains(&zoom)
        {
            return Err(ParamError::TargetZoom {
                zoom,
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if let Some(priorities) = &self.frame_priorities
            && priorities.len() != self.num_frames
        {
            return Err(ParamError::FramePriorities {
                expected: self.num_frames,
                got: priorities.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(SamplingParams::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let params = SamplingParams {
            max_tiles: 0,
            ..Default::default()
        };
        assert_eq!(
            params.validate(),
            Err(ParamError::Zero { name: "max_tiles" })
        );
    }

    #[test]
    fn test_bad_importance_scale_rejected() {
        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let params = SamplingParams {
                importance_scale: scale,
                ..Default::default()
            };
            assert!(matches!(
                params.validate(),
                Err(ParamError::ImportanceScale(_))
            ));
        }
    }

    #[test]
    fn test_inverted_zoom_range_rejected() {
        let params = SamplingParams {
            min_zoom: 5,
            max_zoom: 3,
            ..Default::default()
        };
        assert_eq!(
            params.validate(),
            Err(ParamError::ZoomRange { min: 5, max: 3 })
        );
    }

    #[test]
    fn test_positive_multi_level_offset_rejected() {
        let params = SamplingParams {
            multi_level_loads: vec![-2, 1],
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ParamError::MultiLevelOffset(1)));
    }

    #[test]
    fn test_target_zoom_must_be_in_range() {
        let params = SamplingParams {
            min_zoom: 2,
            max_zoom: 8,
            target_zoom_override: Some(9),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamError::TargetZoom { zoom: 9, .. })
        ));
    }

    #[test]
    fn test_frame_priorities_must_match_depth() {
        let params = SamplingParams {
            num_frames: 3,
            frame_priorities: Some(vec![1, 2]),
            ..Default::default()
        };
        assert_eq!(
            params.validate(),
            Err(ParamError::FramePriorities {
                expected: 3,
                got: 2
            })
        );
    }

    #[test]
    fn test_error_messages_name_the_parameter() {
        let err = ParamError::Zero {
            name: "simultaneous_fetches",
        };
        assert_eq!(err.to_string(), "simultaneous_fetches must be greater than zero");
    }
}
