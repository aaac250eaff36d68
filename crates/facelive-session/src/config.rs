use facelive_core::liveliness::{
    LivelinessConfig, DEFAULT_BLINK_THRESHOLD, DEFAULT_BOX_MARGIN, DEFAULT_SMILE_RATIO,
};

use crate::engine::MeshOptions;

/// Session configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of faces the detector reports per frame.
    pub max_faces: usize,
    /// Eye aspect ratio below which the eyes count as closed.
    pub blink_threshold: f64,
    /// Lips/jaw width ratio above which the face counts as smiling.
    pub smile_ratio: f64,
    /// Fractional padding added to each side of the face box.
    pub box_margin: f64,
    /// Capacity of each track's decoded-frame queue.
    pub frame_queue: usize,
    /// Capacity of the outbound verdict buffer.
    pub sink_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_faces: 2,
            blink_threshold: DEFAULT_BLINK_THRESHOLD,
            smile_ratio: DEFAULT_SMILE_RATIO,
            box_margin: DEFAULT_BOX_MARGIN,
            frame_queue: 4,
            sink_buffer: 16,
        }
    }
}

impl Config {
    /// Load configuration from `FACELIVE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_faces: env_usize("FACELIVE_MAX_FACES", defaults.max_faces),
            blink_threshold: env_f64("FACELIVE_BLINK_THRESHOLD", defaults.blink_threshold),
            smile_ratio: env_f64("FACELIVE_SMILE_RATIO", defaults.smile_ratio),
            box_margin: env_f64("FACELIVE_BOX_MARGIN", defaults.box_margin),
            frame_queue: env_usize("FACELIVE_FRAME_QUEUE", defaults.frame_queue).max(1),
            sink_buffer: env_usize("FACELIVE_SINK_BUFFER", defaults.sink_buffer).max(1),
        }
    }

    pub fn mesh_options(&self) -> MeshOptions {
        MeshOptions {
            max_num_faces: self.max_faces,
        }
    }

    pub fn liveliness(&self) -> LivelinessConfig {
        LivelinessConfig {
            blink_threshold: self.blink_threshold,
            smile_ratio: self.smile_ratio,
            box_margin: self.box_margin,
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_calibrated_constants() {
        let config = Config::default();
        assert_eq!(config.liveliness(), LivelinessConfig::default());
        assert_eq!(config.mesh_options().max_num_faces, 2);
    }

    #[test]
    fn test_env_parsing_falls_back_on_missing_or_invalid() {
        assert_eq!(env_f64("FACELIVE_TEST_UNSET_F64", 0.19), 0.19);

        std::env::set_var("FACELIVE_TEST_INVALID_USIZE", "many");
        assert_eq!(env_usize("FACELIVE_TEST_INVALID_USIZE", 7), 7);

        std::env::set_var("FACELIVE_TEST_VALID_F64", "0.3");
        assert_eq!(env_f64("FACELIVE_TEST_VALID_F64", 0.19), 0.3);
    }
}
