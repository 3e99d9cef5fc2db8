// config.rs - Run configuration edited by the user before the workflow starts
use serde::{Deserialize, Serialize};

/// Angle used for image slots that have no configured camera angle.
pub const DEFAULT_CAMERA_ANGLE: &str = "dynamic perspective";

/// Upper bounds on fan-out size; each slot is one remote request.
pub const MAX_IMAGES: usize = 16;
pub const MAX_VIDEOS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchConfig {
    pub style: StyleConfig,
    pub image_generation: ImageGenerationConfig,
    pub video_generation: VideoGenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    pub material: String,
    pub mood: String,
    pub lighting: String,
    pub realism_level: String,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationConfig {
    pub number_of_images: usize,
    pub camera_angles: Vec<String>,
    pub resolution: String,
    pub post_processing: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoGenerationConfig {
    pub number_of_videos: usize,
    pub videos: Vec<VideoConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub duration_seconds: u32,
    pub motion_style: String,
    pub camera_movements: Vec<String>,
    pub transition_style: String,
    pub frame_rate: String,
}

impl Default for ArchConfig {
    fn default() -> Self {
        Self {
            style: StyleConfig {
                material: "exposed concrete and glass".to_string(),
                mood: "cinematic".to_string(),
                lighting: "golden hour".to_string(),
                realism_level: "photorealistic".to_string(),
                environment: "urban coastal".to_string(),
            },
            image_generation: ImageGenerationConfig {
                number_of_images: 4,
                camera_angles: ["wide", "medium", "close", "aerial"]
                    .iter()
                    .map(|a| a.to_string())
                    .collect(),
                resolution: "high".to_string(),
                post_processing: "architectural render quality".to_string(),
            },
            video_generation: VideoGenerationConfig {
                number_of_videos: 2,
                videos: vec![
                    VideoConfig {
                        duration_seconds: 12,
                        motion_style: "slow cinematic".to_string(),
                        camera_movements: vec!["dolly forward".to_string(), "pan".to_string()],
                        transition_style: "smooth".to_string(),
                        frame_rate: "cinematic".to_string(),
                    },
                    VideoConfig {
                        duration_seconds: 12,
                        motion_style: "dynamic cinematic".to_string(),
                        camera_movements: vec!["orbit".to_string(), "crane up".to_string()],
                        transition_style: "smooth".to_string(),
                        frame_rate: "cinematic".to_string(),
                    },
                ],
            },
        }
    }
}

impl ArchConfig {
    /// Parse configuration text as submitted from the editor.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Pretty JSON used to seed the editor.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Camera angle for an image slot, falling back when the list is short.
    pub fn camera_angle(&self, slot: usize) -> &str {
        self.image_generation
            .camera_angles
            .get(slot)
            .map(String::as_str)
            .unwrap_or(DEFAULT_CAMERA_ANGLE)
    }

    /// Hard limits a run must satisfy before it can start.
    pub fn check_limits(&self) -> Result<(), String> {
        let images = self.image_generation.number_of_images;
        if images == 0 || images > MAX_IMAGES {
            return Err(format!(
                "number_of_images must be between 1 and {}, got {}",
                MAX_IMAGES, images
            ));
        }
        let videos = self.video_generation.videos.len();
        if videos > MAX_VIDEOS {
            return Err(format!("at most {} videos can be configured, got {}", MAX_VIDEOS, videos));
        }
        Ok(())
    }

    /// Coverage problems worth logging; none of them block a run.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let images = &self.image_generation;
        if images.camera_angles.len() < images.number_of_images {
            warnings.push(format!(
                "{} images requested but only {} camera angles configured; remaining slots use '{}'",
                images.number_of_images,
                images.camera_angles.len(),
                DEFAULT_CAMERA_ANGLE
            ));
        }

        let videos = &self.video_generation;
        if videos.videos.len() != videos.number_of_videos {
            warnings.push(format!(
                "number_of_videos is {} but {} video configs are listed; the list wins",
                videos.number_of_videos,
                videos.videos.len()
            ));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_reject_oversized_fan_out() {
        assert!(ArchConfig::default().check_limits().is_ok());

        let mut config = ArchConfig::default();
        config.image_generation.number_of_images = usize::MAX;
        assert!(config.check_limits().unwrap_err().contains("number_of_images"));

        config.image_generation.number_of_images = 0;
        assert!(config.check_limits().is_err());

        config.image_generation.number_of_images = MAX_IMAGES;
        assert!(config.check_limits().is_ok());

        let video = config.video_generation.videos[0].clone();
        config.video_generation.videos = vec![video; MAX_VIDEOS + 1];
        assert!(config.check_limits().unwrap_err().contains("videos"));
    }

    #[test]
    fn test_default_template_roundtrips_through_text() {
        let config = ArchConfig::default();
        let text = config.to_pretty_json().unwrap();
        let parsed = ArchConfig::parse(&text).unwrap();
        assert_eq!(parsed, config);
        assert!(parsed.warnings().is_empty());
    }

    #[test]
    fn test_style_section_reads_back_field_for_field() {
        let text = r#"{
            "style": {"material": "timber", "mood": "calm", "lighting": "overcast",
                      "realism_level": "hyperreal", "environment": "forest"},
            "image_generation": {"number_of_images": 1, "camera_angles": ["eye level"],
                                 "resolution": "high", "post_processing": "none"},
            "video_generation": {"number_of_videos": 0, "videos": []}
        }"#;
        let config = ArchConfig::parse(text).unwrap();

        let shown = serde_json::to_string(&config.style).unwrap();
        let read_back: StyleConfig = serde_json::from_str(&shown).unwrap();
        assert_eq!(read_back, config.style);
        assert_eq!(read_back.material, "timber");
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        assert!(ArchConfig::parse("{ not json").is_err());
        assert!(ArchConfig::parse(r#"{"style": {}}"#).is_err());
    }

    #[test]
    fn test_camera_angle_falls_back_past_list_end() {
        let mut config = ArchConfig::default();
        config.image_generation.number_of_images = 6;
        assert_eq!(config.camera_angle(0), "wide");
        assert_eq!(config.camera_angle(3), "aerial");
        assert_eq!(config.camera_angle(4), DEFAULT_CAMERA_ANGLE);
        assert_eq!(config.warnings().len(), 1);
    }

    #[test]
    fn test_video_count_mismatch_is_reported() {
        let mut config = ArchConfig::default();
        config.video_generation.number_of_videos = 3;
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("number_of_videos is 3"));
    }
}
