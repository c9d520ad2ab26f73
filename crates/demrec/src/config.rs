use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use render::{PipelineStep, RenderTool, RetryBudget};
use serde::Deserialize;

use crate::error::RecordError;

const TICKS_PER_SECOND: f64 = 200.0 / 3.0;

/// Top-level recorder configuration, loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    /// `video` profile keys passed to the capture companion verbatim.
    #[serde(default)]
    pub video: BTreeMap<String, String>,
    #[serde(default)]
    pub motion_blur: BTreeMap<String, String>,
    #[serde(default)]
    pub velocity_overlay: BTreeMap<String, String>,
    /// Render pipelines keyed by output name; the `default` entry, when
    /// present, applies to outputs without their own entry. Each pass is
    /// an ordered argument template.
    #[serde(default)]
    pub pipelines: BTreeMap<String, Vec<Vec<String>>>,
    #[serde(default)]
    pub render: RenderSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Capture companion installation directory.
    pub svr_dir: PathBuf,
    /// Game executable to launch.
    pub game_exe: PathBuf,
    /// Extra launch arguments appended verbatim.
    #[serde(default)]
    pub game_args: Option<String>,
    /// Demo timeline rate; Source runs 66.67 ticks per second.
    #[serde(default = "default_tickrate")]
    pub tickrate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "default_render_binary")]
    pub binary: String,
    /// Diagnostic substrings that make a failed pass worth retrying.
    #[serde(default = "default_transient_phrases")]
    pub transient_phrases: Vec<String>,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_tickrate() -> f64 {
    TICKS_PER_SECOND
}

fn default_render_binary() -> String {
    "ffmpeg".to_owned()
}

fn default_transient_phrases() -> Vec<String> {
    render::DEFAULT_TRANSIENT_PHRASES
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            binary: default_render_binary(),
            transient_phrases: default_transient_phrases(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RecordError::configuration(format!("cannot read `{}`: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            RecordError::configuration(format!("cannot parse `{}`: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if self.general.svr_dir.as_os_str().is_empty() {
            return Err(RecordError::configuration("general.svr_dir is empty"));
        }
        if self.general.game_exe.as_os_str().is_empty() {
            return Err(RecordError::configuration("general.game_exe is empty"));
        }
        if self.general.tickrate <= 0.0 {
            return Err(RecordError::configuration("general.tickrate must be > 0"));
        }
        for (name, passes) in &self.pipelines {
            if passes.is_empty() {
                return Err(RecordError::configuration(format!(
                    "pipeline `{name}` has no passes"
                )));
            }
            for (i, pass) in passes.iter().enumerate() {
                if pass.is_empty() {
                    return Err(RecordError::configuration(format!(
                        "pipeline `{name}` pass {i} is empty"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Passes configured for `output`, falling back to the `default`
    /// pipeline. No entry means the plain mux pass only.
    pub fn pipeline_for(&self, output: &str) -> Vec<PipelineStep> {
        self.pipelines
            .get(output)
            .or_else(|| self.pipelines.get("default"))
            .map(|passes| {
                passes
                    .iter()
                    .map(|args| PipelineStep { args: args.clone() })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn render_tool(&self) -> RenderTool {
        RenderTool::new(self.render.binary.clone())
            .with_transient_phrases(self.render.transient_phrases.clone())
            .with_retry(RetryBudget {
                attempts: self.render.retry_attempts,
                delay: Duration::from_millis(self.render.retry_delay_ms),
            })
    }

    pub fn seconds_for_ticks(&self, ticks: u32) -> f64 {
        f64::from(ticks) / self.general.tickrate
    }

    /// Renders the capture companion profile: one flat `section_key=value`
    /// line per setting, sections concatenated.
    pub fn profile_contents(&self) -> String {
        let mut out = String::new();
        for (section, table) in [
            ("video", &self.video),
            ("motion_blur", &self.motion_blur),
            ("velocity_overlay", &self.velocity_overlay),
        ] {
            for (key, value) in table {
                out.push_str(section);
                out.push('_');
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "general": {
                "svr_dir": "/opt/svr",
                "game_exe": "/games/tf2/hl2.exe"
            }
        }"#
    }

    fn parse(json: &str) -> Config {
        let config: Config = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(minimal_json());
        assert!((config.general.tickrate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(config.render.binary, "ffmpeg");
        assert_eq!(config.render.retry_attempts, 3);
        assert_eq!(config.render.transient_phrases.len(), 2);
        assert!(config.pipeline_for("anything").is_empty());
    }

    #[test]
    fn pipeline_lookup_falls_back_to_default() {
        let config = parse(
            r#"{
                "general": { "svr_dir": "/opt/svr", "game_exe": "/g/hl2.exe" },
                "pipelines": {
                    "default": [["-i", "{prev}", "{next}"]],
                    "take2": [["-i", "{prev}", "-vf", "scale=1280:720", "{next}"]]
                }
            }"#,
        );
        assert_eq!(config.pipeline_for("take2")[0].args.len(), 5);
        assert_eq!(config.pipeline_for("take1")[0].args.len(), 3);
    }

    #[test]
    fn empty_pipeline_pass_is_rejected() {
        let config: Config = serde_json::from_str(
            r#"{
                "general": { "svr_dir": "/opt/svr", "game_exe": "/g/hl2.exe" },
                "pipelines": { "take1": [[]] }
            }"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(RecordError::Configuration { .. })
        ));
    }

    #[test]
    fn zero_tickrate_is_rejected() {
        let config: Config = serde_json::from_str(
            r#"{
                "general": { "svr_dir": "/s", "game_exe": "/g", "tickrate": 0.0 }
            }"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn tick_durations_use_the_tickrate() {
        let config = parse(minimal_json());
        let secs = config.seconds_for_ticks(200);
        assert!((secs - 3.0).abs() < 1e-9);
    }

    #[test]
    fn profile_flattens_sections_into_prefixed_keys() {
        let config = parse(
            r#"{
                "general": { "svr_dir": "/s", "game_exe": "/g" },
                "video": { "fps": "60", "encoder": "libx264" },
                "motion_blur": { "enabled": "1" }
            }"#,
        );
        let profile = config.profile_contents();
        assert!(profile.contains("video_fps=60\n"));
        assert!(profile.contains("video_encoder=libx264\n"));
        assert!(profile.contains("motion_blur_enabled=1\n"));
    }
}
