use crate::defaults;
use crate::error::{LingoBridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A normalized target-language descriptor: human-readable name plus code.
///
/// Parsed from the `"Name - code"` form the settings layer produces,
/// e.g. `"French - fr"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTag {
    pub name: String,
    pub code: String,
}

impl LanguageTag {
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
        }
    }

    /// Parse a `"Name - code"` descriptor, lowercasing both halves.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let lowered = descriptor.to_lowercase();
        let (name, code) =
            lowered
                .split_once(" - ")
                .ok_or_else(|| LingoBridgeError::ConfigInvalidValue {
                    key: "target_language".to_string(),
                    message: format!("expected \"Name - code\", got \"{}\"", descriptor),
                })?;
        Ok(Self {
            name: name.trim().to_string(),
            code: code.trim().to_string(),
        })
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.code)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioSection,
    pub recognizer: RecognizerSection,
    pub translation: TranslationSection,
    pub synthesis: SynthesisSection,
    pub clone: CloneSection,
}

/// Audio device and capture-segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSection {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub energy_threshold: i32,
    pub dynamic_energy_threshold: bool,
    pub pause_threshold: f32,
}

/// Transcription backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognizerSection {
    /// Run a local model rather than a remote transcription API.
    pub run_local: bool,
    pub model_size: String,
    pub api_key: Option<String>,
}

/// Translation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationSection {
    /// Primary engine API key. Absent means fallback-only translation.
    pub api_key: Option<String>,
    /// Target language descriptor in `"Name - code"` form.
    pub target_language: String,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisSection {
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
}

/// Voice cloning configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CloneSection {
    pub enabled: bool,
    pub voice_name: String,
    pub denoise_api_key: Option<String>,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            energy_threshold: defaults::ENERGY_THRESHOLD,
            dynamic_energy_threshold: true,
            pause_threshold: defaults::PAUSE_THRESHOLD_SECS,
        }
    }
}

impl Default for RecognizerSection {
    fn default() -> Self {
        Self {
            run_local: true,
            model_size: "base".to_string(),
            api_key: None,
        }
    }
}

impl Default for TranslationSection {
    fn default() -> Self {
        Self {
            api_key: None,
            target_language: "English - en".to_string(),
        }
    }
}

impl Default for SynthesisSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: String::new(),
            model_id: "eleven_multilingual_v2".to_string(),
        }
    }
}

impl Default for CloneSection {
    fn default() -> Self {
        Self {
            enabled: false,
            voice_name: "Cloned voice".to_string(),
            denoise_api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                anyhow::Error::from(LingoBridgeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                })
            }
            _ => anyhow::Error::from(e),
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if matches!(
                    e.downcast_ref::<LingoBridgeError>(),
                    Some(LingoBridgeError::ConfigFileNotFound { .. })
                ) {
                    Self::default()
                } else {
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LINGOBRIDGE_INPUT_DEVICE → audio.input_device
    /// - LINGOBRIDGE_OUTPUT_DEVICE → audio.output_device
    /// - LINGOBRIDGE_TARGET_LANGUAGE → translation.target_language
    /// - LINGOBRIDGE_MODEL_SIZE → recognizer.model_size
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("LINGOBRIDGE_INPUT_DEVICE")
            && !device.is_empty()
        {
            self.audio.input_device = Some(device);
        }

        if let Ok(device) = std::env::var("LINGOBRIDGE_OUTPUT_DEVICE")
            && !device.is_empty()
        {
            self.audio.output_device = Some(device);
        }

        if let Ok(lang) = std::env::var("LINGOBRIDGE_TARGET_LANGUAGE")
            && !lang.is_empty()
        {
            self.translation.target_language = lang;
        }

        if let Ok(model) = std::env::var("LINGOBRIDGE_MODEL_SIZE")
            && !model.is_empty()
        {
            self.recognizer.model_size = model;
        }

        self
    }

    /// Parse the configured target language descriptor.
    pub fn target_language(&self) -> Result<LanguageTag> {
        LanguageTag::parse(&self.translation.target_language)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/lingobridge/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("lingobridge")
            .join("config.toml")
    }
}
