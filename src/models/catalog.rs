//! TTS model bundle catalog.
//!
//! Bundles are published as `.tar.bz2` archives on the sherpa-onnx
//! `tts-models` release and unpack into a directory of the same name.

use std::path::{Path, PathBuf};

const SHERPA_TTS_BASE: &str = "https://github.com/k2-fsa/sherpa-onnx/releases/download/tts-models";

/// Metadata for a TTS model bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Bundle identifier, also the directory the archive unpacks into
    pub name: &'static str,
    /// Approximate archive size in megabytes
    pub size_mb: u32,
    /// Short human description
    pub description: &'static str,
    /// Files (relative to the bundle directory) that must exist for the
    /// bundle to count as installed
    pub required: &'static [&'static str],
}

impl ModelInfo {
    /// Download URL of the bundle archive.
    pub fn url(&self) -> String {
        format!("{}/{}.tar.bz2", SHERPA_TTS_BASE, self.name)
    }

    /// Archive file name.
    pub fn archive_name(&self) -> String {
        format!("{}.tar.bz2", self.name)
    }

    /// Directory the bundle unpacks into under `models_dir`.
    pub fn install_dir(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(self.name)
    }

    /// Absolute paths of the required files under `models_dir`.
    pub fn required_paths(&self, models_dir: &Path) -> Vec<PathBuf> {
        let dir = self.install_dir(models_dir);
        self.required.iter().map(|f| dir.join(f)).collect()
    }
}

/// Files every Kokoro bundle ships.
const KOKORO_FILES: &[&str] = &["model.onnx", "voices.bin", "tokens.txt", "espeak-ng-data"];

/// Available bundles. The first entry is the default.
///
/// The Kokoro backend maps voice names to v1.0 speaker ids, so only v1.0
/// bundles belong here.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "kokoro-multi-lang-v1_0",
        size_mb: 333,
        description: "Kokoro v1.0, 53 voices, English plus other languages",
        required: KOKORO_FILES,
    },
];

/// Find a bundle by name.
pub fn get_model(name: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.name == name)
}

pub fn list_models() -> &'static [ModelInfo] {
    MODELS
}

/// The bundle `speak` installs and loads.
pub fn default_model() -> &'static ModelInfo {
    &MODELS[0]
}
