use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{FileNames, ModelFiles};
use crate::device::{ExecutionProvider, ProviderOptions};

/// Provider configuration handed to the engine when a graph is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub providers: Vec<ExecutionProvider>,
    #[serde(default)]
    pub provider_options: ProviderOptions,
}

/// How a runner loads its graphs and moves tensors in and out of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerOptions {
    #[serde(default)]
    pub provider: ExecutionProvider,
    #[serde(default)]
    pub provider_options: ProviderOptions,
    /// `None` binds on accelerators. Providers that manage their own memory never bind.
    #[serde(default)]
    pub use_io_binding: Option<bool>,
    /// Load the cached decoder of encoder-decoder models when the directory has one.
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    #[serde(default)]
    pub file_names: FileNames,
    /// Directory below the model directory holding the files.
    #[serde(default)]
    pub subfolder: Option<String>,
}

fn default_use_cache() -> bool {
    true
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            provider: ExecutionProvider::default(),
            provider_options: ProviderOptions::new(),
            use_io_binding: None,
            use_cache: default_use_cache(),
            file_names: FileNames::default(),
            subfolder: None,
        }
    }
}

impl RunnerOptions {
    pub fn new(provider: ExecutionProvider) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }

    pub fn with_provider_options(
        mut self,
        provider_options: ProviderOptions,
    ) -> Self {
        self.provider_options = provider_options;
        self
    }

    pub fn with_io_binding(
        mut self,
        use_io_binding: bool,
    ) -> Self {
        self.use_io_binding = Some(use_io_binding);
        self
    }

    pub fn with_cache(
        mut self,
        use_cache: bool,
    ) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_file_names(
        mut self,
        file_names: FileNames,
    ) -> Self {
        self.file_names = file_names;
        self
    }

    pub fn with_subfolder(
        mut self,
        subfolder: impl Into<String>,
    ) -> Self {
        self.subfolder = Some(subfolder.into());
        self
    }

    /// Files of the model in `model_dir`, honouring the subfolder and the file names.
    pub fn model_files(
        &self,
        model_dir: &Path,
    ) -> ModelFiles {
        let root = match &self.subfolder {
            Some(subfolder) => model_dir.join(subfolder),
            None => model_dir.to_path_buf(),
        };
        ModelFiles::new(root).with_names(self.file_names.clone())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            providers: self.provider.with_fallbacks(),
            provider_options: self.provider_options.clone(),
        }
    }
}
