use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MODEL_FILE_NAME: &str = "model.onnx";
pub const ENCODER_FILE_NAME: &str = "encoder_model.onnx";
pub const DECODER_FILE_NAME: &str = "decoder_model.onnx";
pub const DECODER_WITH_PAST_FILE_NAME: &str = "decoder_with_past_model.onnx";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// One of the graph files an exported model directory can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFile {
    Model,
    Encoder,
    Decoder,
    DecoderWithPast,
}

impl GraphFile {
    pub const fn standard_name(&self) -> &'static str {
        match self {
            GraphFile::Model => MODEL_FILE_NAME,
            GraphFile::Encoder => ENCODER_FILE_NAME,
            GraphFile::Decoder => DECODER_FILE_NAME,
            GraphFile::DecoderWithPast => DECODER_WITH_PAST_FILE_NAME,
        }
    }
}

/// File names of the graphs, for directories that do not use the standard ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileNames {
    pub model: String,
    pub encoder: String,
    pub decoder: String,
    pub decoder_with_past: String,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            model: MODEL_FILE_NAME.to_string(),
            encoder: ENCODER_FILE_NAME.to_string(),
            decoder: DECODER_FILE_NAME.to_string(),
            decoder_with_past: DECODER_WITH_PAST_FILE_NAME.to_string(),
        }
    }
}

impl FileNames {
    pub fn get(
        &self,
        graph: GraphFile,
    ) -> &str {
        match graph {
            GraphFile::Model => &self.model,
            GraphFile::Encoder => &self.encoder,
            GraphFile::Decoder => &self.decoder,
            GraphFile::DecoderWithPast => &self.decoder_with_past,
        }
    }
}

/// Graph and configuration files of an exported model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    root: PathBuf,
    names: FileNames,
}

impl ModelFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            names: FileNames::default(),
        }
    }

    pub fn with_names(
        mut self,
        names: FileNames,
    ) -> Self {
        self.names = names;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn names(&self) -> &FileNames {
        &self.names
    }

    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn graph(
        &self,
        graph: GraphFile,
    ) -> PathBuf {
        self.root.join(self.names.get(graph))
    }

    pub fn model(&self) -> PathBuf {
        self.graph(GraphFile::Model)
    }

    pub fn encoder(&self) -> PathBuf {
        self.graph(GraphFile::Encoder)
    }

    pub fn decoder(&self) -> PathBuf {
        self.graph(GraphFile::Decoder)
    }

    /// Path of the cached-decoder graph, if the directory contains one.
    pub fn decoder_with_past(&self) -> Option<PathBuf> {
        let path = self.graph(GraphFile::DecoderWithPast);
        path.is_file().then_some(path)
    }

    pub fn is_encoder_decoder(&self) -> bool {
        self.encoder().is_file() && self.decoder().is_file()
    }

    /// Copies the configuration and `graphs` into `save_dir` under the standard file names.
    ///
    /// The copy loads back with [`ModelFiles::new`].
    pub fn save(
        &self,
        save_dir: &Path,
        graphs: &[GraphFile],
    ) -> io::Result<()> {
        fs::create_dir_all(save_dir)?;
        fs::copy(self.config(), save_dir.join(CONFIG_FILE_NAME))?;
        for &graph in graphs {
            fs::copy(self.graph(graph), save_dir.join(graph.standard_name()))?;
        }
        debug!(from = %self.root.display(), to = %save_dir.display(), graphs = graphs.len(), "model saved");
        Ok(())
    }
}
