use std::{fmt, str::FromStr};

use crate::{
    Error,
    binding::{LogitsLayout, OutputRole, OutputSpec, ShapeParams},
};

/// Model head a runner serves, named after the export task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    FeatureExtraction,
    QuestionAnswering,
    SequenceClassification,
    TokenClassification,
    MultipleChoice,
    ImageClassification,
    /// Inputs and outputs are discovered from the graph.
    Custom,
    Seq2SeqLm,
    SpeechSeq2SeqLm,
}

const ALL: [Task; 9] = [
    Task::FeatureExtraction,
    Task::QuestionAnswering,
    Task::SequenceClassification,
    Task::TokenClassification,
    Task::MultipleChoice,
    Task::ImageClassification,
    Task::Custom,
    Task::Seq2SeqLm,
    Task::SpeechSeq2SeqLm,
];

impl Task {
    pub const fn name(&self) -> &'static str {
        match self {
            Task::FeatureExtraction => "feature-extraction",
            Task::QuestionAnswering => "question-answering",
            Task::SequenceClassification => "sequence-classification",
            Task::TokenClassification => "token-classification",
            Task::MultipleChoice => "multiple-choice",
            Task::ImageClassification => "image-classification",
            Task::Custom => "custom",
            Task::Seq2SeqLm => "seq2seq-lm",
            Task::SpeechSeq2SeqLm => "speech2seq-lm",
        }
    }

    pub fn all() -> &'static [Task] {
        &ALL
    }

    pub const fn is_encoder_decoder(&self) -> bool {
        matches!(self, Task::Seq2SeqLm | Task::SpeechSeq2SeqLm)
    }

    /// Inputs the runner feeds to the graph. Empty when the graph decides.
    pub const fn input_names(&self) -> &'static [&'static str] {
        match self {
            Task::FeatureExtraction
            | Task::QuestionAnswering
            | Task::SequenceClassification
            | Task::TokenClassification
            | Task::MultipleChoice => &["input_ids", "attention_mask", "token_type_ids"],
            Task::ImageClassification => &["pixel_values"],
            Task::Seq2SeqLm => &["input_ids", "attention_mask", "decoder_input_ids", "labels"],
            Task::SpeechSeq2SeqLm => &["input_features", "decoder_input_ids", "labels"],
            Task::Custom => &[],
        }
    }

    /// Outputs the runner reads back. Empty when the graph decides.
    pub const fn output_names(&self) -> &'static [&'static str] {
        match self {
            Task::FeatureExtraction => &["last_hidden_state"],
            Task::QuestionAnswering => &["start_logits", "end_logits"],
            Task::SequenceClassification
            | Task::TokenClassification
            | Task::MultipleChoice
            | Task::ImageClassification => &["logits"],
            Task::Seq2SeqLm | Task::SpeechSeq2SeqLm => &["logits", "loss"],
            Task::Custom => &[],
        }
    }

    /// Outputs the runner preallocates when binding, with the role that sizes each of them.
    ///
    /// Encoder-decoder tasks list the logits only, their cache outputs depend on the graph.
    pub fn output_specs(
        &self,
        num_labels: usize,
        params: &ShapeParams,
    ) -> Vec<OutputSpec> {
        match self {
            Task::FeatureExtraction => vec![OutputSpec::new("last_hidden_state", OutputRole::HiddenState)],
            Task::QuestionAnswering => vec![
                OutputSpec::new("start_logits", OutputRole::Logits(LogitsLayout::Span)),
                OutputSpec::new("end_logits", OutputRole::Logits(LogitsLayout::Span)),
            ],
            Task::SequenceClassification | Task::ImageClassification => vec![OutputSpec::new(
                "logits",
                OutputRole::Logits(LogitsLayout::PerSequence {
                    num_labels,
                }),
            )],
            Task::TokenClassification => vec![OutputSpec::new(
                "logits",
                OutputRole::Logits(LogitsLayout::PerToken {
                    num_labels,
                }),
            )],
            // The second input axis counts the choices, which is also the logits width.
            Task::MultipleChoice => vec![OutputSpec::new(
                "logits",
                OutputRole::Logits(LogitsLayout::PerSequence {
                    num_labels: params.sequence_length,
                }),
            )],
            Task::Seq2SeqLm | Task::SpeechSeq2SeqLm => {
                vec![OutputSpec::new("logits", OutputRole::Logits(LogitsLayout::Vocabulary))]
            },
            Task::Custom => Vec::new(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = Error;

    /// Accepts the task names plus `default`, the export name of feature extraction.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "default" {
            return Ok(Task::FeatureExtraction);
        }
        ALL.iter().copied().find(|task| task.name() == value).ok_or_else(|| Error::UnknownTask(value.to_string()))
    }
}

/// What a loaded runner accepts and produces, for registration in an external task registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub task: Task,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
}
