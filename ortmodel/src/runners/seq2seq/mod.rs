mod cache;
mod decoder;
mod encoder;
mod model;

pub use cache::{Cache, LayerCache, TENSORS_PER_LAYER};
pub use decoder::{Decoder, DecoderInput, DecoderOutput};
pub use encoder::{Encoder, EncoderInput, EncoderKind, EncoderRegistry};
pub use model::{EncoderDecoderModel, Seq2SeqOutput, Seq2SeqSessions, StepInput};
