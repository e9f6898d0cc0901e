pub mod seq2seq;
mod standalone;
mod task;

use std::rc::Rc;

pub use seq2seq::{
    Cache, Decoder, DecoderInput, DecoderOutput, Encoder, EncoderDecoderModel, EncoderInput, EncoderKind,
    EncoderRegistry, LayerCache, Seq2SeqOutput, Seq2SeqSessions, StepInput,
};
pub use standalone::{ModelOutput, StandaloneRunner};
pub use task::{Capabilities, Task};

use crate::{
    Error,
    device::{Device, DeviceContext, validate_provider_availability},
    session::Engine,
};

/// Checks that `engine` can run on `device` and returns the context outputs will be allocated from.
pub(crate) fn target_context(
    engine: &dyn Engine,
    device: Device,
) -> Result<Rc<dyn DeviceContext>, Error> {
    validate_provider_availability(device.provider(), &engine.available_providers())?;
    engine.device_context(device)
}
