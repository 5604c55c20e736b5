use anyhow::{Context, Result};
use log::debug;

use crate::structs::buffer::AudioBuffer;

/// Framing, encoding and simulated packet loss.
///
/// Provides the [`PacketEncoder`](encode::PacketEncoder) handler and the
/// [`LossyChannel`](encode::LossyChannel) drop decision it applies.
pub mod encode;

/// Gap-aware decoding with frame concealment.
///
/// Provides the [`PacketDecoder`](decode::PacketDecoder) handler.
pub mod decode;

/// Streaming time-stretch over a [`TempoTransform`](crate::tempo::TempoTransform).
pub mod stretch;

/// Rendering to an output device.
pub mod playback;

/// One stage of the pipeline.
///
/// A handler transforms or consumes the shared buffer in place. Returning an
/// error aborts the remaining stages.
pub trait Handler {
    fn name(&self) -> &'static str;

    fn handle(&mut self, buffer: &mut AudioBuffer) -> Result<()>;
}

/// Ordered list of handlers borrowed from their owners.
#[derive(Default)]
pub struct HandlerChain<'a> {
    handlers: Vec<&'a mut dyn Handler>,
}

impl<'a> HandlerChain<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: &'a mut dyn Handler) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Runs every handler in registration order, stopping at the first
    /// failure. Changes made by earlier handlers are kept.
    pub fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        self.process_observed(buffer, |_, _| {})
    }

    /// Like [`process`](Self::process), calling `on_stage` with the index and
    /// name of each handler before it runs.
    pub fn process_observed<F>(&mut self, buffer: &mut AudioBuffer, mut on_stage: F) -> Result<()>
    where
        F: FnMut(usize, &'static str),
    {
        for (index, handler) in self.handlers.iter_mut().enumerate() {
            let name = handler.name();
            on_stage(index, name);
            debug!("Running handler {index}: {name}");

            handler
                .handle(buffer)
                .with_context(|| format!("{name} failed"))?;
        }
        Ok(())
    }
}
