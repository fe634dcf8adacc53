//! Passthrough: forwards every packet to port 0.

use crate::pipeline::error::ProcessorError;
use crate::pipeline::options::Options;
use crate::pipeline::packet::Packet;
use crate::pipeline::processor::{Emitter, Processor, ProcessorContext};

#[derive(Default)]
pub struct Passthrough {
    emitter: Option<Emitter>,
}

impl Passthrough {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for Passthrough {
    fn configure(&mut self, ctx: ProcessorContext, _options: &Options) -> Result<(), ProcessorError> {
        self.emitter = Some(ctx.emitter);
        Ok(())
    }

    fn receive(&self, packet: Packet) -> Result<(), ProcessorError> {
        let emitter = self
            .emitter
            .as_ref()
            .ok_or_else(|| ProcessorError::msg("passthrough used before configure"))?;
        emitter.send(packet, 0);
        Ok(())
    }
}
