//! Route: copies each packet onto the side path (port 0) and forwards the
//! original on the pass-through port (port 1).

use crate::pipeline::error::ProcessorError;
use crate::pipeline::options::Options;
use crate::pipeline::packet::Packet;
use crate::pipeline::port::PortNumber;
use crate::pipeline::processor::{Emitter, Processor, ProcessorContext};

pub const SIDE_PORT: PortNumber = 0;
pub const PASS_PORT: PortNumber = 1;

#[derive(Default)]
pub struct Route {
    emitter: Option<Emitter>,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for Route {
    fn configure(&mut self, ctx: ProcessorContext, _options: &Options) -> Result<(), ProcessorError> {
        self.emitter = Some(ctx.emitter);
        Ok(())
    }

    fn receive(&self, packet: Packet) -> Result<(), ProcessorError> {
        let emitter = self
            .emitter
            .as_ref()
            .ok_or_else(|| ProcessorError::msg("route used before configure"))?;
        if emitter.subscribers(PASS_PORT) > 0 {
            emitter.send(packet.clone(), SIDE_PORT);
            emitter.send(packet, PASS_PORT);
        } else {
            emitter.send(packet, SIDE_PORT);
        }
        Ok(())
    }
}
