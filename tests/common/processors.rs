//! Test processors: channel-fed inputs, collecting outputs and filters with
//! controllable failure modes.

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use pipefan::pipeline::options::Options;
use pipefan::{Emitter, Packet, ProcessorContext, ProcessorError};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Packets collected by output processors, shared with the test.
#[derive(Clone, Default)]
pub struct Collected(Arc<Mutex<Vec<Packet>>>);

impl Collected {
    pub fn push(&self, packet: Packet) {
        self.0.lock().unwrap().push(packet);
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.0.lock().unwrap().clone()
    }
}

/// Counts hook invocations across processor instances.
#[derive(Clone, Default)]
pub struct HookCounter(Arc<AtomicUsize>);

impl HookCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ==================== Inputs ====================

/// Input forwarding everything sent on a test channel to port 0.
pub struct ChannelInput {
    feed: Receiver<Packet>,
    sent: HookCounter,
    emitter: Option<Emitter>,
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Test side of a [`ChannelInput`].
#[derive(Clone)]
pub struct Feed {
    pub tx: Sender<Packet>,
    rx: Receiver<Packet>,
    /// Packets whose delivery downstream has completed.
    pub sent: HookCounter,
}

impl Feed {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            sent: HookCounter::default(),
        }
    }

    pub fn send(&self, packet: Packet) {
        self.tx.send(packet).unwrap();
    }

    pub fn processor(&self) -> ChannelInput {
        ChannelInput {
            feed: self.rx.clone(),
            sent: self.sent.clone(),
            emitter: None,
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }
}

impl pipefan::Processor for ChannelInput {
    fn configure(&mut self, ctx: ProcessorContext, _options: &Options) -> Result<(), ProcessorError> {
        self.emitter = Some(ctx.emitter);
        Ok(())
    }

    fn start(&self, _packet: Packet) -> Result<(), ProcessorError> {
        let emitter = self
            .emitter
            .clone()
            .ok_or_else(|| ProcessorError::msg("not configured"))?;
        let feed = self.feed.clone();
        let sent = self.sent.clone();
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = std::thread::spawn(move || loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(feed) -> msg => match msg {
                    Ok(packet) => {
                        emitter.send(packet, 0);
                        sent.hit();
                    }
                    Err(_) => break,
                },
            }
        });

        *self.stop_tx.lock().unwrap() = Some(stop_tx);
        *self.handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    fn receive(&self, packet: Packet) -> Result<(), ProcessorError> {
        if let Some(emitter) = &self.emitter {
            emitter.send(packet, 0);
        }
        Ok(())
    }

    fn stop(&self, _packet: Packet) -> Result<(), ProcessorError> {
        self.stop_tx.lock().unwrap().take();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.join().map_err(|_| ProcessorError::msg("feed thread panicked"))?;
        }
        Ok(())
    }
}

/// Input emitting a numbered packet on every timer tick.
pub struct Ticker {
    emitter: Option<Emitter>,
    ticks: AtomicUsize,
}

impl Ticker {
    pub fn new() -> Self {
        Self {
            emitter: None,
            ticks: AtomicUsize::new(0),
        }
    }
}

impl pipefan::Processor for Ticker {
    fn configure(&mut self, ctx: ProcessorContext, _options: &Options) -> Result<(), ProcessorError> {
        self.emitter = Some(ctx.emitter);
        Ok(())
    }

    fn receive(&self, _packet: Packet) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn tick(&self, mut packet: Packet) -> Result<(), ProcessorError> {
        let n = self.ticks.fetch_add(1, Ordering::SeqCst) as i64;
        packet.set("tick", n)?;
        if let Some(emitter) = &self.emitter {
            emitter.send(packet, 0);
        }
        Ok(())
    }
}

/// Input whose start hook always fails; counts its stop hook.
pub struct FailingStart {
    pub stops: HookCounter,
}

impl pipefan::Processor for FailingStart {
    fn configure(&mut self, _ctx: ProcessorContext, _options: &Options) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn start(&self, _packet: Packet) -> Result<(), ProcessorError> {
        Err(ProcessorError::msg("address already in use"))
    }

    fn receive(&self, _packet: Packet) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn stop(&self, _packet: Packet) -> Result<(), ProcessorError> {
        self.stops.hit();
        Ok(())
    }
}

// ==================== Filters ====================

#[derive(Debug, Deserialize)]
struct MutateOptions {
    field: String,
    value: String,
}

/// Filter setting `field` to `value` before forwarding.
#[derive(Default)]
pub struct Mutate {
    options: Option<MutateOptions>,
    emitter: Option<Emitter>,
}

impl pipefan::Processor for Mutate {
    fn configure(&mut self, ctx: ProcessorContext, options: &Options) -> Result<(), ProcessorError> {
        self.options = Some(options.decode()?);
        self.emitter = Some(ctx.emitter);
        Ok(())
    }

    fn receive(&self, mut packet: Packet) -> Result<(), ProcessorError> {
        if let Some(options) = &self.options {
            packet.set(&options.field, options.value.as_str())?;
        }
        if let Some(emitter) = &self.emitter {
            emitter.send(packet, 0);
        }
        Ok(())
    }
}

/// Filter failing every packet that carries a `bad` field.
#[derive(Default)]
pub struct Flaky {
    emitter: Option<Emitter>,
}

impl pipefan::Processor for Flaky {
    fn configure(&mut self, ctx: ProcessorContext, _options: &Options) -> Result<(), ProcessorError> {
        self.emitter = Some(ctx.emitter);
        Ok(())
    }

    fn receive(&self, packet: Packet) -> Result<(), ProcessorError> {
        if packet.contains("bad") {
            return Err(ProcessorError::Field {
                path: "bad".into(),
                message: "rejected".into(),
            });
        }
        if let Some(emitter) = &self.emitter {
            emitter.send(packet, 0);
        }
        Ok(())
    }
}

// ==================== Outputs ====================

/// Output storing every packet; tags it first when a `tag` option is set.
pub struct Collector {
    collected: Collected,
    stops: HookCounter,
    tag: Option<String>,
}

impl Collector {
    pub fn new(collected: Collected, stops: HookCounter) -> Self {
        Self {
            collected,
            stops,
            tag: None,
        }
    }
}

impl pipefan::Processor for Collector {
    fn configure(&mut self, _ctx: ProcessorContext, options: &Options) -> Result<(), ProcessorError> {
        self.tag = options.get_str("tag").map(str::to_string);
        Ok(())
    }

    fn receive(&self, mut packet: Packet) -> Result<(), ProcessorError> {
        if let Some(tag) = &self.tag {
            packet.set("tag", tag.as_str())?;
        }
        self.collected.push(packet);
        Ok(())
    }

    fn stop(&self, _packet: Packet) -> Result<(), ProcessorError> {
        self.stops.hit();
        Ok(())
    }
}

/// Output blocking every packet until the gate's sender is dropped.
pub struct Gated {
    gate: Receiver<()>,
    collected: Collected,
}

impl Gated {
    pub fn new(gate: Receiver<()>, collected: Collected) -> Self {
        Self { gate, collected }
    }
}

impl pipefan::Processor for Gated {
    fn configure(&mut self, _ctx: ProcessorContext, _options: &Options) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn receive(&self, packet: Packet) -> Result<(), ProcessorError> {
        let _ = self.gate.recv();
        self.collected.push(packet);
        Ok(())
    }

    fn max_concurrency(&self) -> usize {
        0
    }
}

/// Output taking `delay` per packet.
pub struct Slow {
    delay: Duration,
    collected: Collected,
}

impl Slow {
    pub fn new(delay: Duration, collected: Collected) -> Self {
        Self { delay, collected }
    }
}

impl pipefan::Processor for Slow {
    fn configure(&mut self, _ctx: ProcessorContext, _options: &Options) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn receive(&self, packet: Packet) -> Result<(), ProcessorError> {
        std::thread::sleep(self.delay);
        self.collected.push(packet);
        Ok(())
    }
}
