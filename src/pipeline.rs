//! Stage wiring
//!
//! Builds the channels between stages and starts one named thread per
//! stage:
//!
//! ```text
//! source -> rtp -> stack <-> link-rx / link-tx
//!                    ^
//!                    +--> loopback
//! ```
//!
//! All channels are bounded. Shutdown clears the shared `running` flag;
//! the stack and link threads watch it, the others stop when their peers
//! hang up.

use crate::config::{Config, SourceConfig, SourceKind};
use crate::error::{Error, Result};
use crate::framebuf::{window_offset, BUFFER_SIZE};
use crate::iface::{run_stack, NetworkInterface};
use crate::link::device::{spawn_link, LinkDevice};
use crate::stream::{
    run_source, DeviceMemory, DmaReader, FrameGenerator, RtpPacketizer, RtpSession, StreamSource,
};
use crate::transport::crossbar::{PortCrossbar, UdpPort};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Running pipeline threads
pub struct Pipeline {
    running: Arc<AtomicBool>,
    stages: Vec<(&'static str, JoinHandle<Result<()>>)>,
    link: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Start every stage with the source described by `config.source`
    pub fn spawn<D: LinkDevice + 'static>(
        config: &Config,
        device: Arc<D>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let source = build_source(&config.source)?;
        Self::spawn_with_source(config, device, source, running)
    }

    /// Start every stage around an already started source
    pub fn spawn_with_source<D: LinkDevice + 'static>(
        config: &Config,
        device: Arc<D>,
        source: Box<dyn StreamSource>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        config.validate()?;

        let mut pipeline = Pipeline {
            running: Arc::clone(&running),
            stages: Vec::new(),
            link: Vec::new(),
        };
        if let Err(e) = pipeline.start(config, device, source) {
            return Err(pipeline.abort(e));
        }
        log::info!("Pipeline started ({} threads)", pipeline.stages.len() + pipeline.link.len());
        Ok(pipeline)
    }

    fn start<D: LinkDevice + 'static>(
        &mut self,
        config: &Config,
        device: Arc<D>,
        mut source: Box<dyn StreamSource>,
    ) -> Result<()> {
        let (outbound_tx, outbound_rx) = bounded(config.services.outbound_depth);
        let mut crossbar = PortCrossbar::new(outbound_tx);
        let loopback = crossbar.register(
            config.services.loopback_port,
            config.services.loopback_depth,
        )?;
        let rtp_transmitter = crossbar.transmitter(config.stream.source_port);
        let packetizer = RtpPacketizer::new(RtpSession::from_config(&config.stream))?;
        let iface = NetworkInterface::new(config, crossbar);

        let (crossing, link_handles) = spawn_link(
            device,
            config.interface.link_queue_depth,
            Arc::clone(&self.running),
        )?;
        self.link = link_handles;

        let running = Arc::clone(&self.running);
        self.spawn_stage("stack", move || {
            run_stack(iface, crossing, outbound_rx, running).map(drop)
        })?;

        self.spawn_stage("loopback", move || run_loopback(loopback))?;

        let (beat_tx, beat_rx) = bounded(config.stream.queue_depth);
        self.spawn_stage("rtp", move || packetizer.run(beat_rx, rtp_transmitter))?;

        let running = Arc::clone(&self.running);
        self.spawn_stage("source", move || {
            run_source(source.as_mut(), beat_tx, running)
        })?;
        Ok(())
    }

    fn spawn_stage<F>(&mut self, name: &'static str, body: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let result = body();
                if let Err(ref e) = result {
                    log::error!("{} thread failed: {}", name, e);
                    running.store(false, Ordering::Relaxed);
                }
                result
            })
            .map_err(|_| Error::ThreadSpawn(name))?;
        self.stages.push((name, handle));
        Ok(())
    }

    /// Stop and join whatever a failed start left running, passing `error`
    /// back to the caller
    fn abort(self, error: Error) -> Error {
        log::error!("Pipeline start failed: {}", error);
        self.running.store(false, Ordering::Relaxed);
        if let Err(e) = self.join() {
            log::debug!("Stage error during abort: {}", e);
        }
        error
    }

    /// Shared run flag; clearing it stops the pipeline
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Whether any stage thread has exited
    pub fn is_finished(&self) -> bool {
        self.stages.iter().any(|(_, handle)| handle.is_finished())
    }

    /// Stop all stages and wait for them
    pub fn shutdown(self) -> Result<()> {
        self.running.store(false, Ordering::Relaxed);
        self.join()
    }

    /// Wait for every thread; returns the first stage failure
    pub fn join(self) -> Result<()> {
        let mut outcome = Ok(());
        for (name, handle) in self.stages {
            let result = match handle.join() {
                Ok(result) => result,
                Err(_) => {
                    log::error!("{} thread panicked", name);
                    Err(Error::StagePanicked(name))
                }
            };
            if outcome.is_ok() {
                outcome = result;
            }
        }
        for handle in self.link {
            if handle.join().is_err() {
                log::error!("Link thread panicked");
                if outcome.is_ok() {
                    outcome = Err(Error::StagePanicked("link"));
                }
            }
        }
        log::info!("Pipeline stopped");
        outcome
    }
}

/// Open the configured frame source and start it
pub fn build_source(config: &SourceConfig) -> Result<Box<dyn StreamSource>> {
    match config.kind {
        SourceKind::Generator => {
            let mut generator = FrameGenerator::new();
            generator.start(config.width, config.height, config.bytes_per_pixel)?;
            log::info!(
                "Frame generator {}x{}x{}",
                config.width,
                config.height,
                config.bytes_per_pixel
            );
            Ok(Box::new(generator))
        }
        SourceKind::Dma => {
            let frame_bytes = config.frame_bytes();
            if frame_bytes as u64 > BUFFER_SIZE {
                return Err(Error::InvalidParameter(format!(
                    "frame of {} bytes exceeds the {} byte buffer window",
                    frame_bytes, BUFFER_SIZE
                )));
            }
            let base = window_offset(config.buffer_index)?;
            let memory = DeviceMemory::open(&config.device)?;
            let mut reader = DmaReader::new(memory, config.word_order);
            reader.start(base, frame_bytes)?;
            log::info!(
                "DMA reader on {} window {} ({:#x})",
                config.device,
                config.buffer_index,
                base
            );
            Ok(Box::new(reader))
        }
    }
}

/// UDP echo: every datagram goes back to its sender's address on our port
pub fn run_loopback(port: UdpPort) -> Result<()> {
    log::info!("UDP loopback on port {}", port.port);
    let mut echoed = 0u64;
    while let Ok(datagram) = port.rx.recv() {
        log::trace!(
            "Echoing {} bytes to {:?}",
            datagram.payload.len(),
            datagram.src_addr
        );
        if port.send(datagram.src_addr, port.port, datagram.payload).is_err() {
            break;
        }
        echoed += 1;
    }
    log::debug!("Loopback stopped after {} datagrams", echoed);
    Ok(())
}
