//! The serial handler.
//!
//! One background thread reads the input stream byte by byte, reassembles
//! frames and routes them: responses to the transaction table, events to
//! the listeners. Callers write commands directly under the write lock.
//! A small tokio runtime runs transaction timeouts and listener calls.

use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bgapi_protocol::{BgapiCommand, BgapiEvent, BgapiPacket, BgapiResponse, FrameReader, FrameStatus, PacketRegistry};
use futures::future::{self, BoxFuture, FutureExt};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};

use crate::config::HandlerConfig;
use crate::error::TransportError;
use crate::listener::{BgapiEventListener, BgapiHandlerListener, EventQueue, ListenerSet};
use crate::stats::{HandlerStats, StatsCounters};
use crate::transaction::{TransactionManager, TransactionResult};
use crate::writer::{hex, FrameWriter};

/// Upper bound on bytes drained by `flush_on_connect`.
const FLUSH_LIMIT: usize = 4096;

/// Poll interval while waiting for the reader thread to stop.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State shared by the reader thread, transaction workers and callers.
struct Shared {
    registry: Arc<PacketRegistry>,
    config: HandlerConfig,
    writer: FrameWriter,
    transactions: TransactionManager,
    /// Held from registration through the write, so transactions with the
    /// same key are registered in the order their commands hit the wire.
    send_order: Mutex<()>,
    event_listeners: ListenerSet<EventQueue>,
    handler_listeners: ListenerSet<dyn BgapiHandlerListener>,
    stats: Arc<StatsCounters>,
    runtime: Handle,
    /// Asks the reader to stop.
    shutdown: AtomicBool,
    /// Set once the link has terminated.
    closed: AtomicBool,
}

/// Handler for one BGAPI link.
///
/// `BgapiHandler` is `Send + Sync`; share it behind an `Arc` to issue
/// commands from several threads.
pub struct BgapiHandler {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    runtime: Mutex<Option<Runtime>>,
}

impl BgapiHandler {
    /// Start a handler over an input/output stream pair.
    ///
    /// `input` should have a read timeout so the reader can observe
    /// `close`; a reader blocked in `read` is detached after
    /// `close_timeout`.
    pub fn connect<R, W>(
        mut input: R,
        output: W,
        registry: Arc<PacketRegistry>,
        config: HandlerConfig,
    ) -> Result<Self, TransportError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("bgapi-worker")
            .enable_all()
            .build()
            .map_err(|e| {
                error!("Failed to create runtime: {}", e);
                TransportError::Runtime(e.to_string())
            })?;

        if config.flush_on_connect {
            let flushed = drain_input(&mut input);
            if flushed > 0 {
                debug!("Flushed {} stale bytes from input", flushed);
            }
        }

        let shared = Arc::new(Shared {
            registry,
            config,
            writer: FrameWriter::new(output),
            transactions: TransactionManager::new(),
            send_order: Mutex::new(()),
            event_listeners: ListenerSet::new(),
            handler_listeners: ListenerSet::new(),
            stats: Arc::new(StatsCounters::default()),
            runtime: runtime.handle().clone(),
            shutdown: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let reader_shared = Arc::clone(&shared);
        let reader = thread::Builder::new()
            .name("bgapi-reader".to_string())
            .spawn(move || reader_shared.read_loop(input));
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn reader thread: {}", e);
                runtime.shutdown_background();
                return Err(e.into());
            }
        };

        info!(
            "BGAPI handler started ({} decoders, timeout {:?})",
            shared.registry.len(),
            shared.config.transaction_timeout
        );

        Ok(Self {
            shared,
            reader: Mutex::new(Some(reader)),
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// Write a command without waiting for its response.
    ///
    /// A response that arrives later finds no transaction and is counted
    /// as unmatched.
    pub fn queue_command(&self, command: &BgapiCommand) -> Result<(), TransportError> {
        self.shared.write(command)
    }

    /// Send a command and resolve with its response, using the configured
    /// transaction timeout.
    pub fn send_async(&self, command: BgapiCommand) -> BoxFuture<'static, TransactionResult> {
        let timeout = self.shared.config.transaction_timeout;
        self.send_async_with_timeout(command, timeout)
    }

    /// Send a command with an explicit timeout. `None` waits until the
    /// response arrives or the link closes.
    ///
    /// The command is written before this returns; the future only waits.
    /// It may be polled by any executor.
    pub fn send_async_with_timeout(
        &self,
        command: BgapiCommand,
        timeout: Option<Duration>,
    ) -> BoxFuture<'static, TransactionResult> {
        let key = match command.expected_response() {
            Some(key) => key,
            None => {
                return future::ready(Err(TransportError::NoResponseExpected(command.key()))).boxed()
            }
        };

        let (seq, rx) = {
            let _order = self.shared.send_order.lock();
            let (seq, rx) = match self.shared.transactions.register(key, command.connection()) {
                Ok(registered) => registered,
                Err(e) => return future::ready(Err(e)).boxed(),
            };
            if let Err(e) = self.shared.write(&command) {
                self.shared.transactions.cancel(seq);
                return future::ready(Err(e)).boxed();
            }
            (seq, rx)
        };

        let shared = Arc::clone(&self.shared);
        let worker = self.shared.runtime.spawn(async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(outcome) => outcome.unwrap_or(Err(TransportError::ConnectionClosed)),
                    Err(_) => {
                        shared.transactions.cancel(seq);
                        warn!("Transaction {} for {} timed out after {:?}", seq, key, limit);
                        Err(TransportError::Timeout(limit))
                    }
                },
                None => rx.await.unwrap_or(Err(TransportError::ConnectionClosed)),
            }
        });

        // A worker cancelled by runtime shutdown means the handler is gone.
        async move { worker.await.unwrap_or(Err(TransportError::ConnectionClosed)) }.boxed()
    }

    /// Send a command and block until its response arrives.
    ///
    /// Do not call from an async task; use `send_async` there.
    pub fn send(&self, command: BgapiCommand) -> TransactionResult {
        futures::executor::block_on(self.send_async(command))
    }

    pub fn add_event_listener(&self, listener: Arc<dyn BgapiEventListener>) -> bool {
        self.shared.event_listeners.add_listener(listener)
    }

    /// Events already queued for the listener are still delivered.
    pub fn remove_event_listener(&self, listener: &Arc<dyn BgapiEventListener>) -> bool {
        self.shared.event_listeners.remove_listener(listener)
    }

    pub fn add_handler_listener(&self, listener: Arc<dyn BgapiHandlerListener>) -> bool {
        self.shared.handler_listeners.add(listener)
    }

    pub fn remove_handler_listener(&self, listener: &Arc<dyn BgapiHandlerListener>) -> bool {
        self.shared.handler_listeners.remove(listener)
    }

    /// False once the link has been closed or has failed.
    pub fn is_alive(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> HandlerStats {
        self.shared.stats.snapshot()
    }

    /// Transactions still waiting for a response.
    pub fn pending_transactions(&self) -> usize {
        self.shared.transactions.len()
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.shared.config
    }

    /// Stop the handler.
    ///
    /// Fails every outstanding transaction with `ConnectionClosed`,
    /// notifies handler listeners, waits up to `close_timeout` for the
    /// reader thread and shuts the worker runtime down. Safe to call more
    /// than once and from any thread, including listener callbacks.
    pub fn close(&self) {
        self.shared.terminate(TransportError::ConnectionClosed);

        if let Some(reader) = self.reader.lock().take() {
            if reader.thread().id() == thread::current().id() {
                debug!("close() called on the reader thread; not joining");
            } else {
                let deadline = Instant::now() + self.shared.config.close_timeout;
                while !reader.is_finished() && Instant::now() < deadline {
                    thread::sleep(CLOSE_POLL_INTERVAL);
                }
                if reader.is_finished() {
                    if reader.join().is_err() {
                        warn!("Reader thread panicked");
                    }
                } else {
                    warn!(
                        "Reader thread did not stop within {:?}; detaching",
                        self.shared.config.close_timeout
                    );
                }
            }
        }

        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
            info!("BGAPI handler closed");
        }
    }
}

impl Drop for BgapiHandler {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn write(&self, command: &BgapiCommand) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }
        match self.writer.write_command(command) {
            Ok(_) => {
                StatsCounters::incr(&self.stats.commands_written);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to write {}: {}", command.key(), e);
                Err(e)
            }
        }
    }

    fn read_loop<R: Read>(&self, mut input: R) {
        debug!("Reader thread started");
        let mut framer = FrameReader::new();
        let mut byte = [0u8; 1];
        let mut read_errors = 0u32;

        let cause = loop {
            if self.shutdown.load(Ordering::Acquire) {
                break TransportError::ConnectionClosed;
            }
            match input.read(&mut byte) {
                Ok(0) => {
                    info!("Input stream ended");
                    break TransportError::ConnectionClosed;
                }
                Ok(_) => {
                    read_errors = 0;
                    self.push_byte(&mut framer, byte[0]);
                }
                Err(e) if is_idle(&e) => continue,
                Err(e) => {
                    read_errors += 1;
                    if read_errors > self.config.max_read_errors {
                        error!("Read failed {} times in a row, giving up: {}", read_errors, e);
                        break TransportError::from(e);
                    }
                    warn!("Read error ({}/{}): {}", read_errors, self.config.max_read_errors, e);
                }
            }
        };

        self.terminate(cause);
        debug!("Reader thread stopped");
    }

    fn push_byte(&self, framer: &mut FrameReader, byte: u8) {
        match framer.push(byte) {
            FrameStatus::Pending => {}
            FrameStatus::Resync { discarded, .. } => {
                StatsCounters::incr(&self.stats.resyncs);
                StatsCounters::add(&self.stats.bytes_discarded, discarded as u64);
            }
            FrameStatus::Frame(frame) => {
                StatsCounters::incr(&self.stats.frames_received);
                trace!("RX [{}]", hex(&frame));
                match self.registry.decode(&frame) {
                    Ok(BgapiPacket::Event(event)) => self.dispatch(event),
                    Ok(BgapiPacket::Response(response)) => self.complete(response),
                    Err(e) => {
                        StatsCounters::incr(&self.stats.decode_failures);
                        debug!("Dropping frame: {}", e);
                    }
                }
            }
        }
    }

    fn complete(&self, response: BgapiResponse) {
        match self.transactions.complete(response) {
            Ok(()) => StatsCounters::incr(&self.stats.responses_matched),
            Err(response) => {
                StatsCounters::incr(&self.stats.responses_unmatched);
                warn!("Discarding unsolicited response {}", response.key());
            }
        }
    }

    fn dispatch(&self, event: BgapiEvent) {
        StatsCounters::incr(&self.stats.events_dispatched);
        let queues = self.event_listeners.snapshot();
        if queues.is_empty() {
            trace!("No listeners for {}", event.key());
            return;
        }

        let event = Arc::new(event);
        for queue in queues.iter() {
            if !queue.push(Arc::clone(&event)) {
                continue;
            }
            let queue = Arc::clone(queue);
            let stats = Arc::clone(&self.stats);
            self.runtime.spawn_blocking(move || {
                queue.drain(|event| {
                    warn!("Event listener panicked handling {}", event.key());
                    StatsCounters::incr(&stats.listener_panics);
                })
            });
        }
    }

    /// Tear the link down once. Later calls are no-ops.
    fn terminate(&self, cause: TransportError) {
        self.shutdown.store(true, Ordering::Release);
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        match &cause {
            TransportError::ConnectionClosed => info!("BGAPI link closed"),
            other => error!("BGAPI link failed: {}", other),
        }

        self.transactions.fail_all(&cause);

        for listener in self.handler_listeners.snapshot().iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.bgapi_closed(&cause)));
            if outcome.is_err() {
                warn!("Handler listener panicked");
                StatsCounters::incr(&self.stats.listener_panics);
            }
        }
    }
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Read and discard whatever is already buffered on the input.
fn drain_input<R: Read>(input: &mut R) -> usize {
    let mut buf = [0u8; 256];
    let mut total = 0;
    while total < FLUSH_LIMIT {
        match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(_) => break,
        }
    }
    total
}
