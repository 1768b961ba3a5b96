//! # Render Command Queue
//!
//! Multi-producer, single-consumer FIFO of deferred closures. This is the only way
//! code running off the rendering thread may touch GPU-backed state: it enqueues a
//! named closure that later runs on the consumer with exclusive access to the
//! [`RenderContext`].
//!
//! ## Ordering
//!
//! - Commands from one producer execute in enqueue order
//! - No ordering is promised between different producers
//! - [`RenderCommandQueue::flush`] returns once everything enqueued before it has run

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::render::context::RenderContext;
use crate::render::{RenderError, RenderResult};

/// How often a blocked `flush` re-checks that a consumer is still attached
const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Boxed render command
pub type RenderCommandFn = Box<dyn FnOnce(&mut RenderContext) + Send + 'static>;

/// Destination for render commands.
///
/// Implemented by the queue (deferred execution) and by the render context itself
/// (immediate execution, for code already running on the rendering thread).
pub trait RenderCommandSink {
    /// Run `command` on the rendering thread
    fn submit<F>(&mut self, name: &'static str, command: F)
    where
        F: FnOnce(&mut RenderContext) + Send + 'static;
}

pub(crate) enum QueueMessage {
    Command { name: &'static str, command: RenderCommandFn },
    Fence(Sender<()>),
    Shutdown,
}

static NEXT_THREAD_SERIAL: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_SERIAL: u64 = NEXT_THREAD_SERIAL.fetch_add(1, Ordering::Relaxed);
}

fn current_thread_serial() -> u64 {
    THREAD_SERIAL.with(|serial| *serial)
}

#[derive(Debug, Default)]
struct QueueShared {
    /// Serial of the consuming thread, 0 when none is attached
    consumer: AtomicU64,
    enqueued: AtomicU64,
    executed: AtomicU64,
    /// Set once the consumer has been told to stop; later commands are refused
    closed: AtomicBool,
}

/// Marks the current thread as the queue's consumer until dropped
pub(crate) struct ConsumerGuard {
    shared: Arc<QueueShared>,
    serial: u64,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        let _ = self
            .shared
            .consumer
            .compare_exchange(self.serial, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Logs the name of a command that panics while executing
struct CommandScope {
    name: &'static str,
}

impl Drop for CommandScope {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!("[RENDER_QUEUE] render command '{}' panicked", self.name);
        }
    }
}

/// Cloneable handle to the render command FIFO
#[derive(Clone)]
pub struct RenderCommandQueue {
    sender: Sender<QueueMessage>,
    receiver: Receiver<QueueMessage>,
    shared: Arc<QueueShared>,
}

impl RenderCommandQueue {
    /// Create an empty queue with no consumer attached
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            shared: Arc::new(QueueShared::default()),
        }
    }

    /// Enqueue a command for the rendering thread
    pub fn enqueue<F>(&self, name: &'static str, command: F)
    where
        F: FnOnce(&mut RenderContext) + Send + 'static,
    {
        if self.is_closed() {
            log::warn!("[RENDER_QUEUE] rendering stopped, refused '{}'", name);
            return;
        }
        log::trace!("[RENDER_QUEUE] enqueue '{}'", name);
        self.shared.enqueued.fetch_add(1, Ordering::AcqRel);
        if self
            .sender
            .send(QueueMessage::Command {
                name,
                command: Box::new(command),
            })
            .is_err()
        {
            log::error!("[RENDER_QUEUE] queue disconnected, dropped '{}'", name);
        }
    }

    /// True when called on the thread currently consuming this queue
    pub fn is_in_rendering_thread(&self) -> bool {
        let consumer = self.shared.consumer.load(Ordering::Acquire);
        consumer != 0 && consumer == current_thread_serial()
    }

    /// True once rendering has stopped and the queue no longer accepts commands
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// True while some thread is consuming this queue
    pub fn has_consumer(&self) -> bool {
        self.shared.consumer.load(Ordering::Acquire) != 0
    }

    /// Commands enqueued so far
    pub fn enqueued_commands(&self) -> u64 {
        self.shared.enqueued.load(Ordering::Acquire)
    }

    /// Commands executed so far
    pub fn executed_commands(&self) -> u64 {
        self.shared.executed.load(Ordering::Acquire)
    }

    /// Commands enqueued but not yet executed
    pub fn pending_commands(&self) -> u64 {
        self.enqueued_commands().saturating_sub(self.executed_commands())
    }

    /// Block until every command enqueued before this call has executed.
    ///
    /// Fails instead of deadlocking when called on the rendering thread itself or
    /// when no consumer is attached.
    pub fn flush(&self) -> RenderResult<()> {
        if self.is_in_rendering_thread() {
            return Err(RenderError::FlushFromRenderThread);
        }
        if !self.has_consumer() {
            return Err(RenderError::NoRenderThread);
        }

        let (signal, done) = bounded(1);
        self.sender
            .send(QueueMessage::Fence(signal))
            .map_err(|_| RenderError::QueueDisconnected)?;

        loop {
            match done.recv_timeout(FLUSH_POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.has_consumer() {
                        return Err(RenderError::RenderThreadStopped);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(RenderError::QueueDisconnected),
            }
        }
    }

    /// Make the calling thread the consumer
    pub(crate) fn attach_consumer(&self) -> ConsumerGuard {
        let serial = current_thread_serial();
        let previous = self.shared.consumer.swap(serial, Ordering::AcqRel);
        if previous != 0 && previous != serial {
            log::warn!("[RENDER_QUEUE] consumer replaced while another thread was attached");
        }
        ConsumerGuard {
            shared: Arc::clone(&self.shared),
            serial,
        }
    }

    /// Stop accepting commands. Those already enqueued still execute.
    pub(crate) fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    /// Close the queue and ask a blocking consumer to return after the commands
    /// already enqueued
    pub(crate) fn request_shutdown(&self) {
        self.close();
        let _ = self.sender.send(QueueMessage::Shutdown);
    }

    /// Execute everything currently queued without blocking. Returns the number of
    /// commands executed.
    pub(crate) fn execute_pending(&self, context: &mut RenderContext) -> usize {
        let mut executed = 0;
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                QueueMessage::Command { name, command } => {
                    self.execute(name, command, context);
                    executed += 1;
                }
                QueueMessage::Fence(signal) => {
                    let _ = signal.send(());
                }
                QueueMessage::Shutdown => {
                    log::debug!("[RENDER_QUEUE] shutdown request ignored by non-blocking consumer");
                }
            }
        }
        executed
    }

    /// Block on the queue until a shutdown request arrives
    pub(crate) fn run_until_shutdown(&self, context: &mut RenderContext) {
        while let Ok(message) = self.receiver.recv() {
            match message {
                QueueMessage::Command { name, command } => self.execute(name, command, context),
                QueueMessage::Fence(signal) => {
                    let _ = signal.send(());
                }
                QueueMessage::Shutdown => break,
            }
        }
    }

    fn execute(&self, name: &'static str, command: RenderCommandFn, context: &mut RenderContext) {
        log::trace!("[RENDER_QUEUE] execute '{}'", name);
        let _scope = CommandScope { name };
        command(context);
        self.shared.executed.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for RenderCommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RenderCommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCommandQueue")
            .field("enqueued", &self.enqueued_commands())
            .field("executed", &self.executed_commands())
            .field("has_consumer", &self.has_consumer())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RenderCommandSink for RenderCommandQueue {
    fn submit<F>(&mut self, name: &'static str, command: F)
    where
        F: FnOnce(&mut RenderContext) + Send + 'static,
    {
        self.enqueue(name, command);
    }
}

impl RenderCommandSink for RenderContext {
    fn submit<F>(&mut self, name: &'static str, command: F)
    where
        F: FnOnce(&mut RenderContext) + Send + 'static,
    {
        log::trace!("[RENDER_QUEUE] execute '{}' immediately", name);
        command(self);
    }
}
