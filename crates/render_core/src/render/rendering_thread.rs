//! # Rendering Thread
//!
//! Owns the consumer side of the [`RenderCommandQueue`] together with the
//! [`RenderContext`] the commands operate on.
//!
//! ## Modes
//!
//! - **Threaded**: a named OS thread blocks on the queue and executes commands as
//!   they arrive
//! - **Manual**: no thread is spawned; the thread that called `start` is the
//!   rendering thread and drains the queue by calling [`RenderingThread::pump`]

use std::thread::JoinHandle;

use crossbeam_channel::bounded;

use crate::core::RenderCoreConfig;
use crate::render::command_queue::{ConsumerGuard, RenderCommandQueue, RenderCommandSink};
use crate::render::context::RenderContext;
use crate::render::rhi::Rhi;
use crate::render::{RenderError, RenderResult};

enum Backend {
    Threaded {
        handle: JoinHandle<RenderContext>,
    },
    Manual {
        context: Box<RenderContext>,
        _consumer: ConsumerGuard,
    },
}

/// Consumer of the render command queue
pub struct RenderingThread {
    queue: RenderCommandQueue,
    backend: Option<Backend>,
}

impl RenderingThread {
    /// Create the render context and start consuming commands
    pub fn start(config: RenderCoreConfig, rhi: Box<dyn Rhi>) -> RenderResult<Self> {
        config.validate()?;
        let queue = RenderCommandQueue::new();
        let threaded = config.threaded_rendering;
        let thread_name = config.render_thread_name.clone();
        let context = RenderContext::new(config, rhi);

        let backend = if threaded {
            let worker_queue = queue.clone();
            let (attached_tx, attached_rx) = bounded(1);
            let handle = std::thread::Builder::new().name(thread_name.clone()).spawn(move || {
                let mut context = context;
                let consumer = worker_queue.attach_consumer();
                let _ = attached_tx.send(());

                worker_queue.run_until_shutdown(&mut context);
                context.shutdown();

                drop(consumer);
                context
            })?;
            attached_rx.recv().map_err(|_| RenderError::RenderThreadPanicked)?;
            log::info!("[RENDER_THREAD] started '{}'", thread_name);
            Backend::Threaded { handle }
        } else {
            log::info!("[RENDER_THREAD] threaded rendering disabled, host thread consumes commands");
            Backend::Manual {
                _consumer: queue.attach_consumer(),
                context: Box::new(context),
            }
        };

        Ok(Self {
            queue,
            backend: Some(backend),
        })
    }

    /// Producer handle to the command queue
    pub fn queue(&self) -> RenderCommandQueue {
        self.queue.clone()
    }

    /// True when a dedicated rendering thread is running
    pub fn is_threaded(&self) -> bool {
        matches!(self.backend, Some(Backend::Threaded { .. }))
    }

    /// Enqueue a command
    pub fn enqueue<F>(&self, name: &'static str, command: F)
    where
        F: FnOnce(&mut RenderContext) + Send + 'static,
    {
        self.queue.enqueue(name, command);
    }

    /// Execute queued commands in manual mode. Threaded mode executes on its own and
    /// returns 0.
    pub fn pump(&mut self) -> RenderResult<usize> {
        match self.backend.as_mut() {
            Some(Backend::Manual { context, .. }) => {
                if !self.queue.is_in_rendering_thread() {
                    return Err(RenderError::NotRenderingThread);
                }
                Ok(self.queue.execute_pending(context))
            }
            Some(Backend::Threaded { .. }) => Ok(0),
            None => Err(RenderError::RenderThreadStopped),
        }
    }

    /// Block until every command enqueued so far has executed
    pub fn flush(&mut self) -> RenderResult<()> {
        if self.is_threaded() {
            self.queue.flush()
        } else {
            self.pump().map(|_| ())
        }
    }

    /// The render context, available in manual mode only
    pub fn context_mut(&mut self) -> Option<&mut RenderContext> {
        match self.backend.as_mut() {
            Some(Backend::Manual { context, .. }) => Some(context.as_mut()),
            _ => None,
        }
    }

    /// Drain outstanding commands, release every global resource and hand back the
    /// render context
    pub fn stop(mut self) -> RenderResult<RenderContext> {
        self.stop_backend()
    }

    fn stop_backend(&mut self) -> RenderResult<RenderContext> {
        match self.backend.take() {
            Some(Backend::Threaded { handle }) => {
                self.queue.request_shutdown();
                let context = handle.join().map_err(|_| RenderError::RenderThreadPanicked)?;
                log::info!("[RENDER_THREAD] stopped after {} commands", self.queue.executed_commands());
                Ok(context)
            }
            Some(Backend::Manual { mut context, _consumer }) => {
                self.queue.close();
                self.queue.execute_pending(&mut context);
                context.shutdown();
                Ok(*context)
            }
            None => Err(RenderError::RenderThreadStopped),
        }
    }
}

impl RenderCommandSink for RenderingThread {
    fn submit<F>(&mut self, name: &'static str, command: F)
    where
        F: FnOnce(&mut RenderContext) + Send + 'static,
    {
        self.queue.enqueue(name, command);
    }
}

impl Drop for RenderingThread {
    fn drop(&mut self) {
        if self.backend.is_some() {
            if let Err(err) = self.stop_backend() {
                log::error!("[RENDER_THREAD] failed to stop cleanly: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::rhi::NullRhi;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_manual_mode_pumps_on_host_thread() {
        let config = RenderCoreConfig::new().with_threaded_rendering(false);
        let mut thread = RenderingThread::start(config, Box::new(NullRhi::new())).unwrap();
        assert!(!thread.is_threaded());

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_command = Arc::clone(&ran);
        thread.enqueue("Count", move |_| {
            ran_in_command.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(thread.pump().unwrap(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(thread.queue().is_in_rendering_thread());
        assert!(thread.context_mut().is_some());
    }

    #[test]
    fn test_threaded_mode_runs_commands_off_the_caller_thread() {
        let config = RenderCoreConfig::new().with_render_thread_name("TestRender");
        let mut thread = RenderingThread::start(config, Box::new(NullRhi::new())).unwrap();
        assert!(thread.is_threaded());
        assert!(thread.context_mut().is_none());

        let queue = thread.queue();
        let observed = Arc::new(std::sync::Mutex::new(None));
        let observed_in_command = Arc::clone(&observed);
        let command_queue = queue.clone();
        queue.enqueue("RecordThread", move |_| {
            let name = std::thread::current().name().map(str::to_string);
            *observed_in_command.lock().unwrap() = Some((name, command_queue.is_in_rendering_thread()));
        });
        thread.flush().unwrap();

        let observed = observed.lock().unwrap().clone();
        assert_eq!(observed, Some((Some("TestRender".to_string()), true)));
        assert!(!queue.is_in_rendering_thread());

        thread.stop().unwrap();
        assert!(!queue.has_consumer());
        assert!(matches!(queue.flush(), Err(RenderError::NoRenderThread)));
    }

    #[test]
    fn test_stopped_thread_refuses_new_commands() {
        for threaded in [true, false] {
            let config = RenderCoreConfig::new().with_threaded_rendering(threaded);
            let thread = RenderingThread::start(config, Box::new(NullRhi::new())).unwrap();
            let queue = thread.queue();

            let ran = Arc::new(AtomicUsize::new(0));
            let ran_before = Arc::clone(&ran);
            queue.enqueue("Before", move |_| {
                ran_before.fetch_add(1, Ordering::SeqCst);
            });
            thread.stop().unwrap();
            assert_eq!(ran.load(Ordering::SeqCst), 1);
            assert!(queue.is_closed());

            let ran_after = Arc::clone(&ran);
            queue.enqueue("After", move |_| {
                ran_after.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(queue.enqueued_commands(), 1);
            assert_eq!(queue.pending_commands(), 0);
            assert_eq!(ran.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RenderCoreConfig::new().with_render_thread_name("");
        let result = RenderingThread::start(config, Box::new(NullRhi::new()));
        assert!(matches!(result, Err(RenderError::Config(_))));
    }
}
