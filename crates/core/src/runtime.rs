//! Blocking bridge for async SDKs
//!
//! The client API is synchronous. Clients built on async drivers own a
//! [`BlockingRuntime`] and drive every SDK call through it. The runtime keeps
//! one worker thread so background tasks (connection drivers, SSH sessions)
//! make progress between calls.
//!
//! Must not be used from inside another tokio runtime.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;

#[derive(Debug)]
pub struct BlockingRuntime {
    runtime: Runtime,
}

impl BlockingRuntime {
    pub fn new() -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("urio-io")
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }

    /// Run a future to completion on the calling thread
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Like [`BlockingRuntime::block_on`], giving up after `timeout`
    pub fn block_on_timeout<F: Future>(
        &self,
        timeout: Duration,
        future: F,
    ) -> Result<F::Output, Elapsed> {
        self.runtime.block_on(tokio::time::timeout(timeout, future))
    }

    /// Run a future in the background on the worker thread
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }
}
