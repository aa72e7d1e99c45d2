//! Dedicated, optionally core-pinned, threads for event processors.
//!
//! ```rust,ignore
//! let thread = ProcessorThread::builder()
//!     .name("journaler")
//!     .core(2)
//!     .spawn(processor)?;
//! // ...
//! thread.halt();
//! thread.join()?;
//! ```

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{KaosError, Result};
use crate::processor::{EventProcessor, ProcessorControl};
use crate::sequence::Sequence;

/// Pin current thread to a specific CPU core.
#[cfg(target_os = "linux")]
pub fn pin_to_core(core_id: usize) -> io::Result<()> {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_SETSIZE, CPU_ZERO};

    if core_id >= CPU_SETSIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "core id beyond CPU_SETSIZE",
        ));
    }

    let mut set: cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe {
        CPU_ZERO(&mut set);
        CPU_SET(core_id, &mut set);

        if sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &set) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_core(_core_id: usize) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "Linux only"))
}

#[derive(Debug, Default)]
pub struct ProcessorThreadBuilder {
    name: Option<String>,
    core: Option<usize>,
}

impl ProcessorThreadBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Pin the thread to `core`. A failed pin is logged, not fatal.
    pub fn core(mut self, core: usize) -> Self {
        self.core = Some(core);
        self
    }

    pub fn spawn<P>(self, mut processor: P) -> Result<ProcessorThread>
    where
        P: EventProcessor + 'static,
    {
        let control = processor.control();
        let sequence = processor.sequence();
        let core = self.core;

        let mut builder = thread::Builder::new();
        if let Some(name) = self.name {
            builder = builder.name(name);
        }

        let handle = builder.spawn(move || {
            if let Some(core) = core {
                if let Err(error) = pin_to_core(core) {
                    trace_warn!(core, %error, "failed to pin processor thread");
                }
            }
            processor.run()
        })?;

        Ok(ProcessorThread {
            control,
            sequence,
            handle: Some(handle),
        })
    }
}

/// A processor running on its own OS thread. Dropping it halts and joins.
pub struct ProcessorThread {
    control: ProcessorControl,
    sequence: Arc<Sequence>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl ProcessorThread {
    pub fn builder() -> ProcessorThreadBuilder {
        ProcessorThreadBuilder::default()
    }

    /// Spawn on an unnamed, unpinned thread.
    pub fn spawn<P>(processor: P) -> Result<Self>
    where
        P: EventProcessor + 'static,
    {
        Self::builder().spawn(processor)
    }

    pub fn control(&self) -> &ProcessorControl {
        &self.control
    }

    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    pub fn halt(&self) {
        self.control.halt();
    }

    /// Wait for the processor to stop and return what its `run` returned.
    pub fn join(mut self) -> Result<()> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| KaosError::IllegalState("processor thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for ProcessorThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.control.halt();
            if let Err(error) = self.join_inner() {
                trace_warn!(%error, "processor thread ended with error");
            }
        }
    }
}
