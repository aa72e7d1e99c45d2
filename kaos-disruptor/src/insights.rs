//! Runtime insight hooks.
//!
//! Zero-cost when the `tracing` feature is off. With it on, events are
//! emitted at TRACE level under the `kaos_disruptor::insights` target so
//! they can be filtered independently of lifecycle logging.

/// A producer found the ring full: `wrap_point` is ahead of the slowest
/// gating sequence `gating`. Emitted once per stalled claim.
#[inline]
pub fn record_backpressure(wrap_point: i64, gating: i64) {
    #[cfg(feature = "tracing")]
    tracing::trace!(
        target: "kaos_disruptor::insights",
        wrap_point,
        gating,
        "producer waiting on gating sequence"
    );
    #[cfg(not(feature = "tracing"))]
    let _ = (wrap_point, gating);
}

/// A processor is about to deliver a batch of `size` events.
#[inline]
pub fn record_batch(size: i64) {
    #[cfg(feature = "tracing")]
    tracing::trace!(target: "kaos_disruptor::insights", size, "delivering batch");
    #[cfg(not(feature = "tracing"))]
    let _ = size;
}
