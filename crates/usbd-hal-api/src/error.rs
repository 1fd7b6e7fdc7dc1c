//! Error taxonomy shared by the controller driver and the audio processing
//! core (spec §7): input validation, resource exhaustion, transient
//! bus/hardware, and protocol/correction errors all resolve to one of
//! these two enums rather than a per-module ad hoc type.

/// Errors a controller driver reports to its caller or to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DrvError {
    /// Requested endpoint type/max-packet-size combination is not legal.
    InvalidEndpoint,
    /// The 128-slot / 8 KB FIFO buffer pool has no room left for this pipe.
    FifoPoolExhausted,
    /// No DFIFO channel was free; caller may retry on CFIFO.
    DfifoUnavailable,
    /// A PID transition did not complete within its bounded spin.
    PidTimeout,
    /// The DMA engine reported a channel error mid-transfer.
    DmaChannelError,
    /// The setup-packet queue was full when a new packet arrived.
    SetupQueueOverflow,
    /// The endpoint was aborted while a transfer was outstanding.
    Aborted,
    /// No pipe is open for the given endpoint address.
    NoSuchEndpoint,
}

/// Errors the audio processing core reports across its boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioError {
    /// Control selector not recognized by the addressed entity.
    InvalidSelector,
    /// Channel index exceeded the entity's channel count, or the 0xFF
    /// bulk-set second form was used where only per-channel set is legal.
    ChannelOutOfRange,
    /// Request form (wValue/wIndex encoding) is not one the entity accepts.
    InvalidRequestForm,
    /// Payload length did not match what the control expects.
    InvalidAttribute,
    /// MIN/MAX/RES was requested on a control that only accepts CUR.
    UnsupportedRequestType,
    /// The codec driver returned `None`/unsupported for this control.
    Unsupported,
    /// No free AS IF slot in the arena.
    NoFreeAsIf,
    /// The ring's descriptor pool is exhausted.
    RingExhausted,
    /// A handle's generation did not match the AS IF's current generation;
    /// the completion belongs to a stream that has since been stopped.
    StaleHandle,
    /// A mutex acquisition (per-AS-IF or ring-buffer-queue lock) timed out.
    LockTimeout,
    /// Sampling frequency value is outside the endpoint's advertised range
    /// or enumerated list.
    InvalidSamplingFrequency,
}
