//! Configuration structs, one per subsystem, each `Default` plus a
//! `validate()` following `a2dp_app::config::AppConfig::validate` (return
//! `Result<(), &'static str>` rather than panicking on a bad value).

/// Controller-driver-wide configuration.
#[derive(Debug, Clone, Copy)]
pub struct UsbhsCfg {
    /// Capacity of the setup-packet queue (spec §3 "Setup-Packet Queue").
    pub setup_queue_capacity: usize,
    /// Total FIFO buffer pool, in 64-byte units. The hardware pool is
    /// fixed at 8 KiB / 128 slots; this exists so tests can shrink it.
    pub fifo_pool_slots: u16,
    /// First slot bulk/isochronous pipes may use; slots below this are
    /// reserved for control/interrupt endpoints (spec §4.1).
    pub bulk_iso_base_slot: u16,
    /// Bounded spin, in microseconds, for a PID transition to complete.
    pub pid_spin_bound_us: u32,
    /// Bounded spin, in microseconds, for an ordinary hardware poll.
    pub poll_bound_us: u32,
    /// Number of agreeing VBUS samples required, spaced
    /// `vbus_debounce_interval_us` apart.
    pub vbus_debounce_samples: u8,
    pub vbus_debounce_interval_us: u32,
}

impl Default for UsbhsCfg {
    fn default() -> Self {
        Self {
            setup_queue_capacity: 4,
            fifo_pool_slots: 128,
            bulk_iso_base_slot: 8,
            pid_spin_bound_us: 200,
            poll_bound_us: 4,
            vbus_debounce_samples: 3,
            vbus_debounce_interval_us: 10,
        }
    }
}

impl UsbhsCfg {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.setup_queue_capacity == 0 {
            return Err("setup queue capacity must be nonzero");
        }
        if self.bulk_iso_base_slot as u32 >= self.fifo_pool_slots as u32 {
            return Err("bulk/iso base slot must leave room in the FIFO pool");
        }
        if self.pid_spin_bound_us == 0 || self.poll_bound_us == 0 {
            return Err("spin bounds must be nonzero");
        }
        if self.vbus_debounce_samples == 0 {
            return Err("VBUS debounce requires at least one sample");
        }
        Ok(())
    }
}

/// Per-AS-IF-settings streaming configuration (spec §3 "AS IF Settings").
#[derive(Debug, Clone, Copy)]
pub struct AudioStreamingCfg {
    /// Number of buffer descriptors in the ring (`BufTotalNbr`).
    pub buf_total_nbr: u16,
    /// Nominal length in bytes of one ring buffer block (`BufTotalLen`).
    pub buf_total_len: u16,
    /// Number of pre-buffered blocks required before priming completes
    /// (`StreamPreBufMax`).
    pub stream_pre_buf_max: u16,
    /// USB frames between successive built-in/synch correction
    /// evaluations (`CorrPeriod`).
    pub corr_period_frames: u32,
    /// Positive buffer-difference threshold for heavy correction.
    pub corr_boundary_heavy_pos: i32,
    /// Negative buffer-difference threshold for heavy correction.
    pub corr_boundary_heavy_neg: i32,
    /// Positive buffer-difference threshold for light correction
    /// (synch feedback only).
    pub corr_boundary_light_pos: i32,
    /// Negative buffer-difference threshold for light correction
    /// (synch feedback only).
    pub corr_boundary_light_neg: i32,
    /// Mutex acquisition timeout, in milliseconds (spec §5).
    pub lock_timeout_ms: u32,
}

impl Default for AudioStreamingCfg {
    fn default() -> Self {
        Self {
            buf_total_nbr: 8,
            buf_total_len: 192,
            stream_pre_buf_max: 4,
            corr_period_frames: 1000,
            corr_boundary_heavy_pos: 4,
            corr_boundary_heavy_neg: -4,
            corr_boundary_light_pos: 2,
            corr_boundary_light_neg: -2,
            lock_timeout_ms: 1000,
        }
    }
}

impl AudioStreamingCfg {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.buf_total_nbr < 2 {
            return Err("ring needs at least two buffer descriptors");
        }
        if self.buf_total_len == 0 {
            return Err("buffer block length must be nonzero");
        }
        if self.stream_pre_buf_max == 0 || self.stream_pre_buf_max >= self.buf_total_nbr {
            return Err("pre-buffer target must be nonzero and below the ring size");
        }
        if self.corr_period_frames == 0 {
            return Err("correction period must be nonzero");
        }
        if self.corr_boundary_heavy_pos <= self.corr_boundary_light_pos {
            return Err("heavy-positive threshold must exceed light-positive");
        }
        if self.corr_boundary_heavy_neg >= self.corr_boundary_light_neg {
            return Err("heavy-negative threshold must be below light-negative");
        }
        if self.lock_timeout_ms == 0 {
            return Err("lock timeout must be nonzero");
        }
        Ok(())
    }
}
