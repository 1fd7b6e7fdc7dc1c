//! DFIFO channel pool (spec §3 "FIFO Channel", §4.1 "FIFO acquisition").
//!
//! Two DMA-capable channels (D0FIFO, D1FIFO) are shared process-wide.
//! Acquisition and release flip a bit in a small bitmap under a
//! [`critical_section`], matching the short-critical-section discipline
//! used for every other cross-context shared flag in this driver.

use core::cell::Cell;

/// One of the two DMA-capable FIFO channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfifoChannel {
    D0,
    D1,
}

pub struct DfifoPool {
    // bit 0 = D0 owned, bit 1 = D1 owned.
    owned: critical_section::Mutex<Cell<u8>>,
}

impl DfifoPool {
    pub const fn new() -> Self {
        Self {
            owned: critical_section::Mutex::new(Cell::new(0)),
        }
    }

    /// Attempts to acquire a free DFIFO channel. Returns `None` if both
    /// are owned; the caller falls back to CFIFO (spec §4.1).
    pub fn acquire(&self) -> Option<DfifoChannel> {
        critical_section::with(|cs| {
            let cell = self.owned.borrow(cs);
            let bits = cell.get();
            if bits & 0b01 == 0 {
                cell.set(bits | 0b01);
                Some(DfifoChannel::D0)
            } else if bits & 0b10 == 0 {
                cell.set(bits | 0b10);
                Some(DfifoChannel::D1)
            } else {
                None
            }
        })
    }

    pub fn release(&self, channel: DfifoChannel) {
        critical_section::with(|cs| {
            let cell = self.owned.borrow(cs);
            let mask = match channel {
                DfifoChannel::D0 => 0b01,
                DfifoChannel::D1 => 0b10,
            };
            cell.set(cell.get() & !mask);
        });
    }

    #[cfg(test)]
    fn is_owned(&self, channel: DfifoChannel) -> bool {
        critical_section::with(|cs| {
            let bits = self.owned.borrow(cs).get();
            match channel {
                DfifoChannel::D0 => bits & 0b01 != 0,
                DfifoChannel::D1 => bits & 0b10 != 0,
            }
        })
    }
}

impl Default for DfifoPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_both_then_refuses_a_third() {
        let pool = DfifoPool::new();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn release_frees_the_channel_for_reacquisition() {
        let pool = DfifoPool::new();
        let a = pool.acquire().unwrap();
        pool.acquire().unwrap();
        pool.release(a);
        assert!(!pool.is_owned(a));
        let c = pool.acquire().unwrap();
        assert_eq!(c, a);
    }
}
