//! Pipe allocation (spec §3 "Endpoint / Pipe", §4.1 "Pipe allocation").
//!
//! A pipe binds one logical endpoint number to a reserved FIFO buffer
//! region, transfer type, direction, max-packet-size and the
//! double-buffered/continuous-mode policy flags. Control and interrupt
//! endpoints get a fixed 64-byte slot; bulk and isochronous endpoints are
//! packed starting at [`UsbhsCfg::bulk_iso_base_slot`] out of the shared
//! 128-slot pool.

use usbd_hal_api::{config::UsbhsCfg, types::Direction, DrvError, TransferType};

const SLOT_BYTES: u16 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pipe {
    pub ep_number: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
    /// Starting slot index into the shared FIFO buffer pool.
    pub fifo_slot: u16,
    /// Reserved region length, in 64-byte slots.
    pub fifo_slots_len: u16,
    pub double_buffered: bool,
    pub continuous_mode: bool,
}

impl Pipe {
    fn reserved_bytes(&self) -> u16 {
        self.fifo_slots_len * SLOT_BYTES
    }
}

/// Tracks next-free-slot bump allocation over the shared FIFO buffer
/// pool, and the currently open pipes (indexed by endpoint number, one
/// slot in and one out per number, as the hardware allows both
/// directions on the same pipe number only for control pipe 0).
pub struct PipeTable {
    cfg: UsbhsCfg,
    next_free_slot: u16,
    pipes: [Option<Pipe>; 16],
}

impl PipeTable {
    pub fn new(cfg: UsbhsCfg) -> Self {
        Self {
            cfg,
            next_free_slot: cfg.bulk_iso_base_slot,
            pipes: [None; 16],
        }
    }

    fn slot_of(ep_number: u8, direction: Direction) -> usize {
        // Pipe 0 (control) is bidirectional; all others get one table
        // entry per (number, direction) pair, matching the hardware's
        // separate IN/OUT pipe numbering for non-control endpoints.
        if ep_number == 0 {
            0
        } else {
            let base = (ep_number as usize) * 2;
            match direction {
                Direction::Out => base,
                Direction::In => base + 1,
            }
        }
    }

    /// Opens a pipe. Fixed 64-byte slots for control/interrupt; bump
    /// allocation from `bulk_iso_base_slot` for bulk/isochronous.
    /// DMA-eligible pipes (`dma_capable`) become double-buffered when the
    /// reserved region admits two max-packets, and additionally
    /// continuous-mode for bulk when it admits four (invariants (b)/(c)
    /// in spec §3).
    pub fn open(
        &mut self,
        ep_number: u8,
        direction: Direction,
        transfer_type: TransferType,
        max_packet_size: u16,
        dma_capable: bool,
    ) -> Result<Pipe, DrvError> {
        if max_packet_size == 0 || max_packet_size > 1024 {
            return Err(DrvError::InvalidEndpoint);
        }
        let slot_ix = Self::slot_of(ep_number, direction);
        let (fifo_slot, fifo_slots_len) = match transfer_type {
            TransferType::Control | TransferType::Interrupt => {
                // Fixed single slot; control/interrupt never double-buffer.
                (slot_ix as u16, 1)
            }
            TransferType::Bulk | TransferType::Isochronous => {
                let slots_needed = max_packet_size.div_ceil(SLOT_BYTES).max(1) * 2;
                let slot = self.next_free_slot;
                if slot as u32 + slots_needed as u32 > self.cfg.fifo_pool_slots as u32 {
                    return Err(DrvError::FifoPoolExhausted);
                }
                self.next_free_slot += slots_needed;
                (slot, slots_needed)
            }
        };

        let mut pipe = Pipe {
            ep_number,
            direction,
            transfer_type,
            max_packet_size,
            fifo_slot,
            fifo_slots_len,
            double_buffered: false,
            continuous_mode: false,
        };

        // Invariant (d): only DMA-acquired pipes may double-buffer.
        if dma_capable && pipe.reserved_bytes() >= 2 * max_packet_size {
            pipe.double_buffered = true;
            // Invariant (c): continuous-mode additionally requires bulk
            // and a region wide enough for two max-packets *per half*.
            if transfer_type == TransferType::Bulk && pipe.reserved_bytes() >= 4 * max_packet_size {
                pipe.continuous_mode = true;
            }
        }

        self.pipes[slot_ix] = Some(pipe);
        Ok(pipe)
    }

    pub fn close(&mut self, ep_number: u8, direction: Direction) {
        let slot_ix = Self::slot_of(ep_number, direction);
        self.pipes[slot_ix] = None;
    }

    pub fn get(&self, ep_number: u8, direction: Direction) -> Option<&Pipe> {
        self.pipes[Self::slot_of(ep_number, direction)].as_ref()
    }

    /// Transiently disables double-buffering (FIFO-acquisition fallback
    /// to CFIFO, spec §4.1 "FIFO acquisition"), returning whether it was
    /// enabled beforehand so the caller can restore it after the
    /// transfer.
    pub fn suspend_double_buffer(&mut self, ep_number: u8, direction: Direction) -> bool {
        let slot_ix = Self::slot_of(ep_number, direction);
        if let Some(pipe) = self.pipes[slot_ix].as_mut() {
            let was = pipe.double_buffered;
            pipe.double_buffered = false;
            was
        } else {
            false
        }
    }

    pub fn restore_double_buffer(&mut self, ep_number: u8, direction: Direction, was: bool) {
        let slot_ix = Self::slot_of(ep_number, direction);
        if let Some(pipe) = self.pipes[slot_ix].as_mut() {
            pipe.double_buffered = was;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_and_interrupt_use_fixed_slots() {
        let mut table = PipeTable::new(UsbhsCfg::default());
        let pipe = table
            .open(0, Direction::In, TransferType::Control, 64, false)
            .unwrap();
        assert_eq!(pipe.fifo_slots_len, 1);
        assert!(!pipe.double_buffered);
    }

    #[test]
    fn bulk_pipe_with_dma_and_room_becomes_double_buffered() {
        let mut table = PipeTable::new(UsbhsCfg::default());
        let pipe = table
            .open(1, Direction::In, TransferType::Bulk, 64, true)
            .unwrap();
        assert!(pipe.double_buffered);
        // 2 slots needed for one max-packet * 2 => exactly 2x => also
        // qualifies as continuous only if >= 4x, which one max-packet's
        // worth of slots does not provide.
        assert!(!pipe.continuous_mode);
    }

    #[test]
    fn bulk_pipe_whose_reservation_covers_four_max_packets_gets_continuous_mode() {
        let mut table = PipeTable::new(UsbhsCfg::default());
        // max_packet_size=32 => slots_needed = ceil(32/64)*2 = 2 slots =>
        // reserved = 128 bytes == 4*32, clearing invariant (c)'s threshold.
        let pipe = table
            .open(1, Direction::Out, TransferType::Bulk, 32, true)
            .unwrap();
        assert!(pipe.double_buffered);
        assert!(pipe.continuous_mode);
    }

    #[test]
    fn bulk_pipe_below_continuous_threshold_stays_double_buffered_only() {
        let mut table = PipeTable::new(UsbhsCfg::default());
        // max_packet_size=256 => slots_needed = ceil(256/64)*2 = 8 slots =>
        // reserved = 512 bytes < 4*256 = 1024, short of the continuous-mode
        // threshold despite easily clearing the double-buffer one.
        let pipe = table
            .open(1, Direction::Out, TransferType::Bulk, 256, true)
            .unwrap();
        assert!(pipe.double_buffered);
        assert!(!pipe.continuous_mode);
        assert_eq!(pipe.fifo_slots_len, 8);
    }

    #[test]
    fn exhausting_pool_fails_open() {
        let mut table = PipeTable::new(UsbhsCfg {
            fifo_pool_slots: 10,
            bulk_iso_base_slot: 8,
            ..UsbhsCfg::default()
        });
        // First bulk pipe takes slots [8..10) minimum (64-byte MPS => 2 slots).
        table
            .open(1, Direction::Out, TransferType::Bulk, 64, false)
            .unwrap();
        let err = table
            .open(2, Direction::Out, TransferType::Bulk, 64, false)
            .unwrap_err();
        assert_eq!(err, DrvError::FifoPoolExhausted);
    }

    #[test]
    fn double_buffer_suspend_and_restore_round_trips() {
        let mut table = PipeTable::new(UsbhsCfg::default());
        table
            .open(1, Direction::In, TransferType::Bulk, 64, true)
            .unwrap();
        let was = table.suspend_double_buffer(1, Direction::In);
        assert!(was);
        assert!(!table.get(1, Direction::In).unwrap().double_buffered);
        table.restore_double_buffer(1, Direction::In, was);
        assert!(table.get(1, Direction::In).unwrap().double_buffered);
    }
}
