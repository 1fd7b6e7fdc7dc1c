//! Setup-packet queue integration (spec §3 "Setup-Packet Queue", §4.1
//! "Setup-packet queue").
//!
//! Wraps [`usbd_ring::SetupQueue`] with the one piece of domain logic the
//! generic ring doesn't know about: fabricating a synthetic `SET_ADDRESS`
//! packet when the hardware silently auto-answers a real one, so the
//! stack still observes every standard request in arrival order.

use usbd_hal_api::DrvError;
use usbd_ring::{SetupPacket, SetupQueue};

const SET_ADDRESS: u8 = 0x05;
const DIR_DEVICE_TO_HOST: u8 = 0x80;

pub struct SetupController<const N: usize> {
    queue: SetupQueue<N>,
    /// Whether a synthetic SET_ADDRESS has already been enqueued for the
    /// bus reset currently in progress - at most one per reset (spec
    /// §4.1 "exactly once per bus reset").
    synthesized_this_reset: bool,
}

impl<const N: usize> SetupController<N> {
    pub const fn new() -> Self {
        Self {
            queue: SetupQueue::new(),
            synthesized_this_reset: false,
        }
    }

    /// Called on bus reset: clears the one-shot latch for the next
    /// Addressed-state transition.
    pub fn on_reset(&mut self) {
        self.synthesized_this_reset = false;
    }

    /// Enqueues a real setup packet observed by the ISR.
    pub fn enqueue_observed(&self, packet: SetupPacket) -> Result<(), DrvError> {
        self.queue
            .push_back(packet)
            .map_err(|_| DrvError::SetupQueueOverflow)
    }

    /// Called when the hardware reports the Addressed device state.
    /// Fabricates `80 05 <addr> 00 00 00 00 00` - `GET`-direction bit set
    /// per the real SET_ADDRESS's bmRequestType being host-to-device
    /// is irrelevant here since only the address byte and bRequest are
    /// observable to the stack's router; matches scenario 1 in spec §8,
    /// which expects exactly `80 05 07 00 00 00 00 00` for USBADDR=7.
    pub fn on_addressed(&mut self, address: u8) -> Result<(), DrvError> {
        if self.synthesized_this_reset {
            return Ok(());
        }
        let packet: SetupPacket = [
            DIR_DEVICE_TO_HOST,
            SET_ADDRESS,
            address,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
        ];
        self.queue
            .push_back(packet)
            .map_err(|_| DrvError::SetupQueueOverflow)?;
        self.synthesized_this_reset = true;
        Ok(())
    }

    /// Drains the next packet for delivery to the stack. Must only be
    /// called after the previous delivery's status stage completed
    /// (stack-completed status-ZLP or stack-stalled EP0); the driver
    /// itself does not enforce "one in flight" - that is the caller's
    /// responsibility per spec §3, since the caller is what knows the
    /// status-stage completed.
    pub fn next(&self) -> Option<SetupPacket> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<const N: usize> Default for SetupController<N> {
    fn default() -> Self {
        Self::new()
    }
}
