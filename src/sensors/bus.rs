//! Shared I2C bus.
//!
//! The BME280 and the MAX17048 sit on one physical bus but are read by two
//! logically separate sampler tasks.  [`SharedBus`] serialises every
//! transaction through a mutex so the samplers can never interleave
//! mid-transaction, whatever the scheduler does.

use std::sync::{Arc, Mutex};

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

/// Cloneable handle to a mutex-guarded I2C bus.  Each clone can be moved
/// into its own sampler task.
pub struct SharedBus<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> SharedBus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: I2c> ErrorType for SharedBus<B> {
    type Error = B::Error;
}

impl<B: I2c> I2c for SharedBus<B> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        // A poisoned lock only means another sampler panicked mid-read;
        // the bus itself is still usable.
        let mut bus = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        bus.transaction(address, operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;

    /// Minimal bus recording the addresses it was asked to talk to.
    struct RecordingBus {
        addresses: Vec<u8>,
    }

    impl ErrorType for RecordingBus {
        type Error = ErrorKind;
    }

    impl I2c for RecordingBus {
        fn transaction(
            &mut self,
            address: SevenBitAddress,
            _operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            self.addresses.push(address);
            Ok(())
        }
    }

    #[test]
    fn clones_share_one_bus() {
        let shared = SharedBus::new(RecordingBus { addresses: Vec::new() });
        let mut a = shared.clone();
        let mut b = shared.clone();

        a.write(0x76, &[0x00]).unwrap();
        b.write(0x36, &[0x00]).unwrap();

        let bus = shared.inner.lock().unwrap();
        assert_eq!(bus.addresses, vec![0x76, 0x36]);
    }

    #[test]
    fn concurrent_transactions_serialise() {
        let shared = SharedBus::new(RecordingBus { addresses: Vec::new() });
        let mut handles = Vec::new();
        for addr in [0x10u8, 0x20, 0x30, 0x40] {
            let mut bus = shared.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    bus.write(addr, &[0xAA]).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let bus = shared.inner.lock().unwrap();
        assert_eq!(bus.addresses.len(), 200);
    }
}
