//! Byte-wide port I/O.
//!
//! Drivers talk to hardware through the [`PortIo`] trait instead of building
//! `x86_64::instructions::port::Port`s themselves, so the exact byte sequence
//! a driver emits can be checked against a recording fake.

use x86_64::instructions::port::Port;

pub trait PortIo {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, value: u8);
}

/// Real `in`/`out` instructions.
#[derive(Debug)]
pub struct HardwarePorts {
    _private: (),
}

impl HardwarePorts {
    /// # Safety
    /// Writes go straight to the bus. The caller must be running at ring 0
    /// and must only hand this to drivers that own the ports they touch.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl PortIo for HardwarePorts {
    fn read_u8(&mut self, port: u16) -> u8 {
        // SAFETY: ring 0 is guaranteed by `HardwarePorts::new`.
        unsafe { Port::<u8>::new(port).read() }
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        // SAFETY: see `read_u8`.
        unsafe { Port::<u8>::new(port).write(value) }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::PortIo;

    /// Records every write and serves reads from a small register file.
    #[derive(Default)]
    pub struct RecordingPorts {
        pub writes: Vec<(u16, u8)>,
        pub registers: Vec<(u16, u8)>,
    }

    impl RecordingPorts {
        pub fn with_register(mut self, port: u16, value: u8) -> Self {
            self.registers.push((port, value));
            self
        }

        pub fn register(&self, port: u16) -> Option<u8> {
            self.registers.iter().rev().find(|(p, _)| *p == port).map(|(_, v)| *v)
        }
    }

    impl PortIo for RecordingPorts {
        fn read_u8(&mut self, port: u16) -> u8 {
            self.register(port).unwrap_or(0)
        }

        fn write_u8(&mut self, port: u16, value: u8) {
            self.writes.push((port, value));
            self.registers.push((port, value));
        }
    }
}
