//! Shared memory window between the microcontroller and the host
//!
//! The window is the 64 KiB image the cartridge bus serves to the 68000.
//! Each 16-bit bus word is stored in the microcontroller's native (little
//! endian) order; longwords are stored high half-word first so the host reads
//! them big-endian.
//!
//! ```text
//! +0xF000  RandomToken        4   MCU
//! +0xF004  RandomTokenSeed    4   MCU
//! +0xF008  NtpSuccess         4   MCU   0 / 0xFFFFFFFF
//! +0xF00C  DatetimeBcd        8   MCU   IKBD record
//! +0xF014  DatetimeMsdos      4   MCU
//! +0xF01C  OldXbiosTrap       4   MCU   (SAVE_VECTORS)
//! +0xF020  ReentryTrap        4   both  0 / 0xFFFFFFFF
//! +0xF024  Y2kPatch           4   MCU   0 / 0xFFFFFFFF
//! +0xF02C  SharedVariables   16   both  4 longword slots
//! +0xF040  DallasClock       64   MCU   encoded DS1216 clock bits
//! ```

use crate::error::LayoutError;

/// Size of the bus-visible window
pub const WINDOW_LEN: usize = 0x1_0000;

/// Value written to boolean longword fields when set
pub const FLAG_SET: u32 = 0xFFFF_FFFF;

/// Value written to boolean longword fields when clear
pub const FLAG_CLEAR: u32 = 0;

/// A 32-bit field at a fixed offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Longword(usize);

/// A fixed-size byte block at a fixed offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<const N: usize>(usize);

impl Longword {
    pub const fn offset(self) -> usize {
        self.0
    }
}

impl<const N: usize> Block<N> {
    pub const fn offset(self) -> usize {
        self.0
    }

    pub const fn len(self) -> usize {
        N
    }
}

pub const RANDOM_TOKEN: Longword = Longword(0xF000);
pub const RANDOM_TOKEN_SEED: Longword = Longword(0xF004);
pub const NTP_SUCCESS: Longword = Longword(0xF008);
pub const DATETIME_BCD: Block<8> = Block(0xF00C);
pub const DATETIME_MSDOS: Longword = Longword(0xF014);
pub const OLD_XBIOS_TRAP: Longword = Longword(0xF01C);
pub const REENTRY_TRAP: Longword = Longword(0xF020);
pub const Y2K_PATCH: Longword = Longword(0xF024);
pub const SHARED_VARIABLES: Block<16> = Block(0xF02C);
pub const DALLAS_CLOCK: Block<64> = Block(0xF040);

/// Number of longword slots in the shared variable table
pub const SHARED_VARIABLE_SLOTS: usize = SHARED_VARIABLES.len() / 4;

/// Shared variable: hardware type reported by the host driver
pub const SHARED_VARIABLE_HARDWARE_TYPE: u32 = 0;
/// Shared variable: GEMDOS version reported by the host driver
pub const SHARED_VARIABLE_SVERSION: u32 = 1;
/// Shared variable: buffer type (unused by the RTC)
pub const SHARED_VARIABLE_BUFFER_TYPE: u32 = 2;

// Layout checks: everything inside the window, half-word aligned, no overlap.
const _: () = {
    assert!(DALLAS_CLOCK.offset() + DALLAS_CLOCK.len() <= WINDOW_LEN);
    assert!(RANDOM_TOKEN.offset() % 2 == 0);
    assert!(DATETIME_BCD.offset() % 2 == 0);
    assert!(SHARED_VARIABLES.offset() % 2 == 0);
    assert!(DALLAS_CLOCK.offset() % 2 == 0);
    assert!(RANDOM_TOKEN_SEED.offset() >= RANDOM_TOKEN.offset() + 4);
    assert!(NTP_SUCCESS.offset() >= RANDOM_TOKEN_SEED.offset() + 4);
    assert!(DATETIME_BCD.offset() >= NTP_SUCCESS.offset() + 4);
    assert!(DATETIME_MSDOS.offset() >= DATETIME_BCD.offset() + DATETIME_BCD.len());
    assert!(OLD_XBIOS_TRAP.offset() >= DATETIME_MSDOS.offset() + 4);
    assert!(REENTRY_TRAP.offset() >= OLD_XBIOS_TRAP.offset() + 4);
    assert!(Y2K_PATCH.offset() >= REENTRY_TRAP.offset() + 4);
    assert!(SHARED_VARIABLES.offset() >= Y2K_PATCH.offset() + 4);
    assert!(DALLAS_CLOCK.offset() >= SHARED_VARIABLES.offset() + SHARED_VARIABLES.len());
    assert!(SHARED_VARIABLE_SLOTS == 4);
};

/// Typed accessor over the bus-visible window
pub struct SharedMemory<'a> {
    bytes: &'a mut [u8; WINDOW_LEN],
}

impl<'a> SharedMemory<'a> {
    /// Wrap a window buffer
    pub fn new(bytes: &'a mut [u8; WINDOW_LEN]) -> Self {
        Self { bytes }
    }

    /// Read a 16-bit bus word
    pub fn read_word(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    /// Write a 16-bit bus word
    pub fn write_word(&mut self, offset: usize, value: u16) {
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a longword as the host sees it
    pub fn read_long(&self, field: Longword) -> u32 {
        let high = self.read_word(field.offset()) as u32;
        let low = self.read_word(field.offset() + 2) as u32;
        (high << 16) | low
    }

    /// Write a longword so the host reads `value`
    pub fn write_long(&mut self, field: Longword, value: u32) {
        self.write_word(field.offset(), (value >> 16) as u16);
        self.write_word(field.offset() + 2, value as u16);
    }

    /// Raw bytes of a block, in window order
    pub fn block<const N: usize>(&self, field: Block<N>) -> [u8; N] {
        let start = field.offset();
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[start..start + N]);
        out
    }

    /// Overwrite a block with raw bytes, in window order
    pub fn write_block<const N: usize>(&mut self, field: Block<N>, data: &[u8; N]) {
        let start = field.offset();
        self.bytes[start..start + N].copy_from_slice(data);
    }

    fn shared_variable_field(index: u32) -> Result<Longword, LayoutError> {
        if (index as usize) < SHARED_VARIABLE_SLOTS {
            Ok(Longword(SHARED_VARIABLES.offset() + index as usize * 4))
        } else {
            Err(LayoutError::SlotOutOfRange { index })
        }
    }

    /// Read a shared variable slot
    pub fn shared_variable(&self, index: u32) -> Result<u32, LayoutError> {
        Ok(self.read_long(Self::shared_variable_field(index)?))
    }

    /// Write a shared variable slot
    pub fn set_shared_variable(&mut self, index: u32, value: u32) -> Result<(), LayoutError> {
        let field = Self::shared_variable_field(index)?;
        self.write_long(field, value);
        Ok(())
    }

    /// Whole window, e.g. for the bus to serve reads from
    pub fn as_bytes(&self) -> &[u8; WINDOW_LEN] {
        self.bytes
    }
}
