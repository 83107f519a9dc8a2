//! Flash chips found in supported PCMs and the erase blocks they are divided into

use std::fmt;

use crate::{VpwError, VpwResult};

/// What a flash erase block holds
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockType {
    /// Boot block, never rewritten
    Boot,
    /// Parameter block (VIN, adaptive data)
    Parameter,
    /// Calibration (tune)
    Calibration,
    /// Operating system
    OperatingSystem,
}

/// An erase block of flash, with the CRCs used when comparing against an image
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryRange {
    /// Start address
    pub address: u32,
    /// Size in bytes
    pub size: u32,
    /// Contents
    pub block_type: BlockType,
    /// CRC of the range in the local image
    pub desired_crc: u32,
    /// CRC the kernel reported for the range
    pub actual_crc: u32,
}

impl MemoryRange {
    /// Creates a range with both CRCs zero
    pub const fn new(address: u32, size: u32, block_type: BlockType) -> Self {
        Self {
            address,
            size,
            block_type,
            desired_crc: 0,
            actual_crc: 0,
        }
    }

    /// True if `address` is inside this range
    pub fn contains(&self, address: u32) -> bool {
        address >= self.address && address - self.address < self.size
    }
}

/// A flash chip identified by the ID the kernel reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashChip {
    /// Manufacturer (upper 16 bits) and device ID
    pub chip_id: u32,
    /// Manufacturer, model and size
    pub description: &'static str,
    /// Total size in bytes
    pub size: u32,
    /// Erase blocks, highest address first
    pub memory_ranges: Vec<MemoryRange>,
}

impl FlashChip {
    /// Looks up a chip by ID. Unknown chips are an error since erasing them blind would brick
    /// the PCM
    pub fn new(chip_id: u32) -> VpwResult<Self> {
        use BlockType::*;
        let (description, size, memory_ranges) = match chip_id {
            0x0089_889D => (
                "Intel 28F800B, 1mb",
                1024 * 1024,
                vec![
                    MemoryRange::new(0xE0000, 0x20000, OperatingSystem),
                    MemoryRange::new(0xC0000, 0x20000, OperatingSystem),
                    MemoryRange::new(0xA0000, 0x20000, OperatingSystem),
                    MemoryRange::new(0x80000, 0x20000, OperatingSystem),
                    MemoryRange::new(0x60000, 0x20000, OperatingSystem),
                    MemoryRange::new(0x40000, 0x20000, OperatingSystem),
                    MemoryRange::new(0x20000, 0x20000, OperatingSystem),
                    MemoryRange::new(0x08000, 0x18000, Calibration),
                    MemoryRange::new(0x06000, 0x02000, Parameter),
                    MemoryRange::new(0x04000, 0x02000, Parameter),
                    MemoryRange::new(0x00000, 0x04000, Boot),
                ],
            ),
            // Bottom fill chip in byte mode. The data sheet gives word sizes
            0x0089_4471 => (
                "Intel 28F400B, 512kb",
                512 * 1024,
                vec![
                    MemoryRange::new(0x60000, 0x20000, OperatingSystem),
                    MemoryRange::new(0x40000, 0x20000, OperatingSystem),
                    MemoryRange::new(0x20000, 0x20000, OperatingSystem),
                    MemoryRange::new(0x08000, 0x18000, Calibration),
                    MemoryRange::new(0x06000, 0x02000, Parameter),
                    MemoryRange::new(0x04000, 0x02000, Parameter),
                    MemoryRange::new(0x00000, 0x04000, Boot),
                ],
            ),
            0x0001_2258 => {
                let mut ranges: Vec<MemoryRange> = (2..16u32)
                    .rev()
                    .map(|block| MemoryRange::new(block * 0x10000, 0x10000, OperatingSystem))
                    .collect();
                ranges.extend([
                    MemoryRange::new(0x10000, 0x10000, Calibration),
                    MemoryRange::new(0x08000, 0x08000, Calibration),
                    MemoryRange::new(0x06000, 0x02000, Parameter),
                    MemoryRange::new(0x04000, 0x02000, Parameter),
                    MemoryRange::new(0x00000, 0x04000, Boot),
                ]);
                ("AMD AM29F800BB, 1mb", 1024 * 1024, ranges)
            }
            _ => {
                return Err(VpwError::UnsupportedFormat(format!(
                    "Unsupported flash chip ID {chip_id:08X}"
                )));
            }
        };
        let chip = Self {
            chip_id,
            description,
            size,
            memory_ranges,
        };
        chip.check_ranges()?;
        Ok(chip)
    }

    /// Ranges must tile the chip from its top down to address zero
    fn check_ranges(&self) -> VpwResult<()> {
        let mut top = self.size;
        for range in &self.memory_ranges {
            if range.address + range.size != top {
                return Err(VpwError::UnsupportedFormat(format!(
                    "Range {:05X} does not end at {top:05X}",
                    range.address
                )));
            }
            top = range.address;
        }
        if top != 0 {
            return Err(VpwError::UnsupportedFormat(
                "Memory ranges must start at zero".into(),
            ));
        }
        Ok(())
    }

    /// The erase block containing `address`
    pub fn range_containing(&self, address: u32) -> Option<&MemoryRange> {
        self.memory_ranges.iter().find(|r| r.contains(address))
    }
}

impl fmt::Display for FlashChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_chips_tile_their_size() {
        for id in [0x0089_889D, 0x0089_4471, 0x0001_2258] {
            let chip = FlashChip::new(id).unwrap();
            let total: u32 = chip.memory_ranges.iter().map(|r| r.size).sum();
            assert_eq!(total, chip.size, "{chip}");
        }
    }

    #[test]
    fn intel_400b_layout() {
        let chip = FlashChip::new(0x0089_4471).unwrap();
        assert_eq!(chip.size, 512 * 1024);
        assert_eq!(chip.memory_ranges.len(), 7);
        let cal = chip.range_containing(0x9000).unwrap();
        assert_eq!((cal.address, cal.size), (0x08000, 0x18000));
        assert_eq!(cal.block_type, BlockType::Calibration);
        assert!(chip.range_containing(0x80000).is_none());
    }

    #[test]
    fn unknown_chip() {
        assert!(FlashChip::new(0x1234_5678).is_err());
    }
}
