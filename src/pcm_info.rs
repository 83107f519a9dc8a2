//! Per operating system metadata for the PCMs this crate knows about

use strum_macros::{Display, EnumIter, EnumString};

use crate::key_algorithm::GmKeyAlgorithm;

/// PCM hardware family. Determines the kernel load address and upload request format
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HardwareType {
    /// 512KiB '0411 style PCM
    P01,
    /// 1MiB truck PCM
    P59,
    /// 'Black box' PCM
    P04,
    /// P08
    P08,
    /// P10
    P10,
    /// P12
    P12,
    /// Not known
    Unknown,
}

/// Highest address a kernel can occupy on P01 and P59 hardware
pub const P01_P59_KERNEL_LIMIT: u32 = 0xFF_CDFF;

/// Immutable metadata for one operating system ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmInfo {
    /// Operating system ID
    pub osid: u32,
    /// Human readable description
    pub description: String,
    /// Whether reading and writing this PCM is supported
    pub is_supported: bool,
    /// Hardware family
    pub hardware_type: HardwareType,
    /// RAM address the kernel is uploaded to
    pub kernel_base_address: u32,
    /// Flash address the image starts at
    pub image_base_address: u32,
    /// Size of the flash image in bytes
    pub image_size: u32,
    /// Seed/key algorithm number
    pub key_algorithm: u32,
}

impl PcmInfo {
    /// Looks up metadata for an operating system ID. Unknown IDs get the '0411 defaults
    pub fn new(osid: u32) -> Self {
        let (description, is_supported, hardware_type, image_size, key_algorithm) = match osid {
            1337601 | 1710001 | 1887301 | 2444101 | 2600601 | 2685301 | 3904401 | 1337605
            | 1710005 | 1887305 | 2444105 | 2600605 | 2685305 | 3904405 => {
                ("LB7 EFILive COS", true, HardwareType::P01, 512 * 1024, 2)
            }
            15063376 | 15188873 | 15097100 => {
                ("LB7 9388505", true, HardwareType::P01, 512 * 1024, 2)
            }
            15094441 | 15085499 | 15166853 | 15186006 | 15189044 => {
                ("LB7 12210729", true, HardwareType::P01, 512 * 1024, 2)
            }
            15141668 | 15193885 | 15228758 | 15231599 | 15231600 | 15879103 | 15087230 => {
                ("LLY 12244189", false, HardwareType::P59, 1024 * 1024, 2)
            }
            9360360 | 9360361 | 9361140 | 9363996 | 9365637 | 9373372 | 9379910 | 9381344
            | 12205612 | 12584929 | 12593359 | 12597506 | 16253027 => {
                ("9354896", true, HardwareType::P01, 512 * 1024, 1)
            }
            12202088 | 12206871 | 12208322 | 12209203 | 12212156 | 12216125 | 12221588
            | 12225074 | 12593358 => ("12200411", true, HardwareType::P01, 512 * 1024, 1),
            12591725 | 12592618 | 12593555 | 12606961 | 12612115 => {
                ("12589463", true, HardwareType::P59, 1024 * 1024, 1)
            }
            12564440 | 12585950 | 12588804 | 12592425 | 12592433 | 12606960 | 12612114 => {
                ("12586242", true, HardwareType::P59, 1024 * 1024, 1)
            }
            12587603 | 12587604 => ("12586243", true, HardwareType::P59, 1024 * 1024, 1),
            9355699 | 9365095 | 16263425 => {
                ("'Black Box' 9366810", false, HardwareType::P04, 512 * 1024, 15)
            }
            _ => ("Unknown", true, HardwareType::P01, 512 * 1024, 1),
        };
        Self {
            osid,
            description: description.to_string(),
            is_supported,
            hardware_type,
            kernel_base_address: kernel_base_address(hardware_type),
            image_base_address: 0,
            image_size,
            key_algorithm,
        }
    }

    /// Key algorithm for the unlock handshake
    pub fn key(&self) -> GmKeyAlgorithm {
        GmKeyAlgorithm::new(self.key_algorithm)
    }
}

/// RAM address a kernel is loaded to on each hardware family
pub fn kernel_base_address(hardware: HardwareType) -> u32 {
    match hardware {
        HardwareType::P01 | HardwareType::P59 | HardwareType::Unknown => 0xFF_8000,
        HardwareType::P04 => 0xFF_9090,
        HardwareType::P08 => 0xFF_A000,
        HardwareType::P10 => 0xFF_B800,
        HardwareType::P12 => 0xFF_2000,
    }
}
