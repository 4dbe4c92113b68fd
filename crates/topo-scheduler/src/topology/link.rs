use serde::Deserialize;
use serde::Serialize;

/// Interconnect classification between two accelerator devices on one host.
///
/// The discriminants are the integer codes used in the topology descriptor.
/// Codes that are not listed here decode as [`P2PLinkType::Unknown`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(from = "u32", into = "u32")]
pub enum P2PLinkType {
    #[default]
    #[display("N/A")]
    Unknown = 0,
    #[display("Cross CPU socket")]
    CrossCpu = 1,
    #[display("Same CPU socket")]
    SameCpu = 2,
    #[display("Host PCI bridge")]
    HostBridge = 3,
    #[display("Multiple PCI switches")]
    MultiSwitch = 4,
    #[display("Single PCI switch")]
    SingleSwitch = 5,
    #[display("Same board")]
    SameBoard = 6,
    #[display("Single NVLink")]
    SingleNvLink = 7,
    #[display("Two NVLinks")]
    TwoNvLinks = 8,
    #[display("Three NVLinks")]
    ThreeNvLinks = 9,
    #[display("Four NVLinks")]
    FourNvLinks = 10,
    #[display("Five NVLinks")]
    FiveNvLinks = 11,
    #[display("Six NVLinks")]
    SixNvLinks = 12,
}

impl P2PLinkType {
    /// Desirability of the link, 0 for unknown links.
    ///
    /// PCI paths and NVLink tiers overlap: a single NVLink scores like a path
    /// through multiple PCI switches.
    pub const fn score(self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::CrossCpu => 1,
            Self::SameCpu => 2,
            Self::HostBridge => 3,
            Self::MultiSwitch => 4,
            Self::SingleSwitch => 5,
            Self::SameBoard => 6,
            Self::SingleNvLink => 4,
            Self::TwoNvLinks => 5,
            Self::ThreeNvLinks => 6,
            Self::FourNvLinks => 7,
            Self::FiveNvLinks => 8,
            Self::SixNvLinks => 9,
        }
    }
}

impl From<u32> for P2PLinkType {
    fn from(code: u32) -> Self {
        match code {
            1 => Self::CrossCpu,
            2 => Self::SameCpu,
            3 => Self::HostBridge,
            4 => Self::MultiSwitch,
            5 => Self::SingleSwitch,
            6 => Self::SameBoard,
            7 => Self::SingleNvLink,
            8 => Self::TwoNvLinks,
            9 => Self::ThreeNvLinks,
            10 => Self::FourNvLinks,
            11 => Self::FiveNvLinks,
            12 => Self::SixNvLinks,
            _ => Self::Unknown,
        }
    }
}

impl From<P2PLinkType> for u32 {
    fn from(link: P2PLinkType) -> Self {
        link as u32
    }
}
