// Error taxonomy for the device layer
//
// Argument errors, allocation failures, recoverable presentation conditions
// and fatal device conditions. SUBOPTIMAL is not an error: it travels as
// PresentStatus next to a successful result.

use crate::registry::ObjectKind;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unexpected null argument: {0}")]
    NullArgument(&'static str),

    #[error("{what} index {index} out of range (count {count})")]
    OutOfRange {
        what: &'static str,
        index: u32,
        count: u32,
    },

    #[error("Invalid or stale {0:?} handle")]
    InvalidHandle(ObjectKind),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Failed to allocate {kind:?}: {reason}")]
    AllocationFailed { kind: ObjectKind, reason: String },

    #[error("Swapchain out of date")]
    OutOfDate,

    #[error("Timed out")]
    Timeout,

    #[error("Device lost")]
    DeviceLost,

    #[cfg(feature = "vulkan")]
    #[error("Vk error: {0}")]
    Vk(ash::vk::Result),

    #[cfg(feature = "vulkan")]
    #[error("Gpu alloc error: {0}")]
    GpuAlloc(#[from] gpu_allocator::AllocationError),
}

impl Error {
    pub(crate) fn out_of_range(what: &'static str, index: u32, count: usize) -> Self {
        Self::OutOfRange {
            what,
            index,
            count: count as u32,
        }
    }

    /// True for OUT_OF_DATE, the condition callers recover from by resizing.
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::OutOfDate)
    }
}

#[cfg(feature = "vulkan")]
impl From<ash::vk::Result> for Error {
    fn from(result: ash::vk::Result) -> Self {
        use ash::vk;
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::OutOfDate,
            vk::Result::TIMEOUT | vk::Result::NOT_READY => Self::Timeout,
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            other => Self::Vk(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a successful acquire or present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PresentStatus {
    #[default]
    Optimal,
    /// Still usable, but no longer matches the surface exactly.
    Suboptimal,
}

impl PresentStatus {
    pub fn from_suboptimal(suboptimal: bool) -> Self {
        if suboptimal {
            Self::Suboptimal
        } else {
            Self::Optimal
        }
    }

    pub fn is_suboptimal(self) -> bool {
        self == Self::Suboptimal
    }
}
