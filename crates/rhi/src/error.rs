//! RHI error taxonomy.
//!
//! Swapchain invalidation (`OUT_OF_DATE` / `SUBOPTIMAL`) is deliberately not an
//! error: it is reported as [`crate::swapchain::SwapchainStatus`] and handled by
//! the frame loop.

use ash::vk;
use thiserror::Error;

/// How the top-level loop must react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Log and terminate.
    Fatal,
    /// The caller may continue without the resource.
    Recoverable,
}

/// RHI error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Failed to load the Vulkan library.
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// No physical device exposes the required queue families and formats.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// `vkCreateDevice` failed.
    #[error("Logical device creation failed: {0}")]
    DeviceCreation(vk::Result),

    /// None of the depth format candidates support optimal-tiling attachments.
    #[error("No supported depth format")]
    NoDepthFormat,

    /// Creating a buffer, image, view, sampler or shader module failed.
    #[error("Failed to create {what}: {source}")]
    ResourceCreation {
        what: &'static str,
        #[source]
        source: Box<RhiError>,
    },

    /// A resource requested at runtime could not be created. Not fatal.
    #[error("{what} unavailable: {reason}")]
    ResourceUnavailable { what: &'static str, reason: String },

    /// Any other non-success Vulkan status.
    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    /// GPU allocator error.
    #[error("Allocator error: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),

    /// Invalid SPIR-V or shader file.
    #[error("Shader error: {0}")]
    Shader(String),

    /// Surface creation error.
    #[error("Surface error: {0}")]
    Surface(String),

    /// A bounded wait expired.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// A construction parameter is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RhiError {
    /// Attach the failing API call to a raw status.
    pub fn vk(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vulkan { call, result }
    }

    /// Wrap any error raised while creating `what`.
    pub fn creating(what: &'static str) -> impl FnOnce(RhiError) -> Self {
        move |source| Self::ResourceCreation {
            what,
            source: Box::new(source),
        }
    }

    /// Startup treats every error as fatal; only runtime resource
    /// failures converted by [`RhiError::into_runtime`] are recoverable.
    pub fn severity(&self) -> Severity {
        match self {
            Self::ResourceUnavailable { .. } => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Turn a resource creation failure into a recoverable condition.
    ///
    /// Used on steady-state paths such as texture streaming. Other errors pass
    /// through unchanged.
    pub fn into_runtime(self) -> Self {
        match self {
            Self::ResourceCreation { what, source } => Self::ResourceUnavailable {
                what,
                reason: source.to_string(),
            },
            Self::Allocator(err) => Self::ResourceUnavailable {
                what: "memory",
                reason: err.to_string(),
            },
            other => other,
        }
    }

    /// Subsystem name for diagnostics.
    pub fn subsystem(&self) -> &'static str {
        match self {
            Self::Loading(_) => "loader",
            Self::NoSuitableDevice => "device selection",
            Self::DeviceCreation(_) => "logical device",
            Self::NoDepthFormat => "swapchain",
            Self::ResourceCreation { .. } | Self::ResourceUnavailable { .. } => "resources",
            Self::Vulkan { call, .. } => subsystem_of_call(call),
            Self::Allocator(_) => "allocator",
            Self::Shader(_) => "shader",
            Self::Surface(_) => "surface",
            Self::Timeout(_) => "synchronization",
            Self::InvalidConfig(_) => "configuration",
        }
    }

    /// The failing Vulkan call, when known.
    pub fn failing_call(&self) -> Option<&'static str> {
        match self {
            Self::Vulkan { call, .. } => Some(call),
            Self::DeviceCreation(_) => Some("vkCreateDevice"),
            Self::ResourceCreation { source, .. } => source.failing_call(),
            _ => None,
        }
    }
}

fn subsystem_of_call(call: &str) -> &'static str {
    if call.contains("Swapchain") || call.contains("Acquire") || call.contains("Present") {
        "swapchain"
    } else if call.contains("Fence") || call.contains("Semaphore") || call.contains("Submit") {
        "synchronization"
    } else if call.contains("Command") {
        "command buffers"
    } else if call.contains("Descriptor") || call.contains("Pipeline") {
        "pipeline cache"
    } else if call.contains("Instance") || call.contains("Enumerate") {
        "instance"
    } else {
        "device"
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
