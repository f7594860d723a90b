//! SPIR-V shader modules.
//!
//! Shaders are compiled ahead of time; this module only loads the `.spv`
//! binaries and wraps `VkShaderModule`.

use std::ffi::CStr;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

const ENTRY_POINT: &CStr = c"main";

/// Graphics pipeline stage a module is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// Owned `VkShaderModule` with entry point `main`.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    pub fn from_spirv_file(device: Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        debug!("Loading {} shader from {}", stage, path.display());
        let bytes = std::fs::read(path)
            .map_err(|e| RhiError::Shader(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_spirv_bytes(device, &bytes, stage)
    }

    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe {
            device
                .handle()
                .create_shader_module(&create_info, device.callbacks())
                .map_err(RhiError::vk("vkCreateShaderModule"))?
        };
        debug!("Created {} shader module ({} words)", stage, code.len());

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, self.device.callbacks());
        }
    }
}

/// Decode a SPIR-V binary into words, rejecting truncated or non-SPIR-V input.
fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::Shader(format!("invalid SPIR-V: {e}")))?;
    match words.first() {
        Some(&0x0723_0203) => Ok(words),
        _ => Err(RhiError::Shader("missing SPIR-V magic number".into())),
    }
}
