// Shader compilation and module creation
//
// The triangle shaders ship as GLSL inside the binary and are compiled to
// SPIR-V once at startup with naga. Modules are short-lived: they only need
// to exist while a pipeline is being created.

use anyhow::{Context, Result};
use ash::vk;
use naga::back::spv;
use naga::front::glsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;
use super::VulkanDevice;

const TRIANGLE_VERT: &str = include_str!("../../shaders/triangle.vert");
const TRIANGLE_FRAG: &str = include_str!("../../shaders/triangle.frag");

/// SPIR-V words for the triangle pipeline
pub struct TriangleShaders {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl TriangleShaders {
    pub fn compile() -> Result<Self> {
        let mut compiler = GlslCompiler::new();
        let vertex = compiler
            .compile(ShaderStage::Vertex, TRIANGLE_VERT)
            .context("Failed to compile triangle.vert")?;
        let fragment = compiler
            .compile(ShaderStage::Fragment, TRIANGLE_FRAG)
            .context("Failed to compile triangle.frag")?;

        log::info!(
            "Compiled shaders: vertex {} words, fragment {} words",
            vertex.len(),
            fragment.len()
        );

        Ok(Self { vertex, fragment })
    }
}

pub struct GlslCompiler {
    front: glsl::Frontend,
    validator: Validator,
}

impl GlslCompiler {
    pub fn new() -> Self {
        Self {
            front: glsl::Frontend::default(),
            validator: Validator::new(ValidationFlags::all(), Capabilities::empty()),
        }
    }

    pub fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<Vec<u32>> {
        let options = glsl::Options {
            stage,
            defines: Default::default(),
        };

        let module = self
            .front
            .parse(&options, source)
            .map_err(|e| anyhow::anyhow!("{:?} shader failed to parse: {:?}", stage, e))?;

        let info = self
            .validator
            .validate(&module)
            .map_err(|e| anyhow::anyhow!("{:?} shader failed validation: {:?}", stage, e))?;

        // Sources are written for Vulkan clip space already (y down)
        let mut spv_options = spv::Options {
            lang_version: (1, 0),
            ..Default::default()
        };
        spv_options.flags.remove(spv::WriterFlags::ADJUST_COORDINATE_SPACE);

        let pipeline_options = spv::PipelineOptions {
            shader_stage: stage,
            entry_point: "main".into(),
        };

        spv::write_vec(&module, &info, &spv_options, Some(&pipeline_options))
            .map_err(|e| anyhow::anyhow!("{:?} shader failed SPIR-V generation: {:?}", stage, e))
    }
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe {
        device.device.create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn triangle_shaders_compile_to_spirv() {
        let shaders = TriangleShaders::compile().unwrap();
        assert_eq!(shaders.vertex[0], SPIRV_MAGIC);
        assert_eq!(shaders.fragment[0], SPIRV_MAGIC);
        // SPIR-V 1.0 header version word
        assert_eq!(shaders.vertex[1], 0x0001_0000);
    }

    #[test]
    fn broken_glsl_is_reported() {
        let mut compiler = GlslCompiler::new();
        let err = compiler
            .compile(ShaderStage::Fragment, "#version 450\nvoid main() { nope = 1; }")
            .unwrap_err();
        assert!(err.to_string().contains("Fragment"));
    }
}
