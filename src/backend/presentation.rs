// Presentation chain - everything that depends on the swapchain
//
// Built in dependency order:
//   swapchain + image views -> render pass -> pipeline layout -> pipeline
//   -> framebuffers -> command buffers (recorded once)
// and destroyed in exactly the reverse order when dropped. Recreating after
// a resize is: wait idle, drop the old chain, build a new one.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::pipeline;
use super::shader::TriangleShaders;
use super::{Swapchain, VulkanDevice};

/// Per-build inputs besides the window size
#[derive(Debug, Clone, Copy)]
pub struct ChainSettings {
    pub present_preference: Option<vk::PresentModeKHR>,
    pub clear_color: [f32; 4],
}

pub struct PresentationChain {
    pub swapchain: Swapchain,
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
    /// One per swapchain image, indexed by the acquired image index
    pub command_buffers: Vec<vk::CommandBuffer>,
    command_pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl PresentationChain {
    pub fn new(
        device: Arc<VulkanDevice>,
        command_pool: vk::CommandPool,
        shaders: &TriangleShaders,
        width: u32,
        height: u32,
        settings: ChainSettings,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(device.clone(), width, height, settings.present_preference)?;

        // Null handles are skipped by Drop, so an early `?` only tears down
        // what was already built
        let mut chain = Self {
            swapchain,
            render_pass: vk::RenderPass::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            framebuffers: Vec::new(),
            command_buffers: Vec::new(),
            command_pool,
            device,
        };

        let device = chain.device.clone();
        let extent = chain.swapchain.extent;

        chain.render_pass = pipeline::create_render_pass(&device, chain.swapchain.format)?;
        chain.pipeline_layout = pipeline::create_pipeline_layout(&device)?;
        chain.pipeline = pipeline::create_graphics_pipeline(
            &device,
            shaders,
            chain.render_pass,
            chain.pipeline_layout,
            extent,
        )?;
        chain.framebuffers = pipeline::create_framebuffers(
            &device,
            &chain.swapchain.image_views,
            chain.render_pass,
            extent,
        )?;
        chain.command_buffers = chain.allocate_command_buffers()?;
        chain.record_command_buffers(settings.clear_color)?;

        log::info!(
            "Presentation chain ready: {}x{}, {} framebuffers, {} command buffers",
            extent.width,
            extent.height,
            chain.framebuffers.len(),
            chain.command_buffers.len()
        );

        Ok(chain)
    }

    fn allocate_command_buffers(&self) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(self.swapchain.images.len() as u32);

        unsafe {
            self.device.device.allocate_command_buffers(&alloc_info)
                .context("Failed to allocate command buffers")
        }
    }

    /// Record the draw once per image. The content never changes, so the
    /// buffers are resubmitted every frame.
    fn record_command_buffers(&self, clear_color: [f32; 4]) -> Result<()> {
        let device = &self.device.device;
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.swapchain.extent,
        };

        for (&cmd, &framebuffer) in self.command_buffers.iter().zip(&self.framebuffers) {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass)
                .framebuffer(framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);

            unsafe {
                device.begin_command_buffer(cmd, &begin_info)
                    .context("Failed to begin command buffer")?;
                device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
                device.cmd_draw(cmd, 3, 1, 0, 0);
                device.cmd_end_render_pass(cmd);
                device.end_command_buffer(cmd)
                    .context("Failed to record command buffer")?;
            }
        }

        Ok(())
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }
}

impl Drop for PresentationChain {
    fn drop(&mut self) {
        let device = &self.device.device;

        unsafe {
            if !self.command_buffers.is_empty() {
                device.free_command_buffers(self.command_pool, &self.command_buffers);
            }
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            if self.pipeline != vk::Pipeline::null() {
                device.destroy_pipeline(self.pipeline, None);
            }
            if self.pipeline_layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass, None);
            }
        }

        log::debug!("Destroyed presentation chain");
        // `swapchain` drops next: image views, then the swapchain
    }
}
