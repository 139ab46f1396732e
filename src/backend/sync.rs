// Synchronization primitives
//
// One frame is in flight at a time (the loop waits for the present queue to
// drain), so a single pair of semaphores orders acquire -> draw -> present.

use ash::vk;
use anyhow::Result;
use super::VulkanDevice;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        unsafe {
            let image_available = device.device.create_semaphore(&semaphore_info, None)?;
            let render_finished = match device.device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.device.destroy_semaphore(image_available, None);
                    return Err(e.into());
                }
            };

            Ok(Self {
                image_available,
                render_finished,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
        }
    }
}
