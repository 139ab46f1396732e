// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with the window's surface extensions (+ validation)
// - Surface creation for the window
// - Physical device selection (largest device-local memory, prefer discrete)
// - Graphics/present queue families, logical device + queues

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;
use winit::window::Window;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Queue family indices used for drawing and presenting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices (one queue is created per entry)
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    // Presentation target
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,

    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanDevice {
    /// Create the Vulkan device for a window
    ///
    /// # Arguments
    /// * `app_name` - Application and engine name reported to the driver
    /// * `window` - Window to create the presentation surface for
    /// * `enable_validation` - Request the Khronos validation layer
    pub fn new(app_name: &str, window: &Window, enable_validation: bool) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let layers = Self::instance_layers(&entry, enable_validation)?;
        let instance = Self::create_instance(&entry, app_name, window, &layers)?;

        // Step 3: Setup debug messenger if validation is active
        let debug_utils = if layers.is_empty() {
            None
        } else {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        };

        // Step 4: Create surface
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .context("Failed to create window surface")?;
        let surface_loader = khr::Surface::new(&entry, &instance);
        log::info!("Created Vulkan surface");

        // Step 5: Pick physical device (GPU) and queue families
        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        // Step 6: Create logical device
        let device = Self::create_logical_device(&instance, physical_device, queue_families, &layers)?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        log::info!(
            "Graphics queue family {}, present queue family {}",
            queue_families.graphics,
            queue_families.present
        );

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!("Selected GPU: {}", c_name(&properties.device_name).to_string_lossy());
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            _entry: entry,
            surface,
            surface_loader,
            graphics_queue,
            present_queue,
            queue_families,
            debug_utils,
        }))
    }

    /// Layers to enable: the validation layer when requested and installed
    fn instance_layers(entry: &Entry, enable_validation: bool) -> Result<Vec<&'static CStr>> {
        let available = entry.enumerate_instance_layer_properties()?;
        let names: Vec<&CStr> = available.iter().map(|l| c_name(&l.layer_name)).collect();
        log_names("available layers", &names);

        if !enable_validation {
            return Ok(Vec::new());
        }

        if names.contains(&VALIDATION_LAYER) {
            log::info!("Enabling {}", VALIDATION_LAYER.to_string_lossy());
            Ok(vec![VALIDATION_LAYER])
        } else {
            log::warn!(
                "{} requested but not installed, continuing without validation",
                VALIDATION_LAYER.to_string_lossy()
            );
            Ok(Vec::new())
        }
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        window: &Window,
        layers: &[&CStr],
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&app_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Surface extensions for this display server
        let mut extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
            .context("Window system is not supported by Vulkan")?
            .to_vec();
        if !layers.is_empty() {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let available = entry.enumerate_instance_extension_properties(None)?;
        let available: Vec<&CStr> = available.iter().map(|e| c_name(&e.extension_name)).collect();
        log_names("available instance extensions", &available);

        for &required in &extensions {
            let required = unsafe { CStr::from_ptr(required) };
            if !available.contains(&required) {
                anyhow::bail!(
                    "Required instance extension {} is not available",
                    required.to_string_lossy()
                );
            }
        }
        log::info!("Instance extensions: {:?}", unsafe { names_of(&extensions) });

        let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;
        log::info!("Created Vulkan instance");

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to set up debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut best: Option<(vk::PhysicalDevice, QueueFamilies)> = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let memory = unsafe { instance.get_physical_device_memory_properties(device) };
            let name = c_name(&props.device_name).to_string_lossy().into_owned();

            if !Self::supports_swapchain(instance, device)? {
                log::info!("{}: no {} support, skipping", name, khr::Swapchain::name().to_string_lossy());
                continue;
            }

            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };
            let families = find_queue_families(&queue_families, |index| unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .unwrap_or(false)
            });

            let Some(families) = families else {
                log::info!("{}: no graphics + present queue family, skipping", name);
                continue;
            };

            let score = score_device(&props, &memory);
            log::info!("{} score = {}", name, score);

            if best.is_none() || score > best_score {
                best_score = score;
                best = Some((device, families));
            }
        }

        best.ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))
    }

    fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> Result<bool> {
        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }?;
        let names: Vec<&CStr> = extensions.iter().map(|e| c_name(&e.extension_name)).collect();
        log_names("available device extensions", &names);
        Ok(names.contains(&khr::Swapchain::name()))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilies,
        layers: &[&CStr],
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = [khr::Swapchain::name().as_ptr()];
        // Device layers are ignored by current loaders, older ones expect them
        let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;
        log::info!("Created logical device");

        Ok(device)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Rank a GPU: device-local memory in MB, plus 1000 for discrete GPUs
pub fn score_device(
    props: &vk::PhysicalDeviceProperties,
    memory: &vk::PhysicalDeviceMemoryProperties,
) -> u64 {
    let local_mb: u64 = memory.memory_heaps[..memory.memory_heap_count as usize]
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size / 1_000_000)
        .sum();

    let discrete_bonus = if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        1000
    } else {
        0
    };

    local_mb + discrete_bonus
}

/// Pick the first graphics family, and a present family (the graphics one if
/// it can present, else the first that can).
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<QueueFamilies> {
    let graphics = families
        .iter()
        .position(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))?
        as u32;

    let present = if supports_present(graphics) {
        graphics
    } else {
        (0..families.len() as u32).find(|&index| supports_present(index))?
    };

    Some(QueueFamilies { graphics, present })
}

fn c_name(raw: &[c_char]) -> &CStr {
    // Vulkan name arrays are always NUL terminated
    unsafe { CStr::from_ptr(raw.as_ptr()) }
}

unsafe fn names_of(ptrs: &[*const c_char]) -> Vec<String> {
    ptrs.iter()
        .map(|&p| CStr::from_ptr(p).to_string_lossy().into_owned())
        .collect()
}

fn log_names(what: &str, names: &[&CStr]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    log::debug!("Detected {} {}:", names.len(), what);
    for name in names {
        log::debug!("  - {}", name.to_string_lossy());
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::trace!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn memory_with_heaps(heaps: &[(u64, vk::MemoryHeapFlags)]) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties::default();
        for (i, &(size, flags)) in heaps.iter().enumerate() {
            memory.memory_heaps[i] = vk::MemoryHeap { size, flags };
        }
        memory.memory_heap_count = heaps.len() as u32;
        memory
    }

    #[test]
    fn graphics_family_that_presents_is_shared() {
        let families = [family(vk::QueueFlags::TRANSFER), family(vk::QueueFlags::GRAPHICS)];
        let found = find_queue_families(&families, |_| true).unwrap();
        assert_eq!(found, QueueFamilies { graphics: 1, present: 1 });
        assert!(found.is_shared());
        assert_eq!(found.unique(), vec![1]);
    }

    #[test]
    fn separate_present_family() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::COMPUTE)];
        let found = find_queue_families(&families, |index| index == 1).unwrap();
        assert_eq!(found, QueueFamilies { graphics: 0, present: 1 });
        assert!(!found.is_shared());
        assert_eq!(found.unique(), vec![0, 1]);
    }

    #[test]
    fn no_graphics_or_present_family() {
        let compute_only = [family(vk::QueueFlags::COMPUTE)];
        assert!(find_queue_families(&compute_only, |_| true).is_none());

        let graphics = [family(vk::QueueFlags::GRAPHICS)];
        assert!(find_queue_families(&graphics, |_| false).is_none());
    }

    #[test]
    fn empty_graphics_family_is_ignored() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(find_queue_families(&families, |_| true).unwrap().graphics, 1);
    }

    #[test]
    fn score_counts_device_local_memory_and_discrete_bonus() {
        let memory = memory_with_heaps(&[
            (4_000_000_000, vk::MemoryHeapFlags::DEVICE_LOCAL),
            (16_000_000_000, vk::MemoryHeapFlags::empty()),
        ]);

        let integrated = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..Default::default()
        };
        let discrete = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            ..Default::default()
        };

        assert_eq!(score_device(&integrated, &memory), 4000);
        assert_eq!(score_device(&discrete, &memory), 5000);
    }

    #[test]
    fn heaps_past_count_are_ignored() {
        let mut memory = memory_with_heaps(&[(2_000_000, vk::MemoryHeapFlags::DEVICE_LOCAL)]);
        memory.memory_heaps[1] = vk::MemoryHeap {
            size: 8_000_000_000,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        assert_eq!(score_device(&vk::PhysicalDeviceProperties::default(), &memory), 2);
    }
}
