//! Physical device capability snapshots.

use crate::error::Result;
use crate::queue::{find_queue_families, QueueFamilyIndices};
use crate::surface::{Surface, SurfaceSupport};
use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;
use std::fmt;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Device type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

impl From<vk::PhysicalDeviceType> for DeviceKind {
    fn from(ty: vk::PhysicalDeviceType) -> Self {
        match ty {
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => Self::Virtual,
            vk::PhysicalDeviceType::CPU => Self::Cpu,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discrete => "discrete",
            Self::Integrated => "integrated",
            Self::Virtual => "virtual",
            Self::Cpu => "cpu",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Everything device selection needs to know about one physical device,
/// queried once against the target surface.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceCandidate {
    /// Raw handle.
    pub physical_device: vk::PhysicalDevice,
    /// Device name as reported by the driver.
    pub name: String,
    pub vendor: GpuVendor,
    pub device_id: u32,
    pub kind: DeviceKind,
    /// Highest Vulkan version the device supports.
    pub api_version: u32,
    /// Graphics/present families for the target surface.
    pub queue_families: QueueFamilyIndices,
    /// Names of supported device extensions.
    pub extensions: HashSet<String>,
    /// Surface formats, present modes and limits.
    pub surface_support: SurfaceSupport,
}

impl PhysicalDeviceCandidate {
    /// Query a physical device against a surface.
    ///
    /// # Safety
    /// The physical device must have been enumerated from `instance`, which
    /// must also be the instance the surface was created from.
    pub unsafe fn query(
        instance: &ash::Instance,
        surface: &Surface,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let properties = instance.get_physical_device_properties(physical_device);
        let name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let families = instance.get_physical_device_queue_family_properties(physical_device);
        let queue_families = find_queue_families(&families, |index| {
            surface.supports_present(physical_device, index)
        })?;

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)?
            .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let surface_support = surface.query_support(physical_device)?;

        Ok(Self {
            physical_device,
            name,
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_id: properties.device_id,
            kind: properties.device_type.into(),
            api_version: properties.api_version,
            queue_families,
            extensions,
            surface_support,
        })
    }

    /// Whether the device supports Vulkan 1.3 (dynamic rendering and
    /// synchronization2 in core).
    pub fn supports_vulkan_1_3(&self) -> bool {
        vk::api_version_major(self.api_version) > 1
            || (vk::api_version_major(self.api_version) == 1
                && vk::api_version_minor(self.api_version) >= 3)
    }

    /// Required extensions this device does not advertise.
    pub fn missing_extensions(&self, required: &[&CStr]) -> Vec<String> {
        required
            .iter()
            .map(|ext| ext.to_string_lossy().into_owned())
            .filter(|ext| !self.extensions.contains(ext))
            .collect()
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {}, id {:#06x}) - Vulkan {}.{}.{}",
            self.name,
            self.vendor,
            self.kind,
            self.device_id,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> PhysicalDeviceCandidate {
        PhysicalDeviceCandidate {
            physical_device: vk::PhysicalDevice::null(),
            name: "Test GPU".to_string(),
            vendor: GpuVendor::from_vendor_id(0x1002),
            device_id: 0x73bf,
            kind: DeviceKind::Discrete,
            api_version: vk::make_api_version(0, 1, 3, 250),
            queue_families: QueueFamilyIndices::default(),
            extensions: ["VK_KHR_swapchain".to_string()].into_iter().collect(),
            surface_support: SurfaceSupport::default(),
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x5143), GpuVendor::Other(0x5143));
    }

    #[test]
    fn device_kind_from_vulkan_type() {
        assert_eq!(
            DeviceKind::from(vk::PhysicalDeviceType::DISCRETE_GPU),
            DeviceKind::Discrete
        );
        assert_eq!(
            DeviceKind::from(vk::PhysicalDeviceType::INTEGRATED_GPU),
            DeviceKind::Integrated
        );
        assert_eq!(
            DeviceKind::from(vk::PhysicalDeviceType::OTHER),
            DeviceKind::Other
        );
    }

    #[test]
    fn api_version_gate() {
        let mut device = candidate();
        assert!(device.supports_vulkan_1_3());

        device.api_version = vk::make_api_version(0, 1, 2, 198);
        assert!(!device.supports_vulkan_1_3());
    }

    #[test]
    fn missing_extensions_listed_by_name() {
        let device = candidate();
        assert!(device
            .missing_extensions(&[ash::khr::swapchain::NAME])
            .is_empty());
        assert_eq!(
            device.missing_extensions(&[ash::khr::swapchain::NAME, c"VK_EXT_mesh_shader"]),
            vec!["VK_EXT_mesh_shader".to_string()]
        );
    }

    #[test]
    fn summary_format() {
        insta::assert_snapshot!(
            candidate().summary(),
            @"Test GPU (Amd, discrete, id 0x73bf) - Vulkan 1.3.250"
        );
    }
}
