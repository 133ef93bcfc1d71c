//! Physical device selection.

use crate::capabilities::{DeviceKind, PhysicalDeviceCandidate};
use crate::error::{GpuError, Result};
use crate::instance::Instance;
use crate::surface::Surface;
use std::ffi::CStr;
use thiserror::Error;

/// Device extensions every selected device must support.
pub fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Why a candidate cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no graphics or no present queue family")]
    IncompleteQueueFamilies,
    #[error("missing extensions: {}", .0.join(", "))]
    MissingExtensions(Vec<String>),
    #[error("surface reports no formats or no present modes")]
    InadequateSurface,
    #[error("Vulkan 1.3 not supported")]
    UnsupportedApiVersion,
}

/// Check a candidate against the suitability requirements.
pub fn check_suitability(
    candidate: &PhysicalDeviceCandidate,
    required_extensions: &[&CStr],
) -> std::result::Result<(), Rejection> {
    if !candidate.supports_vulkan_1_3() {
        return Err(Rejection::UnsupportedApiVersion);
    }

    if !candidate.queue_families.is_complete() {
        return Err(Rejection::IncompleteQueueFamilies);
    }

    let missing = candidate.missing_extensions(required_extensions);
    if !missing.is_empty() {
        return Err(Rejection::MissingExtensions(missing));
    }

    if !candidate.surface_support.is_adequate() {
        return Err(Rejection::InadequateSurface);
    }

    Ok(())
}

/// Whether a candidate passes every suitability requirement.
pub fn is_suitable(candidate: &PhysicalDeviceCandidate, required_extensions: &[&CStr]) -> bool {
    check_suitability(candidate, required_extensions).is_ok()
}

/// Pick the device to render with.
///
/// The first suitable discrete GPU in enumeration order wins. Without one,
/// the first suitable device of any kind is taken.
pub fn select_device<'a>(
    candidates: &'a [PhysicalDeviceCandidate],
    required_extensions: &[&CStr],
) -> Result<&'a PhysicalDeviceCandidate> {
    if candidates.is_empty() {
        return Err(GpuError::NoDevice);
    }

    for candidate in candidates {
        if let Err(reason) = check_suitability(candidate, required_extensions) {
            tracing::debug!("Rejecting {}: {}", candidate.name, reason);
        }
    }

    candidates
        .iter()
        .find(|c| c.kind == DeviceKind::Discrete && is_suitable(c, required_extensions))
        .or_else(|| {
            candidates
                .iter()
                .find(|c| is_suitable(c, required_extensions))
        })
        .ok_or(GpuError::NoSuitableDevice)
}

/// Enumerate every physical device and query it against `surface`.
///
/// # Safety
/// `surface` must have been created from `instance`.
pub unsafe fn enumerate_candidates(
    instance: &Instance,
    surface: &Surface,
) -> Result<Vec<PhysicalDeviceCandidate>> {
    let devices = instance.raw().enumerate_physical_devices()?;

    tracing::info!("Available physical devices ({}):", devices.len());

    let mut candidates = Vec::with_capacity(devices.len());
    for (i, device) in devices.into_iter().enumerate() {
        let candidate = PhysicalDeviceCandidate::query(instance.raw(), surface, device)?;
        tracing::info!("  {}) {}", i + 1, candidate.summary());
        candidates.push(candidate);
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::GpuVendor;
    use crate::queue::QueueFamilyIndices;
    use crate::surface::SurfaceSupport;
    use ash::vk;

    fn candidate(name: &str, kind: DeviceKind) -> PhysicalDeviceCandidate {
        PhysicalDeviceCandidate {
            physical_device: vk::PhysicalDevice::null(),
            name: name.to_string(),
            vendor: GpuVendor::Other(0),
            device_id: 0,
            kind,
            api_version: vk::API_VERSION_1_3,
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            extensions: ["VK_KHR_swapchain".to_string()].into_iter().collect(),
            surface_support: SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR::default()],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            },
        }
    }

    fn without_present(mut c: PhysicalDeviceCandidate) -> PhysicalDeviceCandidate {
        c.queue_families.present = None;
        c
    }

    fn select<'a>(candidates: &'a [PhysicalDeviceCandidate]) -> Result<&'a PhysicalDeviceCandidate> {
        select_device(candidates, &required_device_extensions())
    }

    #[test]
    fn discrete_preferred_over_earlier_integrated() {
        let candidates = [
            candidate("integrated", DeviceKind::Integrated),
            candidate("discrete", DeviceKind::Discrete),
        ];
        assert_eq!(select(&candidates).unwrap().name, "discrete");
    }

    #[test]
    fn unsuitable_discrete_skipped() {
        let candidates = [
            without_present(candidate("discrete", DeviceKind::Discrete)),
            candidate("integrated", DeviceKind::Integrated),
            candidate("discrete-2", DeviceKind::Discrete),
        ];
        assert_eq!(select(&candidates).unwrap().name, "discrete-2");
    }

    #[test]
    fn first_suitable_non_discrete_in_order() {
        let candidates = [
            without_present(candidate("virtual", DeviceKind::Virtual)),
            candidate("cpu", DeviceKind::Cpu),
            candidate("integrated", DeviceKind::Integrated),
        ];
        assert_eq!(select(&candidates).unwrap().name, "cpu");
    }

    #[test]
    fn no_suitable_device_fails() {
        let candidates = [
            without_present(candidate("a", DeviceKind::Discrete)),
            without_present(candidate("b", DeviceKind::Integrated)),
        ];
        assert!(matches!(select(&candidates), Err(GpuError::NoSuitableDevice)));
    }

    #[test]
    fn empty_list_fails() {
        assert!(matches!(select(&[]), Err(GpuError::NoDevice)));
    }

    #[test]
    fn rejection_reasons() {
        let required = required_device_extensions();

        let mut no_swapchain = candidate("a", DeviceKind::Discrete);
        no_swapchain.extensions.clear();
        assert_eq!(
            check_suitability(&no_swapchain, &required),
            Err(Rejection::MissingExtensions(vec![
                "VK_KHR_swapchain".to_string()
            ]))
        );

        let mut no_modes = candidate("b", DeviceKind::Discrete);
        no_modes.surface_support.present_modes.clear();
        assert_eq!(
            check_suitability(&no_modes, &required),
            Err(Rejection::InadequateSurface)
        );

        let mut old = candidate("c", DeviceKind::Discrete);
        old.api_version = vk::API_VERSION_1_1;
        assert_eq!(
            check_suitability(&old, &required),
            Err(Rejection::UnsupportedApiVersion)
        );

        assert_eq!(
            check_suitability(&without_present(candidate("d", DeviceKind::Discrete)), &required),
            Err(Rejection::IncompleteQueueFamilies)
        );
    }

    #[test]
    fn rejection_message() {
        let reason = Rejection::MissingExtensions(vec![
            "VK_KHR_swapchain".to_string(),
            "VK_EXT_mesh_shader".to_string(),
        ]);
        insta::assert_snapshot!(
            reason.to_string(),
            @"missing extensions: VK_KHR_swapchain, VK_EXT_mesh_shader"
        );
    }
}
