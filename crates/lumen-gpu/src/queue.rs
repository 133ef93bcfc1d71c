//! Queue family selection.
//!
//! A device needs one family that accepts graphics work and one that can
//! present to the window surface. The two roles are resolved independently
//! and frequently land on the same family.

use crate::error::{GpuError, Result};
use ash::vk;

/// Queue family indices for the graphics and present roles.
///
/// Either role may still be unresolved. Use [`QueueFamilyIndices::resolve`]
/// to obtain a [`QueueFamilies`] that is safe to build a device from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family that supports graphics submission.
    pub graphics: Option<u32>,
    /// Family that can present to the surface.
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both roles are resolved.
    pub const fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Convert into resolved families, failing if either role is missing.
    pub fn resolve(self) -> Result<QueueFamilies> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Ok(QueueFamilies { graphics, present }),
            _ => Err(GpuError::IncompleteQueueFamilies),
        }
    }
}

/// Resolved queue families of a selected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Graphics and present work go to the same family.
    pub const fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    ///
    /// A device must not request the same family twice, so this is the list
    /// queue create infos are built from.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Find graphics and present families.
///
/// Families are scanned in index order and the first match for each role
/// wins. The scan stops once both roles are found. `present_support` is
/// asked per family index whether it can present to the target surface; an
/// error from it aborts the search.
pub fn find_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut present_support: F,
) -> Result<QueueFamilyIndices>
where
    F: FnMut(u32) -> Result<bool>,
{
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(i);
        }

        if indices.present.is_none() && present_support(i)? {
            indices.present = Some(i);
        }

        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
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

    #[test]
    fn incomplete_until_both_roles_set() {
        let mut indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());

        indices.graphics = Some(0);
        assert!(!indices.is_complete());

        indices.present = Some(1);
        assert!(indices.is_complete());
    }

    #[test]
    fn single_family_serves_both_roles() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)];
        let indices = find_queue_families(&families, |_| Ok(true)).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        let resolved = indices.resolve().unwrap();
        assert!(resolved.is_shared());
        assert_eq!(resolved.unique(), vec![0]);
    }

    #[test]
    fn roles_resolve_to_different_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = find_queue_families(&families, |i| Ok(i == 1)).unwrap();

        let resolved = indices.resolve().unwrap();
        assert_eq!(resolved.graphics, 0);
        assert_eq!(resolved.present, 1);
        assert_eq!(resolved.unique(), vec![0, 1]);
    }

    #[test]
    fn first_graphics_family_wins() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = find_queue_families(&families, |i| Ok(i == 2)).unwrap();

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn scan_stops_once_complete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = Vec::new();
        let indices = find_queue_families(&families, |i| {
            queried.push(i);
            Ok(true)
        })
        .unwrap();

        assert!(indices.is_complete());
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn missing_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, |_| Ok(false)).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
        assert!(matches!(
            indices.resolve(),
            Err(GpuError::IncompleteQueueFamilies)
        ));
    }

    #[test]
    fn present_query_failure_aborts() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = find_queue_families(&families, |_| {
            Err(vk::Result::ERROR_SURFACE_LOST_KHR.into())
        });

        assert!(matches!(
            result,
            Err(GpuError::Vulkan(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn no_families_yields_empty_indices() {
        let indices = find_queue_families(&[], |_| Ok(true)).unwrap();
        assert_eq!(indices, QueueFamilyIndices::default());
    }
}
