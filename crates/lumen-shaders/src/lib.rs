//! Triangle shaders for the Lumen renderer.
//!
//! GLSL sources live in `shaders/` and are compiled to SPIR-V at build time
//! using shaderc.

use std::sync::OnceLock;

/// Embedded SPIR-V bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static TRIANGLE_VERT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/triangle_vert.spv"));
    pub static TRIANGLE_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/triangle_frag.spv"));
}

/// Convert byte slice to aligned u32 words (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be a whole number of words"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

static TRIANGLE_VERT_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static TRIANGLE_FRAG_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

/// Vertex shader taking a `vec2` position at location 0 and a `vec3` color at
/// location 1.
pub fn triangle_vertex_shader() -> &'static [u32] {
    TRIANGLE_VERT_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::TRIANGLE_VERT))
}

/// Fragment shader writing the interpolated vertex color with full alpha.
pub fn triangle_fragment_shader() -> &'static [u32] {
    TRIANGLE_FRAG_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::TRIANGLE_FRAG))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn vertex_shader_loads() {
        let shader = triangle_vertex_shader();
        assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
        assert!(shader.len() > 5, "Shader too small");
    }

    #[test]
    fn fragment_shader_loads() {
        let shader = triangle_fragment_shader();
        assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
        assert!(shader.len() > 5, "Shader too small");
    }

    #[test]
    fn bytes_are_little_endian_words() {
        assert_eq!(
            bytes_to_spirv(&[0x03, 0x02, 0x23, 0x07, 1, 0, 0, 0]),
            vec![SPIRV_MAGIC, 1]
        );
    }
}
