use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

const fn vertex(x: f32, y: f32) -> Vertex {
    Vertex {
        position: [x, y],
        uv: [(x + 1.0) * 0.5, (y + 1.0) * 0.5],
    }
}

/// Two counter-clockwise triangles covering clip space.
pub const QUAD_VERTICES: [Vertex; 6] = [
    vertex(-1.0, -1.0),
    vertex(1.0, -1.0),
    vertex(1.0, 1.0),
    vertex(-1.0, -1.0),
    vertex(1.0, 1.0),
    vertex(-1.0, 1.0),
];

pub fn create_vertex_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("full_screen_quad"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

/// Uniform block bound at group 0, binding 2.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FilterUniforms {
    pub amount: f32,
    pub texel_width: f32,
    pub texel_height: f32,
    pub _pad: f32,
}

impl FilterUniforms {
    pub fn new(amount: f32, width: u32, height: u32) -> Self {
        Self {
            amount,
            texel_width: 1.0 / width.max(1) as f32,
            texel_height: 1.0 / height.max(1) as f32,
            _pad: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_covers_clip_space_with_matching_uvs() {
        for v in QUAD_VERTICES {
            assert!(v.position.iter().all(|c| c.abs() == 1.0));
            assert_eq!(v.uv[0], (v.position[0] + 1.0) / 2.0);
            assert_eq!(v.uv[1], (v.position[1] + 1.0) / 2.0);
        }
        assert_eq!(QUAD_VERTICES[0].uv, [0.0, 0.0]);
        assert_eq!(QUAD_VERTICES[2].uv, [1.0, 1.0]);
    }

    #[test]
    fn triangles_are_counter_clockwise() {
        for tri in QUAD_VERTICES.chunks_exact(3) {
            let [a, b, c] = [tri[0].position, tri[1].position, tri[2].position];
            let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(cross > 0.0);
        }
    }

    #[test]
    fn uniforms_are_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<FilterUniforms>(), 16);
        let u = FilterUniforms::new(0.5, 4, 2);
        assert_eq!(u.texel_width, 0.25);
        assert_eq!(u.texel_height, 0.5);
    }
}
