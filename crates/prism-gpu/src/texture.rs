use anyhow::{Result, anyhow};
use half::f16;
use prism_core::error::PipelineError;
use prism_core::image_buf::ImageBuf;

use crate::context::GpuContext;

/// Format of uploaded sources and offscreen render targets. Half floats
/// keep linear values above 1.0 that earlier CPU kernels may produce, and
/// stay filterable without extra device features.
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

const BYTES_PER_PIXEL: u32 = 4 * 2;

/// A GPU texture holding linear RGBA half-float image data.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    /// Upload an ImageBuf as a sampled texture.
    pub fn from_image_buf(
        ctx: &GpuContext,
        buf: &ImageBuf,
        label: &str,
    ) -> Result<Self, PipelineError> {
        check_dimensions(ctx, buf.width, buf.height)?;
        let size = extent(buf.width, buf.height);

        let texture = ctx.scoped("source texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;

        let rgba: Vec<f16> = buf.to_rgba_f32().into_iter().map(f16::from_f32).collect();
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&rgba),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(buf.width * BYTES_PER_PIXEL),
                rows_per_image: Some(buf.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            width: buf.width,
            height: buf.height,
        })
    }

    /// Create an empty texture to render into and read back from.
    pub fn create_render_target(
        ctx: &GpuContext,
        width: u32,
        height: u32,
        label: &str,
    ) -> Result<Self, PipelineError> {
        check_dimensions(ctx, width, height)?;

        let texture = ctx.scoped("render target", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: extent(width, height),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            width,
            height,
        })
    }

    /// Read texture data back to CPU as an ImageBuf (blocking).
    ///
    /// Waits for every submission on the queue, so callers must not be on
    /// an interactive thread.
    pub fn download(&self, ctx: &GpuContext) -> Result<ImageBuf> {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture_download"),
            });
        let readback = self.encode_readback(ctx, &mut encoder);
        ctx.queue.submit(std::iter::once(encoder.finish()));
        readback.wait(ctx)
    }

    /// Record a copy of this texture into a staging buffer. The copy runs
    /// when `encoder` is submitted; [`Readback::wait`] then maps it.
    pub fn encode_readback(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Readback {
        let padded_row = padded_bytes_per_row(self.width);
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture_download_staging"),
            size: (padded_row * self.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            extent(self.width, self.height),
        );

        Readback {
            staging,
            width: self.width,
            height: self.height,
        }
    }
}

/// A texture copy recorded into a command buffer, waiting to be mapped.
pub struct Readback {
    staging: wgpu::Buffer,
    width: u32,
    height: u32,
}

impl Readback {
    /// Block until the copy lands and unpack it. Only polls the device, so
    /// other threads may keep submitting meanwhile.
    pub fn wait(self, ctx: &GpuContext) -> Result<ImageBuf> {
        let unpadded_row = (self.width * BYTES_PER_PIXEL) as usize;
        let padded_row = padded_bytes_per_row(self.width) as usize;

        let (sender, receiver) = std::sync::mpsc::channel();
        self.staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        ctx.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| anyhow!("GPU poll error: {e}"))?;
        receiver
            .recv()
            .map_err(|_| anyhow!("buffer map cancelled"))??;

        let mapped = self.staging.slice(..).get_mapped_range();
        let mut rgb = Vec::with_capacity((self.width * self.height * 3) as usize);
        for row in mapped.chunks_exact(padded_row) {
            for pixel in row[..unpadded_row].chunks_exact(BYTES_PER_PIXEL as usize) {
                // Alpha is dropped.
                for channel in pixel[..6].chunks_exact(2) {
                    rgb.push(f16::from_le_bytes([channel[0], channel[1]]).to_f32());
                }
            }
        }
        drop(mapped);
        self.staging.unmap();

        ImageBuf::from_data(self.width, self.height, rgb)
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

/// Row pitch for texture-to-buffer copies.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * BYTES_PER_PIXEL).div_ceil(align) * align
}

fn check_dimensions(ctx: &GpuContext, width: u32, height: u32) -> Result<(), PipelineError> {
    let max = ctx.max_texture_dimension();
    if width == 0 || height == 0 || width > max || height > max {
        return Err(PipelineError::ResourceCreationFailed(format!(
            "texture size {width}x{height} outside 1..={max}"
        )));
    }
    Ok(())
}
