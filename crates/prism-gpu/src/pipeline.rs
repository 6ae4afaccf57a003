use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};
use wgpu::util::DeviceExt;

use prism_core::error::PipelineError;
use prism_core::filters::{ShaderKernel, ShaderRenderer};
use prism_core::image_buf::ImageBuf;

use crate::context::{GpuContext, GpuPreference};
use crate::quad::{self, FilterUniforms, QUAD_VERTICES, Vertex};
use crate::shader::{self, PipelineCache};
use crate::texture::{GpuTexture, Readback, TEXTURE_FORMAT};

/// Pipelines are compiled per kernel and per target format, since the
/// offscreen target and a presentation surface may differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub kernel: ShaderKernel,
    pub format: wgpu::TextureFormat,
}

/// Per-session render state: shared layouts, sampler, quad and the
/// pipeline cache, all on one device and queue.
pub struct RenderContext {
    gpu: Arc<GpuContext>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    quad: wgpu::Buffer,
    pipelines: PipelineCache<PipelineKey, wgpu::RenderPipeline>,
    disabled: RwLock<HashSet<ShaderKernel>>,
    last_source: Mutex<Option<(String, Arc<GpuTexture>)>>,
    queue_lock: Mutex<()>,
}

impl RenderContext {
    pub fn new(gpu: Arc<GpuContext>) -> Result<Self, PipelineError> {
        let (bind_group_layout, pipeline_layout, sampler, quad) =
            gpu.scoped("render context", |device| {
                let bind_group_layout = create_bind_group_layout(device);
                let pipeline_layout =
                    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("filter_pipeline_layout"),
                        bind_group_layouts: &[&bind_group_layout],
                        push_constant_ranges: &[],
                    });
                let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some("linear_clamp"),
                    address_mode_u: wgpu::AddressMode::ClampToEdge,
                    address_mode_v: wgpu::AddressMode::ClampToEdge,
                    address_mode_w: wgpu::AddressMode::ClampToEdge,
                    mag_filter: wgpu::FilterMode::Linear,
                    min_filter: wgpu::FilterMode::Linear,
                    ..Default::default()
                });
                let quad = quad::create_vertex_buffer(device);
                (bind_group_layout, pipeline_layout, sampler, quad)
            })?;

        info!(adapter = %gpu.adapter_info.name, "render context ready");

        Ok(Self {
            gpu,
            bind_group_layout,
            pipeline_layout,
            sampler,
            quad,
            pipelines: PipelineCache::new(),
            disabled: RwLock::new(HashSet::new()),
            last_source: Mutex::new(None),
            queue_lock: Mutex::new(()),
        })
    }

    /// Acquire a device and build a context on it. Blocks.
    pub fn acquire(preference: GpuPreference) -> Result<Self, PipelineError> {
        let gpu = GpuContext::new_blocking(preference)?;
        Self::new(Arc::new(gpu))
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    /// Number of pipelines compiled so far.
    pub fn compiled_pipelines(&self) -> usize {
        self.pipelines.compiled()
    }

    pub fn is_disabled(&self, kernel: ShaderKernel) -> bool {
        self.disabled.read().contains(&kernel)
    }

    /// The cached pipeline for `kernel` rendering into `format`, compiled
    /// on first use.
    ///
    /// A compile failure is a broken shader library: debug builds panic,
    /// release builds log it and disable the kernel for the session.
    pub fn pipeline(
        &self,
        kernel: ShaderKernel,
        format: wgpu::TextureFormat,
    ) -> Result<Arc<wgpu::RenderPipeline>, PipelineError> {
        if self.is_disabled(kernel) {
            return Err(PipelineError::ShaderCompilationFailed {
                filter: kernel.filter_id().to_string(),
                reason: "disabled after an earlier compile failure".to_string(),
            });
        }

        let key = PipelineKey { kernel, format };
        self.pipelines
            .get_or_try_insert(key, || self.compile(key))
            .map_err(|reason| {
                if cfg!(debug_assertions) {
                    panic!("shader `{}` failed to compile: {reason}", kernel.entry_point());
                }
                error!(
                    filter = kernel.filter_id(),
                    %reason,
                    "shader compilation failed, disabling filter"
                );
                self.disabled.write().insert(kernel);
                PipelineError::ShaderCompilationFailed {
                    filter: kernel.filter_id().to_string(),
                    reason,
                }
            })
    }

    fn compile(&self, key: PipelineKey) -> Result<wgpu::RenderPipeline, String> {
        debug!(kernel = ?key.kernel, format = ?key.format, "compiling render pipeline");
        let source = shader::module_source(key.kernel);

        self.gpu
            .scoped("shader pipeline", |device| {
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(key.kernel.entry_point()),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(key.kernel.filter_id()),
                    layout: Some(&self.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &module,
                        entry_point: Some(shader::VERTEX_ENTRY_POINT),
                        buffers: &[Vertex::layout()],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        ..Default::default()
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &module,
                        entry_point: Some(key.kernel.entry_point()),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: key.format,
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    multiview: None,
                    cache: None,
                })
            })
            .map_err(|e| e.to_string())
    }

    /// Upload `image`, reusing the previous upload when `image_key` and
    /// size match.
    fn source_texture(
        &self,
        image: &ImageBuf,
        image_key: &str,
    ) -> Result<Arc<GpuTexture>, PipelineError> {
        let mut last = self.last_source.lock();
        if let Some((key, texture)) = last.as_ref()
            && key == image_key
            && texture.width == image.width
            && texture.height == image.height
        {
            return Ok(Arc::clone(texture));
        }

        debug!(
            key = image_key,
            width = image.width,
            height = image.height,
            "uploading source texture"
        );
        let texture = Arc::new(GpuTexture::from_image_buf(&self.gpu, image, "filter_source")?);
        *last = Some((image_key.to_string(), Arc::clone(&texture)));
        Ok(texture)
    }

    /// Encode one full-screen draw of `pipeline` over `source` into `target`.
    fn encode_draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        source: &GpuTexture,
        target: &wgpu::TextureView,
        amount: f32,
        viewport: Option<Viewport>,
    ) -> Result<(), PipelineError> {
        let uniforms = FilterUniforms::new(amount, source.width, source.height);
        let bind_group = self.gpu.scoped("filter bind group", |device| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("filter_uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("filter_bind_group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&source.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffer.as_entire_binding(),
                    },
                ],
            })
        })?;

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("filter_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, self.quad.slice(..));
        if let Some(v) = viewport {
            pass.set_viewport(v.x, v.y, v.width, v.height, 0.0, 1.0);
        }
        pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        Ok(())
    }

    /// Render `kernel` over `image` into a memory texture and read it back.
    ///
    /// Blocks until the GPU finishes. Never call from an interactive thread.
    pub fn render_offscreen(
        &self,
        image: &ImageBuf,
        image_key: &str,
        kernel: ShaderKernel,
        amount: f32,
    ) -> Result<ImageBuf, PipelineError> {
        self.submit_offscreen(image, image_key, kernel, amount)?
            .wait(&self.gpu)
            .map_err(|e| PipelineError::ResourceCreationFailed(format!("readback: {e:#}")))
    }

    /// Encode and submit an offscreen render plus the copy back to a
    /// staging buffer. The queue lock is released on return, so a
    /// `present` is never held up by the readback wait.
    pub fn submit_offscreen(
        &self,
        image: &ImageBuf,
        image_key: &str,
        kernel: ShaderKernel,
        amount: f32,
    ) -> Result<Readback, PipelineError> {
        let pipeline = self.pipeline(kernel, TEXTURE_FORMAT)?;
        let _queue = self.queue_lock.lock();

        let source = self.source_texture(image, image_key)?;
        let target = GpuTexture::create_render_target(
            &self.gpu,
            image.width,
            image.height,
            "filter_target",
        )?;

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("offscreen_filter"),
            });
        self.encode_draw(&mut encoder, &pipeline, &source, &target.view, amount, None)?;
        let readback = target.encode_readback(&self.gpu, &mut encoder);
        let commands = self.gpu.scoped("command buffer", |_| encoder.finish())?;
        self.gpu.queue.submit(std::iter::once(commands));

        debug!(
            filter = kernel.filter_id(),
            width = image.width,
            height = image.height,
            "offscreen render submitted"
        );
        Ok(readback)
    }

    /// Render `kernel` over `image` into the surface's next frame and
    /// present it, letterboxed to keep the aspect ratio.
    ///
    /// Does not wait for the GPU.
    pub fn present(
        &self,
        surface: &wgpu::Surface<'_>,
        image: &ImageBuf,
        image_key: &str,
        kernel: ShaderKernel,
        amount: f32,
    ) -> Result<(), PipelineError> {
        let frame = surface
            .get_current_texture()
            .map_err(|e| PipelineError::ResourceCreationFailed(format!("surface frame: {e}")))?;
        let format = frame.texture.format();
        let pipeline = self.pipeline(kernel, format)?;
        let _queue = self.queue_lock.lock();

        let source = self.source_texture(image, image_key)?;
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let viewport = Viewport::fit(
            image.width,
            image.height,
            frame.texture.width(),
            frame.texture.height(),
        );

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present_filter"),
            });
        self.encode_draw(&mut encoder, &pipeline, &source, &view, amount, Some(viewport))?;
        let commands = self.gpu.scoped("command buffer", |_| encoder.finish())?;
        self.gpu.queue.submit(std::iter::once(commands));
        frame.present();
        Ok(())
    }
}

impl ShaderRenderer for RenderContext {
    fn render(
        &self,
        image: &ImageBuf,
        image_key: &str,
        kernel: ShaderKernel,
        amount: f32,
    ) -> Result<ImageBuf, PipelineError> {
        self.render_offscreen(image, image_key, kernel, amount)
    }
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("filter_bgl"),
        entries: &[
            // Source texture
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            // Linear, clamp-to-edge sampler
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            // Filter uniforms
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<FilterUniforms>() as u64,
                    ),
                },
                count: None,
            },
        ],
    })
}

/// Destination rectangle in target pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Largest rectangle with the source aspect ratio centered in the target.
    pub fn fit(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Self {
        let (sw, sh) = (src_width.max(1) as f32, src_height.max(1) as f32);
        let (dw, dh) = (dst_width as f32, dst_height as f32);
        let scale = (dw / sw).min(dh / sh);
        let (width, height) = (sw * scale, sh * scale);
        Self {
            x: (dw - width) / 2.0,
            y: (dh - height) / 2.0,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_context() -> Option<RenderContext> {
        RenderContext::acquire(GpuPreference::default()).ok()
    }

    fn gray(width: u32, height: u32) -> ImageBuf {
        ImageBuf::from_data(width, height, vec![0.5; (width * height * 3) as usize]).unwrap()
    }

    #[test]
    fn fit_letterboxes_wide_image() {
        let v = Viewport::fit(200, 100, 100, 100);
        assert_eq!(v, Viewport { x: 0.0, y: 25.0, width: 100.0, height: 50.0 });
    }

    #[test]
    fn fit_pillarboxes_tall_image() {
        let v = Viewport::fit(100, 200, 200, 200);
        assert_eq!(v, Viewport { x: 50.0, y: 0.0, width: 100.0, height: 200.0 });
    }

    #[test]
    fn rendering_fade_twice_compiles_once() {
        let Some(ctx) = render_context() else {
            return;
        };
        let image = gray(8, 8);

        ctx.render_offscreen(&image, "gray", ShaderKernel::Fade, 1.0).unwrap();
        assert_eq!(ctx.compiled_pipelines(), 1);
        ctx.render_offscreen(&image, "gray", ShaderKernel::Fade, 0.5).unwrap();
        assert_eq!(ctx.compiled_pipelines(), 1);
    }

    #[test]
    fn every_kernel_renders_at_source_size() {
        let Some(ctx) = render_context() else {
            return;
        };
        let image = gray(13, 7);
        for kernel in ShaderKernel::ALL {
            let out = ctx.render_offscreen(&image, "gray", kernel, 1.0).unwrap();
            assert_eq!((out.width, out.height), (13, 7), "{kernel:?}");
            assert!(out.data.iter().all(|v| v.is_finite()), "{kernel:?}");
        }
        assert_eq!(ctx.compiled_pipelines(), ShaderKernel::ALL.len());
    }

    #[test]
    fn vignette_darkens_corners_more_than_center() {
        let Some(ctx) = render_context() else {
            return;
        };
        let image = gray(33, 33);
        let out = ctx.render_offscreen(&image, "gray", ShaderKernel::Vignette, 1.0).unwrap();
        let at = |x: u32, y: u32| out.data[((y * 33 + x) * 3) as usize];
        assert!(at(0, 0) < at(16, 16));
    }

    #[test]
    fn sepia_warms_gray() {
        let Some(ctx) = render_context() else {
            return;
        };
        let out = ctx
            .render_offscreen(&gray(4, 4), "gray", ShaderKernel::Sepia, 1.0)
            .unwrap();
        assert!(out.data[0] > out.data[2]);
    }

    #[test]
    fn orientation_of_rows_is_preserved() {
        let Some(ctx) = render_context() else {
            return;
        };
        // Top row white, bottom row black.
        let mut data = vec![1.0; 4 * 3];
        data.extend(vec![0.0; 4 * 3]);
        let image = ImageBuf::from_data(4, 2, data).unwrap();
        let out = ctx
            .render_offscreen(&image, "rows", ShaderKernel::Posterize, 1.0)
            .unwrap();
        assert!(out.data[0] > 0.9);
        assert!(out.data[out.data.len() - 1] < 0.1);
    }

    #[test]
    fn oversized_image_is_resource_failure() {
        let Some(ctx) = render_context() else {
            return;
        };
        let too_wide = ctx.gpu().max_texture_dimension() + 1;
        let image = ImageBuf::new(too_wide, 1);
        let err = ctx
            .render_offscreen(&image, "huge", ShaderKernel::Fade, 1.0)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ResourceCreationFailed(_)));
    }

    #[test]
    fn renders_through_filter_descriptor() {
        let Some(ctx) = render_context() else {
            return;
        };
        let catalog = prism_core::filters::FilterCatalog::builtin();
        let fade = catalog.get("Fade").unwrap();
        let params = prism_core::filters::FilterParams::Intensity { amount: 1.0 };
        let out = fade
            .apply(gray(4, 4), "gray", &params, Some(&ctx as &dyn ShaderRenderer))
            .unwrap();
        assert_ne!(out, gray(4, 4));
    }

    #[test]
    fn queue_is_free_while_a_readback_is_pending() {
        let Some(ctx) = render_context() else {
            return;
        };
        let pending = ctx
            .submit_offscreen(&gray(8, 8), "gray", ShaderKernel::Fade, 1.0)
            .unwrap();
        assert!(ctx.queue_lock.try_lock().is_some());

        // A second submission goes through before the first is collected.
        let other = ctx
            .render_offscreen(&gray(4, 4), "other", ShaderKernel::Sepia, 1.0)
            .unwrap();
        assert_eq!((other.width, other.height), (4, 4));

        let out = pending.wait(ctx.gpu()).unwrap();
        assert_eq!((out.width, out.height), (8, 8));
    }

    #[test]
    fn values_above_one_are_not_clipped() {
        let Some(ctx) = render_context() else {
            return;
        };
        let bright = ImageBuf::from_data(4, 4, vec![3.0; 4 * 4 * 3]).unwrap();
        let out = ctx
            .render_offscreen(&bright, "bright", ShaderKernel::Fade, 0.0)
            .unwrap();
        assert!(out.data.iter().all(|v| *v > 2.5), "{:?}", &out.data[..3]);
    }
}
