use prism_core::error::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Which adapter to ask for when several are present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuPreference {
    #[default]
    HighPerformance,
    LowPower,
}

impl From<GpuPreference> for wgpu::PowerPreference {
    fn from(pref: GpuPreference) -> Self {
        match pref {
            GpuPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            GpuPreference::LowPower => wgpu::PowerPreference::LowPower,
        }
    }
}

/// Holds the wgpu instance, device and queue for one editing session.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Acquire an adapter and device. Failure is `DeviceUnavailable`.
    pub async fn new(preference: GpuPreference) -> Result<Self, PipelineError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: preference.into(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| {
                PipelineError::DeviceUnavailable(format!("no suitable GPU adapter: {e}"))
            })?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            ?preference,
            "selected GPU adapter"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("prism"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                ..Default::default()
            })
            .await
            .map_err(|e| {
                PipelineError::DeviceUnavailable(format!("failed to create GPU device: {e}"))
            })?;

        Ok(Self {
            instance,
            device,
            queue,
            adapter_info,
        })
    }

    /// Blocking variant of [`GpuContext::new`] for non-async callers.
    pub fn new_blocking(preference: GpuPreference) -> Result<Self, PipelineError> {
        pollster::block_on(Self::new(preference))
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Run `create` inside validation and out-of-memory error scopes.
    ///
    /// Any error raised while creating resources comes back as
    /// `ResourceCreationFailed` instead of reaching the uncaptured handler.
    pub fn scoped<T>(
        &self,
        what: &str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, PipelineError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());

        match validation.or(oom) {
            Some(err) => Err(PipelineError::ResourceCreationFailed(format!("{what}: {err}"))),
            None => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_serializes_snake_case() {
        let json = serde_json::to_string(&GpuPreference::LowPower).unwrap();
        assert_eq!(json, "\"low_power\"");
        let pref: GpuPreference = serde_json::from_str("\"high_performance\"").unwrap();
        assert_eq!(pref, GpuPreference::HighPerformance);
    }

    #[test]
    fn preference_maps_to_wgpu() {
        assert_eq!(
            wgpu::PowerPreference::from(GpuPreference::LowPower),
            wgpu::PowerPreference::LowPower
        );
    }

    #[test]
    fn scoped_reports_validation_errors() {
        let Ok(ctx) = GpuContext::new_blocking(GpuPreference::default()) else {
            return;
        };
        let result = ctx.scoped("zero-sized texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("invalid"),
                size: wgpu::Extent3d {
                    width: 0,
                    height: 0,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        });
        assert!(matches!(result, Err(PipelineError::ResourceCreationFailed(_))));
    }
}
