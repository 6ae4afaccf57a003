pub mod kernels;
mod params;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;
use crate::image_buf::ImageBuf;

pub use params::{FilterParams, ParamKind};

/// Built-in CPU look presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preset {
    Mono,
    Noir,
    Tonal,
    Chrome,
    Instant,
    Process,
    Transfer,
}

/// Parametric CPU color kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorKernel {
    WhiteBalance,
    Exposure,
    Contrast,
    Saturation,
    ColorCube,
}

/// Fragment kernels rendered by the GPU pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderKernel {
    Fade,
    Sepia,
    Vignette,
    Posterize,
}

impl ShaderKernel {
    pub const ALL: [ShaderKernel; 4] = [Self::Fade, Self::Sepia, Self::Vignette, Self::Posterize];

    /// Catalog id of the filter backed by this kernel.
    pub fn filter_id(self) -> &'static str {
        match self {
            Self::Fade => "Fade",
            Self::Sepia => "Sepia",
            Self::Vignette => "Vignette",
            Self::Posterize => "Posterize",
        }
    }

    /// Fragment entry point in the shader library.
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Fade => "fade",
            Self::Sepia => "sepia",
            Self::Vignette => "vignette",
            Self::Posterize => "posterize",
        }
    }
}

/// What executes a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    Preset(Preset),
    Color(ColorKernel),
    Shader(ShaderKernel),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Preset,
    Color,
    Shader,
}

/// Renders shader kernels for the filter engine.
///
/// Implementations own a single command queue and may serialize calls.
pub trait ShaderRenderer: Send + Sync {
    /// Render `kernel` over an upright image. `image_key` identifies the
    /// pixels so an implementation can reuse an uploaded texture.
    fn render(
        &self,
        image: &ImageBuf,
        image_key: &str,
        kernel: ShaderKernel,
        amount: f32,
    ) -> Result<ImageBuf, PipelineError>;
}

/// A catalog entry: stable id, display name and the kernel behind it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub kernel: Kernel,
}

impl FilterDescriptor {
    pub fn capability(&self) -> Capability {
        match self.kernel {
            Kernel::Preset(_) => Capability::Preset,
            Kernel::Color(_) => Capability::Color,
            Kernel::Shader(_) => Capability::Shader,
        }
    }

    pub fn param_kind(&self) -> ParamKind {
        match self.kernel {
            Kernel::Preset(_) | Kernel::Shader(_) | Kernel::Color(ColorKernel::ColorCube) => {
                ParamKind::Intensity
            }
            Kernel::Color(ColorKernel::WhiteBalance) => ParamKind::WhiteBalance,
            Kernel::Color(ColorKernel::Exposure) => ParamKind::Exposure,
            Kernel::Color(ColorKernel::Contrast) => ParamKind::Contrast,
            Kernel::Color(ColorKernel::Saturation) => ParamKind::Saturation,
        }
    }

    pub fn neutral_params(&self) -> FilterParams {
        FilterParams::neutral(self.param_kind())
    }

    /// Parameters used when the filter is picked from the gallery.
    pub fn default_params(&self) -> FilterParams {
        match self.param_kind() {
            ParamKind::Intensity => FilterParams::Intensity { amount: 1.0 },
            kind => FilterParams::neutral(kind),
        }
    }

    /// Check the parameter shape and clamp into range.
    pub fn validate(&self, params: &FilterParams) -> Result<FilterParams, PipelineError> {
        let expected = self.param_kind();
        if params.kind() != expected {
            return Err(PipelineError::ParameterMismatch {
                filter: self.id.to_string(),
                expected,
            });
        }
        Ok(params.clamped())
    }

    /// Apply this filter to upright pixels.
    ///
    /// CPU kernels run inline. Shader kernels go through `renderer` and fail
    /// with `DeviceUnavailable` when none is attached. Neutral parameters
    /// return the input untouched.
    pub fn apply(
        &self,
        input: ImageBuf,
        image_key: &str,
        params: &FilterParams,
        renderer: Option<&dyn ShaderRenderer>,
    ) -> Result<ImageBuf, PipelineError> {
        let params = self.validate(params)?;
        if params.is_neutral() {
            return Ok(input);
        }
        debug!(filter = self.id, ?params, "applying filter");

        let output = match (self.kernel, params) {
            (Kernel::Preset(preset), FilterParams::Intensity { amount }) => {
                kernels::presets::apply(preset, input, amount)
            }
            (Kernel::Color(ColorKernel::ColorCube), FilterParams::Intensity { amount }) => {
                kernels::color_cube::apply(input, amount)
            }
            (
                Kernel::Color(ColorKernel::WhiteBalance),
                FilterParams::WhiteBalance { temperature, tint },
            ) => kernels::white_balance::apply(input, temperature, tint),
            (Kernel::Color(ColorKernel::Exposure), FilterParams::Exposure { ev }) => {
                kernels::exposure::apply(input, ev)
            }
            (Kernel::Color(ColorKernel::Contrast), FilterParams::Contrast { amount }) => {
                kernels::contrast::apply(input, amount)
            }
            (Kernel::Color(ColorKernel::Saturation), FilterParams::Saturation { amount }) => {
                kernels::saturation::apply(input, amount)
            }
            (Kernel::Shader(kernel), FilterParams::Intensity { amount }) => {
                let renderer = renderer.ok_or_else(|| {
                    PipelineError::DeviceUnavailable(format!(
                        "{} needs a GPU renderer",
                        self.id
                    ))
                })?;
                renderer.render(&input, image_key, kernel, amount)?
            }
            _ => {
                return Err(PipelineError::ParameterMismatch {
                    filter: self.id.to_string(),
                    expected: self.param_kind(),
                });
            }
        };
        Ok(output)
    }
}

static BUILTIN_FILTERS: &[FilterDescriptor] = &[
    FilterDescriptor {
        id: "Mono",
        name: "Mono",
        kernel: Kernel::Preset(Preset::Mono),
    },
    FilterDescriptor {
        id: "Noir",
        name: "Noir",
        kernel: Kernel::Preset(Preset::Noir),
    },
    FilterDescriptor {
        id: "Tonal",
        name: "Tonal",
        kernel: Kernel::Preset(Preset::Tonal),
    },
    FilterDescriptor {
        id: "Chrome",
        name: "Chrome",
        kernel: Kernel::Preset(Preset::Chrome),
    },
    FilterDescriptor {
        id: "Instant",
        name: "Instant",
        kernel: Kernel::Preset(Preset::Instant),
    },
    FilterDescriptor {
        id: "Process",
        name: "Process",
        kernel: Kernel::Preset(Preset::Process),
    },
    FilterDescriptor {
        id: "Transfer",
        name: "Transfer",
        kernel: Kernel::Preset(Preset::Transfer),
    },
    FilterDescriptor {
        id: "WhiteBalance",
        name: "White Balance",
        kernel: Kernel::Color(ColorKernel::WhiteBalance),
    },
    FilterDescriptor {
        id: "Exposure",
        name: "Exposure",
        kernel: Kernel::Color(ColorKernel::Exposure),
    },
    FilterDescriptor {
        id: "Contrast",
        name: "Contrast",
        kernel: Kernel::Color(ColorKernel::Contrast),
    },
    FilterDescriptor {
        id: "Saturation",
        name: "Saturation",
        kernel: Kernel::Color(ColorKernel::Saturation),
    },
    FilterDescriptor {
        id: "ColorCube",
        name: "Film Cube",
        kernel: Kernel::Color(ColorKernel::ColorCube),
    },
    FilterDescriptor {
        id: "Fade",
        name: "Fade",
        kernel: Kernel::Shader(ShaderKernel::Fade),
    },
    FilterDescriptor {
        id: "Sepia",
        name: "Sepia",
        kernel: Kernel::Shader(ShaderKernel::Sepia),
    },
    FilterDescriptor {
        id: "Vignette",
        name: "Vignette",
        kernel: Kernel::Shader(ShaderKernel::Vignette),
    },
    FilterDescriptor {
        id: "Posterize",
        name: "Posterize",
        kernel: Kernel::Shader(ShaderKernel::Posterize),
    },
];

/// Filters grouped under a display name.
#[derive(Clone, Debug)]
pub struct FilterCollection {
    pub name: &'static str,
    pub capability: Capability,
    pub filters: Vec<FilterDescriptor>,
}

/// The immutable set of available filters.
#[derive(Clone, Debug)]
pub struct FilterCatalog {
    filters: &'static [FilterDescriptor],
    collections: Vec<FilterCollection>,
}

impl FilterCatalog {
    pub fn builtin() -> Self {
        let collections = [
            ("Built-in Presets", Capability::Preset),
            ("Adjustments", Capability::Color),
            ("Shader Effects", Capability::Shader),
        ]
        .into_iter()
        .map(|(name, capability)| FilterCollection {
            name,
            capability,
            filters: BUILTIN_FILTERS
                .iter()
                .filter(|f| f.capability() == capability)
                .copied()
                .collect(),
        })
        .collect();

        Self {
            filters: BUILTIN_FILTERS,
            collections,
        }
    }

    /// Every filter in declaration order.
    pub fn all_filters(&self) -> &[FilterDescriptor] {
        self.filters
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.id).collect()
    }

    pub fn lookup(&self, id: &str) -> Option<&FilterDescriptor> {
        self.filters.iter().find(|f| f.id == id)
    }

    /// Like [`lookup`](Self::lookup) but reports `UnknownFilter`.
    pub fn get(&self, id: &str) -> Result<&FilterDescriptor, PipelineError> {
        self.lookup(id)
            .ok_or_else(|| PipelineError::UnknownFilter(id.to_string()))
    }

    pub fn collections(&self) -> &[FilterCollection] {
        &self.collections
    }
}

impl Default for FilterCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn gradient() -> ImageBuf {
        let data = (0..4 * 4 * 3).map(|i| (i as f32 / 48.0) * 0.9 + 0.05).collect();
        ImageBuf::from_data(4, 4, data).unwrap()
    }

    struct CountingRenderer(AtomicUsize);

    impl ShaderRenderer for CountingRenderer {
        fn render(
            &self,
            image: &ImageBuf,
            _image_key: &str,
            _kernel: ShaderKernel,
            amount: f32,
        ) -> Result<ImageBuf, PipelineError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            let mut out = image.clone();
            out.data.iter_mut().for_each(|v| *v *= 1.0 - amount * 0.5);
            Ok(out)
        }
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let catalog = FilterCatalog::builtin();
        let ids = catalog.ids();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ids[0], "Mono");
        assert_eq!(ids[1], "Noir");
        assert_eq!(ids.last(), Some(&"Posterize"));
    }

    #[test]
    fn collections_cover_every_filter() {
        let catalog = FilterCatalog::builtin();
        let total: usize = catalog.collections().iter().map(|c| c.filters.len()).sum();
        assert_eq!(total, catalog.all_filters().len());
        assert_eq!(catalog.collections()[0].name, "Built-in Presets");
    }

    #[test]
    fn lookup_unknown_filter() {
        let catalog = FilterCatalog::builtin();
        assert!(catalog.lookup("UnknownX").is_none());
        assert_eq!(
            catalog.get("UnknownX").unwrap_err(),
            PipelineError::UnknownFilter("UnknownX".into())
        );
    }

    #[test]
    fn shader_kernels_map_back_to_catalog() {
        let catalog = FilterCatalog::builtin();
        for kernel in ShaderKernel::ALL {
            let desc = catalog.lookup(kernel.filter_id()).unwrap();
            assert_eq!(desc.kernel, Kernel::Shader(kernel));
            assert_eq!(kernel.entry_point(), desc.id.to_lowercase());
        }
    }

    #[test]
    fn neutral_params_are_pixel_identical() {
        let catalog = FilterCatalog::builtin();
        let renderer = CountingRenderer(AtomicUsize::new(0));
        for desc in catalog.all_filters() {
            let input = gradient();
            let out = desc
                .apply(input.clone(), "k", &desc.neutral_params(), Some(&renderer))
                .unwrap();
            assert_eq!(out, input, "{}", desc.id);
        }
        assert_eq!(renderer.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn default_params_change_presets() {
        let catalog = FilterCatalog::builtin();
        for desc in catalog.all_filters() {
            if desc.capability() != Capability::Preset {
                continue;
            }
            let input = gradient();
            let out = desc.apply(input.clone(), "k", &desc.default_params(), None).unwrap();
            assert_ne!(out, input, "{}", desc.id);
        }
    }

    #[test]
    fn mismatched_params_rejected() {
        let catalog = FilterCatalog::builtin();
        let desc = catalog.get("Exposure").unwrap();
        let err = desc
            .apply(gradient(), "k", &FilterParams::Intensity { amount: 1.0 }, None)
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::ParameterMismatch {
                filter: "Exposure".into(),
                expected: ParamKind::Exposure
            }
        );
    }

    #[test]
    fn shader_filter_without_renderer_is_unavailable() {
        let catalog = FilterCatalog::builtin();
        let desc = catalog.get("Fade").unwrap();
        let err = desc
            .apply(gradient(), "k", &desc.default_params(), None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DeviceUnavailable(_)));
    }

    #[test]
    fn shader_filter_delegates_to_renderer() {
        let catalog = FilterCatalog::builtin();
        let renderer = CountingRenderer(AtomicUsize::new(0));
        let desc = catalog.get("Vignette").unwrap();
        let out = desc
            .apply(gradient(), "k", &desc.default_params(), Some(&renderer))
            .unwrap();
        assert_eq!(renderer.0.load(Ordering::SeqCst), 1);
        assert!((out.data[0] - gradient().data[0] * 0.5).abs() < 1e-6);
    }
}
