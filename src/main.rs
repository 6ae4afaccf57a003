use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::runtime::Handle;
use tracing::{info, warn};

use prism::{EditingSession, SessionConfig, SessionError};
use prism_core::error::PipelineError;
use prism_core::export::ExportFormat;
use prism_core::filters::{FilterCatalog, FilterParams, ParamKind};
use prism_core::source::SourceImage;

const USAGE: &str = "usage: prism <input> <output> [FILTER[=VALUE]]...";

/// `Fade`, `Fade=0.4`, `Exposure=-1.5`, `WhiteBalance=4200,12`.
fn parse_filter(catalog: &FilterCatalog, arg: &str) -> Result<(String, FilterParams)> {
    let (id, value) = match arg.split_once('=') {
        Some((id, value)) => (id, Some(value)),
        None => (arg, None),
    };
    let filter = catalog.get(id)?;
    let Some(value) = value else {
        return Ok((id.to_string(), filter.default_params()));
    };

    let number = |s: &str| -> Result<f32> {
        s.trim()
            .parse()
            .with_context(|| format!("invalid value {s:?} for {id}"))
    };
    let params = match filter.param_kind() {
        ParamKind::Intensity => FilterParams::Intensity { amount: number(value)? },
        ParamKind::Exposure => FilterParams::Exposure { ev: number(value)? },
        ParamKind::Contrast => FilterParams::Contrast { amount: number(value)? },
        ParamKind::Saturation => FilterParams::Saturation { amount: number(value)? },
        ParamKind::WhiteBalance => {
            let (temperature, tint) = value.split_once(',').unwrap_or((value, "0"));
            FilterParams::WhiteBalance {
                temperature: number(temperature)?,
                tint: number(tint)?,
            }
        }
    };
    Ok((id.to_string(), params))
}

fn load_config() -> Result<SessionConfig> {
    match std::env::var_os("PRISM_CONFIG") {
        Some(path) => SessionConfig::load(Path::new(&path)),
        None => Ok(SessionConfig::default()),
    }
}

/// Bring the session up on the blocking pool, since adapter discovery
/// blocks. Without a GPU the session runs CPU filters only.
async fn start_session(
    config: SessionConfig,
    source: Arc<SourceImage>,
) -> Result<EditingSession> {
    let runtime = Handle::current();
    let session = tokio::task::spawn_blocking(move || {
        match EditingSession::start(config.clone(), Arc::clone(&source), runtime.clone()) {
            Err(SessionError::Pipeline(PipelineError::DeviceUnavailable(reason))) => {
                warn!(%reason, "continuing without GPU, shader filters will fail");
                EditingSession::with_renderer(config, source, None, runtime)
            }
            other => other,
        }
    })
    .await??;
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<()> {
    prism::logging::init();

    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        bail!(USAGE);
    };
    let (input, output) = (PathBuf::from(input), PathBuf::from(output));

    let mut config = load_config()?;
    if output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    {
        config.export_format = ExportFormat::Png;
    }

    let catalog = FilterCatalog::builtin();
    let edits = args
        .map(|arg| parse_filter(&catalog, &arg))
        .collect::<Result<Vec<_>>>()?;

    let source = {
        let input = input.clone();
        tokio::task::spawn_blocking(move || prism_metadata::open_source(&input)).await??
    };
    let source = Arc::new(source);

    let mut session = start_session(config, source).await?;

    for (id, params) in &edits {
        session
            .commit(id, params)
            .with_context(|| format!("apply {id}"))?;
    }

    let bytes = session.export_encoded().await?;
    tokio::fs::write(&output, &bytes)
        .await
        .with_context(|| format!("write {}", output.display()))?;

    info!(
        input = %input.display(),
        output = %output.display(),
        filters = edits.len(),
        size = bytes.len(),
        "exported"
    );
    Ok(())
}
