//! The whole run: pick a device, compute the field, show it.

use std::{fs, path::Path};

use log::info;

use crate::{
    canvas::{Canvas, Dismissal},
    config::Config,
    dispatch,
    error::{Error, Result},
    field::ScalarField,
    julia::{self, JuliaParams},
    program::Program,
    selector::{self, ComputeContext},
};

pub const WINDOW_TITLE: &str = "Julia set";

pub fn load_kernel_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::KernelSource {
        path: path.to_path_buf(),
        source,
    })
}

/// Build `source` for `context` and run its `julia` entry point with `params`.
pub fn compute(context: &ComputeContext, source: &str, params: &JuliaParams) -> Result<ScalarField> {
    let program = Program::build(context, "julia-program", source)?;
    let kernel = program.kernel(context, julia::ENTRY_POINT, &julia::SIGNATURE)?;
    dispatch::dispatch(context, &kernel, &params.kernel_args(), params.size)
}

/// Platform and device report, one line each.
pub fn list_devices() -> Vec<String> {
    let instance = wgpu::Instance::new(wgpu::Backends::all());
    selector::platform_report(&selector::platforms(&instance))
}

pub fn run(config: &Config) -> Result<Dismissal> {
    let params = config.julia()?;
    let source = load_kernel_source(&config.kernel)?;

    let instance = wgpu::Instance::new(wgpu::Backends::all());
    let platforms = selector::platforms(&instance);
    selector::log_platforms(&platforms);

    let context = selector::acquire_context(&platforms, config.device)?;
    info!(
        "kernels will be executed on {} ({})",
        context.device_name(),
        context.platform
    );

    let field = compute(&context, &source, &params)?;

    // Nothing is shown unless the whole field was computed.
    let mut canvas = Canvas::open(&instance, &context, WINDOW_TITLE, field.size())?;
    canvas.present(&field, params.max_iter)?;
    drop(field);

    let dismissal = canvas.wait_for_dismissal()?;
    info!("dismissed by {:?}", dismissal);
    Ok(dismissal)
}
