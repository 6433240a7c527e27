//! Kernel dispatch: bind positional arguments, run the kernel over a tiled 2D
//! domain and read the counts back into host memory.

use log::{debug, info};

use crate::{
    command_buffer,
    command_encoder::CommandEncoderExt,
    complex::Complex,
    compute::Geometry,
    error::{DispatchError, Error, FailureCode, Result},
    field::ScalarField,
    program::{ArgKind, Kernel},
    scope,
    screen,
    selector::ComputeContext,
    typed_buffer,
    var::{self, AnyVar},
};

/// One positional kernel argument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KernelArg {
    /// The output buffer. It is allocated by the dispatcher to fit the domain.
    Output,
    Size(screen::Size),
    Complex(Complex),
    Count(u32),
}

impl KernelArg {
    pub fn kind(&self) -> ArgKind {
        match self {
            KernelArg::Output => ArgKind::Output,
            KernelArg::Size(_) => ArgKind::Size,
            KernelArg::Complex(_) => ArgKind::Complex,
            KernelArg::Count(_) => ArgKind::Count,
        }
    }

    fn uniform(&self, device: &wgpu::Device) -> Option<Box<dyn AnyVar>> {
        match *self {
            KernelArg::Output => None,
            KernelArg::Size(size) => Some(Box::new(
                var::Builder::uniform(size)
                    .with_label("kernel-arg-size")
                    .create(device),
            )),
            KernelArg::Complex(complex) => Some(Box::new(
                var::Builder::uniform(complex)
                    .with_label("kernel-arg-complex")
                    .create(device),
            )),
            KernelArg::Count(count) => Some(Box::new(
                var::Builder::uniform(count)
                    .with_label("kernel-arg-count")
                    .create(device),
            )),
        }
    }
}

/// Check `args` against `signature` position by position.
///
/// A `Size` argument must also equal the dispatch domain, since the kernel
/// uses it to discard the invocations outside the domain.
pub fn check_arguments(
    signature: &[ArgKind],
    args: &[KernelArg],
    domain: screen::Size,
) -> Result<(), DispatchError> {
    if signature.len() != args.len() {
        return Err(DispatchError::new(
            FailureCode::ArgumentMismatch,
            format!(
                "kernel takes {} arguments, {} were given",
                signature.len(),
                args.len()
            ),
        ));
    }

    for (position, (expected, arg)) in signature.iter().zip(args).enumerate() {
        if *expected != arg.kind() {
            return Err(DispatchError::new(
                FailureCode::ArgumentMismatch,
                format!(
                    "argument {} should be {}, got {}",
                    position,
                    expected,
                    arg.kind()
                ),
            ));
        }
        if let KernelArg::Size(size) = arg {
            if *size != domain {
                return Err(DispatchError::new(
                    FailureCode::ArgumentMismatch,
                    format!(
                        "argument {} is a {} domain, dispatching over {}",
                        position, size, domain
                    ),
                ));
            }
        }
    }

    Ok(())
}

/// Check that the output buffer for `domain` fits the device.
pub fn check_output_size(
    limits: &wgpu::Limits,
    domain: screen::Size,
) -> Result<(), DispatchError> {
    let output_bytes = domain.cell_count() as u64 * std::mem::size_of::<u32>() as u64;
    if output_bytes > limits.max_storage_buffer_binding_size as u64 {
        return Err(DispatchError::new(
            FailureCode::ResourceLimit,
            format!(
                "a {} domain needs {} bytes of output, the device allows {}",
                domain, output_bytes, limits.max_storage_buffer_binding_size
            ),
        ));
    }
    Ok(())
}

/// Check the workgroup counts against the device.
pub fn check_workgroups(limits: &wgpu::Limits, geometry: &Geometry) -> Result<(), DispatchError> {
    let (x, y, _) = geometry.workgroups();
    if x.max(y) > limits.max_compute_workgroups_per_dimension {
        return Err(DispatchError::new(
            FailureCode::ResourceLimit,
            format!(
                "{}x{} workgroups exceeds the device limit of {} per dimension",
                x, y, limits.max_compute_workgroups_per_dimension
            ),
        ));
    }

    Ok(())
}

/**
Run `kernel` once over `domain` and return the counts it wrote.

Blocks until the device has finished. Either every cell of the returned field
was written by the kernel, or an error is returned and nothing is.
*/
pub fn dispatch(
    context: &ComputeContext,
    kernel: &Kernel,
    args: &[KernelArg],
    domain: screen::Size,
) -> Result<ScalarField> {
    if domain.is_empty() {
        return Err(Error::Configuration(format!(
            "cannot dispatch over an empty {} domain",
            domain
        )));
    }
    check_arguments(kernel.signature(), args, domain)?;

    let limits = context.device.limits();
    check_output_size(&limits, domain)?;
    let geometry = Geometry::new(domain, kernel.local_size())?;
    check_workgroups(&limits, &geometry)?;
    debug!(
        "dispatching {} over {} (global {}, local {}, {} idle invocations)",
        kernel.entry_point(),
        domain,
        geometry.global,
        geometry.local,
        geometry.idle_invocations()
    );

    let device = &context.device;

    let (recorded, error) = scope::capture(device, || record(device, kernel, args, &geometry));
    // An invalid command buffer must never reach the queue.
    if let Some(error) = error {
        return Err(DispatchError::from(error).into());
    }

    info!("kernel execution");
    context.queue.submit([recorded.command_buffer]);

    let counts = recorded.staging.read_to_vec(device)?;
    let field = ScalarField::new(domain, counts).ok_or_else(|| {
        DispatchError::new(
            FailureCode::MapFailed,
            format!("read back the wrong number of cells for a {} domain", domain),
        )
    })?;
    Ok(field)
}

/// Everything a dispatch's command buffer uses. Held until the read completes.
struct Recorded {
    command_buffer: wgpu::CommandBuffer,
    staging: typed_buffer::Buffer<u32>,
    _output: typed_buffer::Buffer<u32>,
    _uniforms: Vec<Option<Box<dyn AnyVar>>>,
    _bind_group: wgpu::BindGroup,
}

fn record(
    device: &wgpu::Device,
    kernel: &Kernel,
    args: &[KernelArg],
    geometry: &Geometry,
) -> Recorded {
    let cell_count = geometry.domain.cell_count() as u64;

    let output = typed_buffer::Builder::<u32>::new(cell_count)
        .with_label("scalar-field")
        .with_usage(wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC)
        .create(device);

    let staging = typed_buffer::Builder::<u32>::new(cell_count)
        .with_label("scalar-field-staging")
        .with_usage(wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST)
        .create(device);

    let uniforms: Vec<Option<Box<dyn AnyVar>>> =
        args.iter().map(|arg| arg.uniform(device)).collect();

    let entries: Vec<wgpu::BindGroupEntry> = uniforms
        .iter()
        .enumerate()
        .map(|(binding, uniform)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: match uniform {
                Some(uniform) => uniform.binding_resource(),
                None => output.binding_resource(),
            },
        })
        .collect();

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("kernel-args"),
        layout: &kernel.bind_group_layout,
        entries: &entries,
    });

    let command_buffer = command_buffer::record(device, "dispatch", |command_encoder| {
        command_encoder.with_compute_pass(kernel.entry_point(), |compute_pass| {
            compute_pass.set_pipeline(&kernel.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            let (x, y, z) = geometry.workgroups();
            compute_pass.dispatch_workgroups(x, y, z);
        });
        typed_buffer::copy_buffer_to_buffer(command_encoder, &output, &staging);
    });

    Recorded {
        command_buffer,
        staging,
        _output: output,
        _uniforms: uniforms,
        _bind_group: bind_group,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::julia;

    fn domain() -> screen::Size {
        screen::Size::new(100, 50)
    }

    fn julia_args() -> Vec<KernelArg> {
        julia::JuliaParams {
            size: domain(),
            ..Default::default()
        }
        .kernel_args()
        .to_vec()
    }

    #[test]
    fn matching_arguments_pass() {
        assert!(check_arguments(&julia::SIGNATURE, &julia_args(), domain()).is_ok());
    }

    #[test]
    fn swapped_arguments_mismatch() {
        let mut args = julia_args();
        args.swap(4, 5);

        let error = check_arguments(&julia::SIGNATURE, &args, domain()).unwrap_err();

        assert_eq!(error.kind, FailureCode::ArgumentMismatch);
        assert_eq!(error.message, "argument 4 should be complex, got count");
    }

    #[test]
    fn missing_arguments_mismatch() {
        let args = &julia_args()[..5];
        let error = check_arguments(&julia::SIGNATURE, args, domain()).unwrap_err();
        assert_eq!(error.kind, FailureCode::ArgumentMismatch);
    }

    #[test]
    fn size_argument_must_match_domain() {
        let other_domain = screen::Size::new(10, 10);
        let error = check_arguments(&julia::SIGNATURE, &julia_args(), other_domain).unwrap_err();
        assert_eq!(error.kind, FailureCode::ArgumentMismatch);
    }

    #[test]
    fn oversized_output_hits_resource_limit() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 1024,
            ..wgpu::Limits::default()
        };

        let error = check_output_size(&limits, screen::Size::new(16, 17)).unwrap_err();

        assert_eq!(error.kind, FailureCode::ResourceLimit);
        assert!(check_output_size(&limits, screen::Size::new(16, 16)).is_ok());
    }

    #[test]
    fn widest_domains_hit_resource_limit_before_tiling() {
        let error =
            check_output_size(&wgpu::Limits::default(), screen::Size::new(u32::MAX, 1))
                .unwrap_err();
        assert_eq!(error.kind, FailureCode::ResourceLimit);
    }

    #[test]
    fn too_many_workgroups_hits_resource_limit() {
        let limits = wgpu::Limits {
            max_compute_workgroups_per_dimension: 4,
            ..wgpu::Limits::default()
        };
        let geometry = Geometry::new(screen::Size::new(33, 8), screen::Size::new(8, 8)).unwrap();
        assert_eq!(
            check_workgroups(&limits, &geometry).unwrap_err().kind,
            FailureCode::ResourceLimit
        );
    }
}
