//! Kernel programs: WGSL source built into a shader module, and compute
//! pipelines for named entry points in it.

use std::fmt;

use log::debug;

use crate::{
    compute::LOCAL_SIZE,
    error::{DispatchError, Error, FailureCode, Result},
    scope,
    selector::ComputeContext,
    screen,
};

/// The kind of one positional kernel argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgKind {
    /// `array<u32>` storage buffer the kernel writes one count per cell into.
    Output,
    /// `vec2<u32>` uniform.
    Size,
    /// `vec2<f32>` uniform.
    Complex,
    /// `u32` uniform.
    Count,
}

impl ArgKind {
    fn binding_type(&self) -> wgpu::BindingType {
        match self {
            ArgKind::Output => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            ArgKind::Size | ArgKind::Complex | ArgKind::Count => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgKind::Output => "output buffer",
            ArgKind::Size => "size",
            ArgKind::Complex => "complex",
            ArgKind::Count => "count",
        };
        f.write_str(name)
    }
}

/// A built shader module, plus its parsed form for reflecting on entry
/// points.
pub struct Program {
    label: String,
    module: wgpu::ShaderModule,
    reflection: naga::Module,
}

impl Program {
    /// Compile `source`. Any compiler diagnostic fails the build and is
    /// returned in full.
    pub fn build(context: &ComputeContext, label: &str, source: &str) -> Result<Self> {
        let device = &context.device;
        let (module, error) = scope::capture(device, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(error) = error {
            return Err(build_failure(error));
        }
        let reflection =
            naga::front::wgsl::parse_str(source).map_err(|error| Error::ProgramBuildFailure {
                log: error.emit_to_string(source),
            })?;

        debug!("built program {}", label);
        Ok(Self {
            label: label.to_string(),
            module,
            reflection,
        })
    }

    /// Compute pipeline for `entry_point`, whose bindings in group 0 are
    /// `signature` in order. The entry point must declare
    /// `@workgroup_size(8, 8, 1)`.
    pub fn kernel(
        &self,
        context: &ComputeContext,
        entry_point: &str,
        signature: &[ArgKind],
    ) -> Result<Kernel> {
        let local_size = declared_local_size(&self.reflection, entry_point)?;
        let device = &context.device;
        let label = format!("{}#{}", self.label, entry_point);

        let ((bind_group_layout, pipeline), error) = scope::capture(device, || {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = signature
                .iter()
                .enumerate()
                .map(|(binding, kind)| wgpu::BindGroupLayoutEntry {
                    binding: binding as u32,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: kind.binding_type(),
                    count: None,
                })
                .collect();

            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&label),
                    entries: &entries,
                });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                module: &self.module,
                entry_point,
            });

            (bind_group_layout, pipeline)
        });
        if let Some(error) = error {
            return Err(build_failure(error));
        }

        debug!("created kernel {}", label);
        Ok(Kernel {
            entry_point: entry_point.to_string(),
            signature: signature.to_vec(),
            local_size,
            bind_group_layout,
            pipeline,
        })
    }
}

/// One entry point of a [`Program`], ready to dispatch.
pub struct Kernel {
    entry_point: String,
    signature: Vec<ArgKind>,
    local_size: screen::Size,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
    pub(crate) pipeline: wgpu::ComputePipeline,
}

impl Kernel {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn signature(&self) -> &[ArgKind] {
        &self.signature
    }

    pub fn local_size(&self) -> screen::Size {
        self.local_size
    }
}

/// The tile `entry_point` declares. Dispatch derives its workgroup counts from
/// [`LOCAL_SIZE`], so any other size would leave cells unwritten.
fn declared_local_size(module: &naga::Module, entry_point: &str) -> Result<screen::Size> {
    let declared = module
        .entry_points
        .iter()
        .find(|candidate| {
            candidate.stage == naga::ShaderStage::Compute && candidate.name == entry_point
        })
        .ok_or_else(|| Error::ProgramBuildFailure {
            log: format!("no compute entry point named {}", entry_point),
        })?;

    let [width, height, depth] = declared.workgroup_size;
    let local_size = screen::Size::new(width, height);
    if local_size != LOCAL_SIZE || depth != 1 {
        return Err(DispatchError::new(
            FailureCode::ArgumentMismatch,
            format!(
                "{} declares @workgroup_size({}, {}, {}), kernels must use {}x1",
                entry_point, width, height, depth, LOCAL_SIZE
            ),
        )
        .into());
    }
    Ok(local_size)
}

fn build_failure(error: wgpu::Error) -> Error {
    let log = match error {
        wgpu::Error::Validation {
            source: _,
            description,
        } => description,
        wgpu::Error::OutOfMemory { source } => source.to_string(),
    };
    Error::ProgramBuildFailure { log }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflect(source: &str) -> naga::Module {
        naga::front::wgsl::parse_str(source).unwrap()
    }

    #[test]
    fn julia_kernel_declares_the_dispatch_tile() {
        let module = reflect(include_str!("../kernels/julia.wgsl"));
        assert_eq!(declared_local_size(&module, "julia").unwrap(), LOCAL_SIZE);
    }

    #[test]
    fn other_workgroup_sizes_are_rejected() {
        let module = reflect(
            "@compute @workgroup_size(16, 16)
            fn wide(@builtin(global_invocation_id) id: vec3<u32>) {}",
        );

        match declared_local_size(&module, "wide") {
            Err(Error::Dispatch(error)) => assert_eq!(error.kind, FailureCode::ArgumentMismatch),
            other => panic!("expected an argument mismatch, got {:?}", other),
        }
    }

    #[test]
    fn unknown_entry_points_fail_to_build() {
        let module = reflect(include_str!("../kernels/julia.wgsl"));
        assert!(matches!(
            declared_local_size(&module, "missing"),
            Err(Error::ProgramBuildFailure { .. })
        ));
    }
}
