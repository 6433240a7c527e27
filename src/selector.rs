//! Compute target selection: walk the platforms in order and keep the first
//! one that can give us a device of the requested class.

use std::fmt;

use log::{debug, info};

use crate::error::{Error, Result};

/// Backends in the order they are tried.
pub const PLATFORM_ORDER: [wgpu::Backend; 5] = [
    wgpu::Backend::Vulkan,
    wgpu::Backend::Metal,
    wgpu::Backend::Dx12,
    wgpu::Backend::Dx11,
    wgpu::Backend::Gl,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DeviceClass {
    /// Discrete, integrated or virtual GPUs.
    Gpu,
    /// Software rasterisers.
    Cpu,
    Any,
}

impl DeviceClass {
    pub fn matches(&self, device_type: wgpu::DeviceType) -> bool {
        match self {
            DeviceClass::Gpu => matches!(
                device_type,
                wgpu::DeviceType::DiscreteGpu
                    | wgpu::DeviceType::IntegratedGpu
                    | wgpu::DeviceType::VirtualGpu
            ),
            DeviceClass::Cpu => device_type == wgpu::DeviceType::Cpu,
            DeviceClass::Any => true,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceClass::Gpu => "GPU",
            DeviceClass::Cpu => "CPU",
            DeviceClass::Any => "any",
        };
        f.write_str(name)
    }
}

/// Why a platform could not produce a context.
#[derive(Debug)]
pub enum PlatformError {
    /// No matching device, or the driver refused to open it. The selector
    /// moves on to the next platform.
    DeviceConstruction(String),
    /// Anything else. Aborts selection.
    Fatal(Error),
}

pub trait Platform {
    type Context;

    fn name(&self) -> String;

    fn create_context(&self, class: DeviceClass) -> Result<Self::Context, PlatformError>;
}

/// Returns the context of the first platform, in order, that can build one
/// for `class`.
pub fn acquire_context<P: Platform>(platforms: &[P], class: DeviceClass) -> Result<P::Context> {
    for platform in platforms {
        match platform.create_context(class) {
            Ok(context) => {
                debug!("platform {} provided a {} context", platform.name(), class);
                return Ok(context);
            }
            Err(PlatformError::DeviceConstruction(reason)) => {
                debug!("skipping platform {}: {}", platform.name(), reason);
            }
            Err(PlatformError::Fatal(error)) => return Err(error),
        }
    }

    Err(Error::NoDeviceAvailable {
        class,
        platforms: platforms.iter().map(P::name).collect(),
    })
}

/// Adapter, device and queue bound together. Created once by the selector and
/// borrowed by everything that talks to the device.
pub struct ComputeContext {
    pub platform: String,
    pub info: wgpu::AdapterInfo,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl ComputeContext {
    pub fn device_name(&self) -> &str {
        &self.info.name
    }
}

impl fmt::Debug for ComputeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeContext")
            .field("platform", &self.platform)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// One `wgpu` backend of an instance.
pub struct BackendPlatform<'a> {
    instance: &'a wgpu::Instance,
    backend: wgpu::Backend,
}

impl<'a> BackendPlatform<'a> {
    pub fn new(instance: &'a wgpu::Instance, backend: wgpu::Backend) -> Self {
        Self { instance, backend }
    }

    pub fn adapters(&self) -> impl Iterator<Item = wgpu::Adapter> {
        self.instance.enumerate_adapters(backend_bits(self.backend))
    }
}

impl<'a> Platform for BackendPlatform<'a> {
    type Context = ComputeContext;

    fn name(&self) -> String {
        format!("{:?}", self.backend)
    }

    fn create_context(&self, class: DeviceClass) -> Result<ComputeContext, PlatformError> {
        let adapter = self
            .adapters()
            .find(|adapter| class.matches(adapter.get_info().device_type))
            .ok_or_else(|| PlatformError::DeviceConstruction(format!("no {} adapter", class)))?;
        let info = adapter.get_info();

        if !adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(PlatformError::DeviceConstruction(format!(
                "{} does not support compute shaders",
                info.name
            )));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("compute-device"),
                features: wgpu::Features::empty(),
                limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|error| PlatformError::DeviceConstruction(format!("{}: {}", info.name, error)))?;

        Ok(ComputeContext {
            platform: self.name(),
            info,
            adapter,
            device,
            queue,
        })
    }
}

/// Every backend in [`PLATFORM_ORDER`], whether or not it has adapters.
pub fn platforms(instance: &wgpu::Instance) -> Vec<BackendPlatform<'_>> {
    PLATFORM_ORDER
        .iter()
        .map(|backend| BackendPlatform::new(instance, *backend))
        .collect()
}

/// One line per platform, followed by one indented line per adapter.
pub fn platform_report(platforms: &[BackendPlatform]) -> Vec<String> {
    let mut lines = Vec::new();
    for platform in platforms {
        lines.push(format!("Platform: {}", platform.name()));
        for adapter in platform.adapters() {
            let info = adapter.get_info();
            lines.push(format!(
                "  Device: {:?} ({})",
                info.device_type, info.name
            ));
        }
    }
    lines
}

pub fn log_platforms(platforms: &[BackendPlatform]) {
    for line in platform_report(platforms) {
        info!("{}", line);
    }
}

fn backend_bits(backend: wgpu::Backend) -> wgpu::Backends {
    match backend {
        wgpu::Backend::Vulkan => wgpu::Backends::VULKAN,
        wgpu::Backend::Metal => wgpu::Backends::METAL,
        wgpu::Backend::Dx12 => wgpu::Backends::DX12,
        wgpu::Backend::Dx11 => wgpu::Backends::DX11,
        wgpu::Backend::Gl => wgpu::Backends::GL,
        wgpu::Backend::BrowserWebGpu => wgpu::Backends::BROWSER_WEBGPU,
        wgpu::Backend::Empty => wgpu::Backends::empty(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// In-memory platform that either hands out its name or fails.
    struct FakePlatform {
        name: &'static str,
        outcome: Outcome,
        attempts: Cell<usize>,
    }

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeeds(DeviceClass),
        NoDevice,
        OutOfMemory,
    }

    impl FakePlatform {
        fn new(name: &'static str, outcome: Outcome) -> Self {
            Self {
                name,
                outcome,
                attempts: Cell::new(0),
            }
        }
    }

    impl Platform for FakePlatform {
        type Context = &'static str;

        fn name(&self) -> String {
            self.name.to_string()
        }

        fn create_context(&self, class: DeviceClass) -> Result<&'static str, PlatformError> {
            self.attempts.set(self.attempts.get() + 1);
            match self.outcome {
                Outcome::Succeeds(available) if available == class || class == DeviceClass::Any => {
                    Ok(self.name)
                }
                Outcome::Succeeds(_) | Outcome::NoDevice => Err(
                    PlatformError::DeviceConstruction(format!("no {} device", class)),
                ),
                Outcome::OutOfMemory => Err(PlatformError::Fatal(Error::Display(
                    "out of host memory".to_string(),
                ))),
            }
        }
    }

    #[test_log::test]
    fn first_capable_platform_wins() {
        let platforms = [
            FakePlatform::new("cpu-only", Outcome::Succeeds(DeviceClass::Cpu)),
            FakePlatform::new("empty", Outcome::NoDevice),
            FakePlatform::new("gpu-a", Outcome::Succeeds(DeviceClass::Gpu)),
            FakePlatform::new("gpu-b", Outcome::Succeeds(DeviceClass::Gpu)),
        ];

        let context = acquire_context(&platforms, DeviceClass::Gpu).unwrap();

        assert_eq!(context, "gpu-a");
        assert_eq!(platforms[0].attempts.get(), 1);
        assert_eq!(platforms[1].attempts.get(), 1);
        assert_eq!(platforms[3].attempts.get(), 0);
    }

    #[test_log::test]
    fn enumeration_order_decides() {
        let platforms = [
            FakePlatform::new("gpu-b", Outcome::Succeeds(DeviceClass::Gpu)),
            FakePlatform::new("gpu-a", Outcome::Succeeds(DeviceClass::Gpu)),
        ];
        assert_eq!(acquire_context(&platforms, DeviceClass::Gpu).unwrap(), "gpu-b");
    }

    #[test_log::test]
    fn exhausted_platforms_report_no_device() {
        let platforms = [
            FakePlatform::new("cpu-only", Outcome::Succeeds(DeviceClass::Cpu)),
            FakePlatform::new("empty", Outcome::NoDevice),
        ];

        match acquire_context(&platforms, DeviceClass::Gpu) {
            Err(Error::NoDeviceAvailable { class, platforms }) => {
                assert_eq!(class, DeviceClass::Gpu);
                assert_eq!(platforms, vec!["cpu-only", "empty"]);
            }
            other => panic!("expected NoDeviceAvailable, got {:?}", other),
        }
    }

    #[test]
    fn zero_platforms_report_no_device() {
        let platforms: [FakePlatform; 0] = [];
        assert!(matches!(
            acquire_context(&platforms, DeviceClass::Gpu),
            Err(Error::NoDeviceAvailable { .. })
        ));
    }

    #[test_log::test]
    fn other_failures_are_not_suppressed() {
        let platforms = [
            FakePlatform::new("empty", Outcome::NoDevice),
            FakePlatform::new("broken", Outcome::OutOfMemory),
            FakePlatform::new("gpu", Outcome::Succeeds(DeviceClass::Gpu)),
        ];

        assert!(matches!(
            acquire_context(&platforms, DeviceClass::Gpu),
            Err(Error::Display(_))
        ));
        assert_eq!(platforms[2].attempts.get(), 0);
    }

    #[test]
    fn device_classes_filter_adapter_types() {
        assert!(DeviceClass::Gpu.matches(wgpu::DeviceType::DiscreteGpu));
        assert!(DeviceClass::Gpu.matches(wgpu::DeviceType::IntegratedGpu));
        assert!(!DeviceClass::Gpu.matches(wgpu::DeviceType::Cpu));
        assert!(DeviceClass::Cpu.matches(wgpu::DeviceType::Cpu));
        assert!(!DeviceClass::Cpu.matches(wgpu::DeviceType::Other));
        assert!(DeviceClass::Any.matches(wgpu::DeviceType::Other));
    }
}
