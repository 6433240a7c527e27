//! The Julia set kernel's contract: its entry point, positional signature and
//! the arguments that fill it.

use crate::{complex::Complex, dispatch::KernelArg, program::ArgKind, screen};

pub const ENTRY_POINT: &str = "julia";

/// Bindings 0 to 5 of `kernels/julia.wgsl`.
pub const SIGNATURE: [ArgKind; 6] = [
    ArgKind::Output,
    ArgKind::Size,
    ArgKind::Complex,
    ArgKind::Complex,
    ArgKind::Complex,
    ArgKind::Count,
];

#[allow(clippy::excessive_precision)]
pub const DEFAULT_C: Complex = Complex::new(-0.726895347709114071439, 0.188887129043845954792);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JuliaParams {
    pub size: screen::Size,
    pub lower_left: Complex,
    pub upper_right: Complex,
    pub c: Complex,
    pub max_iter: u32,
}

impl JuliaParams {
    /// Arguments in [`SIGNATURE`] order.
    pub fn kernel_args(&self) -> [KernelArg; 6] {
        [
            KernelArg::Output,
            KernelArg::Size(self.size),
            KernelArg::Complex(self.lower_left),
            KernelArg::Complex(self.upper_right),
            KernelArg::Complex(self.c),
            KernelArg::Count(self.max_iter),
        ]
    }
}

impl Default for JuliaParams {
    fn default() -> Self {
        Self {
            size: screen::Size::new(2048, 2048),
            lower_left: Complex::new(-1.5, -1.5),
            upper_right: Complex::new(1.5, 1.5),
            c: DEFAULT_C,
            max_iter: 1000,
        }
    }
}
