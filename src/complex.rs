use std::{fmt, str::FromStr};

use bytemuck::{Pod, Zeroable};

/// A point in the complex plane, laid out as the kernel's `vec2<f32>`.
#[repr(C)]
#[derive(Pod, Zeroable, Clone, Copy, Debug, PartialEq)]
pub struct Complex {
    pub real: f32,
    pub imaginary: f32,
}

impl Complex {
    pub const ZERO: Self = Complex {
        real: 0.0,
        imaginary: 0.0,
    };

    pub const fn new(real: f32, imaginary: f32) -> Self {
        Self { real, imaginary }
    }

    pub fn is_finite(&self) -> bool {
        self.real.is_finite() && self.imaginary.is_finite()
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.real, self.imaginary)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("expected a complex number written as `re,im`, got `{0}`")]
pub struct ParseComplexError(String);

/// Parses `re,im`, e.g. `-1.5,0.25`.
impl FromStr for Complex {
    type Err = ParseComplexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseComplexError(s.to_string());
        let (real, imaginary) = s.split_once(',').ok_or_else(error)?;
        let real = real.trim().parse().map_err(|_| error())?;
        let imaginary = imaginary.trim().parse().map_err(|_| error())?;
        Ok(Self { real, imaginary })
    }
}
