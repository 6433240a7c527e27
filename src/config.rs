//! The tunable inputs of a run.

use std::path::PathBuf;

use clap::Parser;

use crate::{
    complex::Complex,
    error::{Error, Result},
    julia::JuliaParams,
    screen,
    selector::DeviceClass,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Render a Julia set on the GPU", long_about = None)]
pub struct Config {
    /// Width of the image in pixels
    #[arg(long, env = "JULIA_WIDTH", default_value_t = 2048)]
    pub width: u32,

    /// Height of the image in pixels
    #[arg(long, env = "JULIA_HEIGHT", default_value_t = 2048)]
    pub height: u32,

    /// Iteration cap per pixel
    #[arg(long, env = "JULIA_MAX_ITER", default_value_t = 1000)]
    pub max_iter: u32,

    /// Lower-left corner of the plotted region, as `re,im`
    #[arg(long, env = "JULIA_LOWER_LEFT", default_value = "-1.5,-1.5", allow_hyphen_values = true)]
    pub lower_left: Complex,

    /// Upper-right corner of the plotted region, as `re,im`
    #[arg(long, env = "JULIA_UPPER_RIGHT", default_value = "1.5,1.5", allow_hyphen_values = true)]
    pub upper_right: Complex,

    /// The constant c in z^2 + c, as `re,im`
    #[arg(
        long = "c",
        env = "JULIA_C",
        default_value = "-0.726895347709114071439,0.188887129043845954792",
        allow_hyphen_values = true
    )]
    pub c: Complex,

    /// Class of device to run the kernel on
    #[arg(long, env = "JULIA_DEVICE", value_enum, default_value_t = DeviceClass::Gpu)]
    pub device: DeviceClass,

    /// WGSL source of the `julia` kernel, declaring `@workgroup_size(8, 8, 1)`
    #[arg(long, env = "JULIA_KERNEL", default_value = "kernels/julia.wgsl")]
    pub kernel: PathBuf,

    /// Print the available platforms and devices, then exit
    #[arg(long)]
    pub list_devices: bool,
}

impl Config {
    /// Validated kernel parameters.
    pub fn julia(&self) -> Result<JuliaParams> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Configuration(format!(
                "image size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.max_iter == 0 {
            return Err(Error::Configuration(
                "max-iter must be non-zero".to_string(),
            ));
        }
        for (name, value) in [
            ("lower-left", self.lower_left),
            ("upper-right", self.upper_right),
            ("c", self.c),
        ] {
            if !value.is_finite() {
                return Err(Error::Configuration(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        if self.lower_left.real == self.upper_right.real
            || self.lower_left.imaginary == self.upper_right.imaginary
        {
            return Err(Error::Configuration(format!(
                "the region {} to {} has no area",
                self.lower_left, self.upper_right
            )));
        }

        Ok(JuliaParams {
            size: screen::Size::new(self.width, self.height),
            lower_left: self.lower_left,
            upper_right: self.upper_right,
            c: self.c,
            max_iter: self.max_iter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compute::{Geometry, LOCAL_SIZE},
        error::FailureCode,
    };

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("wgpu-julia").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_the_classic_render() {
        let config = parse(&[]);
        assert_eq!(config.device, DeviceClass::Gpu);
        assert_eq!(config.kernel, PathBuf::from("kernels/julia.wgsl"));
        assert_eq!(config.julia().unwrap(), JuliaParams::default());
    }

    #[test]
    fn parses_negative_complex_values() {
        let config = parse(&["--lower-left", "-2,-1", "--c", "-0.4,0.6", "--device", "any"]);
        assert_eq!(config.lower_left, Complex::new(-2.0, -1.0));
        assert_eq!(config.c, Complex::new(-0.4, 0.6));
        assert_eq!(config.device, DeviceClass::Any);
    }

    #[test]
    fn rejects_malformed_complex_values() {
        let parsed = Config::try_parse_from(["wgpu-julia", "--c", "0.4"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn empty_domain_is_a_configuration_error() {
        let config = parse(&["--width", "0"]);
        assert!(matches!(config.julia(), Err(Error::Configuration(_))));
    }

    #[test]
    fn zero_iterations_is_a_configuration_error() {
        let config = parse(&["--max-iter", "0"]);
        assert!(matches!(config.julia(), Err(Error::Configuration(_))));
    }

    #[test]
    fn degenerate_region_is_a_configuration_error() {
        let config = parse(&["--lower-left", "1,-1", "--upper-right", "1,1"]);
        assert!(matches!(config.julia(), Err(Error::Configuration(_))));
    }

    #[test]
    fn widest_accepted_size_does_not_overflow_tiling() {
        let params = parse(&["--width", "4294967295", "--height", "1"]).julia().unwrap();
        let error = Geometry::new(params.size, LOCAL_SIZE).unwrap_err();
        assert_eq!(error.kind, FailureCode::ResourceLimit);
    }

    #[test]
    fn sizes_off_the_tile_grid_are_fine() {
        let params = parse(&["--width", "2050", "--height", "13"]).julia().unwrap();
        assert_eq!(params.size, screen::Size::new(2050, 13));
    }
}
