//! Colouring algorithms.

/// Upper end of the hue domain iteration counts are rescaled into before
/// colouring.
pub const GRADIENT_MAX: f32 = 250.0;

/// A colour with floating point channels, each in `[min, max]` of the range
/// it was mapped with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

/**
Rainbow hue sweep (red → yellow → green → cyan → blue → magenta → red) built
from six linear segments of 60 units each, without any trigonometry.

`x` is expected to already be scaled into the hue domain; the thresholds are
fixed at 60, 120, 180, 240 and 300 and each branch includes its lower bound,
so `x == 60.0` lands in the second segment. Within a segment one channel is
held at `max`, one at `min` and the third moves along `(max - min) / 60`.

The last segment computes blue as `-(max - min) / 60 * x + 6 * max` with no
`+ min` term, unlike the other five. Palettes with `min != 0` are therefore
discontinuous at 300. This is how the palette has always rendered, so it is
kept as is.
*/
pub fn hue_sweep(x: f32, min: f32, max: f32) -> Rgb {
    let pos_slope = (max - min) / 60.0;
    let neg_slope = (min - max) / 60.0;

    if x < 60.0 {
        Rgb::new(max, pos_slope * x + min, min)
    } else if x < 120.0 {
        Rgb::new(neg_slope * x + 2.0 * max + min, max, min)
    } else if x < 180.0 {
        Rgb::new(min, max, pos_slope * x - 2.0 * max + min)
    } else if x < 240.0 {
        Rgb::new(min, neg_slope * x + 4.0 * max + min, max)
    } else if x < 300.0 {
        Rgb::new(pos_slope * x - 4.0 * max + min, min, max)
    } else {
        Rgb::new(max, min, neg_slope * x + 6.0 * max)
    }
}

/// Linearly rescale an iteration count in `[0, max_count]` onto
/// `[0, GRADIENT_MAX]`.
pub fn gradient(count: u32, max_count: u32) -> f32 {
    (count as f32 / max_count as f32) * GRADIENT_MAX
}

/// Colour for a raw iteration count.
pub fn colour_for_count(count: u32, max_count: u32) -> Rgb {
    hue_sweep(gradient(count, max_count), 0.0, GRADIENT_MAX)
}
