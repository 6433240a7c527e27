/*!
Dispatch geometry for tiled 2D kernels.

A compute entry point declared with `@workgroup_size(l_x, l_y, 1)` runs
`l_x * l_y` invocations per workgroup, and `dispatch_workgroups(n_x, n_y, 1)`
runs `n_x * n_y` workgroups. The grid of invocations (the global size) is
therefore `(n_x * l_x, n_y * l_y)`.

The domain rarely divides evenly into tiles, so each axis is rounded up to
the next multiple of its tile size. The extra invocations along the right and
bottom edges must be discarded by the kernel itself by comparing
`global_invocation_id` against the domain size; nothing is clipped here.

[WGSL compute shader workgroups reference](https://www.w3.org/TR/WGSL/#compute-shader-workgroups)
*/

use crate::{
    error::{DispatchError, FailureCode},
    screen,
};

/// Local tile for `kernels/julia.wgsl#julia`. Must match its `@workgroup_size`.
pub const LOCAL_SIZE: screen::Size = screen::Size {
    width: 8,
    height: 8,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub domain: screen::Size,
    pub local: screen::Size,
    pub global: screen::Size,
}

impl Geometry {
    /// Fails with `ResourceLimit` when the rounded-up global size does not fit
    /// in a `u32`.
    pub fn new(domain: screen::Size, local: screen::Size) -> Result<Self, DispatchError> {
        let global = round_up(domain.width, local.width)
            .zip(round_up(domain.height, local.height))
            .map(|(width, height)| screen::Size { width, height })
            .ok_or_else(|| {
                DispatchError::new(
                    FailureCode::ResourceLimit,
                    format!("a {} domain cannot be tiled by {}", domain, local),
                )
            })?;

        Ok(Self {
            domain,
            local,
            global,
        })
    }

    /// Arguments for `dispatch_workgroups`.
    pub fn workgroups(&self) -> (u32, u32, u32) {
        (
            self.global.width / self.local.width,
            self.global.height / self.local.height,
            1,
        )
    }

    /// Invocations that fall outside the domain and do no work.
    pub fn idle_invocations(&self) -> usize {
        self.global.cell_count() - self.domain.cell_count()
    }
}

/// Smallest multiple of `tile` that is `>= extent`, if it fits in a `u32`.
pub fn round_up(extent: u32, tile: u32) -> Option<u32> {
    if tile == 0 {
        return None;
    }
    extent.div_ceil(tile).checked_mul(tile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiples_are_unchanged() {
        assert_eq!(round_up(2048, 8), Some(2048));
        assert_eq!(round_up(0, 8), Some(0));
        assert_eq!(round_up(8, 8), Some(8));
    }

    #[test]
    fn partial_tiles_round_up() {
        assert_eq!(round_up(2050, 8), Some(2056));
        assert_eq!(round_up(1, 8), Some(8));
        assert_eq!(round_up(9, 8), Some(16));
    }

    #[test]
    fn rounding_past_u32_fails() {
        assert_eq!(round_up(u32::MAX, 8), None);
        assert_eq!(round_up(u32::MAX - 3, 8), None);
        assert_eq!(round_up(u32::MAX - 7, 8), Some(u32::MAX - 7));
        assert_eq!(round_up(5, 0), None);
    }

    #[test]
    fn domains_near_u32_max_are_rejected() {
        let error =
            Geometry::new(screen::Size::new(u32::MAX, 1), LOCAL_SIZE).unwrap_err();
        assert_eq!(error.kind, FailureCode::ResourceLimit);

        let error =
            Geometry::new(screen::Size::new(1, u32::MAX - 2), LOCAL_SIZE).unwrap_err();
        assert_eq!(error.kind, FailureCode::ResourceLimit);
    }

    #[test]
    fn axes_round_independently() {
        let geometry = Geometry::new(screen::Size::new(2050, 2048), LOCAL_SIZE).unwrap();
        assert_eq!(geometry.global, screen::Size::new(2056, 2048));
        assert_eq!(geometry.workgroups(), (257, 256, 1));
        assert_eq!(geometry.idle_invocations(), 6 * 2048);
    }

    #[test]
    fn global_covers_domain_for_any_tile() {
        for width in 0..70 {
            for tile in 1..17 {
                let global = round_up(width, tile).unwrap();
                assert_eq!(global % tile, 0);
                assert!(global >= width);
                assert!(global < width + tile);
            }
        }
    }

    #[test]
    fn non_square_tiles() {
        let geometry = Geometry::new(screen::Size::new(13, 7), screen::Size::new(4, 2)).unwrap();
        assert_eq!(geometry.global, screen::Size::new(16, 8));
        assert_eq!(geometry.workgroups(), (4, 4, 1));
    }
}
