//! Resolution-level selection.

use tracing::warn;

use crate::mosaic::GridMosaic;

/// Picks the mosaic to serve a requested resolution.
///
/// Among mosaics whose scale is at most `R * tolerance`, the one closest to
/// `R` wins, ties going to the finer scale. When nothing qualifies, or no
/// resolution was requested, the finest mosaic is used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionPolicy {
    tolerance: f64,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self { tolerance: 2.0 }
    }
}

impl ResolutionPolicy {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Index into `scales` of the selected level.
    pub fn select_scale(&self, scales: &[f64], requested: Option<f64>) -> Option<usize> {
        let finest = scales
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)?;

        let requested = match requested {
            Some(r) if r > 0.0 && r.is_finite() => r,
            _ => return Some(finest),
        };

        let limit = requested * self.tolerance;
        let best = scales
            .iter()
            .enumerate()
            .filter(|(_, scale)| **scale <= limit)
            .min_by(|a, b| {
                let da = (a.1 - requested).abs();
                let db = (b.1 - requested).abs();
                da.total_cmp(&db).then(a.1.total_cmp(b.1))
            })
            .map(|(i, _)| i);

        match best {
            Some(i) => Some(i),
            None => {
                warn!(
                    requested = requested,
                    tolerance = self.tolerance,
                    "No mosaic within tolerance of requested resolution, using finest"
                );
                Some(finest)
            }
        }
    }

    pub fn select<'a>(
        &self,
        mosaics: &[&'a GridMosaic],
        requested: Option<f64>,
    ) -> Option<&'a GridMosaic> {
        let scales: Vec<f64> = mosaics.iter().map(|m| m.scale).collect();
        self.select_scale(&scales, requested).map(|i| mosaics[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_within_tolerance() {
        let policy = ResolutionPolicy::new(2.0);
        let scales = [1.0, 0.5];
        assert_eq!(policy.select_scale(&scales, Some(1.2)), Some(0));
        assert_eq!(policy.select_scale(&scales, Some(0.6)), Some(1));
    }

    #[test]
    fn test_falls_back_to_finest() {
        let policy = ResolutionPolicy::new(1.0);
        let scales = [4.0, 2.0, 8.0];
        // Nothing at or below 0.1.
        assert_eq!(policy.select_scale(&scales, Some(0.1)), Some(1));
        assert_eq!(policy.select_scale(&scales, None), Some(1));
        assert_eq!(policy.select_scale(&[], Some(1.0)), None);
    }

    #[test]
    fn test_tie_prefers_finer() {
        let policy = ResolutionPolicy::new(2.0);
        // 1.0 and 3.0 are both 1.0 away from 2.0.
        assert_eq!(policy.select_scale(&[3.0, 1.0], Some(2.0)), Some(1));
    }

    #[test]
    fn test_tolerance_excludes_coarse_levels() {
        let scales = [10.0, 1.0];
        // 10 is closest to 6 but exceeds 6 * 1.5.
        assert_eq!(ResolutionPolicy::new(1.5).select_scale(&scales, Some(6.0)), Some(1));
        assert_eq!(ResolutionPolicy::new(2.0).select_scale(&scales, Some(6.0)), Some(0));
    }
}
