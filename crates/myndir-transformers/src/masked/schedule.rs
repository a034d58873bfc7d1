//! Mask schedules: progress in `[0, 1]` to the fraction of the grid that
//! stays masked.

use std::f32::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaskSchedule {
    /// `cos(progress * pi / 2)`
    #[default]
    Cosine,
    /// `1 - progress`
    Linear,
    /// `1 - progress^2`, keeps more tokens masked early on.
    Square,
}

impl MaskSchedule {
    /// Progress outside `[0, 1]` is clamped. The result is exactly `1.0` at
    /// progress 0 and exactly `0.0` at progress 1.
    pub fn mask_ratio(&self, progress: f32) -> f32 {
        let p = progress.clamp(0.0, 1.0);
        if p >= 1.0 {
            return 0.0;
        }
        let ratio = match self {
            MaskSchedule::Cosine => (p * FRAC_PI_2).cos(),
            MaskSchedule::Linear => 1.0 - p,
            MaskSchedule::Square => 1.0 - p * p,
        };
        ratio.clamp(0.0, 1.0)
    }

    /// `floor(mask_ratio * total)`, without any lower bound.
    pub fn mask_count(&self, progress: f32, total: usize) -> usize {
        ((self.mask_ratio(progress) * total as f32).floor() as usize).min(total)
    }

    /// `max(floor(mask_ratio * total), 1)`, the number of positions forced
    /// back to the mask token at the start of a score-ordered round.
    pub fn num_tokens_to_mask(&self, progress: f32, total: usize) -> usize {
        self.mask_count(progress, total).max(1).min(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const ALL: [MaskSchedule; 3] = [MaskSchedule::Cosine, MaskSchedule::Linear, MaskSchedule::Square];

    #[test]
    fn test_schedule_boundaries() {
        for schedule in ALL {
            assert_abs_diff_eq!(schedule.mask_ratio(0.0), 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(schedule.mask_ratio(1.0), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_cosine_midpoint() {
        assert_abs_diff_eq!(
            MaskSchedule::Cosine.mask_ratio(0.5),
            std::f32::consts::FRAC_1_SQRT_2,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(MaskSchedule::Linear.mask_ratio(-3.0), 1.0);
        assert_eq!(MaskSchedule::Cosine.mask_ratio(7.0), 0.0);
    }

    #[test]
    fn test_mask_count_non_increasing() {
        for schedule in ALL {
            for total in [1usize, 4, 16, 256, 1000] {
                let mut prev = usize::MAX;
                for step in 0..=200 {
                    let progress = step as f32 / 200.0;
                    let count = schedule.num_tokens_to_mask(progress, total);
                    assert!(count <= prev, "{:?} total={} step={}", schedule, total, step);
                    assert!(count >= 1 && count <= total);
                    prev = count;
                }
            }
        }
    }

    #[test]
    fn test_mask_count_has_no_floor() {
        assert_eq!(MaskSchedule::Cosine.mask_count(1.0, 256), 0);
        assert_eq!(MaskSchedule::Cosine.num_tokens_to_mask(1.0, 256), 1);
        assert_eq!(MaskSchedule::Cosine.mask_count(0.0, 256), 256);
    }

    #[test]
    fn test_serde_names() {
        let s: MaskSchedule = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(s, MaskSchedule::Linear);
        assert_eq!(serde_json::to_string(&MaskSchedule::Cosine).unwrap(), "\"cosine\"");
    }
}
