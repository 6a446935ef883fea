// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of ThermION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Cost advisor: store heat while power is cheap, coast while it is dear.

use thermion_types::{ActionPriority, ControllerAction, CostDirection, PriceBand, PriceConfig};
use tracing::debug;

use crate::error::{Result, ensure_finite};

#[derive(Debug, Clone, Copy)]
pub struct PriceAdvisor {
    max_preheat_offset_c: f64,
    max_reduce_offset_c: f64,
}

impl PriceAdvisor {
    pub fn new(config: &PriceConfig) -> Self {
        Self {
            max_preheat_offset_c: config.max_preheat_offset_c,
            max_reduce_offset_c: config.max_reduce_offset_c,
        }
    }

    /// Recommendation for the current band.
    ///
    /// Preheat only while the room is still below target plus the offset;
    /// reduce only while it is above target plus the offset. Anything else
    /// maintains.
    pub fn recommend(
        &self,
        indoor_temp_c: f64,
        target_temp_c: f64,
        band: PriceBand,
    ) -> Result<ControllerAction> {
        ensure_finite("price", "indoor temperature", indoor_temp_c)?;
        ensure_finite("price", "target temperature", target_temp_c)?;

        let preheat = self.max_preheat_offset_c;
        let reduce = self.max_reduce_offset_c;

        let action = match band {
            PriceBand::VeryLow if indoor_temp_c < target_temp_c + preheat => cost(
                CostDirection::Preheat,
                preheat,
                ActionPriority::High,
                format!("Very low price: preheating by {preheat:.1}°C"),
            ),
            PriceBand::Low if indoor_temp_c < target_temp_c + preheat / 2.0 => cost(
                CostDirection::Preheat,
                preheat / 2.0,
                ActionPriority::Medium,
                format!("Low price: preheating by {:.1}°C", preheat / 2.0),
            ),
            PriceBand::High if indoor_temp_c > target_temp_c + reduce / 2.0 => cost(
                CostDirection::Reduce,
                reduce / 2.0,
                ActionPriority::Medium,
                format!("High price: reducing by {:.1}°C", reduce / 2.0),
            ),
            PriceBand::VeryHigh if indoor_temp_c > target_temp_c + reduce => cost(
                CostDirection::Reduce,
                reduce,
                ActionPriority::High,
                format!("Very high price: reducing by {reduce:.1}°C"),
            ),
            _ => cost(
                CostDirection::Maintain,
                0.0,
                ActionPriority::Low,
                format!("Price band {band}: maintaining"),
            ),
        };

        debug!("💰 Price advisor ({}): {}", band, action.reason());
        Ok(action)
    }
}

fn cost(
    action: CostDirection,
    magnitude_c: f64,
    priority: ActionPriority,
    reason: String,
) -> ControllerAction {
    ControllerAction::Cost {
        action,
        magnitude_c,
        priority,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advisor() -> PriceAdvisor {
        PriceAdvisor::new(&PriceConfig::default())
    }

    #[test]
    fn test_very_low_preheats_fully() {
        let action = advisor().recommend(21.0, 21.0, PriceBand::VeryLow).unwrap();
        assert_eq!(action.signed_adjustment_c(), 1.5);
        assert_eq!(action.priority(), Some(ActionPriority::High));
    }

    #[test]
    fn test_low_preheats_half_until_headroom_used() {
        let action = advisor().recommend(21.0, 21.0, PriceBand::Low).unwrap();
        assert_eq!(action.signed_adjustment_c(), 0.75);
        assert_eq!(action.priority(), Some(ActionPriority::Medium));

        let warm = advisor().recommend(21.8, 21.0, PriceBand::Low).unwrap();
        assert!(warm.is_maintain());
        assert_eq!(warm.priority(), Some(ActionPriority::Low));
    }

    #[test]
    fn test_reduce_requires_room_above_offset() {
        let action = advisor().recommend(21.6, 21.0, PriceBand::High).unwrap();
        assert_eq!(action.signed_adjustment_c(), -0.5);

        let cool = advisor().recommend(21.0, 21.0, PriceBand::VeryHigh).unwrap();
        assert!(cool.is_maintain());

        let hot = advisor().recommend(22.5, 21.0, PriceBand::VeryHigh).unwrap();
        assert_eq!(hot.signed_adjustment_c(), -1.0);
        assert_eq!(hot.priority(), Some(ActionPriority::High));
    }

    #[test]
    fn test_normal_maintains() {
        let action = advisor().recommend(19.0, 21.0, PriceBand::Normal).unwrap();
        assert!(action.is_maintain());
        assert_eq!(action.signed_adjustment_c(), 0.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(advisor().recommend(f64::INFINITY, 21.0, PriceBand::Low).is_err());
    }
}
