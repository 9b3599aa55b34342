//! Static game catalog
//!
//! Template mappings, gem bonus fractions, polishing output weights, slot
//! unlock pricing, and the production constants. These tables are fixed for
//! a given deployment; balance changes ship as code.

use rand::Rng;
use std::collections::HashMap;

/// Maximum slots per page
pub const MAX_SLOTS: u32 = 10;

/// Maximum rough gems consumed by a single polishing job
pub const MAX_AMOUNT_PER_SLOT: i64 = 1000;

/// Ledger key for the fungible polishing input (mining output)
pub const ROUGH: &str = "rough";

/// Mining yield divisor: yield = max(1, power / 20)
pub const MINE_YIELD_DIVISOR: u32 = 20;

/// Polished gem output types with their draw weights, rarest last.
/// Weights sum to exactly 1.0.
pub const GEM_WEIGHTS: [(&str, f64); 10] = [
    ("amber", 0.22),
    ("amethyst", 0.18),
    ("citrine", 0.15),
    ("garnet", 0.12),
    ("topaz", 0.10),
    ("aquamarine", 0.08),
    ("sapphire", 0.06),
    ("emerald", 0.04),
    ("ruby", 0.03),
    ("diamond", 0.02),
];

/// Map a gem template to its (gem type, polished) pair
///
/// Unmapped templates are a validation error at stake time.
pub fn gem_template(template_id: &str) -> Option<(&'static str, bool)> {
    let entry = match template_id {
        "520001" => ("amber", false),
        "520002" => ("amber", true),
        "520011" => ("amethyst", false),
        "520012" => ("amethyst", true),
        "520021" => ("citrine", false),
        "520022" => ("citrine", true),
        "520031" => ("garnet", false),
        "520032" => ("garnet", true),
        "520041" => ("topaz", false),
        "520042" => ("topaz", true),
        "520051" => ("aquamarine", false),
        "520052" => ("aquamarine", true),
        "520061" => ("sapphire", false),
        "520062" => ("sapphire", true),
        "520071" => ("emerald", false),
        "520072" => ("emerald", true),
        "520081" => ("ruby", false),
        "520082" => ("ruby", true),
        "520091" => ("diamond", false),
        "520092" => ("diamond", true),
        _ => return None,
    };
    Some(entry)
}

/// Bonus fraction granted by a staked gem of the given type
pub fn gem_bonus(gem_type: &str, polished: bool) -> Option<f64> {
    let (unpolished, polished_bonus) = match gem_type {
        "amber" => (0.005, 0.010),
        "amethyst" => (0.007, 0.014),
        "citrine" => (0.010, 0.020),
        "garnet" => (0.013, 0.026),
        "topaz" => (0.016, 0.032),
        "aquamarine" => (0.020, 0.040),
        "sapphire" => (0.025, 0.050),
        "emerald" => (0.032, 0.064),
        "ruby" => (0.040, 0.080),
        "diamond" => (0.050, 0.100),
        _ => return None,
    };
    Some(if polished { polished_bonus } else { unpolished })
}

/// Payment amount required to unlock a slot, keyed by target slot number.
///
/// Slot 1 is pre-unlocked by the default unlocked count and has no entry.
pub fn unlock_cost(target_slot: u32) -> Option<f64> {
    let cost = match target_slot {
        2 => 5.0,
        3 => 10.0,
        4 => 20.0,
        5 => 35.0,
        6 => 55.0,
        7 => 80.0,
        8 => 110.0,
        9 => 145.0,
        10 => 185.0,
        _ => return None,
    };
    Some(cost)
}

/// Mining yield for a computed power value
pub fn mining_yield(computed_power: u32) -> i64 {
    ((computed_power / MINE_YIELD_DIVISOR) as i64).max(1)
}

/// Draw one polished gem type by cumulative-threshold sampling
pub fn sample_gem_type<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    let roll: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (gem_type, weight) in GEM_WEIGHTS {
        cumulative += weight;
        if roll < cumulative {
            return gem_type;
        }
    }
    // Floating-point edge: a roll landing on the far end of the last bucket
    GEM_WEIGHTS[GEM_WEIGHTS.len() - 1].0
}

/// Draw `amount` independent polishing outputs, aggregated per type
pub fn draw_polish_outputs<R: Rng + ?Sized>(rng: &mut R, amount: i64) -> HashMap<String, i64> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for _ in 0..amount {
        *counts.entry(sample_gem_type(rng).to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn gem_weights_sum_to_one() {
        let total: f64 = GEM_WEIGHTS.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9, "weights sum to {}", total);
    }

    #[test]
    fn every_weighted_type_has_bonus_entries() {
        for (gem_type, _) in GEM_WEIGHTS {
            let unpolished = gem_bonus(gem_type, false).unwrap();
            let polished = gem_bonus(gem_type, true).unwrap();
            assert!(polished > unpolished, "{} polished bonus must exceed unpolished", gem_type);
        }
        assert!(gem_bonus("obsidian", false).is_none());
    }

    #[test]
    fn templates_map_to_known_types() {
        let (gem_type, polished) = gem_template("520082").unwrap();
        assert_eq!(gem_type, "ruby");
        assert!(polished);
        assert!(gem_template("999999").is_none());
    }

    #[test]
    fn unlock_costs_cover_slots_two_through_ten() {
        assert!(unlock_cost(1).is_none());
        let mut previous = 0.0;
        for slot in 2..=MAX_SLOTS {
            let cost = unlock_cost(slot).unwrap();
            assert!(cost > previous, "slot {} cost must increase", slot);
            previous = cost;
        }
        assert!(unlock_cost(MAX_SLOTS + 1).is_none());
    }

    #[test]
    fn mining_yield_floors_and_clamps() {
        assert_eq!(mining_yield(0), 1);
        assert_eq!(mining_yield(19), 1);
        assert_eq!(mining_yield(20), 1);
        assert_eq!(mining_yield(39), 1);
        assert_eq!(mining_yield(200), 10);
        assert_eq!(mining_yield(205), 10);
    }

    #[test]
    fn polish_outputs_sum_to_amount() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let counts = draw_polish_outputs(&mut rng, 500);
        let total: i64 = counts.values().sum();
        assert_eq!(total, 500);
        for gem_type in counts.keys() {
            assert!(GEM_WEIGHTS.iter().any(|(t, _)| t == gem_type));
        }
    }

    #[test]
    fn sampling_tracks_weights_roughly() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let counts = draw_polish_outputs(&mut rng, 20_000);
        let amber = *counts.get("amber").unwrap_or(&0) as f64 / 20_000.0;
        let diamond = *counts.get("diamond").unwrap_or(&0) as f64 / 20_000.0;
        assert!((amber - 0.22).abs() < 0.02, "amber frequency {}", amber);
        assert!((diamond - 0.02).abs() < 0.01, "diamond frequency {}", diamond);
    }

    #[test]
    fn mining_yield_never_below_one() {
        for power in [0, 1, 5, 19] {
            assert_eq!(mining_yield(power), 1);
        }
    }
}
