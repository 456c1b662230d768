//! Placement strategies.
//!
//! A strategy answers one question: which container should receive one more
//! unit of a given item type? The functions here only read the working
//! states; the allocator performs the mutation after a container is chosen.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::{ContainerState, ItemType};

/// Request-level allocation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FirstFit,
    BestFit,
    BestFitDecreasing,
    SingleContainerOnly,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::FirstFit,
        Strategy::BestFit,
        Strategy::BestFitDecreasing,
        Strategy::SingleContainerOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FirstFit => "first_fit",
            Strategy::BestFit => "best_fit",
            Strategy::BestFitDecreasing => "best_fit_decreasing",
            Strategy::SingleContainerOnly => "single_container_only",
        }
    }

    /// How the allocator drives this strategy.
    pub fn mode(&self) -> AllocationMode {
        match self {
            Strategy::FirstFit => AllocationMode::UnitByUnit {
                rule: PlacementRule::FirstFit,
                demand_order: DemandOrder::AsRequested,
            },
            Strategy::BestFit => AllocationMode::UnitByUnit {
                rule: PlacementRule::BestFit,
                demand_order: DemandOrder::AsRequested,
            },
            Strategy::BestFitDecreasing => AllocationMode::UnitByUnit {
                rule: PlacementRule::BestFitDecreasing,
                demand_order: DemandOrder::LargestFirst,
            },
            Strategy::SingleContainerOnly => AllocationMode::WholeDemand,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a strategy key outside the supported set.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error(
    "unknown strategy '{0}', expected one of: first_fit, best_fit, best_fit_decreasing, bfd, single_container_only"
)]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_fit" => Ok(Strategy::FirstFit),
            "best_fit" => Ok(Strategy::BestFit),
            "best_fit_decreasing" | "bfd" => Ok(Strategy::BestFitDecreasing),
            "single_container_only" => Ok(Strategy::SingleContainerOnly),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Driving mode of an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationMode {
    /// Ask `rule` for a target once per unit, demand in `demand_order`.
    UnitByUnit {
        rule: PlacementRule,
        demand_order: DemandOrder,
    },
    /// Place the complete demand into one container or nothing at all.
    WholeDemand,
}

/// Order in which demand lines are processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemandOrder {
    AsRequested,
    /// Volume, longest edge and weight descending; input order breaks ties.
    LargestFirst,
}

/// Per-unit container selection rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementRule {
    FirstFit,
    BestFit,
    BestFitDecreasing,
}

impl PlacementRule {
    /// Index of the state that should receive one unit of `item`, if any.
    pub fn select(&self, states: &[ContainerState], item: &ItemType) -> Option<usize> {
        match self {
            PlacementRule::FirstFit => first_fit(states, item),
            PlacementRule::BestFit => best_fit(states, item),
            PlacementRule::BestFitDecreasing => best_fit_decreasing(states, item),
        }
    }
}

/// First container (in given order) that can take one more unit.
pub fn first_fit(states: &[ContainerState], item: &ItemType) -> Option<usize> {
    states.iter().position(|state| state.fits(item))
}

/// Container with the lowest slack score after placement.
///
/// Ties keep the earliest container.
pub fn best_fit(states: &[ContainerState], item: &ItemType) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, state) in states.iter().enumerate() {
        if !state.fits(item) {
            continue;
        }
        let score = state.slack_after(item);
        match best {
            Some((_, best_score)) if score >= best_score => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Placement step of best-fit-decreasing.
///
/// Same score as [`best_fit`]; equal scores prefer the container that was
/// fuller before the placement, then the earliest container.
pub fn best_fit_decreasing(states: &[ContainerState], item: &ItemType) -> Option<usize> {
    let mut best: Option<Candidate> = None;
    for (idx, state) in states.iter().enumerate() {
        if !state.fits(item) {
            continue;
        }
        let candidate = Candidate {
            index: idx,
            slack: state.slack_after(item),
            pre_slack: state.slack(),
        };
        match best {
            Some(current) if !candidate.beats(&current) => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|candidate| candidate.index)
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    index: usize,
    slack: f64,
    pre_slack: f64,
}

impl Candidate {
    fn beats(&self, other: &Self) -> bool {
        let ordering = self
            .slack
            .total_cmp(&other.slack)
            .then_with(|| self.pre_slack.total_cmp(&other.pre_slack))
            .then_with(|| self.index.cmp(&other.index));
        ordering == Ordering::Less
    }
}

/// Ordering used by [`DemandOrder::LargestFirst`].
///
/// Compares two item types; `Ordering::Less` means `a` goes first. Callers
/// sort stably so equal keys keep their input order.
pub fn largest_first(a: &ItemType, b: &ItemType) -> Ordering {
    b.unit_volume_m3
        .total_cmp(&a.unit_volume_m3)
        .then_with(|| b.longest_edge().total_cmp(&a.longest_edge()))
        .then_with(|| b.unit_weight_kg.total_cmp(&a.unit_weight_kg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Container, ContainerId, ItemTypeId, UserId};
    use crate::types::Load;

    fn item(weight: f64, volume: f64) -> ItemType {
        ItemType::new(ItemTypeId::new(), "Unit", weight, volume).unwrap()
    }

    fn state(max_weight: f64, max_volume: f64, used_weight: f64, used_volume: f64) -> ContainerState {
        let container = Container::new(
            ContainerId::new(),
            "Bay",
            max_weight,
            max_volume,
            UserId::new(),
        )
        .unwrap();
        let mut state = ContainerState::new(container);
        state.used = Load::new(used_weight, used_volume);
        state
    }

    fn light() -> ItemType {
        item(1.0, 0.1)
    }

    fn heavy() -> ItemType {
        item(10.0, 0.2)
    }

    #[test]
    fn parses_all_keys_and_alias() {
        assert_eq!("first_fit".parse::<Strategy>(), Ok(Strategy::FirstFit));
        assert_eq!("best_fit".parse::<Strategy>(), Ok(Strategy::BestFit));
        assert_eq!("best_fit_decreasing".parse::<Strategy>(), Ok(Strategy::BestFitDecreasing));
        assert_eq!("bfd".parse::<Strategy>(), Ok(Strategy::BestFitDecreasing));
        assert_eq!("single_container_only".parse::<Strategy>(), Ok(Strategy::SingleContainerOnly));
        assert_eq!(" Best-Fit ".parse::<Strategy>(), Ok(Strategy::BestFit));
    }

    #[test]
    fn rejects_unknown_key() {
        let err = "worst_fit".parse::<Strategy>().unwrap_err();
        assert_eq!(err, UnknownStrategy("worst_fit".to_string()));
        assert!(err.to_string().contains("worst_fit"));
    }

    #[test]
    fn as_str_round_trips_through_parse() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>(), Ok(strategy));
        }
    }

    #[test]
    fn only_bfd_reorders_demand() {
        assert!(matches!(
            Strategy::BestFitDecreasing.mode(),
            AllocationMode::UnitByUnit {
                demand_order: DemandOrder::LargestFirst,
                ..
            }
        ));
        assert!(matches!(
            Strategy::BestFit.mode(),
            AllocationMode::UnitByUnit {
                demand_order: DemandOrder::AsRequested,
                ..
            }
        ));
        assert_eq!(Strategy::SingleContainerOnly.mode(), AllocationMode::WholeDemand);
    }

    #[test]
    fn first_fit_picks_first_container_with_room() {
        let states = vec![
            // no room for heavy (weight) nor light (volume)
            state(50.0, 1.0, 49.0, 0.95),
            state(30.0, 0.6, 0.0, 0.0),
        ];
        assert_eq!(first_fit(&states, &heavy()), Some(1));
        assert_eq!(first_fit(&states, &light()), Some(1));
    }

    #[test]
    fn first_fit_prefers_earlier_container_when_both_fit() {
        let states = vec![state(50.0, 1.0, 0.0, 0.0), state(30.0, 0.6, 0.0, 0.0)];
        assert_eq!(first_fit(&states, &light()), Some(0));
    }

    #[test]
    fn best_fit_minimizes_slack_score() {
        let states = vec![
            // after light: weight (50-11)/50 = 0.78, volume 0.4 -> 0.78
            state(50.0, 1.0, 10.0, 0.5),
            // after light: weight (30-21)/30 = 0.3, volume 0.5/0.6 = 0.833 -> 0.833
            state(30.0, 0.6, 20.0, 0.0),
        ];
        assert_eq!(best_fit(&states, &light()), Some(0));
    }

    #[test]
    fn best_fit_keeps_first_on_equal_scores() {
        let states = vec![state(10.0, 1.0, 0.0, 0.0), state(10.0, 1.0, 0.0, 0.0)];
        assert_eq!(best_fit(&states, &light()), Some(0));
    }

    #[test]
    fn strategies_return_none_when_nothing_fits() {
        let states = vec![state(50.0, 1.0, 50.0, 1.0), state(30.0, 0.6, 30.0, 0.6)];
        assert_eq!(first_fit(&states, &light()), None);
        assert_eq!(best_fit(&states, &light()), None);
        assert_eq!(best_fit_decreasing(&states, &light()), None);
    }

    #[test]
    fn best_fit_decreasing_breaks_ties_by_fullness_then_index() {
        let states = vec![
            // after light: weight 0.5, volume 0.5 -> 0.5; before: 0.6
            state(10.0, 1.0, 4.0, 0.4),
            // after light: weight 0.2, volume 0.5 -> 0.5; before: 0.7
            state(5.0, 0.5, 3.0, 0.15),
        ];
        assert_eq!(best_fit_decreasing(&states, &light()), Some(0));

        let reversed = vec![states[1].clone(), states[0].clone()];
        assert_eq!(best_fit_decreasing(&reversed, &light()), Some(1));

        let twins = vec![state(10.0, 1.0, 4.0, 0.4), state(10.0, 1.0, 4.0, 0.4)];
        assert_eq!(best_fit_decreasing(&twins, &light()), Some(0));
    }

    #[test]
    fn zero_capacity_container_scores_without_nan() {
        let weightless = item(0.0, 0.0);
        let states = vec![state(0.0, 0.0, 0.0, 0.0), state(10.0, 1.0, 0.0, 0.0)];
        // zero container scores 0, the empty one scores 1
        assert_eq!(best_fit(&states, &weightless), Some(0));
        assert_eq!(best_fit_decreasing(&states, &weightless), Some(0));
    }

    #[test]
    fn largest_first_orders_by_volume_then_edge_then_weight() {
        let big = item(1.0, 2.0);
        let long = item(1.0, 1.0).with_dimensions(Some(3.0), None, None).unwrap();
        let short_heavy = item(5.0, 1.0).with_dimensions(Some(1.0), None, None).unwrap();
        let short_light = item(2.0, 1.0).with_dimensions(Some(1.0), None, None).unwrap();

        assert_eq!(largest_first(&big, &long), Ordering::Less);
        assert_eq!(largest_first(&long, &short_heavy), Ordering::Less);
        assert_eq!(largest_first(&short_heavy, &short_light), Ordering::Less);
        assert_eq!(largest_first(&short_light, &short_light.clone()), Ordering::Equal);
    }
}
