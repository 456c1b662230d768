//! Allocation engine.
//!
//! Evaluates how a demand list (item type + quantity) can be distributed over
//! a set of containers under a chosen [`Strategy`]:
//! - validates the request shape
//! - resolves containers and item types through the [`Catalog`]
//! - checks access to every container through the [`AccessPolicy`]
//! - places units one at a time (or the whole demand at once for
//!   `single_container_only`) and aggregates utilization
//!
//! Capacity infeasibility is part of the result, never an error.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::catalog::{AccessPolicy, Catalog};
use crate::model::{Actor, Container, ContainerId, ContainerState, ItemType, ItemTypeId};
use crate::strategy::{AllocationMode, DemandOrder, PlacementRule, Strategy, UnknownStrategy, largest_first};
use crate::types::{Capacity, Load, UnitLoad, Utilization};

/// Limits that keep the cost of one evaluation bounded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocationLimits {
    /// Maximum number of demand lines per request
    pub max_items: usize,
    /// Maximum number of candidate containers per request
    pub max_containers: usize,
    /// Maximum sum of normalized unit counts per request
    pub max_total_units: u64,
}

impl AllocationLimits {
    pub const DEFAULT_MAX_ITEMS: usize = 100;
    pub const DEFAULT_MAX_CONTAINERS: usize = 100;
    pub const DEFAULT_MAX_TOTAL_UNITS: u64 = 1_000_000;

    pub fn builder() -> AllocationLimitsBuilder {
        AllocationLimitsBuilder::default()
    }
}

impl Default for AllocationLimits {
    fn default() -> Self {
        Self {
            max_items: Self::DEFAULT_MAX_ITEMS,
            max_containers: Self::DEFAULT_MAX_CONTAINERS,
            max_total_units: Self::DEFAULT_MAX_TOTAL_UNITS,
        }
    }
}

/// Builder for [`AllocationLimits`].
#[derive(Clone, Debug, Default)]
pub struct AllocationLimitsBuilder {
    limits: AllocationLimits,
}

impl AllocationLimitsBuilder {
    pub fn max_items(mut self, max: usize) -> Self {
        self.limits.max_items = max;
        self
    }

    pub fn max_containers(mut self, max: usize) -> Self {
        self.limits.max_containers = max;
        self
    }

    pub fn max_total_units(mut self, max: u64) -> Self {
        self.limits.max_total_units = max;
        self
    }

    pub fn build(self) -> AllocationLimits {
        self.limits
    }
}

/// One requested row: an item type and a (possibly fractional) quantity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DemandLine {
    pub item_type_id: ItemTypeId,
    pub quantity: f64,
}

impl DemandLine {
    pub fn new(item_type_id: ItemTypeId, quantity: f64) -> Self {
        Self {
            item_type_id,
            quantity,
        }
    }

    /// Whole units requested; fractions are truncated toward zero.
    pub fn units(&self) -> u64 {
        // `as` saturates for values beyond u64::MAX
        self.quantity.floor() as u64
    }
}

/// Input of an evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationRequest {
    pub items: Vec<DemandLine>,
    pub containers: Vec<ContainerId>,
    pub strategy: String,
}

/// Quantity of one item type, in whole units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocationLine {
    pub item_type_id: ItemTypeId,
    pub quantity: u64,
}

/// Final usage of one candidate container.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAllocation {
    pub container_id: ContainerId,
    pub total_weight_kg: f64,
    pub total_volume_m3: f64,
    pub utilization: Utilization,
    pub items: Vec<AllocationLine>,
}

impl ContainerAllocation {
    fn from_state(state: &ContainerState) -> Self {
        Self {
            container_id: state.container.id,
            total_weight_kg: state.used.weight_kg,
            total_volume_m3: state.used.volume_m3,
            utilization: state.used.utilization_against(&state.container.capacity()),
            items: state
                .placed_units
                .iter()
                .map(|(item_type_id, quantity)| AllocationLine {
                    item_type_id: *item_type_id,
                    quantity: *quantity,
                })
                .collect(),
        }
    }
}

/// Outcome of an evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// `true` iff every requested unit was placed
    pub feasible: bool,
    /// One entry per requested container, in request order
    pub by_container: Vec<ContainerAllocation>,
    /// Remainders that could not be placed; quantities are always > 0
    pub unallocated: Vec<AllocationLine>,
}

impl EvaluationResult {
    /// Total units placed across all containers.
    pub fn placed_units(&self) -> u64 {
        self.by_container
            .iter()
            .flat_map(|c| c.items.iter())
            .map(|line| line.quantity)
            .sum()
    }

    /// Total units left unallocated.
    pub fn unallocated_units(&self) -> u64 {
        self.unallocated.iter().map(|line| line.quantity).sum()
    }
}

/// Category of an [`EvaluationError`], used for transport mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
}

/// Precondition failures; any of them aborts the evaluation before placement.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EvaluationError {
    #[error("items cannot be empty")]
    EmptyItems,
    #[error("containers cannot be empty")]
    EmptyContainers,
    #[error("items must contain at most {max} entries, got {actual}")]
    TooManyItems { max: usize, actual: usize },
    #[error("containers must contain at most {max} entries, got {actual}")]
    TooManyContainers { max: usize, actual: usize },
    #[error("quantity for item type {item_type_id} must be a finite number >= 0, got {quantity}")]
    InvalidQuantity {
        item_type_id: ItemTypeId,
        quantity: f64,
    },
    #[error(transparent)]
    UnknownStrategy(#[from] UnknownStrategy),
    #[error("request asks for {requested} units, at most {max} are allowed per evaluation")]
    TooManyUnits { requested: u64, max: u64 },
    #[error("container {0} is listed more than once")]
    DuplicateContainer(ContainerId),
    #[error("One or more containers not found")]
    ContainersNotFound(Vec<ContainerId>),
    #[error("One or more item types not found")]
    ItemTypesNotFound(Vec<ItemTypeId>),
    #[error("You cannot use containers you do not own")]
    Forbidden(ContainerId),
}

impl EvaluationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvaluationError::Forbidden(_) => ErrorKind::Forbidden,
            _ => ErrorKind::BadRequest,
        }
    }
}

/// Events emitted while allocating, for live progress streams.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum AllocationEvent {
    /// Working state is ready; placement begins.
    EvaluationStarted {
        strategy: Strategy,
        containers: usize,
        demand_lines: usize,
        total_units: u64,
    },
    /// A run of consecutive units of one item type went into one container.
    UnitsPlaced {
        container_id: ContainerId,
        item_type_id: ItemTypeId,
        quantity: u64,
        total_weight_kg: f64,
        total_volume_m3: f64,
    },
    /// A demand line could not be placed completely.
    DemandUnallocated {
        item_type_id: ItemTypeId,
        quantity: u64,
    },
    /// Allocation finished.
    Finished { feasible: bool, unallocated: usize },
}

/// A demand line after normalization, carrying its resolved item type.
#[derive(Clone, Debug)]
struct DemandUnits {
    item: ItemType,
    units: u64,
}

/// Resolved, authorized and ordered evaluation, ready to allocate.
///
/// Owns fresh working state; running it consumes it.
#[derive(Clone, Debug)]
pub struct PreparedEvaluation {
    strategy: Strategy,
    states: Vec<ContainerState>,
    demand: Vec<DemandUnits>,
}

impl PreparedEvaluation {
    /// Builds working state from already resolved records.
    ///
    /// `demand` pairs each line's item type with its requested quantity.
    /// Quantities are floored; zero-unit lines are dropped. For
    /// best-fit-decreasing the lines are reordered here.
    pub fn new(
        strategy: Strategy,
        containers: Vec<Container>,
        demand: Vec<(ItemType, f64)>,
    ) -> Self {
        let states = containers.into_iter().map(ContainerState::new).collect();
        let mut demand: Vec<DemandUnits> = demand
            .into_iter()
            .map(|(item, quantity)| DemandUnits {
                units: DemandLine::new(item.id, quantity).units(),
                item,
            })
            .filter(|line| line.units > 0)
            .collect();

        if let AllocationMode::UnitByUnit {
            demand_order: DemandOrder::LargestFirst,
            ..
        } = strategy.mode()
        {
            // stable: equal keys keep input order
            demand.sort_by(|a, b| largest_first(&a.item, &b.item));
        }

        Self {
            strategy,
            states,
            demand,
        }
    }

    /// Sum of normalized units across all demand lines.
    pub fn total_units(&self) -> u64 {
        self.demand
            .iter()
            .fold(0u64, |acc, line| acc.saturating_add(line.units))
    }

    /// Allocates and returns the result.
    pub fn run(self) -> EvaluationResult {
        self.run_with_progress(|_| {})
    }

    /// Allocates, reporting every step through `on_event`.
    pub fn run_with_progress(self, mut on_event: impl FnMut(&AllocationEvent)) -> EvaluationResult {
        let total_units = self.total_units();
        let PreparedEvaluation {
            strategy,
            mut states,
            demand,
        } = self;

        on_event(&AllocationEvent::EvaluationStarted {
            strategy,
            containers: states.len(),
            demand_lines: demand.len(),
            total_units,
        });

        let unallocated = match strategy.mode() {
            AllocationMode::WholeDemand => place_whole_demand(&mut states, &demand, &mut on_event),
            AllocationMode::UnitByUnit { rule, .. } => {
                place_unit_by_unit(&mut states, &demand, rule, &mut on_event)
            }
        };

        let result = EvaluationResult {
            feasible: unallocated.is_empty(),
            by_container: states.iter().map(ContainerAllocation::from_state).collect(),
            unallocated,
        };

        on_event(&AllocationEvent::Finished {
            feasible: result.feasible,
            unallocated: result.unallocated.len(),
        });
        info!(
            strategy = %strategy,
            feasible = result.feasible,
            placed = result.placed_units(),
            unallocated = result.unallocated_units(),
            "evaluation finished"
        );

        result
    }
}

/// Places each line unit by unit, asking `rule` for a target every time.
///
/// A line stops at the first unit no container accepts; its remainder is
/// returned as unallocated.
fn place_unit_by_unit(
    states: &mut [ContainerState],
    demand: &[DemandUnits],
    rule: PlacementRule,
    on_event: &mut impl FnMut(&AllocationEvent),
) -> Vec<AllocationLine> {
    let mut unallocated = Vec::new();

    for line in demand {
        let mut remaining = line.units;
        let mut run: Option<(usize, u64)> = None;

        while remaining > 0 {
            let Some(idx) = rule.select(states, &line.item) else {
                break;
            };
            states[idx].place_unit(&line.item);
            remaining -= 1;

            run = match run {
                Some((current, count)) if current == idx => Some((current, count + 1)),
                Some((current, count)) => {
                    emit_units_placed(&states[current], line.item.id, count, on_event);
                    Some((idx, 1))
                }
                None => Some((idx, 1)),
            };
        }

        if let Some((current, count)) = run {
            emit_units_placed(&states[current], line.item.id, count, on_event);
        }

        if remaining > 0 {
            debug!(item_type = %line.item.id, remaining, "no container accepts further units");
            on_event(&AllocationEvent::DemandUnallocated {
                item_type_id: line.item.id,
                quantity: remaining,
            });
            unallocated.push(AllocationLine {
                item_type_id: line.item.id,
                quantity: remaining,
            });
        }
    }

    unallocated
}

/// Commits the complete demand to the first container that can hold all of
/// it, or reports every line as unallocated.
fn place_whole_demand(
    states: &mut [ContainerState],
    demand: &[DemandUnits],
    on_event: &mut impl FnMut(&AllocationEvent),
) -> Vec<AllocationLine> {
    let total = demand.iter().fold(Load::zero(), |acc, line| {
        acc + line.item.unit_load() * line.units as f64
    });

    let target = states
        .iter()
        .position(|state| (state.used + total).fits_within(&state.container.capacity()));

    match target {
        Some(idx) => {
            let state = &mut states[idx];
            state.used += total;
            for line in demand {
                state.record_units(line.item.id, line.units);
            }
            for line in demand {
                emit_units_placed(state, line.item.id, line.units, on_event);
            }
            Vec::new()
        }
        None => {
            debug!(
                weight_kg = total.weight_kg,
                volume_m3 = total.volume_m3,
                "no single container holds the whole demand"
            );
            demand
                .iter()
                .map(|line| {
                    on_event(&AllocationEvent::DemandUnallocated {
                        item_type_id: line.item.id,
                        quantity: line.units,
                    });
                    AllocationLine {
                        item_type_id: line.item.id,
                        quantity: line.units,
                    }
                })
                .collect()
        }
    }
}

fn emit_units_placed(
    state: &ContainerState,
    item_type_id: ItemTypeId,
    quantity: u64,
    on_event: &mut impl FnMut(&AllocationEvent),
) {
    debug!(container = %state.container.id, item_type = %item_type_id, quantity, "units placed");
    on_event(&AllocationEvent::UnitsPlaced {
        container_id: state.container.id,
        item_type_id,
        quantity,
        total_weight_kg: state.used.weight_kg,
        total_volume_m3: state.used.volume_m3,
    });
}

/// Runs the precondition steps of an evaluation against a catalog and an
/// access policy.
pub struct Evaluator<'a, C: ?Sized, P: ?Sized> {
    catalog: &'a C,
    policy: &'a P,
    limits: AllocationLimits,
}

impl<'a, C, P> Evaluator<'a, C, P>
where
    C: Catalog + ?Sized,
    P: AccessPolicy + ?Sized,
{
    pub fn new(catalog: &'a C, policy: &'a P, limits: AllocationLimits) -> Self {
        Self {
            catalog,
            policy,
            limits,
        }
    }

    /// Validates, resolves and authorizes a request.
    ///
    /// Nothing is allocated here; every failure leaves no trace.
    #[instrument(
        skip_all,
        fields(
            strategy = %request.strategy,
            items = request.items.len(),
            containers = request.containers.len(),
            actor = %actor.id
        )
    )]
    pub async fn prepare(
        &self,
        request: &AllocationRequest,
        actor: &Actor,
    ) -> Result<PreparedEvaluation, EvaluationError> {
        let strategy = validate_shape(request, &self.limits)?;

        let containers = self
            .catalog
            .resolve_containers(&request.containers)
            .await
            .map_err(|err| {
                debug!(error = %err, "container resolution failed");
                EvaluationError::ContainersNotFound(err.missing_containers())
            })?;

        let item_type_ids = distinct_item_types(&request.items);
        let item_types = self
            .catalog
            .resolve_item_types(&item_type_ids)
            .await
            .map_err(|err| {
                debug!(error = %err, "item type resolution failed");
                EvaluationError::ItemTypesNotFound(err.missing_item_types())
            })?;

        if let Some(denied) = containers
            .iter()
            .find(|container| !self.policy.can_access(actor, container))
        {
            info!(container = %denied.id, "access to container denied");
            return Err(EvaluationError::Forbidden(denied.id));
        }

        let mut demand = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let item = item_types
                .iter()
                .find(|item| item.id == line.item_type_id)
                .cloned()
                .ok_or_else(|| EvaluationError::ItemTypesNotFound(vec![line.item_type_id]))?;
            demand.push((item, line.quantity));
        }

        Ok(PreparedEvaluation::new(strategy, containers, demand))
    }

    /// Validates, resolves, authorizes and allocates.
    pub async fn evaluate(
        &self,
        request: &AllocationRequest,
        actor: &Actor,
    ) -> Result<EvaluationResult, EvaluationError> {
        Ok(self.prepare(request, actor).await?.run())
    }
}

/// Shape checks that need no catalog access.
fn validate_shape(
    request: &AllocationRequest,
    limits: &AllocationLimits,
) -> Result<Strategy, EvaluationError> {
    if request.items.is_empty() {
        return Err(EvaluationError::EmptyItems);
    }
    if request.containers.is_empty() {
        return Err(EvaluationError::EmptyContainers);
    }
    if request.items.len() > limits.max_items {
        return Err(EvaluationError::TooManyItems {
            max: limits.max_items,
            actual: request.items.len(),
        });
    }
    if request.containers.len() > limits.max_containers {
        return Err(EvaluationError::TooManyContainers {
            max: limits.max_containers,
            actual: request.containers.len(),
        });
    }

    let strategy: Strategy = request.strategy.parse()?;

    let mut requested: u64 = 0;
    for line in &request.items {
        if !line.quantity.is_finite() || line.quantity < 0.0 {
            return Err(EvaluationError::InvalidQuantity {
                item_type_id: line.item_type_id,
                quantity: line.quantity,
            });
        }
        requested = requested.saturating_add(line.units());
    }
    if requested > limits.max_total_units {
        return Err(EvaluationError::TooManyUnits {
            requested,
            max: limits.max_total_units,
        });
    }

    let mut seen = HashSet::with_capacity(request.containers.len());
    for id in &request.containers {
        if !seen.insert(*id) {
            return Err(EvaluationError::DuplicateContainer(*id));
        }
    }

    Ok(strategy)
}

/// Distinct item type ids in order of first appearance.
fn distinct_item_types(items: &[DemandLine]) -> Vec<ItemTypeId> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .map(|line| line.item_type_id)
        .filter(|id| seen.insert(*id))
        .collect()
}
