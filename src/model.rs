//! Data models for the allocation service.
//!
//! This module defines the fundamental data structures:
//! - `ItemType`: a catalog entry with per-unit weight and volume
//! - `Container`: a capacity envelope owned by a user
//! - `ContainerState`: the mutable working record of one evaluation
//! - `StoredItem`: a quantity of an item type kept inside a container
//!
//! Capacity arithmetic is delegated to the `types` module.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::{Capacity, Load, UnitLoad, validation};

/// Validation error for catalog data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid volume: {0}")]
    InvalidVolume(String),
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

define_id!(
    /// Identifier of an item type in the catalog.
    ItemTypeId
);
define_id!(
    /// Identifier of a container.
    ContainerId
);
define_id!(
    /// Identifier of a user (container owner or request actor).
    UserId
);
define_id!(
    /// Identifier of an item stored inside a container.
    ItemId
);

/// Authorization role of an actor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Catalog definition of an item: per-unit weight, volume and optional
/// outer dimensions.
///
/// # Fields
/// * `unit_weight_kg` - Weight of one unit in kg
/// * `unit_volume_m3` - Volume of one unit in m³
/// * `length_m`, `width_m`, `height_m` - Optional edges in m, only used to
///   order demand for best-fit-decreasing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemType {
    pub id: ItemTypeId,
    pub name: String,
    pub unit_weight_kg: f64,
    pub unit_volume_m3: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_m: Option<f64>,
}

impl ItemType {
    /// Creates a new item type with validation.
    ///
    /// # Returns
    /// `Ok(ItemType)` for valid values, otherwise `Err(ValidationError)`
    pub fn new(
        id: ItemTypeId,
        name: impl Into<String>,
        unit_weight_kg: f64,
        unit_volume_m3: f64,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        validation::validate_name(&name, "Item type name").map_err(ValidationError::InvalidName)?;
        validation::validate_non_negative(unit_weight_kg, "Unit weight")
            .map_err(ValidationError::InvalidWeight)?;
        validation::validate_non_negative(unit_volume_m3, "Unit volume")
            .map_err(ValidationError::InvalidVolume)?;
        Ok(Self {
            id,
            name,
            unit_weight_kg,
            unit_volume_m3,
            length_m: None,
            width_m: None,
            height_m: None,
        })
    }

    /// Attaches outer dimensions after validating them.
    pub fn with_dimensions(
        mut self,
        length_m: Option<f64>,
        width_m: Option<f64>,
        height_m: Option<f64>,
    ) -> Result<Self, ValidationError> {
        validation::validate_optional(length_m, "Length").map_err(ValidationError::InvalidDimension)?;
        validation::validate_optional(width_m, "Width").map_err(ValidationError::InvalidDimension)?;
        validation::validate_optional(height_m, "Height").map_err(ValidationError::InvalidDimension)?;
        self.length_m = length_m;
        self.width_m = width_m;
        self.height_m = height_m;
        Ok(self)
    }

    /// Longest known edge; missing dimensions count as 0.
    pub fn longest_edge(&self) -> f64 {
        [self.length_m, self.width_m, self.height_m]
            .into_iter()
            .map(|edge| edge.unwrap_or(0.0))
            .fold(0.0, f64::max)
    }
}

impl UnitLoad for ItemType {
    fn unit_load(&self) -> Load {
        Load::new(self.unit_weight_kg, self.unit_volume_m3)
    }
}

/// Represents a storage container with capacity limits.
///
/// # Fields
/// * `max_weight_kg` - Maximum total weight in kg
/// * `max_volume_m3` - Maximum total volume in m³
/// * `owner_id` - User that owns the container; only relevant for access checks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub max_weight_kg: f64,
    pub max_volume_m3: f64,
    pub owner_id: UserId,
}

impl Container {
    /// Creates a new container with validation.
    ///
    /// Zero limits are allowed; such a container only accepts
    /// weightless and volumeless items.
    pub fn new(
        id: ContainerId,
        name: impl Into<String>,
        max_weight_kg: f64,
        max_volume_m3: f64,
        owner_id: UserId,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        validation::validate_name(&name, "Container name").map_err(ValidationError::InvalidName)?;
        validation::validate_non_negative(max_weight_kg, "Maximum weight")
            .map_err(ValidationError::InvalidWeight)?;
        validation::validate_non_negative(max_volume_m3, "Maximum volume")
            .map_err(ValidationError::InvalidVolume)?;
        Ok(Self {
            id,
            name,
            max_weight_kg,
            max_volume_m3,
            owner_id,
        })
    }
}

impl Capacity for Container {
    fn capacity(&self) -> Load {
        Load::new(self.max_weight_kg, self.max_volume_m3)
    }
}

/// Working record of one container during a single evaluation.
///
/// Created empty at the start of an evaluation and dropped at its end.
/// `used` never exceeds the container's capacity: placement goes through
/// [`ContainerState::fits`] first.
#[derive(Clone, Debug)]
pub struct ContainerState {
    pub container: Container,
    pub used: Load,
    pub placed_units: BTreeMap<ItemTypeId, u64>,
}

impl ContainerState {
    /// Creates an empty state for a container.
    pub fn new(container: Container) -> Self {
        Self {
            container,
            used: Load::zero(),
            placed_units: BTreeMap::new(),
        }
    }

    /// Usage after hypothetically adding one unit.
    #[inline]
    pub fn used_after(&self, item: &ItemType) -> Load {
        self.used + item.unit_load()
    }

    /// Checks if one more unit fits without exceeding either limit.
    #[inline]
    pub fn fits(&self, item: &ItemType) -> bool {
        self.used_after(item).fits_within(&self.container.capacity())
    }

    /// Slack score before any placement.
    pub fn slack(&self) -> f64 {
        self.used.slack_against(&self.container.capacity())
    }

    /// Slack score after hypothetically adding one unit.
    pub fn slack_after(&self, item: &ItemType) -> f64 {
        self.used_after(item).slack_against(&self.container.capacity())
    }

    /// Places one unit. Callers check [`ContainerState::fits`] first.
    pub fn place_unit(&mut self, item: &ItemType) {
        debug_assert!(self.fits(item), "placement would exceed container capacity");
        self.used = self.used_after(item);
        *self.placed_units.entry(item.id).or_insert(0) += 1;
    }

    /// Records a bulk placement whose load has already been checked.
    pub fn record_units(&mut self, item_type_id: ItemTypeId, units: u64) {
        if units > 0 {
            *self.placed_units.entry(item_type_id).or_insert(0) += units;
        }
    }
}

/// A quantity of an item type stored inside a container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredItem {
    pub id: ItemId,
    pub container_id: ContainerId,
    pub item_type_id: ItemTypeId,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StoredItem {
    pub fn new(
        id: ItemId,
        container_id: ContainerId,
        item_type_id: ItemTypeId,
        quantity: f64,
        note: Option<String>,
    ) -> Result<Self, ValidationError> {
        validation::validate_non_negative(quantity, "Quantity")
            .map_err(ValidationError::InvalidQuantity)?;
        Ok(Self {
            id,
            container_id,
            item_type_id,
            quantity,
            note,
        })
    }
}
