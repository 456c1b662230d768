//! Inventory catalog: item types, containers and the items stored in them.
//!
//! The allocation engine only needs read access through the [`Catalog`]
//! trait and an [`AccessPolicy`]; the HTTP layer uses the CRUD operations of
//! [`InMemoryCatalog`] directly.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::allocator::DemandLine;
use crate::model::{
    Actor, Container, ContainerId, ItemId, ItemType, ItemTypeId, StoredItem, UserId,
    ValidationError,
};
use crate::types::{Capacity, Load, UnitLoad, Utilization};

/// Default page size for paginated listings.
pub const DEFAULT_PAGE_LIMIT: u64 = 20;
/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Fixed identifier of the seeded demo administrator.
pub const DEMO_ADMIN_ID: UserId = UserId(Uuid::from_u128(1));
/// Fixed identifier of the seeded demo user.
pub const DEMO_USER_ID: UserId = UserId(Uuid::from_u128(2));

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("Container not found")]
    ContainerNotFound(ContainerId),
    #[error("One or more containers not found")]
    ContainersNotFound(Vec<ContainerId>),
    #[error("Item type not found")]
    ItemTypeNotFound(ItemTypeId),
    #[error("One or more item types not found")]
    ItemTypesNotFound(Vec<ItemTypeId>),
    #[error("Item not found")]
    ItemNotFound(ItemId),
    #[error("Not your container")]
    Forbidden(ContainerId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid page request: {0}")]
    InvalidPage(String),
}

impl CatalogError {
    /// Container ids this error reports as missing.
    pub fn missing_containers(&self) -> Vec<ContainerId> {
        match self {
            CatalogError::ContainerNotFound(id) => vec![*id],
            CatalogError::ContainersNotFound(ids) => ids.clone(),
            _ => Vec::new(),
        }
    }

    /// Item type ids this error reports as missing.
    pub fn missing_item_types(&self) -> Vec<ItemTypeId> {
        match self {
            CatalogError::ItemTypeNotFound(id) => vec![*id],
            CatalogError::ItemTypesNotFound(ids) => ids.clone(),
            _ => Vec::new(),
        }
    }
}

/// Read access to catalog records.
///
/// Results are returned in the order of the requested ids; any unknown id
/// fails the whole call and is reported in the error.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn resolve_containers(&self, ids: &[ContainerId]) -> Result<Vec<Container>, CatalogError>;

    async fn resolve_item_types(&self, ids: &[ItemTypeId]) -> Result<Vec<ItemType>, CatalogError>;
}

/// Decides whether an actor may use a container.
pub trait AccessPolicy: Send + Sync {
    fn can_access(&self, actor: &Actor, container: &Container) -> bool;
}

/// Admins may use every container, everybody else only their own.
#[derive(Clone, Copy, Debug, Default)]
pub struct OwnershipPolicy;

impl AccessPolicy for OwnershipPolicy {
    fn can_access(&self, actor: &Actor, container: &Container) -> bool {
        actor.is_admin() || container.owner_id == actor.id
    }
}

/// Changes to a container; absent fields stay as they are.
///
/// When `items` is present it replaces the stored items of the container.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPatch {
    pub name: Option<String>,
    pub max_weight_kg: Option<f64>,
    pub max_volume_m3: Option<f64>,
    pub items: Option<Vec<DemandLine>>,
}

/// A new item to store inside a container.
#[derive(Clone, Debug, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub item_type_id: ItemTypeId,
    pub quantity: f64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Changes to a stored item; absent fields stay as they are.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    pub item_type_id: Option<ItemTypeId>,
    pub quantity: Option<f64>,
    pub note: Option<String>,
}

/// Current load of a container computed from its stored items.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerUtilization {
    pub container_id: ContainerId,
    pub total_weight_kg: f64,
    pub total_volume_m3: f64,
    pub max_weight_kg: f64,
    pub max_volume_m3: f64,
    pub utilization: Utilization,
    pub weight_exceeded: bool,
    pub volume_exceeded: bool,
}

/// Raw pagination query parameters.
#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Number of records to skip (default 0)
    pub offset: Option<u64>,
    /// Page size, 1..=100 (default 20)
    pub limit: Option<u64>,
    /// One of `name`, `maxWeightKg`, `maxVolumeM3`, `id`
    pub sort: Option<String>,
    /// `asc` (default) or `desc`
    pub dir: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerSort {
    Name,
    MaxWeight,
    MaxVolume,
    Id,
}

impl ContainerSort {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "name" => Some(ContainerSort::Name),
            "maxWeightKg" => Some(ContainerSort::MaxWeight),
            "maxVolumeM3" => Some(ContainerSort::MaxVolume),
            "id" => Some(ContainerSort::Id),
            _ => None,
        }
    }

    fn compare(&self, a: &Container, b: &Container) -> Ordering {
        match self {
            ContainerSort::Name => a.name.cmp(&b.name),
            ContainerSort::MaxWeight => a.max_weight_kg.total_cmp(&b.max_weight_kg),
            ContainerSort::MaxVolume => a.max_volume_m3.total_cmp(&b.max_volume_m3),
            ContainerSort::Id => a.id.cmp(&b.id),
        }
    }
}

/// Validated pagination request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
    /// `None` keeps insertion order
    pub sort: Option<ContainerSort>,
    pub descending: bool,
}

impl PageQuery {
    /// Applies defaults and bounds.
    ///
    /// Sort keys outside the allowed set are ignored and fall back to
    /// insertion order.
    pub fn into_validated(self) -> Result<PageRequest, CatalogError> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(CatalogError::InvalidPage(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {limit}"
            )));
        }
        let descending = match self.dir.as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => {
                return Err(CatalogError::InvalidPage(format!(
                    "dir must be 'asc' or 'desc', got '{other}'"
                )));
            }
        };
        Ok(PageRequest {
            offset: self.offset.unwrap_or(0),
            limit,
            sort: self.sort.as_deref().and_then(ContainerSort::parse),
            descending,
        })
    }
}

/// One page of a listing.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Identifiers created by [`InMemoryCatalog::seed_demo`].
#[derive(Clone, Debug)]
pub struct DemoSeed {
    pub admin: UserId,
    pub user: UserId,
    pub item_types: Vec<ItemTypeId>,
    pub containers: Vec<ContainerId>,
}

#[derive(Debug, Default)]
struct CatalogData {
    item_types: Vec<ItemType>,
    containers: Vec<Container>,
    items: Vec<StoredItem>,
}

impl CatalogData {
    fn item_type(&self, id: ItemTypeId) -> Result<&ItemType, CatalogError> {
        self.item_types
            .iter()
            .find(|item| item.id == id)
            .ok_or(CatalogError::ItemTypeNotFound(id))
    }

    fn container_index(&self, id: ContainerId) -> Result<usize, CatalogError> {
        self.containers
            .iter()
            .position(|container| container.id == id)
            .ok_or(CatalogError::ContainerNotFound(id))
    }

    /// Builds stored items for a container after checking every item type.
    fn stock(
        &self,
        container_id: ContainerId,
        lines: &[DemandLine],
    ) -> Result<Vec<StoredItem>, CatalogError> {
        lines
            .iter()
            .map(|line| {
                self.item_type(line.item_type_id)?;
                Ok(StoredItem::new(
                    ItemId::new(),
                    container_id,
                    line.item_type_id,
                    line.quantity,
                    None,
                )?)
            })
            .collect()
    }
}

/// Catalog kept in process memory.
///
/// Records are listed in insertion order.
pub struct InMemoryCatalog {
    data: RwLock<CatalogData>,
    policy: Box<dyn AccessPolicy>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::with_policy(OwnershipPolicy)
    }

    pub fn with_policy(policy: impl AccessPolicy + 'static) -> Self {
        Self {
            data: RwLock::new(CatalogData::default()),
            policy: Box::new(policy),
        }
    }

    /// Policy used for every container access check.
    pub fn policy(&self) -> &(dyn AccessPolicy + 'static) {
        self.policy.as_ref()
    }

    fn authorize(&self, actor: &Actor, container: &Container) -> Result<(), CatalogError> {
        if self.policy.can_access(actor, container) {
            Ok(())
        } else {
            Err(CatalogError::Forbidden(container.id))
        }
    }

    // ----- item types -----

    pub async fn list_item_types(&self) -> Vec<ItemType> {
        self.data.read().await.item_types.clone()
    }

    pub async fn item_type(&self, id: ItemTypeId) -> Result<ItemType, CatalogError> {
        self.data.read().await.item_type(id).cloned()
    }

    pub async fn insert_item_type(&self, item_type: ItemType) -> Result<ItemType, CatalogError> {
        let mut data = self.data.write().await;
        data.item_types.push(item_type.clone());
        info!(item_type = %item_type.id, name = %item_type.name, "item type created");
        Ok(item_type)
    }

    // ----- containers -----

    /// Containers the actor may see.
    pub async fn list_containers(&self, actor: &Actor) -> Vec<Container> {
        self.data
            .read()
            .await
            .containers
            .iter()
            .filter(|container| self.policy.can_access(actor, container))
            .cloned()
            .collect()
    }

    /// One page of the containers the actor may see.
    pub async fn list_containers_page(
        &self,
        actor: &Actor,
        page: PageRequest,
    ) -> Page<Container> {
        let mut visible = self.list_containers(actor).await;
        if let Some(sort) = page.sort {
            visible.sort_by(|a, b| {
                let ordering = sort.compare(a, b);
                if page.descending { ordering.reverse() } else { ordering }
            });
        }
        let total = visible.len() as u64;
        let data = visible
            .into_iter()
            .skip(usize::try_from(page.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
            .collect();
        Page {
            data,
            total,
            offset: page.offset,
            limit: page.limit,
        }
    }

    /// A single container; missing ids come before access checks.
    pub async fn container(&self, id: ContainerId, actor: &Actor) -> Result<Container, CatalogError> {
        let data = self.data.read().await;
        let container = &data.containers[data.container_index(id)?];
        self.authorize(actor, container)?;
        Ok(container.clone())
    }

    /// Stores a container together with its initial items.
    pub async fn insert_container(
        &self,
        container: Container,
        items: Vec<DemandLine>,
    ) -> Result<Container, CatalogError> {
        let mut data = self.data.write().await;
        let stock = data.stock(container.id, &items)?;
        data.containers.push(container.clone());
        data.items.extend(stock);
        info!(container = %container.id, owner = %container.owner_id, "container created");
        Ok(container)
    }

    pub async fn update_container(
        &self,
        id: ContainerId,
        actor: &Actor,
        patch: ContainerPatch,
    ) -> Result<Container, CatalogError> {
        let mut data = self.data.write().await;
        let idx = data.container_index(id)?;
        let current = data.containers[idx].clone();
        self.authorize(actor, &current)?;

        let updated = Container::new(
            current.id,
            patch.name.unwrap_or(current.name),
            patch.max_weight_kg.unwrap_or(current.max_weight_kg),
            patch.max_volume_m3.unwrap_or(current.max_volume_m3),
            current.owner_id,
        )?;

        if let Some(lines) = patch.items {
            let stock = data.stock(id, &lines)?;
            data.items.retain(|item| item.container_id != id);
            data.items.extend(stock);
        }
        data.containers[idx] = updated.clone();
        info!(container = %id, "container updated");
        Ok(updated)
    }

    /// Removes a container and every item stored in it.
    pub async fn delete_container(&self, id: ContainerId, actor: &Actor) -> Result<(), CatalogError> {
        let mut data = self.data.write().await;
        let idx = data.container_index(id)?;
        self.authorize(actor, &data.containers[idx])?;
        data.containers.remove(idx);
        data.items.retain(|item| item.container_id != id);
        info!(container = %id, "container deleted");
        Ok(())
    }

    /// Sums the stored items of a container against its limits.
    ///
    /// Unlike an evaluation this reports overloads instead of preventing
    /// them: stored quantities are whatever the owner recorded.
    pub async fn calculate_container(
        &self,
        id: ContainerId,
        actor: &Actor,
    ) -> Result<ContainerUtilization, CatalogError> {
        let data = self.data.read().await;
        let container = &data.containers[data.container_index(id)?];
        self.authorize(actor, container)?;

        let mut total = Load::zero();
        for item in data.items.iter().filter(|item| item.container_id == id) {
            let item_type = data.item_type(item.item_type_id)?;
            total += item_type.unit_load() * item.quantity;
        }

        let capacity = container.capacity();
        Ok(ContainerUtilization {
            container_id: id,
            total_weight_kg: total.weight_kg,
            total_volume_m3: total.volume_m3,
            max_weight_kg: capacity.weight_kg,
            max_volume_m3: capacity.volume_m3,
            utilization: total.utilization_against(&capacity),
            weight_exceeded: total.weight_kg > capacity.weight_kg,
            volume_exceeded: total.volume_m3 > capacity.volume_m3,
        })
    }

    // ----- stored items -----

    pub async fn list_items(
        &self,
        container_id: ContainerId,
        actor: &Actor,
    ) -> Result<Vec<StoredItem>, CatalogError> {
        let data = self.data.read().await;
        self.authorize(actor, &data.containers[data.container_index(container_id)?])?;
        Ok(data
            .items
            .iter()
            .filter(|item| item.container_id == container_id)
            .cloned()
            .collect())
    }

    pub async fn create_item(
        &self,
        container_id: ContainerId,
        actor: &Actor,
        new_item: NewItem,
    ) -> Result<StoredItem, CatalogError> {
        let mut data = self.data.write().await;
        self.authorize(actor, &data.containers[data.container_index(container_id)?])?;
        data.item_type(new_item.item_type_id)?;

        let item = StoredItem::new(
            ItemId::new(),
            container_id,
            new_item.item_type_id,
            new_item.quantity,
            new_item.note,
        )?;
        data.items.push(item.clone());
        info!(item = %item.id, container = %container_id, "item stored");
        Ok(item)
    }

    pub async fn update_item(
        &self,
        id: ItemId,
        actor: &Actor,
        patch: ItemPatch,
    ) -> Result<StoredItem, CatalogError> {
        let mut data = self.data.write().await;
        let idx = data
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(CatalogError::ItemNotFound(id))?;
        let current = data.items[idx].clone();
        self.authorize(actor, &data.containers[data.container_index(current.container_id)?])?;

        if let Some(item_type_id) = patch.item_type_id {
            data.item_type(item_type_id)?;
        }
        let updated = StoredItem::new(
            current.id,
            current.container_id,
            patch.item_type_id.unwrap_or(current.item_type_id),
            patch.quantity.unwrap_or(current.quantity),
            patch.note.or(current.note),
        )?;
        data.items[idx] = updated.clone();
        Ok(updated)
    }

    /// Deletes a stored item; an unknown id is not an error.
    pub async fn delete_item(&self, id: ItemId, actor: &Actor) -> Result<(), CatalogError> {
        let mut data = self.data.write().await;
        let Some(idx) = data.items.iter().position(|item| item.id == id) else {
            return Ok(());
        };
        let container_id = data.items[idx].container_id;
        self.authorize(actor, &data.containers[data.container_index(container_id)?])?;
        data.items.remove(idx);
        Ok(())
    }

    // ----- demo data -----

    /// Loads a small demo inventory owned by [`DEMO_USER_ID`].
    pub async fn seed_demo(&self) -> Result<DemoSeed, CatalogError> {
        let small = ItemType::new(ItemTypeId::new(), "Small Box", 1.0, 0.02)?
            .with_dimensions(Some(0.4), Some(0.3), Some(0.2))?;
        let medium = ItemType::new(ItemTypeId::new(), "Medium Box", 2.0, 0.05)?
            .with_dimensions(Some(0.6), Some(0.4), Some(0.25))?;
        let large = ItemType::new(ItemTypeId::new(), "Large Box", 5.0, 0.1)?
            .with_dimensions(Some(0.8), Some(0.6), Some(0.25))?;
        let item_types = vec![small.id, medium.id, large.id];
        for item_type in [small.clone(), medium.clone(), large.clone()] {
            self.insert_item_type(item_type).await?;
        }

        let container_a = Container::new(ContainerId::new(), "Container A", 200.0, 2.5, DEMO_USER_ID)?;
        let container_b = Container::new(ContainerId::new(), "Container B", 120.0, 1.2, DEMO_USER_ID)?;
        let containers = vec![container_a.id, container_b.id];

        self.insert_container(container_a.clone(), vec![DemandLine::new(medium.id, 5.0)])
            .await?;
        self.create_item(
            container_a.id,
            &Actor::new(DEMO_USER_ID, Default::default()),
            NewItem {
                item_type_id: small.id,
                quantity: 10.0,
                note: Some("Small items".to_string()),
            },
        )
        .await?;
        self.insert_container(container_b, vec![DemandLine::new(large.id, 3.0)])
            .await?;

        info!(
            admin = %DEMO_ADMIN_ID,
            user = %DEMO_USER_ID,
            item_types = item_types.len(),
            containers = containers.len(),
            "demo inventory seeded"
        );
        Ok(DemoSeed {
            admin: DEMO_ADMIN_ID,
            user: DEMO_USER_ID,
            item_types,
            containers,
        })
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn resolve_containers(&self, ids: &[ContainerId]) -> Result<Vec<Container>, CatalogError> {
        let data = self.data.read().await;
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match data.containers.iter().find(|container| container.id == *id) {
                Some(container) => found.push(container.clone()),
                None => missing.push(*id),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(CatalogError::ContainersNotFound(missing))
        }
    }

    async fn resolve_item_types(&self, ids: &[ItemTypeId]) -> Result<Vec<ItemType>, CatalogError> {
        let data = self.data.read().await;
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match data.item_type(*id) {
                Ok(item_type) => found.push(item_type.clone()),
                Err(_) => missing.push(*id),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(CatalogError::ItemTypesNotFound(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn user() -> Actor {
        Actor::new(UserId::new(), Role::User)
    }

    async fn container_for(catalog: &InMemoryCatalog, owner: &Actor, name: &str, weight: f64) -> Container {
        catalog
            .insert_container(
                Container::new(ContainerId::new(), name, weight, 1.0, owner.id).unwrap(),
                Vec::new(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn resolve_keeps_request_order_and_reports_missing() {
        let catalog = InMemoryCatalog::new();
        let owner = user();
        let a = container_for(&catalog, &owner, "A", 10.0).await;
        let b = container_for(&catalog, &owner, "B", 10.0).await;

        let resolved = catalog.resolve_containers(&[b.id, a.id]).await.unwrap();
        assert_eq!(resolved, vec![b.clone(), a.clone()]);

        let ghost = ContainerId::new();
        let err = catalog.resolve_containers(&[a.id, ghost]).await.unwrap_err();
        assert_eq!(err, CatalogError::ContainersNotFound(vec![ghost]));
        assert_eq!(err.missing_containers(), vec![ghost]);

        let missing = ItemTypeId::new();
        let err = catalog.resolve_item_types(&[missing]).await.unwrap_err();
        assert_eq!(err.missing_item_types(), vec![missing]);
    }

    #[tokio::test]
    async fn visibility_follows_ownership() {
        let catalog = InMemoryCatalog::new();
        let alice = user();
        let bob = user();
        let admin = Actor::new(UserId::new(), Role::Admin);
        let mine = container_for(&catalog, &alice, "mine", 10.0).await;
        container_for(&catalog, &bob, "theirs", 10.0).await;

        assert_eq!(catalog.list_containers(&alice).await, vec![mine.clone()]);
        assert_eq!(catalog.list_containers(&admin).await.len(), 2);

        assert_eq!(
            catalog.container(mine.id, &bob).await,
            Err(CatalogError::Forbidden(mine.id))
        );
        let ghost = ContainerId::new();
        assert_eq!(
            catalog.container(ghost, &bob).await,
            Err(CatalogError::ContainerNotFound(ghost))
        );
        assert!(catalog.container(mine.id, &admin).await.is_ok());
    }

    #[tokio::test]
    async fn pagination_sorts_and_slices() {
        let catalog = InMemoryCatalog::new();
        let owner = user();
        for (name, weight) in [("c", 30.0), ("a", 10.0), ("b", 20.0)] {
            container_for(&catalog, &owner, name, weight).await;
        }

        let query = PageQuery {
            offset: Some(1),
            limit: Some(1),
            sort: Some("maxWeightKg".to_string()),
            dir: Some("desc".to_string()),
        };
        let page = catalog
            .list_containers_page(&owner, query.into_validated().unwrap())
            .await;
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name, "b");

        let unsorted = catalog
            .list_containers_page(&owner, PageQuery::default().into_validated().unwrap())
            .await;
        let names: Vec<_> = unsorted.data.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(unsorted.limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn page_query_bounds() {
        let too_big = PageQuery {
            limit: Some(101),
            ..PageQuery::default()
        };
        assert!(matches!(too_big.into_validated(), Err(CatalogError::InvalidPage(_))));

        let zero = PageQuery {
            limit: Some(0),
            ..PageQuery::default()
        };
        assert!(zero.into_validated().is_err());

        let bad_dir = PageQuery {
            dir: Some("sideways".to_string()),
            ..PageQuery::default()
        };
        assert!(bad_dir.into_validated().is_err());

        let unknown_sort = PageQuery {
            sort: Some("owner".to_string()),
            ..PageQuery::default()
        };
        assert_eq!(unknown_sort.into_validated().unwrap().sort, None);
    }

    #[tokio::test]
    async fn update_validates_and_replaces_items() {
        let catalog = InMemoryCatalog::new();
        let owner = user();
        let container = container_for(&catalog, &owner, "bay", 10.0).await;
        let crate_type = catalog
            .insert_item_type(ItemType::new(ItemTypeId::new(), "crate", 1.0, 0.1).unwrap())
            .await
            .unwrap();

        let patch = ContainerPatch {
            max_weight_kg: Some(-5.0),
            ..ContainerPatch::default()
        };
        assert!(matches!(
            catalog.update_container(container.id, &owner, patch).await,
            Err(CatalogError::Validation(ValidationError::InvalidWeight(_)))
        ));

        let patch = ContainerPatch {
            name: Some("renamed".to_string()),
            items: Some(vec![DemandLine::new(crate_type.id, 4.0)]),
            ..ContainerPatch::default()
        };
        let updated = catalog.update_container(container.id, &owner, patch).await.unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.max_weight_kg, 10.0);

        let items = catalog.list_items(container.id, &owner).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 4.0);
    }

    #[tokio::test]
    async fn calculate_reports_overload() {
        let catalog = InMemoryCatalog::new();
        let owner = user();
        let container = container_for(&catalog, &owner, "bay", 10.0).await;
        let heavy = catalog
            .insert_item_type(ItemType::new(ItemTypeId::new(), "anvil", 4.0, 0.25).unwrap())
            .await
            .unwrap();
        catalog
            .create_item(
                container.id,
                &owner,
                NewItem {
                    item_type_id: heavy.id,
                    quantity: 3.0,
                    note: None,
                },
            )
            .await
            .unwrap();

        let report = catalog.calculate_container(container.id, &owner).await.unwrap();
        assert_eq!(report.total_weight_kg, 12.0);
        assert_eq!(report.total_volume_m3, 0.75);
        assert!(report.weight_exceeded);
        assert!(!report.volume_exceeded);
        assert_eq!(report.utilization.weight_pct, 1.2);
        assert_eq!(report.utilization.volume_pct, 0.75);
    }

    #[tokio::test]
    async fn items_follow_container_access() {
        let catalog = InMemoryCatalog::new();
        let owner = user();
        let stranger = user();
        let container = container_for(&catalog, &owner, "bay", 10.0).await;
        let crate_type = catalog
            .insert_item_type(ItemType::new(ItemTypeId::new(), "crate", 1.0, 0.1).unwrap())
            .await
            .unwrap();

        let new_item = NewItem {
            item_type_id: crate_type.id,
            quantity: 2.0,
            note: Some("fragile".to_string()),
        };
        assert_eq!(
            catalog.create_item(container.id, &stranger, new_item.clone()).await,
            Err(CatalogError::Forbidden(container.id))
        );
        let item = catalog.create_item(container.id, &owner, new_item).await.unwrap();

        let patch = ItemPatch {
            quantity: Some(5.0),
            ..ItemPatch::default()
        };
        let updated = catalog.update_item(item.id, &owner, patch).await.unwrap();
        assert_eq!(updated.quantity, 5.0);
        assert_eq!(updated.note.as_deref(), Some("fragile"));

        let bad_type = ItemPatch {
            item_type_id: Some(ItemTypeId::new()),
            ..ItemPatch::default()
        };
        assert!(matches!(
            catalog.update_item(item.id, &owner, bad_type).await,
            Err(CatalogError::ItemTypeNotFound(_))
        ));

        assert_eq!(
            catalog.delete_item(item.id, &stranger).await,
            Err(CatalogError::Forbidden(container.id))
        );
        catalog.delete_item(item.id, &owner).await.unwrap();
        // deleting twice is fine
        catalog.delete_item(item.id, &owner).await.unwrap();
        assert!(catalog.list_items(container.id, &owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_container_cascades() {
        let catalog = InMemoryCatalog::new();
        let seed = catalog.seed_demo().await.unwrap();
        let demo = Actor::new(seed.user, Role::User);
        let first = seed.containers[0];

        assert_eq!(catalog.list_items(first, &demo).await.unwrap().len(), 2);
        catalog.delete_container(first, &demo).await.unwrap();
        assert_eq!(
            catalog.list_items(first, &demo).await,
            Err(CatalogError::ContainerNotFound(first))
        );
        assert_eq!(catalog.list_containers(&demo).await.len(), 1);
    }

    #[tokio::test]
    async fn demo_seed_matches_expected_load() {
        let catalog = InMemoryCatalog::new();
        let seed = catalog.seed_demo().await.unwrap();
        let admin = Actor::new(seed.admin, Role::Admin);

        assert_eq!(catalog.list_item_types().await.len(), 3);
        // 10 small (1 kg) + 5 medium (2 kg)
        let report = catalog.calculate_container(seed.containers[0], &admin).await.unwrap();
        assert_eq!(report.total_weight_kg, 20.0);
        assert!(!report.weight_exceeded);

        let report = catalog.calculate_container(seed.containers[1], &admin).await.unwrap();
        assert_eq!(report.total_weight_kg, 15.0);
    }
}
