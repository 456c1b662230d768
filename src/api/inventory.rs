//! Inventory endpoints: item types, containers and stored items.
//!
//! Every endpoint requires an actor. Containers (and the items inside them)
//! are visible to their owner and to admins; a missing record is reported
//! before a foreign one.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use super::{ApiError, ApiState, CurrentActor, ErrorResponse};
use crate::allocator::DemandLine;
use crate::catalog::{
    ContainerPatch, ContainerUtilization, ItemPatch, NewItem, Page, PageQuery,
};
use crate::model::{Container, ContainerId, ItemId, ItemType, ItemTypeId, StoredItem, UserId, ValidationError};

/// Payload to create an item type.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemTypeRequest {
    pub name: String,
    pub unit_weight_kg: f64,
    pub unit_volume_m3: f64,
    #[serde(default)]
    pub length_m: Option<f64>,
    #[serde(default)]
    pub width_m: Option<f64>,
    #[serde(default)]
    pub height_m: Option<f64>,
}

impl CreateItemTypeRequest {
    fn into_validated(self) -> Result<ItemType, ValidationError> {
        ItemType::new(ItemTypeId::new(), self.name, self.unit_weight_kg, self.unit_volume_m3)?
            .with_dimensions(self.length_m, self.width_m, self.height_m)
    }
}

/// Payload to create a container owned by the caller.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateContainerRequest {
    pub name: String,
    pub max_weight_kg: f64,
    pub max_volume_m3: f64,
    /// Items stored right away
    #[serde(default)]
    pub items: Vec<DemandLine>,
}

impl CreateContainerRequest {
    fn into_validated(self, owner: UserId) -> Result<(Container, Vec<DemandLine>), ValidationError> {
        let container = Container::new(
            ContainerId::new(),
            self.name,
            self.max_weight_kg,
            self.max_volume_m3,
            owner,
        )?;
        Ok((container, self.items))
    }
}

// ----- item types -----

#[utoipa::path(
    get,
    path = "/item-types",
    responses(
        (status = 200, description = "All item types", body = [ItemType]),
        (status = UNAUTHORIZED, description = "Missing or malformed actor headers", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn list_item_types(
    State(state): State<ApiState>,
    CurrentActor(_actor): CurrentActor,
) -> Json<Vec<ItemType>> {
    Json(state.catalog.list_item_types().await)
}

#[utoipa::path(
    post,
    path = "/item-types",
    request_body = CreateItemTypeRequest,
    responses(
        (status = 201, description = "Item type created", body = ItemType),
        (status = BAD_REQUEST, description = "Invalid values", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Malformed JSON", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn create_item_type(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<CreateItemTypeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ItemType>), ApiError> {
    let Json(payload) = payload?;
    let item_type = state.catalog.insert_item_type(payload.into_validated()?).await?;
    info!(actor = %actor.id, item_type = %item_type.id, "item type created via api");
    Ok((StatusCode::CREATED, Json(item_type)))
}

#[utoipa::path(
    get,
    path = "/item-types/{id}",
    params(("id" = ItemTypeId, Path, description = "Item type id")),
    responses(
        (status = 200, description = "Item type", body = ItemType),
        (status = NOT_FOUND, description = "Unknown id", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn get_item_type(
    State(state): State<ApiState>,
    CurrentActor(_actor): CurrentActor,
    path: Result<Path<ItemTypeId>, PathRejection>,
) -> Result<Json<ItemType>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.catalog.item_type(id).await?))
}

// ----- containers -----

#[utoipa::path(
    get,
    path = "/containers",
    responses(
        (status = 200, description = "Containers visible to the caller", body = [Container]),
        (status = UNAUTHORIZED, description = "Missing or malformed actor headers", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn list_containers(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
) -> Json<Vec<Container>> {
    Json(state.catalog.list_containers(&actor).await)
}

#[utoipa::path(
    get,
    path = "/containers/page",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of visible containers", body = Page<Container>),
        (status = BAD_REQUEST, description = "Invalid paging parameters", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn list_containers_page(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Page<Container>>, ApiError> {
    let Query(query) = query?;
    let page = query.into_validated()?;
    Ok(Json(state.catalog.list_containers_page(&actor, page).await))
}

#[utoipa::path(
    post,
    path = "/containers",
    request_body = CreateContainerRequest,
    responses(
        (status = 201, description = "Container created", body = Container),
        (status = BAD_REQUEST, description = "Invalid values", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown item type in initial items", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn create_container(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<CreateContainerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Container>), ApiError> {
    let Json(payload) = payload?;
    let (container, items) = payload.into_validated(actor.id)?;
    let container = state.catalog.insert_container(container, items).await?;
    Ok((StatusCode::CREATED, Json(container)))
}

#[utoipa::path(
    get,
    path = "/containers/{id}",
    params(("id" = ContainerId, Path, description = "Container id")),
    responses(
        (status = 200, description = "Container", body = Container),
        (status = FORBIDDEN, description = "Not your container", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown id", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn get_container(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    path: Result<Path<ContainerId>, PathRejection>,
) -> Result<Json<Container>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.catalog.container(id, &actor).await?))
}

#[utoipa::path(
    patch,
    path = "/containers/{id}",
    params(("id" = ContainerId, Path, description = "Container id")),
    request_body = ContainerPatch,
    responses(
        (status = 200, description = "Updated container", body = Container),
        (status = BAD_REQUEST, description = "Invalid values", body = ErrorResponse),
        (status = FORBIDDEN, description = "Not your container", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown id", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn update_container(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    path: Result<Path<ContainerId>, PathRejection>,
    payload: Result<Json<ContainerPatch>, JsonRejection>,
) -> Result<Json<Container>, ApiError> {
    let Path(id) = path?;
    let Json(patch) = payload?;
    Ok(Json(state.catalog.update_container(id, &actor, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/containers/{id}",
    params(("id" = ContainerId, Path, description = "Container id")),
    responses(
        (status = 204, description = "Container and its items deleted"),
        (status = FORBIDDEN, description = "Not your container", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown id", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn delete_container(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    path: Result<Path<ContainerId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    state.catalog.delete_container(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/containers/{id}/calculate",
    params(("id" = ContainerId, Path, description = "Container id")),
    responses(
        (status = 200, description = "Current utilization", body = ContainerUtilization),
        (status = FORBIDDEN, description = "Not your container", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown id", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn calculate_container(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    path: Result<Path<ContainerId>, PathRejection>,
) -> Result<Json<ContainerUtilization>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.catalog.calculate_container(id, &actor).await?))
}

// ----- stored items -----

#[utoipa::path(
    get,
    path = "/containers/{id}/items",
    params(("id" = ContainerId, Path, description = "Container id")),
    responses(
        (status = 200, description = "Items stored in the container", body = [StoredItem]),
        (status = FORBIDDEN, description = "Not your container", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown id", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn list_items(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    path: Result<Path<ContainerId>, PathRejection>,
) -> Result<Json<Vec<StoredItem>>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.catalog.list_items(id, &actor).await?))
}

#[utoipa::path(
    post,
    path = "/containers/{id}/items",
    params(("id" = ContainerId, Path, description = "Container id")),
    request_body = NewItem,
    responses(
        (status = 201, description = "Item stored", body = StoredItem),
        (status = BAD_REQUEST, description = "Invalid quantity", body = ErrorResponse),
        (status = FORBIDDEN, description = "Not your container", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown container or item type", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn create_item(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    path: Result<Path<ContainerId>, PathRejection>,
    payload: Result<Json<NewItem>, JsonRejection>,
) -> Result<(StatusCode, Json<StoredItem>), ApiError> {
    let Path(id) = path?;
    let Json(new_item) = payload?;
    let item = state.catalog.create_item(id, &actor, new_item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[utoipa::path(
    patch,
    path = "/items/{id}",
    params(("id" = ItemId, Path, description = "Item id")),
    request_body = ItemPatch,
    responses(
        (status = 200, description = "Updated item", body = StoredItem),
        (status = BAD_REQUEST, description = "Invalid quantity", body = ErrorResponse),
        (status = FORBIDDEN, description = "Not your container", body = ErrorResponse),
        (status = NOT_FOUND, description = "Unknown item or item type", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn update_item(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    path: Result<Path<ItemId>, PathRejection>,
    payload: Result<Json<ItemPatch>, JsonRejection>,
) -> Result<Json<StoredItem>, ApiError> {
    let Path(id) = path?;
    let Json(patch) = payload?;
    Ok(Json(state.catalog.update_item(id, &actor, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/items/{id}",
    params(("id" = ItemId, Path, description = "Item id")),
    responses(
        (status = 204, description = "Item deleted (or already gone)"),
        (status = FORBIDDEN, description = "Not your container", body = ErrorResponse)
    ),
    tag = "inventory"
)]
pub(super) async fn delete_item(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    path: Result<Path<ItemId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    state.catalog.delete_item(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}
