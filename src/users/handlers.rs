use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    state::AppState,
    users::{
        dto::{
            BulkCreateRequest, BulkReport, CreateUserRequest, Envelope, FindUsersQuery,
            UpdateUserRequest,
        },
        error::UserResult,
        extract::{JsonBody, PathParam, QueryParams},
        repo_types::User,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/getAllUsers", get(get_all_users))
        .route("/users/findUsers", get(find_users))
        .route("/users/bulkCreate", post(bulk_create_users))
        .route(
            "/users/:id",
            get(get_user)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> UserResult<Envelope<String>> {
    state.directory.create_user(payload).await
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> UserResult<Envelope<Option<User>>> {
    state.directory.get_user_by_id(id).await
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> UserResult<Envelope<String>> {
    state.directory.update_user(id, payload).await
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> UserResult<Envelope<String>> {
    state.directory.delete_user(id).await
}

#[instrument(skip(state))]
pub async fn get_all_users(State(state): State<AppState>) -> UserResult<Envelope<Vec<User>>> {
    state.directory.get_all_users().await
}

#[instrument(skip(state, query))]
pub async fn find_users(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<FindUsersQuery>,
) -> UserResult<Envelope<Vec<User>>> {
    state.directory.find_users(query).await
}

#[instrument(skip(state, payload), fields(entries = payload.users.len()))]
pub async fn bulk_create_users(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<BulkCreateRequest>,
) -> Envelope<BulkReport> {
    state.directory.bulk_create_users(payload).await
}
