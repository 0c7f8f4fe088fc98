// crates/portico-rpc/src/handlers/platform.rs
//
// platform.v1.PlatformService: Ping, CreateUser, GetUser, DeleteUser.
//
// Messages derive both prost (binary RPC) and serde (REST transcoding, with
// proto3-style camelCase field names).

use std::sync::Arc;

use chrono::SecondsFormat;
use prost_types::FileDescriptorProto;
use serde::{Deserialize, Serialize};
use tonic::Status;

use portico_core::{NewUser, PlatformApi};

use crate::descriptor::{HttpVerb, MethodDescriptor};
use crate::error::status_from_domain;
use crate::interceptor::CallContext;
use crate::method::MethodTable;
use crate::registry::ServiceRegistration;
use crate::schema::{field, ProtoFile};
use crate::transcode::{lenient, RestMapping};

pub const SERVICE: &str = "platform.v1.PlatformService";

pub const PING: MethodDescriptor =
    MethodDescriptor::new(SERVICE, "Ping", "platform.v1.PingRequest", "platform.v1.PingResponse")
        .with_http(HttpVerb::Get, "/ping");

pub const CREATE_USER: MethodDescriptor = MethodDescriptor::new(
    SERVICE,
    "CreateUser",
    "platform.v1.CreateUserRequest",
    "platform.v1.CreateUserResponse",
)
.with_http(HttpVerb::Post, "/users");

pub const GET_USER: MethodDescriptor = MethodDescriptor::new(
    SERVICE,
    "GetUser",
    "platform.v1.GetUserRequest",
    "platform.v1.GetUserResponse",
)
.with_http(HttpVerb::Get, "/users/{id}");

pub const DELETE_USER: MethodDescriptor = MethodDescriptor::new(
    SERVICE,
    "DeleteUser",
    "platform.v1.DeleteUserRequest",
    "platform.v1.DeleteUserResponse",
)
.with_http(HttpVerb::Delete, "/users/{id}");

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct PingRequest {}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct PingResponse {
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub message: String,
}

/// Wire form of a user. Timestamps are RFC 3339 strings.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[prost(uint64, tag = "1")]
    #[serde(default, deserialize_with = "lenient::u64")]
    pub id: u64,
    #[prost(string, tag = "2")]
    #[serde(default)]
    pub username: String,
    #[prost(string, tag = "3")]
    #[serde(default)]
    pub email: String,
    #[prost(string, tag = "4")]
    #[serde(default)]
    pub created_at: String,
    #[prost(string, tag = "5")]
    #[serde(default)]
    pub updated_at: String,
}

impl From<portico_core::User> for User {
    fn from(user: portico_core::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            updated_at: user.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct CreateUserRequest {
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub username: String,
    #[prost(string, tag = "2")]
    #[serde(default)]
    pub email: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct CreateUserResponse {
    #[prost(message, optional, tag = "1")]
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct GetUserRequest {
    #[prost(uint64, tag = "1")]
    #[serde(default, deserialize_with = "lenient::u64")]
    pub id: u64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct GetUserResponse {
    #[prost(message, optional, tag = "1")]
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct DeleteUserRequest {
    #[prost(uint64, tag = "1")]
    #[serde(default, deserialize_with = "lenient::u64")]
    pub id: u64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct DeleteUserResponse {}

/// Descriptor of `platform/v1/platform.proto`, served by reflection.
pub fn proto_file() -> FileDescriptorProto {
    ProtoFile::new("platform/v1/platform.proto", "platform.v1")
        .message("PingRequest", vec![])
        .message("PingResponse", vec![field::string("message", 1)])
        .message(
            "User",
            vec![
                field::uint64("id", 1),
                field::string("username", 2),
                field::string("email", 3),
                field::string("created_at", 4),
                field::string("updated_at", 5),
            ],
        )
        .message(
            "CreateUserRequest",
            vec![field::string("username", 1), field::string("email", 2)],
        )
        .message("CreateUserResponse", vec![field::message("user", 1, "platform.v1.User")])
        .message("GetUserRequest", vec![field::uint64("id", 1)])
        .message("GetUserResponse", vec![field::message("user", 1, "platform.v1.User")])
        .message("DeleteUserRequest", vec![field::uint64("id", 1)])
        .message("DeleteUserResponse", vec![])
        .service(&[PING, CREATE_USER, GET_USER, DELETE_USER])
        .build()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn handle_ping(api: &dyn PlatformApi, _request: PingRequest) -> Result<PingResponse, Status> {
    Ok(PingResponse { message: api.ping() })
}

pub async fn handle_create_user(
    api: &dyn PlatformApi,
    request: CreateUserRequest,
) -> Result<CreateUserResponse, Status> {
    let user = api
        .create_user(NewUser::new(request.username, request.email))
        .await
        .map_err(status_from_domain)?;
    tracing::info!(user_id = user.id, "Created user {}", user.username);
    Ok(CreateUserResponse {
        user: Some(user.into()),
    })
}

pub async fn handle_get_user(api: &dyn PlatformApi, request: GetUserRequest) -> Result<GetUserResponse, Status> {
    let user = api.get_user(request.id).await.map_err(status_from_domain)?;
    Ok(GetUserResponse {
        user: Some(user.into()),
    })
}

pub async fn handle_delete_user(
    api: &dyn PlatformApi,
    request: DeleteUserRequest,
) -> Result<DeleteUserResponse, Status> {
    api.delete_user(request.id).await.map_err(status_from_domain)?;
    tracing::info!(user_id = request.id, "Deleted user");
    Ok(DeleteUserResponse {})
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Registration attaching the four platform methods, backed by `api`.
pub fn registration(api: Arc<dyn PlatformApi>) -> ServiceRegistration {
    ServiceRegistration::new(SERVICE, move |table: &mut MethodTable| {
        table.describe(proto_file());

        let svc = Arc::clone(&api);
        table.add_unary(PING, move |_ctx: CallContext, req: PingRequest| {
            let svc = Arc::clone(&svc);
            async move { handle_ping(svc.as_ref(), req).await }
        })?;

        let svc = Arc::clone(&api);
        table.add_unary(CREATE_USER, move |_ctx: CallContext, req: CreateUserRequest| {
            let svc = Arc::clone(&svc);
            async move { handle_create_user(svc.as_ref(), req).await }
        })?;

        let svc = Arc::clone(&api);
        table.add_unary(GET_USER, move |_ctx: CallContext, req: GetUserRequest| {
            let svc = Arc::clone(&svc);
            async move { handle_get_user(svc.as_ref(), req).await }
        })?;

        let svc = Arc::clone(&api);
        table.add_unary(DELETE_USER, move |_ctx: CallContext, req: DeleteUserRequest| {
            let svc = Arc::clone(&svc);
            async move { handle_delete_user(svc.as_ref(), req).await }
        })?;

        Ok(())
    })
}

/// REST bindings for the platform methods.
pub fn rest_mappings() -> Vec<RestMapping> {
    vec![
        RestMapping::unary::<PingRequest, PingResponse>(PING),
        RestMapping::unary::<CreateUserRequest, CreateUserResponse>(CREATE_USER),
        RestMapping::unary::<GetUserRequest, GetUserResponse>(GET_USER),
        RestMapping::unary::<DeleteUserRequest, DeleteUserResponse>(DELETE_USER),
    ]
}
