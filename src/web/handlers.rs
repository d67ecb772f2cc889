use crate::address::HardwareAddress;
use crate::engine::ProtocolEngine;
use crate::web::schemas::{AclUpdate, AclView, ErrorBody, LeaseView, PolicyUpdate};
use std::convert::Infallible;
use std::sync::Arc;

use warp::http::StatusCode;
use warp::reply::{self, Json, WithStatus};

type JsonReply = WithStatus<Json>;

pub async fn leases_handler(engine: Arc<ProtocolEngine>) -> Result<impl warp::Reply, Infallible> {
    let leases: Vec<LeaseView> = engine
        .pool()
        .active_leases()
        .await
        .into_iter()
        .map(LeaseView::from)
        .collect();
    Ok(reply::json(&leases))
}

pub async fn acl_handler(engine: Arc<ProtocolEngine>) -> Result<impl warp::Reply, Infallible> {
    Ok(reply::json(&acl_view(&engine).await))
}

pub async fn policy_handler(
    update: PolicyUpdate,
    engine: Arc<ProtocolEngine>,
) -> Result<impl warp::Reply, Infallible> {
    engine.acl().set_allow_any(update.allow_any).await;
    Ok(reply::json(&acl_view(&engine).await))
}

pub async fn clear_acl_handler(engine: Arc<ProtocolEngine>) -> Result<impl warp::Reply, Infallible> {
    engine.acl().clear().await;
    Ok(reply::json(&acl_view(&engine).await))
}

pub async fn set_entry_handler(
    mac: String,
    update: AclUpdate,
    engine: Arc<ProtocolEngine>,
) -> Result<JsonReply, Infallible> {
    let mac = match mac.parse::<HardwareAddress>() {
        Ok(mac) => mac,
        Err(err) => return Ok(error_reply(StatusCode::BAD_REQUEST, err.to_string())),
    };
    engine.acl().add(mac, update.deny).await;
    Ok(reply::with_status(
        reply::json(&acl_view(&engine).await),
        StatusCode::OK,
    ))
}

pub async fn remove_entry_handler(
    mac: String,
    engine: Arc<ProtocolEngine>,
) -> Result<JsonReply, Infallible> {
    let mac = match mac.parse::<HardwareAddress>() {
        Ok(mac) => mac,
        Err(err) => return Ok(error_reply(StatusCode::BAD_REQUEST, err.to_string())),
    };
    if !engine.acl().remove(&mac).await {
        return Ok(error_reply(
            StatusCode::NOT_FOUND,
            format!("no ACL entry for {}", mac),
        ));
    }
    Ok(reply::with_status(
        reply::json(&acl_view(&engine).await),
        StatusCode::OK,
    ))
}

pub async fn reservations_handler(
    engine: Arc<ProtocolEngine>,
) -> Result<impl warp::Reply, Infallible> {
    Ok(reply::json(&engine.acl().reservations().await))
}

async fn acl_view(engine: &ProtocolEngine) -> AclView {
    AclView {
        allow_any: engine.acl().allow_any().await,
        entries: engine.acl().entries().await,
    }
}

fn error_reply(status: StatusCode, error: String) -> JsonReply {
    reply::with_status(reply::json(&ErrorBody { error }), status)
}
