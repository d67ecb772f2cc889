pub mod handlers;
pub mod schemas;

use crate::engine::ProtocolEngine;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use warp::Filter;

const MAX_BODY: u64 = 4 * 1024;

/// Every route of the admin API.
pub fn filters(
    engine: Arc<ProtocolEngine>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let leases = warp::path!("leases")
        .and(warp::get())
        .and(with_engine(engine.clone()))
        .and_then(handlers::leases_handler);

    let acl = warp::path!("acl")
        .and(warp::get())
        .and(with_engine(engine.clone()))
        .and_then(handlers::acl_handler);

    let policy = warp::path!("acl")
        .and(warp::put())
        .and(json_body())
        .and(with_engine(engine.clone()))
        .and_then(handlers::policy_handler);

    let clear = warp::path!("acl")
        .and(warp::delete())
        .and(with_engine(engine.clone()))
        .and_then(handlers::clear_acl_handler);

    let set_entry = warp::path!("acl" / String)
        .and(warp::put())
        .and(json_body())
        .and(with_engine(engine.clone()))
        .and_then(handlers::set_entry_handler);

    let remove_entry = warp::path!("acl" / String)
        .and(warp::delete())
        .and(with_engine(engine.clone()))
        .and_then(handlers::remove_entry_handler);

    let reservations = warp::path!("reservations")
        .and(warp::get())
        .and(with_engine(engine))
        .and_then(handlers::reservations_handler);

    leases
        .or(acl)
        .or(policy)
        .or(clear)
        .or(set_entry)
        .or(remove_entry)
        .or(reservations)
}

/// Bind the admin API and run it until `shutdown` resolves.
pub fn serve<F>(
    address: SocketAddr,
    engine: Arc<ProtocolEngine>,
    shutdown: F,
    logger: &slog::Logger,
) -> Result<tokio::task::JoinHandle<()>, warp::Error>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let (bound, server) =
        warp::serve(filters(engine)).try_bind_with_graceful_shutdown(address, shutdown)?;
    info!(logger, "Admin API listening"; "address" => %bound);
    Ok(tokio::spawn(server))
}

fn with_engine(
    engine: Arc<ProtocolEngine>,
) -> impl Filter<Extract = (Arc<ProtocolEngine>,), Error = Infallible> + Clone {
    warp::any().map(move || engine.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY).and(warp::body::json())
}
