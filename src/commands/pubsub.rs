//! Pub/sub commands (spec §4.10): subscribe-family commands talk
//! directly to the connection's outbound sender (through
//! [`crate::pubsub::PubSub`]) rather than returning a single `Reply`,
//! since they emit one frame per channel; `PUBLISH`/`PUBSUB` are
//! ordinary request/reply commands.

use super::Args;
use crate::connection::ConnectionId;
use crate::engine::Engine;
use crate::error::CommandError;
use crate::reply::Reply;

pub fn subscribe(engine: &mut Engine, id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let channels = args.rest();
    let subscriber = engine.connections.get(&id).map(crate::connection::Connection::subscriber);
    let Some(subscriber) = subscriber else {
        return Ok(Reply::ok());
    };
    for channel in channels {
        engine.pubsub.subscribe(channel.clone(), &subscriber);
        if let Some(connection) = engine.connections.get_mut(&id) {
            connection.channels.insert(channel);
        }
    }
    // Each frame was already pushed directly to the connection's sender;
    // dispatch still needs a reply value, so this becomes a no-op status
    // the server shell discards in favor of the pushed frames.
    Ok(Reply::Status("OK"))
}

pub fn psubscribe(engine: &mut Engine, id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let patterns = args.rest();
    let subscriber = engine.connections.get(&id).map(crate::connection::Connection::subscriber);
    let Some(subscriber) = subscriber else {
        return Ok(Reply::ok());
    };
    for pattern in patterns {
        engine.pubsub.psubscribe(pattern.clone(), &subscriber);
        if let Some(connection) = engine.connections.get_mut(&id) {
            connection.patterns.insert(pattern);
        }
    }
    Ok(Reply::Status("OK"))
}

pub fn unsubscribe(engine: &mut Engine, id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let channels = args.rest();
    let subscriber = engine.connections.get(&id).map(crate::connection::Connection::subscriber);
    let Some(subscriber) = subscriber else {
        return Ok(Reply::ok());
    };
    engine.pubsub.unsubscribe(&channels, &subscriber);
    if let Some(connection) = engine.connections.get_mut(&id) {
        if channels.is_empty() {
            connection.channels.clear();
        } else {
            for channel in &channels {
                connection.channels.remove(channel);
            }
        }
    }
    Ok(Reply::Status("OK"))
}

pub fn punsubscribe(engine: &mut Engine, id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let patterns = args.rest();
    let subscriber = engine.connections.get(&id).map(crate::connection::Connection::subscriber);
    let Some(subscriber) = subscriber else {
        return Ok(Reply::ok());
    };
    engine.pubsub.punsubscribe(&patterns, &subscriber);
    if let Some(connection) = engine.connections.get_mut(&id) {
        if patterns.is_empty() {
            connection.patterns.clear();
        } else {
            for pattern in &patterns {
                connection.patterns.remove(pattern);
            }
        }
    }
    Ok(Reply::Status("OK"))
}

pub fn publish(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let channel = args.pop()?;
    let message = args.pop()?;
    let delivered = engine.pubsub.publish(&channel, &message);
    Ok(Reply::from(delivered))
}

pub fn pubsub(engine: &mut Engine, _id: ConnectionId, mut args: Args) -> Result<Reply, CommandError> {
    let sub = args.pop()?;
    if Args::eq_ignore_case(&sub, "CHANNELS") {
        let pattern = args.try_pop();
        let channels = engine.pubsub.channels_matching(pattern.as_deref());
        Ok(Reply::from(channels))
    } else if Args::eq_ignore_case(&sub, "NUMSUB") {
        let mut items = Vec::new();
        for channel in args.rest() {
            let count = engine.pubsub.numsub(&channel);
            items.push(Reply::bulk(channel));
            items.push(Reply::from(count));
        }
        Ok(Reply::Array(items))
    } else if Args::eq_ignore_case(&sub, "NUMPAT") {
        Ok(Reply::from(engine.pubsub.numpat()))
    } else {
        Err(CommandError::UnknownSubcommand(
            String::from_utf8_lossy(&sub).into_owned(),
            "PUBSUB".to_owned(),
        ))
    }
}
