//! Wholesale synchronization of remote key value maps.
//!
//! The management endpoint has no update primitive, so a map is always
//! replaced as a whole: delete the remote map (absent maps delete
//! successfully), then create it again with the full entry list. A failure
//! between the two calls leaves the map absent; no compensation is
//! attempted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::client::{Gateway, RemoteCallError};
use crate::manifest::MapValues;

/// Errors that can occur while synchronizing key value maps.
#[derive(Debug, Error)]
pub enum MapSyncError {
  /// The delete or create call for a map failed.
  #[error("unable to synchronize map '{name}'")]
  Synchronize {
    name: String,
    #[source]
    source: RemoteCallError,
  },
}

/// One entry of a remote key value map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
  pub name: String,
  pub map_name: String,
  pub value: String,
}

/// Wire payload for creating a map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapPayload {
  pub name: String,
  #[serde(rename = "keyMapEntryValues")]
  pub entries: Vec<MapEntry>,
}

impl MapPayload {
  pub fn new(name: &str, values: &MapValues) -> Self {
    Self {
      name: name.to_string(),
      entries: to_entries(name, values),
    }
  }
}

/// Convert a flat key/value object into the remote entry representation.
///
/// String values pass through unchanged; anything else becomes its JSON
/// text.
pub fn to_entries(map_name: &str, values: &MapValues) -> Vec<MapEntry> {
  values
    .iter()
    .map(|(key, value)| MapEntry {
      name: key.clone(),
      map_name: map_name.to_string(),
      value: match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
      },
    })
    .collect()
}

/// Replace the remote map `name` with the given values.
pub async fn synchronize<G>(client: &G, name: &str, values: &MapValues) -> Result<(), MapSyncError>
where
  G: Gateway + ?Sized,
{
  let payload = MapPayload::new(name, values);
  let result = async {
    client.delete_map(name).await?;
    client.create_map(name, &payload).await
  }
  .await;

  match result {
    Ok(()) => {
      info!(map = name, "synchronized key value map");
      Ok(())
    }
    Err(source) => {
      error!(map = name, "unable to synchronize key value map");
      Err(MapSyncError::Synchronize {
        name: name.to_string(),
        source,
      })
    }
  }
}

/// Synchronize every named map concurrently.
///
/// Independent maps have no ordering dependency, so all synchronizations
/// run at once. All of them are allowed to finish; the first observed
/// failure is the one reported.
pub async fn synchronize_all<G>(
  client: &G,
  maps: &BTreeMap<String, MapValues>,
) -> Result<(), MapSyncError>
where
  G: Gateway + Clone + 'static,
{
  let mut join_set = JoinSet::new();

  for (name, values) in maps {
    let client = client.clone();
    let name = name.clone();
    let values = values.clone();
    join_set.spawn(async move { synchronize(&client, &name, &values).await });
  }

  let mut first_error = None;
  while let Some(join_result) = join_set.join_next().await {
    match join_result {
      Ok(Ok(())) => {}
      Ok(Err(e)) => {
        if first_error.is_none() {
          first_error = Some(e);
        }
      }
      Err(e) => {
        error!(error = %e, "map synchronization task panicked");
      }
    }
  }

  match first_error {
    Some(e) => Err(e),
    None => Ok(()),
  }
}
