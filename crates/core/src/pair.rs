use serde::{Deserialize, Serialize};

/// Durable id of a (connector, credential) binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CcPairId(pub i64);

impl std::fmt::Display for CcPairId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Id of an embedding/search configuration. Two configurations may index
/// the same CC-pair concurrently during a model migration, so indexing
/// fences carry this in their key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchConfigId(pub i64);

impl std::fmt::Display for SearchConfigId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Lifecycle status of a CC-pair, owned by the control plane. The sync
/// core only reads it to decide which passes a pair is eligible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CcPairStatus {
  Active,
  Paused,
  Deleting,
}

/// A connector-credential pair as the sync core sees it: an immutable key
/// plus a status snapshot taken at scan time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorCredentialPair {
  pub id: CcPairId,
  pub connector_id: i64,
  pub credential_id: i64,
  pub status: CcPairStatus,
  /// External group/permission sync requested for this pair
  pub permission_sync_enabled: bool,
}

impl ConnectorCredentialPair {
  pub fn new(id: i64, connector_id: i64, credential_id: i64, status: CcPairStatus) -> Self {
    Self {
      id: CcPairId(id),
      connector_id,
      credential_id,
      status,
      permission_sync_enabled: false,
    }
  }
}

/// The three sync passes that share the fence protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
  Deletion,
  Indexing,
  PermissionSync,
}

impl SyncKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      SyncKind::Deletion => "deletion",
      SyncKind::Indexing => "indexing",
      SyncKind::PermissionSync => "permission_sync",
    }
  }
}

impl std::fmt::Display for SyncKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
