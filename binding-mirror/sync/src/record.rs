//! Recovery records: the last-synced body of each role binding.

use anyhow::Result;
use binding_mirror_k8s_api::RoleBinding;
use binding_mirror_store::RecoveryStore;
use tracing::warn;

pub(crate) async fn save<S>(store: &S, key: &str, binding: &RoleBinding) -> Result<()>
where
    S: RecoveryStore + ?Sized,
{
    let value = serde_json::to_vec(binding)?;
    store.put(key, value).await?;
    Ok(())
}

/// Reads the record for `key`. A record that cannot be decoded is removed
/// and reported as absent.
pub(crate) async fn load<S>(store: &S, key: &str) -> Result<Option<RoleBinding>>
where
    S: RecoveryStore + ?Sized,
{
    let Some(bytes) = store.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(binding) => Ok(Some(binding)),
        Err(error) => {
            warn!(%key, %error, "Discarding unreadable recovery record");
            if let Err(error) = store.delete(key).await {
                warn!(%key, %error, "Failed to remove unreadable recovery record");
            }
            Ok(None)
        }
    }
}
