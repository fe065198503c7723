use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::OwnerReference,
};

use crate::consts::k8s::secret;

pub trait SecretExt {
    /// The UTF-8 value stored under `key`.
    fn data_str(&self, key: &str) -> Option<&str>;

    /// When the stored credentials expire, if recorded and well formed.
    fn expiration(&self) -> Option<DateTime<Utc>>;

    /// The generation of the declaration the secret was last synced from, if
    /// recorded and well formed.
    fn generation_marker(&self) -> Option<i64>;

    /// Whether any owner reference is set.
    fn has_owner(&self) -> bool;

    /// Whether an owner reference matches `owner` on API version, kind, UID
    /// and name.
    fn is_owned_by(&self, owner: &OwnerReference) -> bool;
}

impl SecretExt for Secret {
    fn data_str(&self, key: &str) -> Option<&str> {
        let value = self.data.as_ref()?.get(key)?;
        std::str::from_utf8(&value.0).ok()
    }

    fn expiration(&self) -> Option<DateTime<Utc>> {
        let expire = self.data_str(secret::EXPIRE_KEY)?;
        DateTime::parse_from_rfc3339(expire).ok().map(|expire| expire.with_timezone(&Utc))
    }

    fn generation_marker(&self) -> Option<i64> {
        self.data_str(secret::GENERATION_KEY)?.parse().ok()
    }

    fn has_owner(&self) -> bool {
        self.metadata.owner_references.as_ref().is_some_and(|refs| !refs.is_empty())
    }

    fn is_owned_by(&self, owner: &OwnerReference) -> bool {
        self.metadata.owner_references.iter().flatten().any(|reference| {
            reference.api_version == owner.api_version
                && reference.kind == owner.kind
                && reference.uid == owner.uid
                && reference.name == owner.name
        })
    }
}
