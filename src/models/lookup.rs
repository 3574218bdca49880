use serde::{Deserialize, Serialize};

use super::{from_fields, to_fields, LOOKUP_TABLE};
use crate::db::{StoreResult, StoredEntity, VersionToken};

// ==================== LOOKUP ====================
/// `(group, name) -> (game, owner)` row, partitioned by group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupEntry {
    pub group: String,
    pub name: String,
    pub game_id: String,
    pub owner_id: String,
    #[serde(skip)]
    pub version: Option<VersionToken>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupRow {
    game_id: String,
    owner_id: String,
}

impl LookupEntry {
    pub fn to_entity(&self) -> StoreResult<StoredEntity> {
        let row = LookupRow {
            game_id: self.game_id.clone(),
            owner_id: self.owner_id.clone(),
        };
        let mut entity = StoredEntity::new(LOOKUP_TABLE, &self.group, &self.name, to_fields(&row)?);
        entity.version = self.version.clone();
        Ok(entity)
    }

    pub fn from_entity(entity: &StoredEntity) -> StoreResult<Self> {
        let row: LookupRow = from_fields(&entity.fields)?;
        Ok(Self {
            group: entity.partition_key.clone(),
            name: entity.row_key.clone(),
            game_id: row.game_id,
            owner_id: row.owner_id,
            version: entity.version.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_row_is_partitioned_by_group() {
        let entry = LookupEntry {
            group: "uk".to_string(),
            name: "cup-final".to_string(),
            game_id: "g1".to_string(),
            owner_id: "o1".to_string(),
            version: None,
        };
        let entity = entry.to_entity().unwrap();
        assert_eq!(entity.table, "Lookup");
        assert_eq!(entity.partition_key, "uk");
        assert_eq!(entity.row_key, "cup-final");
        assert_eq!(LookupEntry::from_entity(&entity).unwrap(), entry);
    }
}
