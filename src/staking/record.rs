//! Pure staking-record mutations
//!
//! Everything here operates on an in-memory [`StakingRecordDoc`]; the store
//! decides how the result is persisted. Keeping the mutations pure makes the
//! cross-entity invariants (global asset uniqueness, role capacity) directly
//! testable.

use serde::Deserialize;

use crate::assets::{catalog, normalize_boost, Page, Role, RoleAttributes, StakedAsset};
use crate::db::schemas::{slot_key, SlotEntry, StakingRecordDoc};
use crate::types::{LapidaryError, Result};

/// Caller-supplied stake payload
#[derive(Debug, Clone, Deserialize)]
pub struct StakeRequest {
    pub asset_id: String,
    pub template_id: String,
    pub role: Role,
    /// Power value for mine/table/worker roles
    #[serde(default)]
    pub power: Option<u32>,
    /// Boost fraction for speedboost roles
    #[serde(default)]
    pub boost: Option<f64>,
    /// Multiplier (1 + boost) accepted as an alternative to `boost`
    #[serde(default)]
    pub multiplier: Option<f64>,
}

/// Build the staked asset for a request, deriving role attributes
///
/// Gem attributes come from the template catalog; an unmapped gem template
/// is a validation error. Speedboost boost/multiplier pairs are normalized.
pub fn build_asset(request: &StakeRequest) -> Result<StakedAsset> {
    if request.asset_id.is_empty() {
        return Err(LapidaryError::Validation("asset_id must not be empty".into()));
    }

    let attributes = match request.role {
        Role::Mine | Role::Table | Role::Worker => {
            let power = request.power.ok_or_else(|| {
                LapidaryError::Validation(format!(
                    "power is required for role '{}'",
                    request.role
                ))
            })?;
            match request.role {
                Role::Mine => RoleAttributes::Mine { power },
                Role::Table => RoleAttributes::Table { power },
                _ => RoleAttributes::Worker { power },
            }
        }
        Role::Gem => {
            let (gem_type, polished) =
                catalog::gem_template(&request.template_id).ok_or_else(|| {
                    LapidaryError::Validation(format!(
                        "unknown gem template '{}'",
                        request.template_id
                    ))
                })?;
            let bonus = catalog::gem_bonus(gem_type, polished).ok_or_else(|| {
                LapidaryError::Validation(format!("no bonus entry for gem type '{}'", gem_type))
            })?;
            RoleAttributes::Gem {
                gem_type: gem_type.to_string(),
                polished,
                bonus,
            }
        }
        Role::Speedboost => {
            let (boost, multiplier) = normalize_boost(request.boost, request.multiplier);
            RoleAttributes::Speedboost { boost, multiplier }
        }
    };

    Ok(StakedAsset {
        asset_id: request.asset_id.clone(),
        template_id: request.template_id.clone(),
        attributes,
    })
}

/// Normalize a record into canonical shape
///
/// Collapses the legacy per-slot speedboost list into the single
/// maximum-boost occupant, recomputes boost/multiplier pairs, and prunes
/// empty branches.
pub fn normalize(record: &mut StakingRecordDoc) {
    for slots in [&mut record.mining, &mut record.polishing] {
        for entry in slots.values_mut() {
            normalize_slot(entry);
        }
    }
    record.prune();
}

fn normalize_slot(entry: &mut SlotEntry) {
    if !entry.speedboosts.is_empty() {
        let mut candidates: Vec<StakedAsset> = entry.speedboost.take().into_iter().collect();
        candidates.append(&mut entry.speedboosts);
        entry.speedboost = candidates.into_iter().max_by(|a, b| {
            a.attributes
                .boost()
                .partial_cmp(&b.attributes.boost())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    if let Some(ref mut sb) = entry.speedboost {
        if let RoleAttributes::Speedboost { boost, multiplier } = sb.attributes.clone() {
            let (boost, multiplier) = normalize_boost(Some(boost), Some(multiplier));
            sb.attributes = RoleAttributes::Speedboost { boost, multiplier };
        }
    }
}

/// Roles a page accepts: the base extractor differs, the rest are shared
fn role_allowed(page: Page, role: Role) -> bool {
    match role {
        Role::Mine => page == Page::Mining,
        Role::Table => page == Page::Polishing,
        Role::Worker | Role::Gem | Role::Speedboost => true,
    }
}

/// Stake an asset into a slot
///
/// Returns the displaced speedboost when the new occupant replaces one.
/// Fails on any duplicate of the asset id anywhere in the record, and on
/// singleton-role collisions within the slot.
pub fn apply_stake(
    record: &mut StakingRecordDoc,
    page: Page,
    slot_num: u32,
    asset: StakedAsset,
) -> Result<Option<StakedAsset>> {
    if slot_num < 1 || slot_num > catalog::MAX_SLOTS {
        return Err(LapidaryError::Validation(format!(
            "slot {} out of range 1..={}",
            slot_num,
            catalog::MAX_SLOTS
        )));
    }

    let role = asset.role();
    if !role_allowed(page, role) {
        return Err(LapidaryError::Validation(format!(
            "role '{}' cannot be staked on the {} page",
            role, page
        )));
    }

    if let Some((at_page, at_slot)) = record.locate_asset(&asset.asset_id) {
        return Err(LapidaryError::Conflict(format!(
            "asset {} already staked at {} slot {}",
            asset.asset_id, at_page, at_slot
        )));
    }

    let entry = record.page_mut(page).entry(slot_key(slot_num)).or_default();

    let displaced = match role {
        Role::Mine => {
            if entry.mine.is_some() {
                return Err(LapidaryError::Conflict(format!(
                    "slot {} already has a mine",
                    slot_num
                )));
            }
            entry.mine = Some(asset);
            None
        }
        Role::Table => {
            if entry.table.is_some() {
                return Err(LapidaryError::Conflict(format!(
                    "slot {} already has a table",
                    slot_num
                )));
            }
            entry.table = Some(asset);
            None
        }
        Role::Worker => {
            // Redundant with the global scan, but the per-slot duplicate is
            // its own conflict
            if entry.workers.iter().any(|w| w.asset_id == asset.asset_id) {
                return Err(LapidaryError::Conflict(format!(
                    "worker {} already in slot {}",
                    asset.asset_id, slot_num
                )));
            }
            entry.workers.push(asset);
            None
        }
        Role::Gem => {
            if entry.gem.is_some() {
                return Err(LapidaryError::Conflict(format!(
                    "slot {} already has a gem",
                    slot_num
                )));
            }
            entry.gem = Some(asset);
            None
        }
        Role::Speedboost => {
            // Speedboosts always replace; the caller audits the displacement
            normalize_slot(entry);
            let displaced = entry.speedboost.take();
            entry.speedboost = Some(asset);
            displaced
        }
    };

    Ok(displaced)
}

/// Remove an asset from a slot by exact id, pruning empty branches
pub fn apply_unstake(
    record: &mut StakingRecordDoc,
    page: Page,
    slot_num: u32,
    role: Role,
    asset_id: &str,
) -> Result<()> {
    let key = slot_key(slot_num);
    let entry = record.page_mut(page).get_mut(&key).ok_or_else(|| {
        LapidaryError::NotFound(format!("{} slot {} is not staked", page, slot_num))
    })?;

    let removed = match role {
        Role::Mine => take_if_matching(&mut entry.mine, asset_id),
        Role::Table => take_if_matching(&mut entry.table, asset_id),
        Role::Gem => take_if_matching(&mut entry.gem, asset_id),
        Role::Worker => {
            let before = entry.workers.len();
            entry.workers.retain(|w| w.asset_id != asset_id);
            entry.workers.len() != before
        }
        Role::Speedboost => {
            let direct = take_if_matching(&mut entry.speedboost, asset_id);
            if direct {
                true
            } else {
                // Legacy list fallback
                let before = entry.speedboosts.len();
                entry.speedboosts.retain(|s| s.asset_id != asset_id);
                entry.speedboosts.len() != before
            }
        }
    };

    if !removed {
        return Err(LapidaryError::NotFound(format!(
            "asset {} not staked as {} in {} slot {}",
            asset_id, role, page, slot_num
        )));
    }

    record.prune();
    Ok(())
}

fn take_if_matching(occupant: &mut Option<StakedAsset>, asset_id: &str) -> bool {
    if occupant.as_ref().is_some_and(|a| a.asset_id == asset_id) {
        *occupant = None;
        true
    } else {
        false
    }
}

/// Role an asset currently plays within a slot, if staked there
pub fn role_in_slot(entry: &SlotEntry, asset_id: &str) -> Option<Role> {
    if entry.mine.as_ref().is_some_and(|a| a.asset_id == asset_id) {
        return Some(Role::Mine);
    }
    if entry.table.as_ref().is_some_and(|a| a.asset_id == asset_id) {
        return Some(Role::Table);
    }
    if entry.workers.iter().any(|a| a.asset_id == asset_id) {
        return Some(Role::Worker);
    }
    if entry.gem.as_ref().is_some_and(|a| a.asset_id == asset_id) {
        return Some(Role::Gem);
    }
    if entry.speedboost.as_ref().is_some_and(|a| a.asset_id == asset_id)
        || entry.speedboosts.iter().any(|a| a.asset_id == asset_id)
    {
        return Some(Role::Speedboost);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mine_request(id: &str, power: u32) -> StakeRequest {
        StakeRequest {
            asset_id: id.to_string(),
            template_id: "200001".to_string(),
            role: Role::Mine,
            power: Some(power),
            boost: None,
            multiplier: None,
        }
    }

    fn worker_request(id: &str, power: u32) -> StakeRequest {
        StakeRequest {
            asset_id: id.to_string(),
            template_id: "100001".to_string(),
            role: Role::Worker,
            power: Some(power),
            boost: None,
            multiplier: None,
        }
    }

    fn speedboost_request(id: &str, boost: f64) -> StakeRequest {
        StakeRequest {
            asset_id: id.to_string(),
            template_id: "300001".to_string(),
            role: Role::Speedboost,
            power: None,
            boost: Some(boost),
            multiplier: None,
        }
    }

    fn stake(record: &mut StakingRecordDoc, page: Page, slot: u32, req: &StakeRequest) -> Result<Option<StakedAsset>> {
        apply_stake(record, page, slot, build_asset(req)?)
    }

    #[test]
    fn stake_then_unstake_restores_prior_shape() {
        let mut record = StakingRecordDoc::empty("alice");
        let before = record.clone();

        stake(&mut record, Page::Mining, 1, &mine_request("m-1", 100)).unwrap();
        assert!(record.slot(Page::Mining, 1).is_some());

        apply_unstake(&mut record, Page::Mining, 1, Role::Mine, "m-1").unwrap();
        assert_eq!(record, before);
    }

    #[test]
    fn asset_unique_across_pages_and_roles() {
        let mut record = StakingRecordDoc::empty("alice");
        stake(&mut record, Page::Mining, 1, &worker_request("w-1", 50)).unwrap();

        // Same id anywhere else is a conflict, even in another page or role
        let err = stake(&mut record, Page::Polishing, 3, &worker_request("w-1", 50)).unwrap_err();
        assert!(matches!(err, LapidaryError::Conflict(_)));

        let err = stake(&mut record, Page::Mining, 2, &mine_request("w-1", 10)).unwrap_err();
        assert!(matches!(err, LapidaryError::Conflict(_)));
    }

    #[test]
    fn singleton_roles_conflict_when_occupied() {
        let mut record = StakingRecordDoc::empty("alice");
        stake(&mut record, Page::Mining, 1, &mine_request("m-1", 100)).unwrap();

        let err = stake(&mut record, Page::Mining, 1, &mine_request("m-2", 80)).unwrap_err();
        assert!(matches!(err, LapidaryError::Conflict(_)));
    }

    #[test]
    fn workers_append_until_duplicate() {
        let mut record = StakingRecordDoc::empty("alice");
        stake(&mut record, Page::Mining, 1, &worker_request("w-1", 50)).unwrap();
        stake(&mut record, Page::Mining, 1, &worker_request("w-2", 50)).unwrap();

        let entry = record.slot(Page::Mining, 1).unwrap();
        assert_eq!(entry.workers.len(), 2);
    }

    #[test]
    fn gem_from_unknown_template_rejected() {
        let request = StakeRequest {
            asset_id: "g-1".to_string(),
            template_id: "999999".to_string(),
            role: Role::Gem,
            power: None,
            boost: None,
            multiplier: None,
        };
        let err = build_asset(&request).unwrap_err();
        assert!(matches!(err, LapidaryError::Validation(_)));
    }

    #[test]
    fn gem_attributes_derived_from_catalog() {
        let request = StakeRequest {
            asset_id: "g-1".to_string(),
            template_id: "520082".to_string(),
            role: Role::Gem,
            power: None,
            boost: None,
            multiplier: None,
        };
        let asset = build_asset(&request).unwrap();
        match asset.attributes {
            RoleAttributes::Gem { ref gem_type, polished, bonus } => {
                assert_eq!(gem_type, "ruby");
                assert!(polished);
                assert!((bonus - 0.080).abs() < 1e-9);
            }
            _ => panic!("expected gem attributes"),
        }
    }

    #[test]
    fn speedboost_replaces_and_reports_displacement() {
        let mut record = StakingRecordDoc::empty("alice");
        stake(&mut record, Page::Mining, 1, &speedboost_request("sb-1", 0.1)).unwrap();

        let displaced = stake(&mut record, Page::Mining, 1, &speedboost_request("sb-2", 0.2))
            .unwrap()
            .expect("first speedboost should be displaced");
        assert_eq!(displaced.asset_id, "sb-1");

        let entry = record.slot(Page::Mining, 1).unwrap();
        assert_eq!(entry.speedboost.as_ref().unwrap().asset_id, "sb-2");
    }

    #[test]
    fn legacy_speedboost_list_collapses_to_max() {
        let mut record = StakingRecordDoc::empty("alice");
        let entry = record.mining.entry(slot_key(1)).or_default();
        for (id, boost) in [("sb-1", 0.05), ("sb-2", 0.30), ("sb-3", 0.10)] {
            entry.speedboosts.push(StakedAsset {
                asset_id: id.to_string(),
                template_id: "300001".to_string(),
                attributes: RoleAttributes::Speedboost {
                    boost,
                    multiplier: 1.0 + boost,
                },
            });
        }

        normalize(&mut record);

        let entry = record.slot(Page::Mining, 1).unwrap();
        assert!(entry.speedboosts.is_empty());
        assert_eq!(entry.speedboost.as_ref().unwrap().asset_id, "sb-2");
    }

    #[test]
    fn unstake_missing_occupant_not_found() {
        let mut record = StakingRecordDoc::empty("alice");
        stake(&mut record, Page::Mining, 1, &mine_request("m-1", 100)).unwrap();

        let err = apply_unstake(&mut record, Page::Mining, 1, Role::Mine, "m-2").unwrap_err();
        assert!(matches!(err, LapidaryError::NotFound(_)));

        let err = apply_unstake(&mut record, Page::Mining, 2, Role::Mine, "m-1").unwrap_err();
        assert!(matches!(err, LapidaryError::NotFound(_)));
    }

    #[test]
    fn unstake_prunes_empty_branches() {
        let mut record = StakingRecordDoc::empty("alice");
        stake(&mut record, Page::Mining, 4, &worker_request("w-1", 50)).unwrap();
        apply_unstake(&mut record, Page::Mining, 4, Role::Worker, "w-1").unwrap();
        assert!(record.mining.is_empty());
    }

    #[test]
    fn table_only_on_polishing_page() {
        let mut record = StakingRecordDoc::empty("alice");
        let request = StakeRequest {
            asset_id: "t-1".to_string(),
            template_id: "210001".to_string(),
            role: Role::Table,
            power: Some(60),
            boost: None,
            multiplier: None,
        };
        let err = stake(&mut record, Page::Mining, 1, &request).unwrap_err();
        assert!(matches!(err, LapidaryError::Validation(_)));
        assert!(stake(&mut record, Page::Polishing, 1, &request).is_ok());
    }

    #[test]
    fn slot_number_bounds_checked() {
        let mut record = StakingRecordDoc::empty("alice");
        let err = stake(&mut record, Page::Mining, 0, &mine_request("m-1", 10)).unwrap_err();
        assert!(matches!(err, LapidaryError::Validation(_)));
        let err = stake(&mut record, Page::Mining, 11, &mine_request("m-1", 10)).unwrap_err();
        assert!(matches!(err, LapidaryError::Validation(_)));
    }

    #[test]
    fn role_in_slot_finds_occupants() {
        let mut record = StakingRecordDoc::empty("alice");
        stake(&mut record, Page::Mining, 1, &worker_request("w-1", 50)).unwrap();
        stake(&mut record, Page::Mining, 1, &speedboost_request("sb-1", 0.1)).unwrap();

        let entry = record.slot(Page::Mining, 1).unwrap();
        assert_eq!(role_in_slot(entry, "w-1"), Some(Role::Worker));
        assert_eq!(role_in_slot(entry, "sb-1"), Some(Role::Speedboost));
        assert_eq!(role_in_slot(entry, "zzz"), None);
    }
}
