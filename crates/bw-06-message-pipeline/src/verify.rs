//! # Message Verification
//!
//! Every message is verified before local delivery or persistence.
//!
//! | Step | Rejects with |
//! |------|--------------|
//! | suffix grammar, wildcard on publish/persist/list | `BadURI`, `BadOperation` |
//! | primary access chain present and resolvable | `BadPermissions`, `Unresolvable` |
//! | DOT signatures | `InvalidSig` |
//! | chain analysis (links, TTL, URI restriction) | `BadLink`, `TTLExpired`, `OverconstrainedURI`, ... |
//! | permissions for the message type on the merged URI | `BadPermissions` |
//! | origin against the chain receiver | `NoOrigin`, `OriginVKMismatch` |
//! | chain namespace | `MVKMismatch` |
//! | registry state of entities and DOTs | `RevokedEntity`, `ExpiredEntity`, `RevokedDOT`, `ExpiredDOT` |
//! | message signature under the origin | `InvalidSig` |
//! | expiry routing object | `ExpiredMessage` |
//!
//! A message from the namespace key itself needs no chain. A consume-only
//! message on a suffix with a `$` cell is let through without a valid chain
//! as long as it names its origin and its signature checks out.

use bw_01_objects::{DChain, Dot, Message, MessageType};
use bw_02_object_store::DynObjectStore;
use bw_03_resolver::Resolver;
use shared_crypto::fmt_key;
use shared_types::{
    analyze_suffix, now_millis, BwError, BwResult, StatusCode, SuffixInfo, ValidityState,
    EVERYBODY_VK,
};
use std::sync::Arc;
use tracing::{debug, trace};

fn consume_only(mtype: MessageType) -> bool {
    matches!(
        mtype,
        MessageType::Subscribe | MessageType::Query | MessageType::Tap | MessageType::TapQuery
    )
}

fn entity_state(state: ValidityState, role: &str) -> BwResult<()> {
    match state {
        ValidityState::Revoked => Err(BwError::new(
            StatusCode::RevokedEntity,
            format!("{role} entity is revoked"),
        )),
        ValidityState::Expired => Err(BwError::new(
            StatusCode::ExpiredEntity,
            format!("{role} entity has expired"),
        )),
        _ => Ok(()),
    }
}

pub struct MessageVerifier {
    resolver: Arc<Resolver>,
    store: Arc<DynObjectStore>,
}

impl MessageVerifier {
    pub fn new(resolver: Arc<Resolver>, store: Arc<DynObjectStore>) -> Self {
        Self { resolver, store }
    }

    /// Verify `m`, filling in its origin and merged suffix on success.
    pub async fn verify(&self, m: &mut Message) -> BwResult<()> {
        let info = analyze_suffix(m.suffix()).ok_or_else(|| {
            BwError::new(StatusCode::BadURI, format!("bad URI suffix {:?}", m.suffix()))
        })?;
        let mtype = m.mtype();
        if mtype.needs_concrete_topic() && info.is_wildcard() {
            return Err(BwError::new(
                StatusCode::BadOperation,
                format!("{mtype:?} cannot target a wildcard"),
            ));
        }

        let merged = if m.origin_vk() == Some(m.mvk()) {
            trace!("message from the namespace key");
            m.suffix().to_string()
        } else {
            match self.authorize(m, &info).await {
                Ok(merged) => merged,
                Err(e) if info.has_dollar && consume_only(mtype) => {
                    debug!(suffix = %m.suffix(), reason = %e, "allowing chainless access to $ path");
                    m.suffix().to_string()
                }
                Err(e) => return Err(e),
            }
        };

        let origin = *m
            .origin_vk()
            .ok_or_else(|| BwError::new(StatusCode::NoOrigin, "message names no origin"))?;
        if !m.sig_valid_for(&origin) {
            return Err(BwError::new(
                StatusCode::InvalidSig,
                format!("message signature does not verify under {}", fmt_key(&origin)),
            ));
        }
        if m.is_expired(&now_millis()) {
            return Err(BwError::from_code(StatusCode::ExpiredMessage));
        }
        m.set_merged_suffix(merged);
        Ok(())
    }

    /// Check the primary access chain; returns the merged suffix.
    async fn authorize(&self, m: &mut Message, info: &SuffixInfo) -> BwResult<String> {
        let mut pac = m.primary_access_chain().cloned().ok_or_else(|| {
            BwError::new(StatusCode::BadPermissions, "no primary access chain")
        })?;
        let inline: Vec<Arc<Dot>> = m.access_dots().cloned().collect();
        self.elaborate(&mut pac, &inline).await?;
        if !pac.check_all_sigs() {
            return Err(BwError::new(StatusCode::InvalidSig, "DOT signature invalid"));
        }

        let analysis = pac.analyze_access(m.suffix())?;
        let merged_info = analyze_suffix(&analysis.uri).unwrap_or(*info);
        let required = m.mtype().required_permissions(&merged_info);
        if !required.is_subset_of(&analysis.permissions) {
            return Err(BwError::new(
                StatusCode::BadPermissions,
                format!(
                    "chain grants {} but {:?} needs {}",
                    analysis.permissions.to_perm_string(),
                    m.mtype(),
                    required.to_perm_string()
                ),
            ));
        }

        if analysis.receiver == EVERYBODY_VK {
            if m.origin_vk().is_none() {
                return Err(BwError::new(
                    StatusCode::NoOrigin,
                    "chain ends at everybody and the message names no origin",
                ));
            }
        } else {
            match m.origin_vk() {
                Some(origin) if origin != &analysis.receiver => {
                    return Err(BwError::from_code(StatusCode::OriginVKMismatch))
                }
                Some(_) => {}
                None => m.set_origin_vk(analysis.receiver),
            }
        }
        if &analysis.mvk != m.mvk() {
            return Err(BwError::from_code(StatusCode::MVKMismatch));
        }

        self.check_states(&pac).await?;
        Ok(analysis.uri)
    }

    /// Fill in the chain's DOT hashes and DOTs from `inline`, the local
    /// store, then the registry.
    pub(crate) async fn elaborate(&self, pac: &mut DChain, inline: &[Arc<Dot>]) -> BwResult<()> {
        if !pac.is_elaborated() {
            let hash = *pac.chain_hash();
            let elaborated = match self.store.get_chain(&hash)? {
                Some(local) => Some(local),
                None => self.resolver.resolve_access_chain(&hash).await?.0,
            };
            *pac = elaborated.ok_or_else(|| {
                BwError::new(StatusCode::Unresolvable, "primary access chain unresolvable")
            })?;
        }
        for dot in inline {
            pac.augment_by(dot);
        }
        for i in 0..pac.num_hashes() {
            if pac.dot(i).is_some() {
                continue;
            }
            let Some(hash) = pac.dot_hash(i).copied() else {
                continue;
            };
            let dot = match self.store.get_dot(&hash)? {
                Some(d) => Some(d),
                None => self.resolver.resolve_dot(&hash).await?.0,
            };
            let dot = dot.ok_or_else(|| {
                BwError::new(StatusCode::Unresolvable, format!("DOT {i} of chain unresolvable"))
            })?;
            pac.set_dot(i, dot)?;
        }
        Ok(())
    }

    async fn check_states(&self, pac: &DChain) -> BwResult<()> {
        for i in 0..pac.num_hashes() {
            let (Some(hash), Some(dot)) = (pac.dot_hash(i), pac.dot(i)) else {
                return Err(BwError::from_code(StatusCode::Unresolvable));
            };
            let (_, giver) = self.resolver.resolve_entity(dot.giver()).await?;
            entity_state(giver, "granting")?;
            if dot.receiver() != &EVERYBODY_VK {
                let (_, receiver) = self.resolver.resolve_entity(dot.receiver()).await?;
                entity_state(receiver, "receiving")?;
            }
            let (_, state) = self.resolver.resolve_dot(hash).await?;
            match state {
                ValidityState::Valid => {}
                ValidityState::Revoked => return Err(BwError::from_code(StatusCode::RevokedDOT)),
                ValidityState::Expired => return Err(BwError::from_code(StatusCode::ExpiredDOT)),
                other => {
                    return Err(BwError::new(
                        StatusCode::Unresolvable,
                        format!("DOT {i} of chain is {}", other.as_str()),
                    ))
                }
            }
        }
        Ok(())
    }
}
