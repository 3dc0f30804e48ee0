//! Per-connection command dispatch.
//!
//! A `Session` owns one client handle and the sending half of the
//! connection's outbound queue. All frames leave through that queue, so a
//! single writer task serialises the connection.

use crate::domain::{Command, Frame};
use bw_01_objects::{
    ronum, DChain, Dot, Entity, Message, PayloadObject, Revocation, RoutingObject,
    UniqueMessageId,
};
use bw_03_resolver::parse_short_alias;
use bw_05_terminus::SubscriptionStream;
use bw_06_message_pipeline::{
    BcipUpdate, BosswaveClient, BuildChainParams, CreateDotParams, CreateEntityParams,
    ElaboratePac, MessageRequest,
};
use parking_lot::Mutex;
use shared_crypto::{fmt_hash, fmt_key, unfmt_hash};
use shared_types::{
    from_millis, BwError, BwResult, Hash32, StatusCode, Timestamp, Vk, PO_ACCESS_CHAIN,
    PO_ACCESS_DOT, PO_ENTITY_WITH_KEY, PO_MESSAGE, PO_REVOCATION,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

fn malformed(msg: impl Into<String>) -> BwError {
    BwError::new(StatusCode::MalformedOOBCommand, msg)
}

fn okay(seqno: u32) -> Frame {
    Frame::new(Command::Response, seqno).header("status", "okay")
}

fn done(frame: Frame) -> Frame {
    frame.header("finished", "true")
}

fn finished_result(seqno: u32) -> Frame {
    done(Frame::new(Command::Result, seqno))
}

/// Error response for a failed command.
pub fn error_frame(seqno: u32, err: &BwError) -> Frame {
    Frame::new(Command::Response, seqno)
        .header("status", "error")
        .header("code", err.code.code().to_string())
        .header("reason", err.message.clone())
        .header("finished", "true")
}

/// One `rslt` carrying a delivered message. Unpacked results expose the
/// origin, URI, routing and payload objects; packed ones carry the whole
/// signed message.
pub fn message_result(seqno: u32, m: &Message, unpack: bool) -> Frame {
    let mut r = Frame::new(Command::Result, seqno);
    if unpack {
        if let Some(origin) = m.origin_vk() {
            r.add_header("from", fmt_key(origin));
        }
        r.add_header("uri", format!("{}/{}", fmt_key(m.mvk()), m.suffix()));
        for ro in m.routing_objects() {
            r.add_routing_object(ro);
        }
        for po in m.payload_objects() {
            r.add_payload_object(po.clone());
        }
    } else {
        r.add_payload_object(PayloadObject::new(PO_MESSAGE, m.encoded().to_vec()));
    }
    r
}

fn pad32(bytes: &[u8]) -> BwResult<[u8; 32]> {
    if bytes.len() > 32 {
        return Err(BwError::new(
            StatusCode::AliasError,
            format!("alias value is {} bytes, max 32", bytes.len()),
        ));
    }
    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn parse_hash(text: &str) -> BwResult<Hash32> {
    unfmt_hash(text).map_err(|_| malformed(format!("bad hash {text:?}")))
}

fn parse_expiry(frame: &Frame) -> BwResult<Option<Timestamp>> {
    frame
        .text("expiry")?
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|t| from_millis(t.timestamp_millis()))
                .map_err(|_| malformed(format!("expiry {s:?} is not RFC 3339")))
        })
        .transpose()
}

pub struct Session {
    client: BosswaveClient,
    out: mpsc::Sender<Frame>,
    dispatchers: Mutex<HashMap<UniqueMessageId, JoinHandle<()>>>,
}

impl Session {
    pub fn new(client: BosswaveClient, out: mpsc::Sender<Frame>) -> Arc<Self> {
        Arc::new(Self {
            client,
            out,
            dispatchers: Mutex::new(HashMap::new()),
        })
    }

    pub fn client(&self) -> &BosswaveClient {
        &self.client
    }

    /// Dispatch one inbound frame. Commands that wait on the registry run
    /// on their own task so the read loop keeps going.
    pub async fn handle(self: &Arc<Self>, frame: Frame) {
        let Some(cmd) = frame.command() else {
            warn!(client = %self.client.id(), cmd = %frame.cmd, "unknown command");
            let err = BwError::new(
                StatusCode::InvalidOOBCommand,
                format!("unknown command {:?}", frame.cmd),
            );
            self.send(error_frame(frame.seqno, &err)).await;
            return;
        };
        trace!(client = %self.client.id(), %cmd, seqno = frame.seqno, "command");

        if cmd.waits_on_registry() {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run(cmd, frame).await });
        } else {
            self.run(cmd, frame).await;
        }
    }

    async fn run(self: &Arc<Self>, cmd: Command, frame: Frame) {
        if let Err(e) = self.execute(cmd, &frame).await {
            warn!(
                client = %self.client.id(),
                %cmd,
                code = e.code.code(),
                error = %e.message,
                "command failed"
            );
            self.send(error_frame(frame.seqno, &e)).await;
        }
    }

    async fn send(&self, frame: Frame) {
        if self.out.send(frame).await.is_err() {
            trace!(client = %self.client.id(), "connection writer gone");
        }
    }

    /// Drop every subscription and stop the dispatchers.
    pub fn close(&self) {
        self.client.destroy();
        for (_, handle) in self.dispatchers.lock().drain() {
            handle.abort();
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    async fn execute(self: &Arc<Self>, cmd: Command, f: &Frame) -> BwResult<()> {
        let seq = f.seqno;
        match cmd {
            Command::Hello | Command::Response | Command::Result => Err(BwError::new(
                StatusCode::InvalidOOBCommand,
                format!("{cmd} is router-originated"),
            )),

            // ---------------------------------------------------------------
            // Messaging
            // ---------------------------------------------------------------
            Command::Publish | Command::Persist => {
                let req = self.message_request(f).await?;
                self.client.publish(req, cmd == Command::Persist).await?;
                self.send(done(okay(seq))).await;
                Ok(())
            }
            Command::Subscribe | Command::TapSubscribe => {
                let unpack = f.flag("unpack", false)?;
                let req = self.message_request(f).await?;
                let outcome = self
                    .client
                    .subscribe(req, cmd == Command::TapSubscribe)
                    .await?;
                self.send(
                    okay(seq)
                        .header("handle", outcome.umid.to_string())
                        .header("duplicate", outcome.duplicate.to_string())
                        .header("finished", "false"),
                )
                .await;
                match outcome.stream {
                    Some(stream) => self.spawn_dispatcher(seq, stream, unpack),
                    // Deliveries stay on the original seqno.
                    None => self.send(finished_result(seq)).await,
                }
                Ok(())
            }
            Command::Query | Command::TapQuery => {
                let unpack = f.flag("unpack", false)?;
                let req = self.message_request(f).await?;
                let results = self.client.query(req, cmd == Command::TapQuery).await?;
                self.send(okay(seq).header("finished", "false")).await;
                for m in &results {
                    self.send(message_result(seq, m, unpack)).await;
                }
                self.send(finished_result(seq)).await;
                Ok(())
            }
            Command::List => {
                let req = self.message_request(f).await?;
                let children = self.client.list(req).await?;
                self.send(okay(seq).header("finished", "false")).await;
                for child in children {
                    self.send(Frame::new(Command::Result, seq).header("child", child))
                        .await;
                }
                self.send(finished_result(seq)).await;
                Ok(())
            }
            Command::Unsubscribe => {
                let umid = UniqueMessageId::from_str(f.require_text("handle")?)?;
                self.client.unsubscribe(&umid)?;
                // The dispatcher drains and emits the final rslt itself.
                self.dispatchers.lock().remove(&umid);
                self.send(done(okay(seq))).await;
                Ok(())
            }

            // ---------------------------------------------------------------
            // Local object creation
            // ---------------------------------------------------------------
            Command::MakeEntity => {
                let entity = self.client.create_entity(CreateEntityParams {
                    expiry: parse_expiry(f)?,
                    expiry_delta: f.duration("expirydelta")?,
                    contact: f.text("contact")?.unwrap_or_default().to_string(),
                    comment: f.text("comment")?.unwrap_or_default().to_string(),
                    revokers: self.revokers(f).await?,
                    omit_creation_date: f.flag("omitcreationdate", false)?,
                })?;
                let blob = entity.signing_blob().ok_or_else(|| {
                    BwError::new(StatusCode::InvalidEntity, "created entity has no key")
                })?;
                let mut r = okay(seq).header("vk", fmt_key(entity.vk()));
                r.add_payload_object(PayloadObject::new(PO_ENTITY_WITH_KEY, blob));
                self.send(done(r)).await;
                Ok(())
            }
            Command::MakeDot => {
                if f.flag("ispermission", false)? {
                    return Err(BwError::new(
                        StatusCode::BadOperation,
                        "permission DOTs are not supported",
                    ));
                }
                let (mvk, suffix) = self.load_uri(f).await?;
                let to = self.key(f.require_text("to")?).await?;
                let dot = self
                    .client
                    .create_dot(CreateDotParams {
                        is_permission: false,
                        to,
                        ttl: f.number("ttl")?.unwrap_or(0),
                        expiry: parse_expiry(f)?,
                        expiry_delta: f.duration("expirydelta")?,
                        contact: f.text("contact")?.unwrap_or_default().to_string(),
                        comment: f.text("comment")?.unwrap_or_default().to_string(),
                        revokers: self.revokers(f).await?,
                        omit_creation_date: f.flag("omitcreationdate", false)?,
                        mvk,
                        suffix,
                        access_permissions: f
                            .text("accesspermissions")?
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .await?;
                let mut r = okay(seq).header("hash", fmt_hash(dot.hash()));
                r.add_payload_object(PayloadObject::new(PO_ACCESS_DOT, dot.content().to_vec()));
                self.send(done(r)).await;
                Ok(())
            }
            Command::MakeChain => {
                if f.flag("ispermission", false)? {
                    return Err(BwError::new(
                        StatusCode::BadOperation,
                        "permission chains are not supported",
                    ));
                }
                let mut dots = Vec::new();
                for h in f.all("dot") {
                    let text = std::str::from_utf8(h).map_err(|_| malformed("dot is not UTF-8"))?;
                    dots.push(self.find_dot(&parse_hash(text)?).await?);
                }
                let chain = self
                    .client
                    .create_dot_chain(dots, f.flag("unelaborate", false)?)?;
                let mut r = okay(seq).header("hash", fmt_hash(chain.chain_hash()));
                r.add_payload_object(chain_payload(&chain));
                self.send(done(r)).await;
                Ok(())
            }
            Command::BuildChain => {
                let to = self.key(f.require_text("to")?).await?;
                let chains = self
                    .client
                    .build_chain(BuildChainParams {
                        uri: f.require_text("uri")?.to_string(),
                        permissions: f.require_text("accesspermissions")?.to_string(),
                        to,
                    })
                    .await?;
                self.send(okay(seq).header("finished", "false")).await;
                for chain in &chains {
                    let mut r = Frame::new(Command::Result, seq)
                        .header("hash", fmt_hash(chain.chain_hash()));
                    r.add_payload_object(chain_payload(chain));
                    self.send(r).await;
                }
                self.send(finished_result(seq)).await;
                Ok(())
            }
            Command::SetEntity => {
                let po = f.require_payload(PO_ENTITY_WITH_KEY)?;
                let vk = self.client.set_entity(&po.content)?;
                self.send(done(okay(seq).header("vk", fmt_key(&vk)))).await;
                Ok(())
            }
            Command::RevokeObject => {
                let target = if let Some(dot) = f.text("dot")? {
                    parse_hash(dot)?
                } else if let Some(entity) = f.text("entity")? {
                    self.key(entity).await?
                } else {
                    return Err(malformed("revk needs a dot or entity header"));
                };
                let comment = f.text("comment")?.unwrap_or_default();
                let revocation = self.client.create_revocation(target, comment)?;
                let mut r = okay(seq).header("hash", fmt_hash(revocation.hash()));
                r.add_payload_object(PayloadObject::new(
                    PO_REVOCATION,
                    revocation.content().to_vec(),
                ));
                self.send(done(r)).await;
                Ok(())
            }

            // ---------------------------------------------------------------
            // Registry
            // ---------------------------------------------------------------
            Command::PutEntity => {
                let entity = if let Some(po) = f.payload(PO_ENTITY_WITH_KEY) {
                    Entity::decode_with_key(&po.content)?
                } else {
                    Entity::decode(&f.require_payload(u32::from(ronum::ENTITY))?.content)?
                };
                let vk = self.client.put_entity(&entity).await?;
                self.send(done(okay(seq).header("vk", fmt_key(&vk)))).await;
                Ok(())
            }
            Command::PutDot => {
                let po = f.require_payload(PO_ACCESS_DOT)?;
                let dot = Dot::decode(ronum::ACCESS_DOT, &po.content)?;
                let hash = self.client.put_dot(&dot).await?;
                self.send(done(okay(seq).header("hash", fmt_hash(&hash))))
                    .await;
                Ok(())
            }
            Command::PutChain => {
                let po = f.require_payload(PO_ACCESS_CHAIN)?;
                let chain = DChain::decode(ronum::ACCESS_CHAIN, &po.content)?;
                let hash = self.client.put_chain(&chain).await?;
                self.send(done(okay(seq).header("hash", fmt_hash(&hash))))
                    .await;
                Ok(())
            }
            Command::PutRevocation => {
                let po = f.require_payload(PO_REVOCATION)?;
                let revocation = Revocation::decode(&po.content)?;
                let hash = self.client.put_revocation(&revocation).await?;
                self.send(done(okay(seq).header("hash", fmt_hash(&hash))))
                    .await;
                Ok(())
            }
            Command::ResolveRegistryObject => {
                let (ro, state) = self.client.resolve_ro(f.require_text("key")?).await?;
                let mut r = okay(seq).header("validity", state.as_str());
                r.add_routing_object(&ro);
                self.send(done(r)).await;
                Ok(())
            }
            Command::BcInteractionParams => {
                let params = self.client.bc_interaction_params(BcipUpdate {
                    confirmations: f.number("confirmations")?,
                    timeout_blocks: f.number("timeout")?,
                    max_chain_age: f.number::<u64>("maxage")?.map(Duration::from_secs),
                })?;
                let r = okay(seq)
                    .header("confirmations", params.confirmations.to_string())
                    .header("timeout", params.timeout_blocks.to_string())
                    .header("maxage", params.max_chain_age.as_secs().to_string())
                    .header("currentblock", params.current_block.to_string())
                    .header("currentage", params.head_block_age.as_secs().to_string());
                self.send(done(r)).await;
                Ok(())
            }
            Command::Transfer => {
                let to = self.key(f.require_text("to")?).await?;
                let value = f
                    .number::<u128>("value")?
                    .ok_or_else(|| malformed("missing header value"))?;
                self.client.transfer(&to, value).await?;
                self.send(done(okay(seq))).await;
                Ok(())
            }
            Command::EntityBalance => {
                let vk = *self.client.entity()?.vk();
                let balance = self.client.balance(&vk).await?;
                self.send(done(
                    okay(seq)
                        .header("address", fmt_key(&vk))
                        .header("balance", balance.to_string()),
                ))
                .await;
                Ok(())
            }
            Command::AddressBalance => {
                let vk = self.key(f.require_text("address")?).await?;
                let balance = self.client.balance(&vk).await?;
                self.send(done(okay(seq).header("balance", balance.to_string())))
                    .await;
                Ok(())
            }
            Command::MakeShortAlias => {
                let value = pad32(f.first("content").unwrap_or_default())?;
                let n = self.client.make_short_alias(value).await?;
                self.send(done(okay(seq).header("hexkey", format!("{n:x}"))))
                    .await;
                Ok(())
            }
            Command::MakeLongAlias => {
                let key = f
                    .first("key")
                    .ok_or_else(|| malformed("missing header key"))?;
                let value = pad32(f.first("content").unwrap_or_default())?;
                self.client.make_long_alias(key, value).await?;
                self.send(done(okay(seq))).await;
                Ok(())
            }
            Command::ResolveAlias => {
                let value = if let Some(long) = f.first("longkey") {
                    self.client.resolve_long_alias(long).await?
                } else if let Some(short) = f.text("shortkey")? {
                    let n = parse_short_alias(short)?;
                    self.client.resolve_short_alias(n).await?
                } else {
                    return Err(malformed("resa needs a longkey or shortkey header"));
                };
                let value = value
                    .ok_or_else(|| BwError::new(StatusCode::UnresolvedAlias, "alias not found"))?;
                self.send(done(okay(seq).header("value", value.to_vec())))
                    .await;
                Ok(())
            }

            // ---------------------------------------------------------------
            // Designated routers
            // ---------------------------------------------------------------
            Command::NewDrOffer => {
                let nsvk = self.key(f.require_text("nsvk")?).await?;
                self.client.new_router_offer(&nsvk).await?;
                self.send(done(okay(seq))).await;
                Ok(())
            }
            Command::AcceptDrOffer => {
                let drvk = self.key(f.require_text("drvk")?).await?;
                self.client.accept_router_offer(&drvk).await?;
                self.send(done(okay(seq))).await;
                Ok(())
            }
            Command::RevokeDrOffer => {
                let nsvk = self.key(f.require_text("nsvk")?).await?;
                self.client.retract_router_offer(&nsvk).await?;
                self.send(done(okay(seq))).await;
                Ok(())
            }
            Command::RevokeDrAccept => {
                let drvk = self.key(f.require_text("drvk")?).await?;
                self.client.retract_router_acceptance(&drvk).await?;
                self.send(done(okay(seq))).await;
                Ok(())
            }
            Command::ListDrOffers => {
                let nsvk = self.key(f.require_text("nsvk")?).await?;
                let offers = self.client.list_router_offers(&nsvk).await?;
                self.send(okay(seq).header("finished", "false")).await;
                for offer in offers {
                    let mut r = Frame::new(Command::Result, seq)
                        .header("drvk", fmt_key(&offer.drvk))
                        .header("nsvk", fmt_key(&offer.nsvk))
                        .header("active", offer.accepted.to_string());
                    if let Some(srv) = self.client.srv_record(&offer.drvk).await? {
                        r.add_header("srv", srv);
                    }
                    self.send(r).await;
                }
                self.send(finished_result(seq)).await;
                Ok(())
            }
            Command::UpdateSrvRecord => {
                self.client.update_srv_record(f.require_text("srv")?).await?;
                self.send(done(okay(seq))).await;
                Ok(())
            }
        }
    }

    // =========================================================================
    // Request parsing
    // =========================================================================

    async fn key(&self, name: &str) -> BwResult<Vk> {
        self.client.router().resolver().resolve_key(name).await
    }

    async fn revokers(&self, f: &Frame) -> BwResult<Vec<Vk>> {
        let mut out = Vec::new();
        for raw in f.all("revoker") {
            let name = std::str::from_utf8(raw).map_err(|_| malformed("revoker is not UTF-8"))?;
            out.push(self.key(name).await?);
        }
        Ok(out)
    }

    /// Namespace and suffix from `uri`, or from `mvk` plus `uri_suffix`.
    async fn load_uri(&self, f: &Frame) -> BwResult<(Vk, String)> {
        if let Some(uri) = f.text("uri")? {
            let (ns, suffix) = uri
                .split_once('/')
                .ok_or_else(|| BwError::new(StatusCode::BadURI, format!("no suffix in {uri:?}")))?;
            return Ok((self.key(ns).await?, suffix.to_string()));
        }
        let mvk = self.key(f.require_text("mvk")?).await?;
        Ok((mvk, f.require_text("uri_suffix")?.to_string()))
    }

    async fn find_dot(&self, hash: &Hash32) -> BwResult<Arc<Dot>> {
        let router = self.client.router();
        if let Some(dot) = router.store().get_dot(hash)? {
            return Ok(dot);
        }
        match router.resolver().resolve_dot(hash).await? {
            (Some(dot), _) => Ok(dot),
            (None, _) => Err(BwError::new(
                StatusCode::Unresolvable,
                format!("DOT {} not found", fmt_hash(hash)),
            )),
        }
    }

    async fn message_request(&self, f: &Frame) -> BwResult<MessageRequest> {
        let (mvk, suffix) = self.load_uri(f).await?;
        let mut req = MessageRequest::new(mvk, suffix);
        req.autochain = f.flag("autochain", false)?;
        if let Some(text) = f.text("primary_access_chain")? {
            let hash = parse_hash(text)?;
            req.primary_access_chain = Some(
                match self.client.router().store().get_chain(&hash)? {
                    Some(chain) => chain,
                    None => DChain::from_chain_hash(true, hash),
                },
            );
        }
        if let Some(mode) = f.text("elaborate_pac")? {
            req.elaborate_pac = mode.parse::<ElaboratePac>()?;
        }
        req.expiry = parse_expiry(f)?;
        req.expiry_delta = f.duration("expirydelta")?;
        req.consumers = f.number("consumers")?.unwrap_or(0);
        for (num, content) in &f.routing_objects {
            req.routing_objects.push(RoutingObject::decode(*num, content)?);
        }
        req.payload_objects = f.payload_objects.clone();
        Ok(req)
    }

    // =========================================================================
    // Subscription dispatch
    // =========================================================================

    fn spawn_dispatcher(&self, seqno: u32, mut stream: SubscriptionStream, unpack: bool) {
        let out = self.out.clone();
        let umid = stream.umid();
        let client = self.client.id();
        let handle = tokio::spawn(async move {
            while let Some(m) = stream.recv().await {
                if out.send(message_result(seqno, &m, unpack)).await.is_err() {
                    return;
                }
            }
            debug!(%client, handle = %umid, dropped = stream.dropped(), "subscription ended");
            let _ = out.send(finished_result(seqno)).await;
        });
        self.dispatchers.lock().insert(umid, handle);
    }
}

fn chain_payload(chain: &DChain) -> PayloadObject {
    PayloadObject::new(u32::from(chain.ro_num()), chain.content())
}
