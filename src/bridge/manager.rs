//! Pending request slots and their resolution.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::error::{BridgeError, BridgeResult, RejectReason};
use super::message::{BridgeMessage, BridgeMethod, BridgeReply, BridgeRequest, RelayAccess};
use crate::nostr::EventDraft;
use crate::state::{site_host, AppState};
use crate::vault::KeyVault;

/// Decision the host has to ask the user for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Pick the key to reveal to the site.
    SelectKey {
        /// Site host.
        site: String,
        /// Public keys to choose from.
        candidates: Vec<String>,
    },
    /// Confirm signing a draft.
    ApproveSignature {
        /// Site host.
        site: String,
        /// Public key that will sign.
        signer: String,
        /// The draft as requested.
        draft: EventDraft,
    },
}

/// Web side of a bridge request.
///
/// The reply is delivered exactly once. If the bridge drops the request
/// without answering, the ticket resolves as cancelled.
#[derive(Debug)]
pub struct BridgeTicket {
    method: BridgeMethod,
    /// Prompt to show, or `None` if the request was answered immediately.
    pub prompt: Option<Prompt>,
    reply: oneshot::Receiver<BridgeReply>,
    delivered: bool,
}

impl BridgeTicket {
    /// Method the request was for.
    #[must_use]
    pub const fn method(&self) -> BridgeMethod {
        self.method
    }

    /// Waits for the reply.
    pub async fn reply(self) -> BridgeReply {
        let method = self.method;
        self.reply
            .await
            .unwrap_or_else(|_| BridgeReply::rejected(method, RejectReason::Cancelled))
    }

    /// Returns the reply if it is available and was not returned before.
    pub fn try_reply(&mut self) -> Option<BridgeReply> {
        if self.delivered {
            return None;
        }
        let reply = match self.reply.try_recv() {
            Ok(reply) => reply,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => {
                BridgeReply::rejected(self.method, RejectReason::Cancelled)
            }
        };
        self.delivered = true;
        Some(reply)
    }
}

struct PendingRequest {
    request: BridgeRequest,
    page_url: String,
    signer: Option<String>,
    responder: oneshot::Sender<BridgeReply>,
    opened_at: Instant,
}

impl PendingRequest {
    fn resolve(self, reply: BridgeReply) {
        // The page may have navigated away
        let _ = self.responder.send(reply);
    }

    fn reject(self, reason: RejectReason) {
        let method = self.request.method();
        self.resolve(BridgeReply::rejected(method, reason));
    }
}

/// Routes bridge requests between web content and the key vault.
///
/// Each site has at most one pending request. A newer request from the
/// same site supersedes the older one, which is rejected as
/// [`RejectReason::Cancelled`].
pub struct SigningBridge {
    pending: HashMap<String, PendingRequest>,
    approval_timeout: Option<Duration>,
}

impl SigningBridge {
    /// Creates a bridge. Prompts older than `approval_timeout` are
    /// rejected by [`expire`](Self::expire).
    #[must_use]
    pub fn new(approval_timeout: Option<Duration>) -> Self {
        Self {
            pending: HashMap::new(),
            approval_timeout,
        }
    }

    /// Accepts a message posted by the page at `page_url`.
    ///
    /// Requests that cannot be answered (malformed draft, no identity) are
    /// rejected right away; the returned ticket then carries no prompt.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown method names and page URLs without a
    /// host. No request is opened in that case.
    pub fn receive(
        &mut self,
        page_url: &str,
        message: BridgeMessage,
        state: &mut AppState,
    ) -> BridgeResult<BridgeTicket> {
        let method = message.method()?;
        let site = site_host(page_url).map_err(|_| BridgeError::InvalidSite(page_url.to_string()))?;

        if let Some(superseded) = self.pending.remove(&site) {
            log::debug!("Superseding pending request from {site}");
            superseded.reject(RejectReason::Cancelled);
        }

        let (responder, reply) = oneshot::channel();
        let mut ticket = BridgeTicket {
            method,
            prompt: None,
            reply,
            delivered: false,
        };

        let request = match BridgeRequest::decode(method, message.body) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("Rejecting malformed {} from {site}: {e}", method.name());
                let _ = responder.send(BridgeReply::rejected(method, RejectReason::InvalidRequest));
                return Ok(ticket);
            }
        };

        match request {
            BridgeRequest::GetPublicKey => {
                let candidates: Vec<String> = state
                    .identities()
                    .iter()
                    .map(|identity| identity.public_key.clone())
                    .collect();
                if candidates.is_empty() {
                    let _ = responder.send(BridgeReply::rejected(method, RejectReason::NoIdentity));
                    return Ok(ticket);
                }
                ticket.prompt = Some(Prompt::SelectKey {
                    site: site.clone(),
                    candidates,
                });
                self.open(site, request, page_url, None, responder);
            }
            BridgeRequest::SignEvent(ref draft) => {
                let Some(signer) = state
                    .signer_for_site(&site)
                    .map(|identity| identity.public_key.clone())
                else {
                    let _ = responder.send(BridgeReply::rejected(method, RejectReason::NoIdentity));
                    return Ok(ticket);
                };
                if draft
                    .pubkey
                    .as_deref()
                    .is_some_and(|pubkey| !pubkey.eq_ignore_ascii_case(&signer))
                {
                    log::debug!("Rejecting draft from {site} for a key other than the signer");
                    let _ =
                        responder.send(BridgeReply::rejected(method, RejectReason::InvalidRequest));
                    return Ok(ticket);
                }
                ticket.prompt = Some(Prompt::ApproveSignature {
                    site: site.clone(),
                    signer: signer.clone(),
                    draft: draft.clone(),
                });
                self.open(site, request, page_url, Some(signer), responder);
            }
            BridgeRequest::GetRelays => {
                let reply = match state.signer_for_site(&site) {
                    Some(identity) => BridgeReply::Relays(
                        identity
                            .relay_permissions
                            .values()
                            .map(|permission| {
                                (
                                    permission.relay_id.clone(),
                                    RelayAccess {
                                        read: permission.read,
                                        write: permission.write,
                                    },
                                )
                            })
                            .collect(),
                    ),
                    None => BridgeReply::rejected(method, RejectReason::NoIdentity),
                };
                if !matches!(reply, BridgeReply::Rejected { .. }) {
                    state.touch_session(page_url)?;
                }
                let _ = responder.send(reply);
            }
        }

        Ok(ticket)
    }

    fn open(
        &mut self,
        site: String,
        request: BridgeRequest,
        page_url: &str,
        signer: Option<String>,
        responder: oneshot::Sender<BridgeReply>,
    ) {
        self.pending.insert(
            site,
            PendingRequest {
                request,
                page_url: page_url.to_string(),
                signer,
                responder,
                opened_at: Instant::now(),
            },
        );
    }

    fn take(&mut self, site: &str, method: BridgeMethod) -> BridgeResult<PendingRequest> {
        match self.pending.get(site) {
            Some(pending) if pending.request.method() == method => {}
            _ => {
                return Err(BridgeError::NoPendingRequest {
                    site: site.to_string(),
                    method: method.name(),
                })
            }
        }
        self.pending
            .remove(site)
            .ok_or_else(|| BridgeError::NoPendingRequest {
                site: site.to_string(),
                method: method.name(),
            })
    }

    /// Answers a pending `getPublicKey` with `public_key`.
    ///
    /// The key is bound to the site, so later signatures use it without
    /// asking again.
    ///
    /// # Errors
    ///
    /// Returns an error if no `getPublicKey` is pending for `site` or the
    /// key is not an identity. The request stays pending in both cases.
    pub fn select_key(
        &mut self,
        site: &str,
        public_key: &str,
        state: &mut AppState,
    ) -> BridgeResult<()> {
        let public_key = state
            .identity(public_key)
            .map(|identity| identity.public_key.clone())
            .ok_or_else(|| BridgeError::IdentityNotFound(public_key.to_string()))?;
        let pending = self.take(site, BridgeMethod::GetPublicKey)?;

        let recorded = state
            .touch_session(&pending.page_url)
            .and_then(|host| state.bind_identity(&host, &public_key));
        if let Err(e) = recorded {
            log::warn!("Failed to bind {public_key} to {site}: {e}");
        }

        log::info!("Shared public key {public_key} with {site}");
        pending.resolve(BridgeReply::PublicKey(public_key));
        Ok(())
    }

    /// Signs the pending draft for `site` after user approval.
    ///
    /// Vault failures resolve the request as rejected and are not errors
    /// here. Returns the reply that was sent.
    ///
    /// # Errors
    ///
    /// Returns an error if no `signEvent` is pending for `site`.
    pub fn approve_signature(
        &mut self,
        site: &str,
        state: &mut AppState,
        vault: &KeyVault,
    ) -> BridgeResult<BridgeReply> {
        let pending = self.take(site, BridgeMethod::SignEvent)?;

        let (BridgeRequest::SignEvent(draft), Some(signer)) =
            (pending.request.clone(), pending.signer.clone())
        else {
            let reply = BridgeReply::rejected(BridgeMethod::SignEvent, RejectReason::InvalidRequest);
            pending.resolve(reply.clone());
            return Ok(reply);
        };

        let reply = match vault.sign(&signer, draft) {
            Ok(event) => {
                log::info!("Signed event {} for {site}", event.id);
                if let Err(e) = state.touch_session(&pending.page_url) {
                    log::warn!("Failed to record session for {site}: {e}");
                }
                BridgeReply::SignedEvent(event)
            }
            Err(e) => {
                log::warn!("Signing for {site} failed: {e}");
                BridgeReply::rejected(BridgeMethod::SignEvent, RejectReason::from(&e))
            }
        };

        pending.resolve(reply.clone());
        Ok(reply)
    }

    /// Rejects the pending request for `site` on behalf of the user.
    ///
    /// Returns whether a request was pending.
    pub fn reject(&mut self, site: &str) -> bool {
        self.resolve_with(site, RejectReason::UserRejected)
    }

    /// Cancels the pending request for `site` (prompt dismissed, page
    /// closed). Returns whether a request was pending.
    pub fn cancel(&mut self, site: &str) -> bool {
        self.resolve_with(site, RejectReason::Cancelled)
    }

    fn resolve_with(&mut self, site: &str, reason: RejectReason) -> bool {
        let Some(pending) = self.pending.remove(site) else {
            return false;
        };
        pending.reject(reason);
        true
    }

    /// Cancels every pending request. Returns how many there were.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            pending.reject(RejectReason::Cancelled);
        }
        count
    }

    /// Rejects requests that waited longer than the approval timeout.
    ///
    /// Returns how many expired.
    pub fn expire(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.approval_timeout else {
            return 0;
        };

        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.opened_at) >= timeout)
            .map(|(site, _)| site.clone())
            .collect();

        for site in &expired {
            if let Some(pending) = self.pending.remove(site) {
                log::info!("Request from {site} timed out");
                pending.reject(RejectReason::TimedOut);
            }
        }
        expired.len()
    }

    /// Whether a request is pending for `site`.
    #[must_use]
    pub fn has_pending(&self, site: &str) -> bool {
        self.pending.contains_key(site)
    }

    /// Number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for SigningBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningBridge")
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("approval_timeout", &self.approval_timeout)
            .finish()
    }
}
