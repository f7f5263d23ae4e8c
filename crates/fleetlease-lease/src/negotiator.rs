//! The broadcast reservation protocol.
//!
//! Requesting side: try the local table, otherwise publish a [`Request`] and
//! wait for a [`Fulfillment`] carrying our `(peer, token)`.
//!
//! Granting side: every foreign request goes through
//! `SEEN -> BACKING_OFF -> {ABSTAINED | FULFILLING -> FULFILLED}`. During the
//! backoff window the node watches the fulfillment topic and stands down as
//! soon as any other node answers the same request.

use crate::backoff::BackoffPolicy;
use crate::config::NegotiatorConfig;
use crate::dedup::DedupCache;
use crate::error::{LeaseError, NegotiatorError, ReservationError};
use crate::metrics::NegotiatorMetrics;
use crate::table::{Lease, LocalReservation, MAX_LEASE};
use crate::wire::{Fulfillment, LeaseTerms, Request, millis};
use fleetlease_core::{Device, PeerId, RequestKey, Token};
use fleetlease_logistics::{RecvError, Subscription, TopicHandle, Transport};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant as StdInstant, SystemTime};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, sleep_until};

/// How long past its lease a considered request is remembered, so late
/// redeliveries are still recognised.
const SEEN_HORIZON: Duration = Duration::from_secs(300);

/// Dedup lifetime for fulfillments that do not carry lease terms.
const UNTERMED_FULFILLMENT_TTL: Duration = Duration::from_secs(300);

/// Where a reserved device came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// One of our own devices; the lease lives in our table.
    Local { lease: Lease },
    /// A peer's device, leased on our behalf by `granter`.
    Remote {
        granter: PeerId,
        terms: Option<LeaseTerms>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub device: Device,
    /// For remote grants this is measured from the moment the request was
    /// published, which never outlasts the granter's own lease.
    pub expires_at: Instant,
    pub origin: Origin,
}

impl Reservation {
    pub fn is_remote(&self) -> bool {
        matches!(self.origin, Origin::Remote { .. })
    }
}

struct Shared {
    peer: PeerId,
    ignore_own_requests: bool,
    local: Arc<dyn LocalReservation>,
    backoff: Arc<dyn BackoffPolicy>,
    requests: Arc<dyn TopicHandle>,
    fulfillments: Arc<dyn TopicHandle>,
    /// Requests known to be answered, by us or anyone else.
    satisfied: DedupCache,
    /// Requests this node has already begun considering.
    seen: DedupCache,
    metrics: NegotiatorMetrics,
}

/// One node's participant in the reservation protocol.
///
/// Construction joins both topics and starts the background request listener
/// and fulfillment monitor. Both stop on [`Negotiator::shutdown`] or drop.
pub struct Negotiator {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Negotiator {
    /// Joins the protocol. Topic join or subscription failures are fatal: a
    /// node that cannot hear the fleet cannot take part.
    pub async fn start(
        config: NegotiatorConfig,
        transport: &dyn Transport,
        local: Arc<dyn LocalReservation>,
    ) -> Result<Self, NegotiatorError> {
        config.validate()?;

        let requests = transport.join(&config.request_topic).await?;
        let fulfillments = transport.join(&config.fulfillment_topic).await?;
        let request_sub = requests.subscribe()?;
        let monitor_sub = fulfillments.subscribe()?;

        let shared = Arc::new(Shared {
            peer: config.peer_id,
            ignore_own_requests: config.ignore_own_requests,
            local,
            backoff: config.backoff.build(),
            requests,
            fulfillments,
            satisfied: DedupCache::new(),
            seen: DedupCache::new(),
            metrics: NegotiatorMetrics::new()?,
        });

        let tasks = vec![
            tokio::spawn(listen_for_requests(shared.clone(), request_sub)),
            tokio::spawn(monitor_fulfillments(shared.clone(), monitor_sub)),
        ];

        tracing::info!(
            peer = %shared.peer,
            request_topic = %config.request_topic,
            fulfillment_topic = %config.fulfillment_topic,
            "negotiator started"
        );

        Ok(Self {
            shared,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.shared.peer
    }

    pub fn metrics(&self) -> &NegotiatorMetrics {
        &self.shared.metrics
    }

    /// Requests this node currently believes are answered.
    pub fn dedup(&self) -> &DedupCache {
        &self.shared.satisfied
    }

    /// Reserves a device for `lease`, locally if possible and otherwise from
    /// the fleet, giving up after `timeout`.
    ///
    /// Locally satisfiable requests never touch the network. A `timeout` too
    /// large to represent as a deadline waits indefinitely.
    #[tracing::instrument(skip(self), fields(peer = %self.shared.peer))]
    pub async fn reserve(
        &self,
        lease: Duration,
        timeout: Duration,
    ) -> Result<Reservation, ReservationError> {
        let shared = &self.shared;

        match shared.local.reserve(lease) {
            Ok(grant) => {
                shared.metrics.local_grants.inc();
                tracing::info!(device = %grant.device, "reserved local device");
                return Ok(Reservation {
                    device: grant.device,
                    expires_at: grant.lease.expires_at,
                    origin: Origin::Local { lease: grant.lease },
                });
            }
            Err(LeaseError::NotAvailable) => {
                tracing::debug!("no local device free, asking the fleet");
            }
        }

        let request = Request {
            requestor: shared.peer.clone(),
            token: Token::generate(),
            lease,
        };
        let key = request.key();
        let deadline = Instant::now().checked_add(timeout);

        // Subscribe before publishing so a fast grant cannot slip past us.
        let mut fulfillments = shared.fulfillments.subscribe()?;
        let published_at = Instant::now();
        shared.requests.publish(request.encode()).await?;
        shared.metrics.requests_published.inc();
        tracing::debug!(token = %request.token, "request published");

        loop {
            match fulfillments.next(deadline).await {
                Ok(payload) => match Fulfillment::decode(&payload) {
                    Ok(f) if f.answers(&key) => {
                        shared.metrics.remote_grants.inc();
                        tracing::info!(
                            device = %f.device,
                            granter = %f.granter,
                            "reserved remote device"
                        );
                        return Ok(Reservation {
                            device: f.device,
                            expires_at: published_at + lease.min(MAX_LEASE),
                            origin: Origin::Remote {
                                granter: f.granter,
                                terms: f.lease,
                            },
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "ignoring malformed fulfillment");
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "fulfillment subscription lagged");
                }
                Err(RecvError::Timeout) => {
                    shared.metrics.request_timeouts.inc();
                    tracing::debug!(token = %request.token, "request timed out");
                    return Err(ReservationError::Timeout(timeout));
                }
                Err(RecvError::Closed) => return Err(ReservationError::Closed),
            }
        }
    }

    /// Stops the background tasks. Requests mid-backoff are abandoned.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Negotiator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn listen_for_requests(shared: Arc<Shared>, mut requests: Box<dyn Subscription>) {
    // Dropping the set when this task is aborted aborts every consideration.
    let mut considering = JoinSet::new();

    loop {
        tokio::select! {
            received = requests.next(None) => match received {
                Ok(payload) => shared.on_request(&payload, &mut considering),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "request subscription lagged");
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("request subscription closed, listener exiting");
                    return;
                }
                Err(RecvError::Timeout) => {}
            },
            Some(done) = considering.join_next(), if !considering.is_empty() => {
                if let Err(e) = done {
                    if e.is_panic() {
                        tracing::error!(error = %e, "request consideration panicked");
                    }
                }
            }
        }
    }
}

async fn monitor_fulfillments(shared: Arc<Shared>, mut fulfillments: Box<dyn Subscription>) {
    loop {
        match fulfillments.next(None).await {
            Ok(payload) => match Fulfillment::decode(&payload) {
                Ok(f) => {
                    let ttl = f
                        .lease
                        .as_ref()
                        .map_or(UNTERMED_FULFILLMENT_TTL, |terms| terms.duration)
                        .min(MAX_LEASE);
                    tracing::trace!(request = %f.key(), granter = %f.granter, "fulfillment observed");
                    shared.satisfied.mark_satisfied(f.key(), StdInstant::now() + ttl);
                }
                Err(e) => {
                    shared.metrics.malformed_messages.inc();
                    tracing::debug!(error = %e, "dropping malformed fulfillment");
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "fulfillment monitor lagged");
            }
            Err(RecvError::Closed) => return,
            Err(RecvError::Timeout) => {}
        }
    }
}

impl Shared {
    fn on_request(self: &Arc<Self>, payload: &[u8], considering: &mut JoinSet<()>) {
        let request = match Request::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                self.metrics.malformed_messages.inc();
                tracing::debug!(error = %e, "dropping malformed request");
                return;
            }
        };

        // Our own requests are settled by the local attempt that preceded them.
        if self.ignore_own_requests && request.requestor == self.peer {
            return;
        }

        let key = request.key();
        let remember_until = StdInstant::now() + request.lease.min(MAX_LEASE) + SEEN_HORIZON;
        if self.satisfied.is_satisfied(&key) || !self.seen.claim(key.clone(), remember_until) {
            self.metrics.duplicate_requests.inc();
            tracing::debug!(request = %key, "request already handled");
            return;
        }

        considering.spawn(self.clone().consider(request, key));
    }

    async fn consider(self: Arc<Self>, request: Request, key: RequestKey) {
        let window = self.backoff.delay();
        tracing::debug!(
            request = %key,
            backoff_ms = millis(window),
            "backing off"
        );

        let lease = request.lease.min(MAX_LEASE);
        if let Some(winner) = self.watch_for_competitor(&key, window).await {
            self.satisfied
                .mark_satisfied(key.clone(), StdInstant::now() + lease);
            self.abstain(&key, Some(&winner.granter));
            return;
        }
        // The competitor may have answered before our watch was subscribed.
        if self.satisfied.is_satisfied(&key) {
            self.abstain(&key, None);
            return;
        }

        let grant = match self.local.reserve(request.lease) {
            Ok(grant) => grant,
            Err(LeaseError::NotAvailable) => {
                self.metrics.failed_attempts.inc();
                tracing::debug!(request = %key, "no local device free for peer request");
                return;
            }
        };

        let fulfillment = Fulfillment {
            requestor: request.requestor,
            token: request.token,
            granter: self.peer.clone(),
            device: grant.device,
            lease: Some(LeaseTerms {
                token: grant.lease.token,
                duration: request.lease,
                expires_at: SystemTime::now() + lease,
            }),
        };
        self.satisfied
            .mark_satisfied(key.clone(), StdInstant::now() + lease);

        match self.fulfillments.publish(fulfillment.encode()).await {
            Ok(()) => {
                self.metrics.fulfillments_published.inc();
                tracing::info!(
                    request = %key,
                    device = %fulfillment.device,
                    "granted device to peer"
                );
            }
            Err(e) => {
                tracing::warn!(request = %key, error = %e, "fulfillment publish failed, releasing device");
                self.local.release(fulfillment.device.id);
            }
        }
    }

    /// Watches the fulfillment topic until `window` elapses. Returns the first
    /// fulfillment that answers `key`.
    async fn watch_for_competitor(&self, key: &RequestKey, window: Duration) -> Option<Fulfillment> {
        let deadline = Instant::now() + window.min(MAX_LEASE);

        let mut watch = match self.fulfillments.subscribe() {
            Ok(watch) => watch,
            Err(e) => {
                tracing::warn!(request = %key, error = %e, "cannot watch fulfillments, backing off blind");
                sleep_until(deadline).await;
                return None;
            }
        };

        loop {
            match watch.next(Some(deadline)).await {
                Ok(payload) => {
                    // Malformed payloads are counted by the monitor.
                    if let Ok(f) = Fulfillment::decode(&payload) {
                        if f.answers(key) {
                            return Some(f);
                        }
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Timeout) => return None,
                Err(RecvError::Closed) => {
                    sleep_until(deadline).await;
                    return None;
                }
            }
        }
    }

    fn abstain(&self, key: &RequestKey, winner: Option<&PeerId>) {
        self.metrics.abstentions.inc();
        tracing::debug!(
            request = %key,
            winner = winner.map(PeerId::as_str),
            "request answered by another node, abstaining"
        );
    }
}
