
use log::{debug, info, warn};
use sansio::Protocol;
use shared::error::*;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Instant;

use shared::queue::TaskQueue;

use crate::candidate::Candidate;
use crate::channel::*;
use crate::description::*;
use crate::rand::{generate_pwd, generate_tiebreaker, generate_ufrag};
use crate::role::IceRole;
use crate::state::TransportState;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub content_name: String,
    /// Transport namespace, e.g. [NS_JINGLE_ICE_UDP].
    pub transport_type: String,
    pub ice_role: IceRole,
    /// Random when unset.
    pub tiebreaker: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            content_name: String::new(),
            transport_type: NS_JINGLE_ICE_UDP.to_owned(),
            ice_role: IceRole::Unknown,
            tiebreaker: None,
        }
    }
}

/// Events a transport reports to the session that owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connecting,
    ReadableState(TransportState),
    WritableState(TransportState),
    CandidatesReady(Vec<Candidate>),
    CandidatesAllocationDone,
    Completed,
    Failed,
}

// Work posted for delivery on the next handle_timeout. States and candidate
// batches are read at delivery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportMessage {
    Connecting,
    ReadableState,
    WritableState,
    CandidatesReady,
    CandidatesAllocationDone,
    Completed,
    Failed,
}

struct ChannelMapEntry<C> {
    channel: C,
    ref_count: usize,
    candidates_allocated: bool,
}

/// Transport negotiates ICE parameters for one content and aggregates the
/// state of its per-component channels.
pub struct Transport<F: ChannelFactory> {
    content_name: String,
    transport_type: String,
    factory: F,
    channels: BTreeMap<u16, ChannelMapEntry<F::Channel>>,

    ice_role: IceRole,
    tiebreaker: u64,
    local_description: Option<TransportDescription>,
    remote_description: Option<TransportDescription>,
    remote_ice_mode: IceMode,

    connect_requested: bool,
    destroyed: bool,
    readable: TransportState,
    writable: TransportState,
    completed: bool,
    failed: bool,
    ready_candidates: Vec<Candidate>,

    messages: TaskQueue<TransportMessage>,
    events: VecDeque<TransportEvent>,
}

impl<F: ChannelFactory> Transport<F> {
    pub fn new(config: TransportConfig, factory: F) -> Self {
        Transport {
            content_name: config.content_name,
            transport_type: config.transport_type,
            factory,
            channels: BTreeMap::new(),

            ice_role: config.ice_role,
            tiebreaker: config.tiebreaker.unwrap_or_else(generate_tiebreaker),
            local_description: None,
            remote_description: None,
            remote_ice_mode: IceMode::Full,

            connect_requested: false,
            destroyed: false,
            readable: TransportState::None,
            writable: TransportState::None,
            completed: false,
            failed: false,
            ready_candidates: vec![],

            messages: TaskQueue::new(),
            events: VecDeque::new(),
        }
    }

    pub fn content_name(&self) -> &str {
        &self.content_name
    }

    pub fn transport_type(&self) -> &str {
        &self.transport_type
    }

    pub fn ice_role(&self) -> IceRole {
        self.ice_role
    }

    pub fn set_ice_role(&mut self, role: IceRole) {
        self.ice_role = role;
        for entry in self.channels.values_mut() {
            entry.channel.set_ice_role(role);
        }
    }

    pub fn ice_tiebreaker(&self) -> u64 {
        self.tiebreaker
    }

    pub fn set_ice_tiebreaker(&mut self, tiebreaker: u64) {
        self.tiebreaker = tiebreaker;
        for entry in self.channels.values_mut() {
            entry.channel.set_ice_tiebreaker(tiebreaker);
        }
    }

    pub fn local_description(&self) -> Option<&TransportDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&TransportDescription> {
        self.remote_description.as_ref()
    }

    pub fn remote_ice_mode(&self) -> IceMode {
        self.remote_ice_mode
    }

    pub fn connect_requested(&self) -> bool {
        self.connect_requested
    }

    pub fn readable(&self) -> TransportState {
        self.readable
    }

    pub fn writable(&self) -> TransportState {
        self.writable
    }

    pub fn all_channels_writable(&self) -> bool {
        self.writable == TransportState::All
    }

    /// completed is true after a Completed event was delivered and until a
    /// Failed one.
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// create_channel returns the channel for `component`, creating it on
    /// first use. Every call must be matched by a [Transport::destroy_channel].
    pub fn create_channel(&mut self, component: u16, now: Instant) -> Result<&mut F::Channel> {
        if self.destroyed {
            return Err(Error::ErrTransportDestroyed);
        }

        if !self.channels.contains_key(&component) {
            let mut channel = self.factory.create_channel(&self.content_name, component)?;
            channel.set_ice_role(self.ice_role);
            channel.set_ice_tiebreaker(self.tiebreaker);
            if let Some(local) = &self.local_description {
                channel.set_ice_credentials(&local.ice_ufrag, &local.ice_pwd);
            }
            if let Some(remote) = &self.remote_description {
                channel.set_remote_ice_credentials(&remote.ice_ufrag, &remote.ice_pwd);
            }
            channel.set_remote_ice_mode(self.remote_ice_mode);

            if self.connect_requested {
                channel.connect(now)?;
                if self.channels.is_empty() {
                    // the first channel is where connecting starts
                    self.messages.post(now, TransportMessage::Connecting);
                }
            }

            self.channels.insert(
                component,
                ChannelMapEntry {
                    channel,
                    ref_count: 0,
                    candidates_allocated: false,
                },
            );
        }

        let entry = self
            .channels
            .get_mut(&component)
            .ok_or(Error::ErrChannelNotFound(component))?;
        entry.ref_count += 1;
        Ok(&mut entry.channel)
    }

    /// destroy_channel drops one reference to the channel for `component`
    /// and closes it when none are left.
    pub fn destroy_channel(&mut self, component: u16, now: Instant) {
        let Some(entry) = self.channels.get_mut(&component) else {
            return;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            return;
        }

        if let Some(mut entry) = self.channels.remove(&component) {
            if let Err(err) = entry.channel.close() {
                warn!("{}: closing channel {} failed: {}", self, component, err);
            }
        }

        // the channel may have been the only one holding the state back
        self.messages.post(now, TransportMessage::ReadableState);
        self.messages.post(now, TransportMessage::WritableState);
    }

    /// destroy_all_channels closes every channel and cancels everything
    /// still waiting for delivery. The transport cannot be used afterwards.
    pub fn destroy_all_channels(&mut self) {
        for (component, mut entry) in std::mem::take(&mut self.channels) {
            if let Err(err) = entry.channel.close() {
                warn!("{}: closing channel {} failed: {}", self, component, err);
            }
        }
        self.messages.clear();
        self.ready_candidates.clear();
        self.destroyed = true;
    }

    pub fn get_channel(&self, component: u16) -> Option<&F::Channel> {
        self.channels.get(&component).map(|entry| &entry.channel)
    }

    pub fn get_channel_mut(&mut self, component: u16) -> Option<&mut F::Channel> {
        self.channels
            .get_mut(&component)
            .map(|entry| &mut entry.channel)
    }

    pub fn has_channel(&self, component: u16) -> bool {
        self.channels.contains_key(&component)
    }

    pub fn has_channels(&self) -> bool {
        !self.channels.is_empty()
    }

    /// connect_channels starts gathering on every channel. A local
    /// description is generated if none was set.
    pub fn connect_channels(&mut self, now: Instant) -> Result<()> {
        if self.destroyed || self.connect_requested || self.channels.is_empty() {
            return Ok(());
        }
        self.connect_requested = true;
        // release candidates held back until now
        self.messages.post(now, TransportMessage::CandidatesReady);

        if self.local_description.is_none() {
            info!(
                "{}: no local description has been set, generating one",
                self
            );
            let desc = TransportDescription::new(
                &self.transport_type,
                &generate_ufrag(),
                &generate_pwd(),
            );
            self.set_local_transport_description(desc, ContentAction::Offer)?;
        }

        for entry in self.channels.values_mut() {
            entry.channel.connect(now)?;
        }
        self.messages.post(now, TransportMessage::Connecting);
        Ok(())
    }

    /// set_local_transport_description applies our side of an offer/answer
    /// round. New credentials while a remote description exists restart
    /// ICE and reverse the role, unless the remote is lite.
    pub fn set_local_transport_description(
        &mut self,
        desc: TransportDescription,
        action: ContentAction,
    ) -> Result<()> {
        verify_ice_params(&desc)?;
        if action.is_answer() && self.remote_description.is_none() {
            return Err(Error::ErrNoRemoteDescription);
        }

        let restart_role = match (&self.local_description, &self.remote_description) {
            (Some(local), Some(remote))
                if ice_credentials_changed(
                    &local.ice_ufrag,
                    &local.ice_pwd,
                    &desc.ice_ufrag,
                    &desc.ice_pwd,
                ) =>
            {
                if remote.ice_mode == IceMode::Lite {
                    Some(IceRole::Controlling)
                } else {
                    Some(self.ice_role.reversed())
                }
            }
            _ => None,
        };
        if let Some(role) = restart_role {
            info!("{}: ICE restart, role {} -> {}", self, self.ice_role, role);
            self.set_ice_role(role);
        }

        for entry in self.channels.values_mut() {
            entry
                .channel
                .set_ice_credentials(&desc.ice_ufrag, &desc.ice_pwd);
        }
        self.local_description = Some(desc);

        if action.is_answer() {
            self.negotiate_transport_description();
        }
        Ok(())
    }

    /// set_remote_transport_description applies the peer's side of an
    /// offer/answer round.
    pub fn set_remote_transport_description(
        &mut self,
        desc: TransportDescription,
        action: ContentAction,
    ) -> Result<()> {
        verify_ice_params(&desc)?;
        if action.is_answer() && self.local_description.is_none() {
            return Err(Error::ErrNoLocalDescription);
        }

        for entry in self.channels.values_mut() {
            entry
                .channel
                .set_remote_ice_credentials(&desc.ice_ufrag, &desc.ice_pwd);
        }
        self.remote_description = Some(desc);

        if action.is_answer() {
            self.negotiate_transport_description();
        }
        Ok(())
    }

    fn negotiate_transport_description(&mut self) {
        let Some(remote_ice_mode) = self.remote_description.as_ref().map(|d| d.ice_mode) else {
            return;
        };

        // a full agent facing a lite one always controls
        if self.ice_role == IceRole::Controlled && remote_ice_mode == IceMode::Lite {
            self.set_ice_role(IceRole::Controlling);
        }

        self.remote_ice_mode = remote_ice_mode;
        for entry in self.channels.values_mut() {
            entry.channel.set_remote_ice_mode(remote_ice_mode);
        }
    }

    /// verify_candidate checks a remote candidate before it reaches a channel.
    pub fn verify_candidate(&self, candidate: &Candidate) -> Result<()> {
        let address = candidate.address();
        if address.is_any() {
            return Err(Error::ErrZeroCandidateAddress);
        }

        // Only 80 and 443 are allowed below 1024, and only on public addresses.
        let port = address.port();
        if port < 1024 {
            if port != 80 && port != 443 {
                return Err(Error::ErrLowCandidatePort(port));
            }
            if address.is_private_ip() {
                return Err(Error::ErrPrivateLowCandidatePort(port));
            }
        }

        if !self.has_channel(candidate.component()) {
            return Err(Error::ErrUnknownComponent(candidate.component()));
        }
        Ok(())
    }

    /// on_remote_candidates hands remote candidates to their channels. The
    /// whole batch is rejected if any candidate fails verification.
    pub fn on_remote_candidates(&mut self, candidates: &[Candidate], now: Instant) -> Result<()> {
        if self.destroyed {
            return Err(Error::ErrTransportDestroyed);
        }
        for candidate in candidates {
            self.verify_candidate(candidate)?;
        }

        for candidate in candidates {
            let entry = self
                .channels
                .get_mut(&candidate.component())
                .ok_or(Error::ErrChannelNotFound(candidate.component()))?;
            entry.channel.on_candidate(candidate, now)?;
        }
        Ok(())
    }

    pub fn get_stats(&self) -> TransportStats {
        TransportStats {
            content_name: self.content_name.clone(),
            channel_stats: self
                .channels
                .iter()
                .map(|(component, entry)| TransportChannelStats {
                    component: *component,
                    connection_infos: entry.channel.get_stats(),
                })
                .collect(),
        }
    }

    fn transport_state(&self, read: bool) -> TransportState {
        let matching = self
            .channels
            .values()
            .filter(|entry| {
                if read {
                    entry.channel.readable()
                } else {
                    entry.channel.writable()
                }
            })
            .count();
        TransportState::from_counts(matching, self.channels.len())
    }

    fn on_channel_event(&mut self, component: u16, event: ChannelEvent, now: Instant) {
        // a channel that has connections again may fail again
        if self
            .channels
            .get(&component)
            .is_some_and(|entry| entry.channel.connection_count() > 0)
        {
            self.failed = false;
        }

        match event {
            ChannelEvent::ReadableState => {
                self.messages.post(now, TransportMessage::ReadableState);
            }
            ChannelEvent::WritableState => {
                self.messages.post(now, TransportMessage::WritableState);
                self.maybe_completed(now);
            }
            ChannelEvent::CandidateReady(candidate) => {
                self.ready_candidates.push(candidate);
                // held until the owner asks to connect
                if self.connect_requested {
                    self.messages.post(now, TransportMessage::CandidatesReady);
                }
            }
            ChannelEvent::CandidatesAllocationDone => {
                if let Some(entry) = self.channels.get_mut(&component) {
                    entry.candidates_allocated = true;
                }
                if self
                    .channels
                    .values()
                    .all(|entry| entry.candidates_allocated)
                {
                    self.messages
                        .post(now, TransportMessage::CandidatesAllocationDone);
                    self.maybe_completed(now);
                }
            }
            ChannelEvent::ConnectionRemoved => self.on_channel_connection_removed(component, now),
        }
    }

    // ICE is completed once every channel is writable, finished allocating,
    // and has pruned down to a single connection.
    fn maybe_completed(&mut self, now: Instant) {
        if self.channels.is_empty() {
            return;
        }
        let done = self.channels.values().all(|entry| {
            entry.channel.writable()
                && entry.channel.connection_count() == 1
                && entry.channel.ice_role() == IceRole::Controlling
                && entry.candidates_allocated
        });
        if done {
            self.messages.post(now, TransportMessage::Completed);
        }
    }

    fn on_channel_connection_removed(&mut self, component: u16, now: Instant) {
        self.maybe_completed(now);

        // Failed is only reported by the controlling side, after allocation stopped.
        let Some(entry) = self.channels.get(&component) else {
            return;
        };
        if entry.channel.ice_role() != IceRole::Controlling || !entry.candidates_allocated {
            return;
        }
        if entry.channel.connection_count() == 0 {
            self.messages.post(now, TransportMessage::Failed);
        }
    }

    fn deliver(&mut self, message: TransportMessage) {
        match message {
            TransportMessage::Connecting => self.events.push_back(TransportEvent::Connecting),
            TransportMessage::ReadableState => {
                let readable = self.transport_state(true);
                if readable != self.readable {
                    self.readable = readable;
                    self.events
                        .push_back(TransportEvent::ReadableState(readable));
                }
            }
            TransportMessage::WritableState => {
                let writable = self.transport_state(false);
                if writable != self.writable {
                    self.writable = writable;
                    self.events
                        .push_back(TransportEvent::WritableState(writable));
                }
            }
            TransportMessage::CandidatesReady => {
                let candidates = std::mem::take(&mut self.ready_candidates);
                if !candidates.is_empty() {
                    self.events
                        .push_back(TransportEvent::CandidatesReady(candidates));
                }
            }
            TransportMessage::CandidatesAllocationDone => {
                self.events
                    .push_back(TransportEvent::CandidatesAllocationDone);
            }
            TransportMessage::Completed => {
                if !self.completed {
                    self.completed = true;
                    self.events.push_back(TransportEvent::Completed);
                }
            }
            TransportMessage::Failed => {
                if !self.failed {
                    self.failed = true;
                    self.completed = false;
                    self.events.push_back(TransportEvent::Failed);
                }
            }
        }
    }
}

impl<F: ChannelFactory> fmt::Display for Transport<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transport[{}]", self.content_name)
    }
}

impl<F: ChannelFactory> Protocol<(), (), ()> for Transport<F> {
    type Rout = ();
    type Wout = ();
    type Eout = TransportEvent;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        None
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    /// handle_timeout drives the channels, folds their events into posted
    /// messages, then delivers every message due at `now`.
    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }

        let mut errs = vec![];
        let components: Vec<u16> = self.channels.keys().copied().collect();
        for component in components {
            let mut events = vec![];
            if let Some(entry) = self.channels.get_mut(&component) {
                if let Err(err) = entry.channel.handle_timeout(now) {
                    errs.push(err);
                }
                while let Some(event) = entry.channel.poll_event() {
                    events.push(event);
                }
            }
            for event in events {
                debug!("{}: channel {} {:?}", self, component, event);
                self.on_channel_event(component, event, now);
            }
        }

        while let Some(message) = self.messages.pop_due(now) {
            self.deliver(message);
        }

        flatten_errs(errs)
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        if self.destroyed {
            return None;
        }
        let channels = self
            .channels
            .values_mut()
            .filter_map(|entry| entry.channel.poll_timeout());
        self.messages.poll_timeout().into_iter().chain(channels).min()
    }

    fn close(&mut self) -> Result<()> {
        self.destroy_all_channels();
        Ok(())
    }
}
