
use bytes::BytesMut;
use log::{debug, trace, warn};
use shared::TaggedBytesMut;
use shared::error::*;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::Transmit;
use crate::message::*;

/// Number of times a request is put on the wire before it times out.
pub const DEFAULT_MAX_SENDS: u32 = 9;
/// Base retransmission delay.
pub const DEFAULT_DELAY_UNIT: Duration = Duration::from_millis(100);
/// Cap on the exponential backoff multiplier.
pub const DEFAULT_MAX_DELAY_FACTOR: u32 = 16;

/// StunRequest is an outgoing request waiting to be sent or answered.
///
/// `T` is caller-owned context handed back with the request's outcome.
#[derive(Debug, Clone)]
pub struct StunRequest<T> {
    message: Message,
    destination: SocketAddr,
    context: T,
    created: Instant,
    delay: Duration,
}

impl<T> StunRequest<T> {
    pub fn new(message: Message, destination: SocketAddr, context: T, now: Instant) -> Self {
        Self {
            message,
            destination,
            context,
            created: now,
            delay: Duration::ZERO,
        }
    }

    /// with_delay postpones the first transmission by `delay` from creation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn id(&self) -> TransactionId {
        self.message.transaction_id
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn context(&self) -> &T {
        &self.context
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Outcome of a request, reported through `poll_event`.
#[derive(Debug)]
pub enum StunRequestEvent<T> {
    Response {
        destination: SocketAddr,
        context: T,
        response: Message,
        rtt: Duration,
    },
    ErrorResponse {
        destination: SocketAddr,
        context: T,
        response: Message,
    },
    Timeout {
        destination: SocketAddr,
        context: T,
    },
}

struct RequestState<T> {
    request: StunRequest<T>,
    raw: BytesMut,
    count: u32,
    timed_out: bool,
    deadline: Instant,
    sent_at: Option<Instant>,
}

struct RequestSettings {
    max_sends: u32,
    delay_unit: Duration,
    max_delay_factor: u32,
}

impl Default for RequestSettings {
    fn default() -> Self {
        RequestSettings {
            max_sends: DEFAULT_MAX_SENDS,
            delay_unit: DEFAULT_DELAY_UNIT,
            max_delay_factor: DEFAULT_MAX_DELAY_FACTOR,
        }
    }
}

// delay before the next retransmission after `count` sends so far
fn next_delay(settings: &RequestSettings, count: u32) -> Duration {
    let factor = 1u32
        .checked_shl(count)
        .unwrap_or(u32::MAX)
        .min(settings.max_delay_factor);
    settings.delay_unit * factor
}

#[derive(Default)]
pub struct StunRequestManagerBuilder {
    settings: RequestSettings,
}

impl StunRequestManagerBuilder {
    pub fn new() -> Self {
        StunRequestManagerBuilder {
            settings: RequestSettings::default(),
        }
    }

    /// with_max_sends sets how many times a request is sent before it times out.
    pub fn with_max_sends(mut self, max_sends: u32) -> Self {
        self.settings.max_sends = max_sends;
        self
    }

    /// with_delay_unit sets the base retransmission delay.
    pub fn with_delay_unit(mut self, delay_unit: Duration) -> Self {
        self.settings.delay_unit = delay_unit;
        self
    }

    /// with_max_delay_factor caps the backoff multiplier.
    pub fn with_max_delay_factor(mut self, factor: u32) -> Self {
        self.settings.max_delay_factor = factor;
        self
    }

    pub fn build<T>(self) -> StunRequestManager<T> {
        StunRequestManager::with_settings(self.settings)
    }
}

/// StunRequestManager correlates outgoing requests with their responses and
/// drives retransmission over an unreliable transport.
pub struct StunRequestManager<T> {
    settings: RequestSettings,
    requests: HashMap<TransactionId, RequestState<T>>,
    transmits: VecDeque<Transmit>,
    events: VecDeque<StunRequestEvent<T>>,
    closed: bool,
}

impl<T> Default for StunRequestManager<T> {
    fn default() -> Self {
        Self::with_settings(RequestSettings::default())
    }
}

impl<T> StunRequestManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_settings(settings: RequestSettings) -> Self {
        Self {
            settings,
            requests: HashMap::new(),
            transmits: VecDeque::new(),
            events: VecDeque::new(),
            closed: false,
        }
    }

    /// send puts `request` on the wire now, or after its delay if it has one,
    /// and keeps retransmitting until a response arrives or it times out.
    pub fn send(&mut self, request: StunRequest<T>) -> Result<()> {
        if self.closed {
            return Err(Error::ErrRequestManagerClosed);
        }

        let id = request.id();
        if self.requests.contains_key(&id) {
            return Err(Error::ErrDuplicatedTransactionId);
        }

        let raw = request.message.marshal();
        let start = request.created;
        let deadline = start + request.delay;
        let immediate = request.delay.is_zero();
        self.requests.insert(
            id,
            RequestState {
                request,
                raw,
                count: 0,
                timed_out: false,
                deadline,
                sent_at: None,
            },
        );

        if immediate {
            self.fire(id, start);
        }

        Ok(())
    }

    /// send_delayed schedules the first transmission of `request` `delay` after its creation.
    pub fn send_delayed(&mut self, request: StunRequest<T>, delay: Duration) -> Result<()> {
        self.send(request.with_delay(delay))
    }

    /// remove drops an outstanding request without reporting an outcome.
    pub fn remove(&mut self, id: &TransactionId) -> Option<StunRequest<T>> {
        self.requests.remove(id).map(|state| state.request)
    }

    /// clear drops every outstanding request without reporting outcomes.
    pub fn clear(&mut self) {
        self.requests.clear();
        self.transmits.clear();
    }

    pub fn has_request(&self, id: &TransactionId) -> bool {
        self.requests.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// check_response matches `buf` against the outstanding requests.
    ///
    /// Returns true if the datagram answered one of them. Unparsable
    /// datagrams, non-responses and unknown transactions are dropped.
    pub fn check_response(&mut self, buf: &[u8], now: Instant) -> bool {
        let response = match Message::unmarshal(buf) {
            Ok(response) => response,
            Err(err) => {
                debug!("dropping malformed stun message: {err}");
                return false;
            }
        };

        if !response.typ.class.is_response() {
            debug!("dropping stun {} which is not a response", response.typ);
            return false;
        }

        let Some(state) = self.requests.get(&response.transaction_id) else {
            debug!(
                "dropping stun response for unknown transaction {}",
                response.transaction_id
            );
            return false;
        };

        if response.typ.method != state.request.message.typ.method {
            warn!(
                "received response with wrong type: {} (expecting {})",
                response.typ,
                MessageType::new(
                    state.request.message.typ.method,
                    MessageClass::SuccessResponse
                )
            );
            return false;
        }

        let Some(state) = self.requests.remove(&response.transaction_id) else {
            return false;
        };
        let StunRequest {
            destination,
            context,
            ..
        } = state.request;

        if response.typ.class == MessageClass::SuccessResponse {
            let rtt = state
                .sent_at
                .map(|sent_at| now.saturating_duration_since(sent_at))
                .unwrap_or_default();
            self.events.push_back(StunRequestEvent::Response {
                destination,
                context,
                response,
                rtt,
            });
        } else {
            self.events.push_back(StunRequestEvent::ErrorResponse {
                destination,
                context,
                response,
            });
        }

        true
    }

    // fire either transmits the request again or, once its sends are used
    // up, completes it with a timeout.
    fn fire(&mut self, id: TransactionId, now: Instant) {
        let Some(state) = self.requests.get_mut(&id) else {
            return;
        };

        if state.timed_out {
            if let Some(state) = self.requests.remove(&id) {
                debug!(
                    "stun request {} to {} timed out after {} sends",
                    id, state.request.destination, state.count
                );
                self.events.push_back(StunRequestEvent::Timeout {
                    destination: state.request.destination,
                    context: state.request.context,
                });
            }
            return;
        }

        trace!(
            "sending stun request {} to {} (attempt {})",
            id,
            state.request.destination,
            state.count + 1
        );
        self.transmits.push_back(Transmit {
            now,
            remote: state.request.destination,
            payload: state.raw.clone(),
        });
        state.sent_at = Some(now);

        let delay = next_delay(&self.settings, state.count);
        state.count += 1;
        if state.count >= self.settings.max_sends {
            state.timed_out = true;
        }
        state.deadline = now + delay;
    }
}

impl<T> sansio::Protocol<TaggedBytesMut, StunRequest<T>, ()> for StunRequestManager<T> {
    type Rout = ();
    type Wout = Transmit;
    type Eout = StunRequestEvent<T>;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        self.check_response(&msg.message, msg.now);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, request: StunRequest<T>) -> Result<()> {
        self.send(request)
    }

    /// Returns packets to transmit
    ///
    /// It should be polled for transmit after:
    /// - a call was made to `handle_write`
    /// - a call was made to `handle_timeout`
    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.transmits.pop_front()
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        let mut due: Vec<(Instant, TransactionId)> = self
            .requests
            .iter()
            .filter(|(_, state)| state.deadline <= now)
            .map(|(id, state)| (state.deadline, *id))
            .collect();
        due.sort();

        for (_, id) in due {
            self.fire(id, now);
        }

        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        self.requests.values().map(|state| state.deadline).min()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.requests.clear();
        self.transmits.clear();
        self.events.clear();
        Ok(())
    }
}
