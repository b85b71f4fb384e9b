use super::*;
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use uuid::Uuid;

// =============================================================================
// Mock media
// =============================================================================

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: String) {
    log.lock().expect("log mutex should lock").push(entry);
}

struct MockAudio {
    log: Log,
}

impl LocalAudio for MockAudio {
    fn set_enabled(&self, enabled: bool) {
        push(&self.log, format!("audio-enabled:{enabled}"));
    }

    fn stop(&self) {
        push(&self.log, "audio-stop".into());
    }
}

struct MockLink {
    peer: ClientId,
    log: Log,
}

#[async_trait::async_trait]
impl PeerLink for MockLink {
    async fn create_offer(&self) -> Result<Value, MediaError> {
        push(&self.log, format!("offer:{}", self.peer));
        Ok(json!({"type": "offer", "sdp": "o"}))
    }

    async fn create_answer(&self) -> Result<Value, MediaError> {
        push(&self.log, format!("answer:{}", self.peer));
        Ok(json!({"type": "answer", "sdp": "a"}))
    }

    async fn set_remote_description(&self, _sdp: Value) -> Result<(), MediaError> {
        push(&self.log, format!("remote:{}", self.peer));
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: Value) -> Result<(), MediaError> {
        push(&self.log, format!("candidate:{}", self.peer));
        Ok(())
    }

    fn close(&self) {
        push(&self.log, format!("close:{}", self.peer));
    }
}

struct MockSink {
    peer: ClientId,
    log: Log,
}

impl AudioSink for MockSink {
    fn close(&self) {
        push(&self.log, format!("sink-close:{}", self.peer));
    }
}

#[derive(Default)]
struct MockMedia {
    log: Log,
    deny: AtomicBool,
}

#[async_trait::async_trait]
impl MediaCapability for MockMedia {
    async fn local_audio(&self) -> Result<Arc<dyn LocalAudio>, MediaError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied);
        }
        push(&self.log, "audio-open".into());
        Ok(Arc::new(MockAudio { log: self.log.clone() }))
    }

    fn create_peer_link(&self, peer: ClientId, initiator: bool, _audio: &Arc<dyn LocalAudio>) -> Arc<dyn PeerLink> {
        push(&self.log, format!("link:{peer}:{initiator}"));
        Arc::new(MockLink { peer, log: self.log.clone() })
    }

    fn create_audio_sink(&self, peer: ClientId) -> Arc<dyn AudioSink> {
        push(&self.log, format!("sink:{peer}"));
        Arc::new(MockSink { peer, log: self.log.clone() })
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    machine: CallMachine,
    media: Arc<MockMedia>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl Harness {
    fn new(me: &str) -> Self {
        let media = Arc::new(MockMedia::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut machine = CallMachine::new(media.clone(), tx);
        machine.set_identity(me);
        Self { machine, media, rx }
    }

    fn sent(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn log(&self) -> Vec<String> {
        self.media.log.lock().expect("log mutex should lock").clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// Start a call and complete the microphone request.
    async fn start(&mut self, target: ChatTarget) {
        let request = self.machine.start_call(target).expect("start allowed");
        let audio = request.audio.await;
        self.machine.on_local_audio(request.epoch, audio).expect("audio granted");
    }
}

async fn run(steps: Vec<Negotiation>) {
    for step in steps {
        step.await;
    }
}

fn syscalls(frames: &[Frame]) -> Vec<&str> {
    frames.iter().map(|f| f.syscall.as_str()).collect()
}

fn general() -> ChatTarget {
    ChatTarget::group("general")
}

// =============================================================================
// Starting
// =============================================================================

#[tokio::test]
async fn group_call_joins_after_microphone_is_granted() {
    let mut h = Harness::new("alice");
    let request = h.machine.start_call(general()).expect("start");
    assert_eq!(h.machine.phase(), CallPhase::Requesting);
    assert!(h.sent().is_empty());

    let audio = request.audio.await;
    h.machine.on_local_audio(request.epoch, audio).expect("granted");

    assert_eq!(h.machine.phase(), CallPhase::Active);
    let sent = h.sent();
    assert_eq!(syscalls(&sent), vec!["call:join"]);
    assert_eq!(sent[0].str_field("call_id"), Some("group:general"));
}

#[tokio::test]
async fn pair_call_joins_then_invites() {
    let mut h = Harness::new("alice");
    h.start(ChatTarget::pair("bob", "alice")).await;

    let sent = h.sent();
    assert_eq!(syscalls(&sent), vec!["call:join", "call:invite"]);
    assert_eq!(sent[1].str_field("call_id"), Some("pm:alice:bob"));
    assert_eq!(sent[1].str_field("to"), Some("bob"));
}

#[tokio::test]
async fn second_call_is_refused_while_one_is_active() {
    let mut h = Harness::new("alice");
    h.start(general()).await;
    h.sent();

    assert!(matches!(h.machine.start_call(ChatTarget::group("dev")), Err(CallError::AlreadyInCall)));
    assert!(h.sent().is_empty());
    assert_eq!(h.machine.call_id(), Some("group:general"));
}

#[tokio::test]
async fn call_requires_identity_and_own_pair() {
    let media = Arc::new(MockMedia::default());
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut anonymous = CallMachine::new(media, tx);
    assert!(matches!(anonymous.start_call(general()), Err(CallError::NoIdentity)));

    let mut h = Harness::new("alice");
    assert!(matches!(h.machine.start_call(ChatTarget::pair("bob", "carol")), Err(CallError::InvalidTarget(_))));
    assert_eq!(h.machine.phase(), CallPhase::Idle);
}

#[tokio::test]
async fn denied_microphone_aborts_without_joining() {
    let mut h = Harness::new("alice");
    h.media.deny.store(true, Ordering::SeqCst);

    let request = h.machine.start_call(general()).expect("start");
    let audio = request.audio.await;
    assert_eq!(h.machine.on_local_audio(request.epoch, audio), Err(CallError::PermissionDenied));

    assert_eq!(h.machine.phase(), CallPhase::Idle);
    assert!(h.sent().is_empty());
    assert!(h.machine.start_call(general()).is_ok());
}

#[tokio::test]
async fn microphone_granted_after_cancel_is_released() {
    let mut h = Harness::new("alice");
    let request = h.machine.start_call(general()).expect("start");
    h.machine.end_call();

    let audio = request.audio.await;
    assert_eq!(h.machine.on_local_audio(request.epoch, audio), Err(CallError::StaleSignal));
    assert_eq!(h.count("audio-stop"), 1);
    assert!(h.sent().is_empty());
}

// =============================================================================
// Mesh formation
// =============================================================================

#[tokio::test]
async fn joiner_offers_to_every_existing_member() {
    let mut h = Harness::new("cid");
    h.start(general()).await;
    h.sent();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let steps = h.machine.on_joined("group:general", &[a, b]).expect("current call");
    assert_eq!(steps.len(), 2);
    run(steps).await;

    assert!(h.log().contains(&format!("link:{a}:true")));
    assert!(h.log().contains(&format!("link:{b}:true")));
    let sent = h.sent();
    assert_eq!(syscalls(&sent), vec!["call:signal", "call:signal"]);
    assert!(sent.iter().all(|f| f.data["data"]["type"] == json!("offer")));
}

#[tokio::test]
async fn existing_member_waits_for_newcomer_offer() {
    let mut h = Harness::new("ann");
    h.start(general()).await;
    h.sent();
    let newcomer = Uuid::new_v4();

    h.machine.on_peer_joined("group:general", newcomer).expect("current call");
    assert!(h.log().contains(&format!("link:{newcomer}:false")));
    assert_eq!(h.count("offer:"), 0);

    let offer = json!({"type": "offer", "sdp": {"type": "offer", "sdp": "o"}});
    let step = h.machine.on_signal("group:general", newcomer, &offer).expect("current").expect("step");
    step.await;

    assert_eq!(h.count("link:"), 1);
    let sent = h.sent();
    assert_eq!(syscalls(&sent), vec!["call:signal"]);
    assert_eq!(sent[0].str_field("to"), Some(newcomer.to_string().as_str()));
    assert_eq!(sent[0].data["data"]["type"], json!("answer"));
}

#[tokio::test]
async fn peer_links_are_never_duplicated() {
    let mut h = Harness::new("ann");
    h.start(general()).await;
    let peer = Uuid::new_v4();

    h.machine.on_peer_joined("group:general", peer).expect("current");
    h.machine.on_peer_joined("group:general", peer).expect("current");
    let answer = json!({"type": "answer", "sdp": {}});
    run(h.machine.on_signal("group:general", peer, &answer).expect("current").into_iter().collect()).await;
    let steps = h.machine.on_joined("group:general", &[peer]).expect("current");

    assert!(steps.is_empty());
    assert_eq!(h.count("link:"), 1);
    assert_eq!(h.machine.peer_ids(), vec![peer]);
}

#[tokio::test]
async fn candidates_flow_both_ways() {
    let mut h = Harness::new("ann");
    h.start(general()).await;
    h.sent();
    let peer = Uuid::new_v4();
    h.machine.on_peer_joined("group:general", peer).expect("current");

    h.machine.on_local_candidate(peer, json!({"candidate": "c1"})).expect("live link");
    let sent = h.sent();
    assert_eq!(sent[0].data["data"], json!({"type": "candidate", "candidate": {"candidate": "c1"}}));

    let remote = json!({"type": "candidate", "candidate": {"candidate": "c2"}});
    h.machine.on_signal("group:general", peer, &remote).expect("current").expect("step").await;
    assert_eq!(h.count("candidate:"), 1);

    let empty = json!({"type": "candidate"});
    assert!(h.machine.on_signal("group:general", peer, &empty).expect("current").is_none());
}

#[tokio::test]
async fn malformed_signal_is_refused() {
    let mut h = Harness::new("ann");
    h.start(general()).await;
    let bogus = json!({"type": "renegotiate"});
    assert!(matches!(h.machine.on_signal("group:general", Uuid::new_v4(), &bogus), Err(CallError::Malformed)));
}

#[tokio::test]
async fn remote_track_creates_one_sink_and_peer_left_removes_both() {
    let mut h = Harness::new("ann");
    h.start(general()).await;
    let peer = Uuid::new_v4();
    h.machine.on_peer_joined("group:general", peer).expect("current");

    h.machine.on_remote_track(peer).expect("live");
    h.machine.on_remote_track(peer).expect("live");
    assert_eq!(h.count("sink:"), 1);
    assert!(h.machine.has_audio_sink(peer));

    h.machine.on_peer_left("group:general", peer).expect("current");
    assert!(h.log().contains(&format!("close:{peer}")));
    assert!(h.log().contains(&format!("sink-close:{peer}")));
    assert!(h.machine.peer_ids().is_empty());
    assert_eq!(h.machine.phase(), CallPhase::Active);
}

// =============================================================================
// Staleness and teardown
// =============================================================================

#[tokio::test]
async fn events_for_other_calls_are_stale() {
    let mut h = Harness::new("ann");
    assert!(matches!(h.machine.on_peer_joined("group:general", Uuid::new_v4()), Err(CallError::StaleSignal)));

    h.start(general()).await;
    let offer = json!({"type": "offer", "sdp": {}});
    assert!(matches!(h.machine.on_signal("group:dev", Uuid::new_v4(), &offer), Err(CallError::StaleSignal)));
    assert!(matches!(h.machine.on_local_candidate(Uuid::new_v4(), json!({})), Err(CallError::StaleSignal)));
    assert_eq!(h.count("link:"), 0);
}

#[tokio::test]
async fn negotiation_in_flight_when_call_ends_sends_nothing() {
    let mut h = Harness::new("ann");
    h.start(general()).await;
    let peer = Uuid::new_v4();
    let offer = json!({"type": "offer", "sdp": {}});
    let step = h.machine.on_signal("group:general", peer, &offer).expect("current").expect("step");

    h.machine.end_call();
    h.sent();
    step.await;

    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn end_call_leaves_then_tears_down_then_stops_audio() {
    let mut h = Harness::new("ann");
    h.start(general()).await;
    h.sent();
    let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
    h.machine.on_peer_joined("group:general", p1).expect("current");
    h.machine.on_peer_joined("group:general", p2).expect("current");
    h.machine.on_remote_track(p1).expect("live");

    h.machine.end_call();

    let sent = h.sent();
    assert_eq!(syscalls(&sent), vec!["call:leave"]);
    assert_eq!(sent[0].str_field("call_id"), Some("group:general"));

    let log = h.log();
    let stop = log.iter().position(|e| e == "audio-stop").expect("audio stopped");
    for entry in [format!("close:{p1}"), format!("close:{p2}"), format!("sink-close:{p1}")] {
        let at = log.iter().position(|e| *e == entry).expect("peer torn down");
        assert!(at < stop, "{entry} must precede audio-stop");
    }
    assert_eq!(h.machine.phase(), CallPhase::Idle);
    assert!(h.machine.peer_ids().is_empty());
    assert_eq!(h.machine.call_id(), None);
}

#[tokio::test]
async fn end_call_when_idle_is_noop() {
    let mut h = Harness::new("ann");
    h.machine.end_call();
    assert!(h.sent().is_empty());
    assert!(h.log().is_empty());
}

#[tokio::test]
async fn mute_gates_audio_without_touching_links() {
    let mut h = Harness::new("ann");
    assert!(!h.machine.set_muted(true));

    h.start(general()).await;
    let peer = Uuid::new_v4();
    h.machine.on_peer_joined("group:general", peer).expect("current");

    assert!(h.machine.set_muted(true));
    assert!(h.machine.is_muted());
    assert!(h.machine.set_muted(false));

    assert_eq!(h.count("audio-enabled:false"), 1);
    assert_eq!(h.count("audio-enabled:true"), 1);
    assert_eq!(h.count("close:"), 0);
    assert_eq!(h.count("link:"), 1);
}

#[tokio::test]
async fn navigating_away_ends_the_call() {
    let mut h = Harness::new("alice");
    h.start(general()).await;
    h.sent();

    assert!(!h.machine.navigate(ChatTarget::group("general")));
    assert_eq!(h.machine.phase(), CallPhase::Active);

    assert!(h.machine.navigate(ChatTarget::pair("alice", "bob")));
    assert_eq!(h.machine.phase(), CallPhase::Idle);
    assert_eq!(syscalls(&h.sent()), vec!["call:leave"]);
}

#[tokio::test]
async fn failed_link_ends_pair_call_only_when_last_peer() {
    let mut h = Harness::new("alice");
    h.start(ChatTarget::pair("alice", "bob")).await;
    let bob = Uuid::new_v4();
    h.machine.on_peer_joined("pm:alice:bob", bob).expect("current");

    assert!(!h.machine.on_connection_state(bob, LinkState::Connecting));
    assert!(h.machine.on_connection_state(bob, LinkState::Failed));
    assert_eq!(h.machine.phase(), CallPhase::Idle);
}

#[tokio::test]
async fn failed_link_in_group_call_drops_only_that_peer() {
    let mut h = Harness::new("ann");
    h.start(general()).await;
    let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
    h.machine.on_peer_joined("group:general", p1).expect("current");
    h.machine.on_peer_joined("group:general", p2).expect("current");

    assert!(!h.machine.on_connection_state(p1, LinkState::Disconnected));
    assert_eq!(h.machine.peer_ids(), vec![p2]);
    assert!(!h.machine.on_connection_state(p2, LinkState::Closed));
    assert_eq!(h.machine.phase(), CallPhase::Active);
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn incoming_call_rings_when_idle_and_auto_rejects_when_busy() {
    let mut h = Harness::new("bob");
    assert_eq!(h.machine.on_incoming("pm:alice:bob", "alice"), Incoming::Ringing);
    assert_eq!(h.machine.incoming().map(|i| i.from.as_str()), Some("alice"));

    // A second caller while ringing is refused outright.
    assert_eq!(h.machine.on_incoming("pm:bob:carol", "carol"), Incoming::AutoRejected);
    let sent = h.sent();
    assert_eq!(syscalls(&sent), vec!["call:reject"]);
    assert_eq!(sent[0].str_field("to"), Some("carol"));
    assert_eq!(h.machine.incoming().map(|i| i.from.as_str()), Some("alice"));
}

#[tokio::test]
async fn incoming_during_active_call_is_auto_rejected() {
    let mut h = Harness::new("bob");
    h.start(general()).await;
    h.sent();
    assert_eq!(h.machine.on_incoming("pm:alice:bob", "alice"), Incoming::AutoRejected);
    assert!(h.machine.incoming().is_none());
    assert_eq!(syscalls(&h.sent()), vec!["call:reject"]);
    assert_eq!(h.machine.phase(), CallPhase::Active);
}

#[tokio::test]
async fn accepting_switches_chat_and_joins_without_invite() {
    let mut h = Harness::new("bob");
    h.machine.navigate(general());
    h.machine.on_incoming("pm:alice:bob", "alice");

    let request = h.machine.accept_incoming().expect("ringing");
    assert_eq!(h.machine.viewing(), Some(&ChatTarget::pair("alice", "bob")));
    let audio = request.audio.await;
    h.machine.on_local_audio(request.epoch, audio).expect("granted");

    assert_eq!(syscalls(&h.sent()), vec!["call:join"]);
    assert_eq!(h.machine.call_id(), Some("pm:alice:bob"));
}

#[tokio::test]
async fn accept_with_denied_microphone_rejects_caller() {
    let mut h = Harness::new("bob");
    h.media.deny.store(true, Ordering::SeqCst);
    h.machine.on_incoming("pm:alice:bob", "alice");

    let request = h.machine.accept_incoming().expect("ringing");
    let audio = request.audio.await;
    assert_eq!(h.machine.on_local_audio(request.epoch, audio), Err(CallError::PermissionDenied));

    let sent = h.sent();
    assert_eq!(syscalls(&sent), vec!["call:reject"]);
    assert_eq!(sent[0].str_field("to"), Some("alice"));
    assert_eq!(h.machine.phase(), CallPhase::Idle);
}

#[tokio::test]
async fn reject_incoming_notifies_caller() {
    let mut h = Harness::new("bob");
    assert_eq!(h.machine.reject_incoming(), Err(CallError::NoIncomingCall));
    h.machine.on_incoming("pm:alice:bob", "alice");
    h.machine.reject_incoming().expect("ringing");
    assert_eq!(syscalls(&h.sent()), vec!["call:reject"]);
    assert!(h.machine.incoming().is_none());
}

#[tokio::test]
async fn rejected_notice_returns_caller_to_idle() {
    let mut h = Harness::new("alice");
    h.start(ChatTarget::pair("alice", "bob")).await;
    h.sent();

    assert_eq!(h.machine.on_rejected("pm:alice:carol", "carol"), Err(CallError::StaleSignal));
    h.machine.on_rejected("pm:alice:bob", "bob").expect("current call");

    assert_eq!(h.machine.phase(), CallPhase::Idle);
    assert_eq!(syscalls(&h.sent()), vec!["call:leave"]);
}

#[tokio::test]
async fn caller_going_offline_stops_ringing() {
    let mut h = Harness::new("bob");
    h.machine.on_incoming("pm:alice:bob", "alice");
    h.machine.on_roster(&["bob".to_string()]);
    assert!(h.machine.incoming().is_none());
}

// =============================================================================
// Frame dispatch
// =============================================================================

#[tokio::test]
async fn handle_frame_routes_hub_events() {
    let mut h = Harness::new("cid");
    h.start(general()).await;
    let join_req = h.sent().remove(0);
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let reply = join_req.done_with(
        serde_json::from_value(json!({"call_id": "group:general", "peers": [a]})).expect("data"),
    );
    run(h.machine.handle_frame(&reply)).await;
    assert_eq!(h.count("offer:"), 1);

    let joined = Frame::request(
        "call:peer-joined",
        serde_json::from_value(json!({"call_id": "group:general", "client_id": b})).expect("data"),
    );
    assert!(h.machine.handle_frame(&joined).is_empty());
    assert_eq!(h.machine.peer_ids().len(), 2);

    let stale = Frame::request(
        "call:peer-left",
        serde_json::from_value(json!({"call_id": "group:other", "client_id": b})).expect("data"),
    );
    h.machine.handle_frame(&stale);
    assert_eq!(h.machine.peer_ids().len(), 2);

    let garbage = Frame::request("call:signal", Data::new());
    assert!(h.machine.handle_frame(&garbage).is_empty());
}
