//! End-to-end game flows driven through the gateway dispatcher with
//! channel-backed fake connections. Timers run against tokio's paused
//! clock, so grace periods and turn delays elapse instantly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use taskroom::catalog::{Task, TaskCatalog, PENALTIES};
use taskroom::config::{GRACE_PERIOD, ROOM_EXPIRY, TURN_ADVANCE_DELAY};
use taskroom::gateway::{dispatch, AppState, ConnIdentity};
use taskroom::protocol::{ClientIntent, PhaseWire, ServerEvent, Verdict};
use taskroom::registry::RoomRegistry;
use taskroom::session;

fn app_state(catalog_size: u32) -> AppState {
    let tasks = (1..=catalog_size)
        .map(|id| Task { id, kind: "dare".into(), text: format!("task {id}") })
        .collect();
    AppState {
        registry: Arc::new(RoomRegistry::new()),
        catalog: Arc::new(TaskCatalog::from_tasks(tasks)),
    }
}

/// One fake client connection: an outbound channel pair plus the identity
/// the gateway would track for a live socket.
struct Client {
    tx: UnboundedSender<ServerEvent>,
    rx: UnboundedReceiver<ServerEvent>,
    ident: ConnIdentity,
}

impl Client {
    fn connect() -> Self {
        let (tx, rx) = unbounded_channel();
        Self { tx, rx, ident: None }
    }

    fn intend(&mut self, state: &AppState, intent: ClientIntent) {
        dispatch(state, &self.tx, &mut self.ident, intent);
    }

    /// Everything delivered since the last drain.
    fn events(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn player_id(&self) -> Uuid {
        self.ident.as_ref().expect("client is seated").1
    }

    /// Simulate the socket dropping, as the read loop does on close.
    fn drop_socket(&mut self, state: &AppState) {
        if let Some((code, player_id)) = self.ident.take() {
            session::disconnect(state, &code, player_id);
        }
    }

    fn expect_session(&mut self) -> (String, String) {
        for event in self.events() {
            if let ServerEvent::SessionCreated { token, room_code, .. } = event {
                return (token, room_code);
            }
        }
        panic!("no session_created received");
    }
}

fn new_turns(events: &[ServerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::NewTurn { player, .. } => Some(player.name.clone()),
            _ => None,
        })
        .collect()
}

fn lobby_of_two(state: &AppState) -> (Client, Client, String) {
    let mut alice = Client::connect();
    alice.intend(state, ClientIntent::CreateRoom { name: "Alice".into() });
    let (_, code) = alice.expect_session();

    let mut bob = Client::connect();
    bob.intend(state, ClientIntent::JoinRoom { room_code: code.clone(), name: "Bob".into() });
    bob.expect_session();
    (alice, bob, code)
}

#[tokio::test(start_paused = true)]
async fn scenario_create_join_start_first_turn_is_hosts() {
    let state = app_state(20);
    let (mut alice, mut bob, code) = lobby_of_two(&state);
    alice.events();

    alice.intend(&state, ClientIntent::StartGame { room_code: code.clone() });

    let alice_turns = new_turns(&alice.events());
    let bob_turns = new_turns(&bob.events());
    assert_eq!(alice_turns, vec!["Alice"], "exactly one new_turn, held by the first joiner");
    assert_eq!(bob_turns, vec!["Alice"]);

    let room = state.registry.get(&code).expect("room is live");
    assert_eq!(room.lock().round(), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_full_game_runs_ten_rounds_then_ends() {
    let state = app_state(30);
    let (mut alice, mut bob, code) = lobby_of_two(&state);
    alice.intend(&state, ClientIntent::StartGame { room_code: code.clone() });

    // 2 players x multiplier 5 = 10 rounds. The non-holder casts the only
    // required vote each round: Alice's turns get rejected, Bob's accepted.
    for _ in 0..10 {
        let turns = new_turns(&alice.events());
        let holder = turns.last().expect("a turn is open").clone();
        bob.events();
        let (voter, verdict) = if holder == "Alice" {
            (&mut bob, Verdict::NotDone)
        } else {
            (&mut alice, Verdict::Done)
        };
        voter.intend(&state, ClientIntent::SubmitVote { room_code: code.clone(), vote: verdict });
        // Let the scheduled advance fire before the next iteration.
        tokio::time::sleep(TURN_ADVANCE_DELAY + Duration::from_millis(100)).await;
    }

    let end = alice
        .events()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::GameEnd { scores, last_player } => Some((scores, last_player)),
            _ => None,
        })
        .expect("game_end after the round budget is spent");

    let (scores, last_player) = end;
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].name, "Bob");
    assert_eq!(scores[0].score, 10, "five accepted turns at +2");
    assert_eq!(scores[1].name, "Alice");
    assert_eq!(scores[1].score, -5, "five rejected turns at -1");
    assert_eq!(last_player.name, "Alice");
    assert!(PENALTIES.contains(&last_player.penalty.as_str()));

    // The finished room lingers for late viewing, then expires.
    assert!(state.registry.get(&code).is_some());
    tokio::time::sleep(ROOM_EXPIRY + Duration::from_secs(1)).await;
    assert!(state.registry.get(&code).is_none());
}

#[tokio::test(start_paused = true)]
async fn scenario_two_rejections_cost_the_holder_a_point() {
    let state = app_state(20);
    let (mut alice, mut bob, code) = lobby_of_two(&state);
    let mut carol = Client::connect();
    carol.intend(&state, ClientIntent::JoinRoom { room_code: code.clone(), name: "Carol".into() });
    carol.expect_session();

    alice.intend(&state, ClientIntent::StartGame { room_code: code.clone() });
    assert_eq!(new_turns(&alice.events()), vec!["Alice"]);
    bob.events();
    carol.events();

    bob.intend(&state, ClientIntent::SubmitVote { room_code: code.clone(), vote: Verdict::NotDone });
    assert!(bob.events().is_empty(), "turn must not resolve before the last vote");
    carol.intend(&state, ClientIntent::SubmitVote { room_code: code.clone(), vote: Verdict::NotDone });

    let result = carol
        .events()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::TurnResult { message, scores } => Some((message, scores)),
            _ => None,
        })
        .expect("turn_result after all votes are in");
    assert!(result.0.contains("couldn't convince"));
    let alice_score = result.1.iter().find(|s| s.name == "Alice").unwrap().score;
    assert_eq!(alice_score, -1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_within_grace_restores_the_seat() {
    let state = app_state(20);
    let mut alice = Client::connect();
    alice.intend(&state, ClientIntent::CreateRoom { name: "Alice".into() });
    let (_, code) = alice.expect_session();

    let mut bob = Client::connect();
    bob.intend(&state, ClientIntent::JoinRoom { room_code: code.clone(), name: "Bob".into() });
    let (bob_token, _) = bob.expect_session();
    let bob_id = bob.player_id();

    alice.intend(&state, ClientIntent::StartGame { room_code: code.clone() });
    bob.drop_socket(&state);

    // Alice sees the connected-only roster shrink.
    let roster = alice
        .events()
        .into_iter()
        .rev()
        .find_map(|e| match e {
            ServerEvent::UpdatePlayerList { players } => Some(players),
            _ => None,
        })
        .expect("roster update on disconnect");
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].name, "Alice");

    // A fresh connection presents only the token, no room hint.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut bob_again = Client::connect();
    bob_again.intend(
        &state,
        ClientIntent::ReconnectWithToken { token: bob_token.clone(), room_code: None },
    );
    let snapshot = bob_again
        .events()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::ReconnectSuccess { room } => Some(room),
            _ => None,
        })
        .expect("reconnect_success");
    assert_eq!(snapshot.code, code);
    assert_eq!(snapshot.phase, PhaseWire::InProgress);
    assert!(snapshot.current_task.is_some(), "snapshot carries the open turn");
    assert_eq!(bob_again.player_id(), bob_id, "same seat, same identity");

    // The stale grace timer fires and must not reap the reconnected player.
    tokio::time::sleep(GRACE_PERIOD).await;
    let room = state.registry.get(&code).expect("room survives");
    assert!(room.lock().player(bob_id).is_some());
    assert!(room.lock().player(bob_id).unwrap().connected);
}

#[tokio::test(start_paused = true)]
async fn grace_expiry_removes_the_player_and_migrates_host() {
    let state = app_state(20);
    let (mut alice, mut bob, code) = lobby_of_two(&state);
    let mut carol = Client::connect();
    carol.intend(&state, ClientIntent::JoinRoom { room_code: code.clone(), name: "Carol".into() });
    carol.expect_session();
    let alice_id = alice.player_id();
    let bob_id = bob.player_id();

    alice.drop_socket(&state);
    tokio::time::sleep(GRACE_PERIOD + Duration::from_secs(1)).await;

    let room = state.registry.get(&code).expect("room survives with two players");
    {
        let r = room.lock();
        assert!(r.player(alice_id).is_none(), "silence past the grace window is final");
        assert_eq!(r.host_id, bob_id, "earliest-joined remaining player hosts");
        assert_eq!(r.players.len(), 2);
    }
    // Both remaining players heard about the removal.
    assert!(bob.events().iter().any(|e| matches!(e, ServerEvent::UpdatePlayerList { players } if players.len() == 2)));
}

#[tokio::test(start_paused = true)]
async fn losing_too_many_players_ends_the_game_and_room() {
    let state = app_state(20);
    let (mut alice, mut bob, code) = lobby_of_two(&state);
    alice.intend(&state, ClientIntent::StartGame { room_code: code.clone() });

    bob.drop_socket(&state);
    tokio::time::sleep(GRACE_PERIOD + Duration::from_secs(1)).await;

    let ended = alice.events().into_iter().any(|e| matches!(e, ServerEvent::GameEnd { .. }));
    assert!(ended, "dropping below two players ends an in-progress game");

    tokio::time::sleep(ROOM_EXPIRY + Duration::from_secs(1)).await;
    assert!(state.registry.get(&code).is_none(), "ended room is torn down");
}

#[tokio::test(start_paused = true)]
async fn empty_room_is_destroyed_at_grace_expiry() {
    let state = app_state(20);
    let mut alice = Client::connect();
    alice.intend(&state, ClientIntent::CreateRoom { name: "Alice".into() });
    let (_, code) = alice.expect_session();

    alice.drop_socket(&state);
    tokio::time::sleep(GRACE_PERIOD + Duration::from_secs(1)).await;
    assert!(state.registry.get(&code).is_none());
}

#[tokio::test(start_paused = true)]
async fn join_errors_reach_only_the_offender() {
    let state = app_state(20);
    let (mut alice, mut bob, code) = lobby_of_two(&state);
    alice.events();
    bob.events();

    let mut eve = Client::connect();
    eve.intend(&state, ClientIntent::JoinRoom { room_code: "ZZZZZZ".into(), name: "Eve".into() });
    assert!(matches!(
        eve.events().as_slice(),
        [ServerEvent::Error { message }] if message == "Room not found."
    ));

    eve.intend(&state, ClientIntent::JoinRoom { room_code: code.clone(), name: "ALICE".into() });
    assert!(matches!(
        eve.events().as_slice(),
        [ServerEvent::Error { message }] if message.contains("already in the room")
    ));

    alice.intend(&state, ClientIntent::StartGame { room_code: code.clone() });
    eve.intend(&state, ClientIntent::JoinRoom { room_code: code, name: "Eve".into() });
    assert!(matches!(
        eve.events().as_slice(),
        [ServerEvent::Error { message }] if message == "The game has already started."
    ));

    // The rejected joins never touched the room's members.
    assert!(!alice.events().iter().any(|e| matches!(e, ServerEvent::Error { .. })));
    assert!(!bob.events().iter().any(|e| matches!(e, ServerEvent::Error { .. })));
}

#[tokio::test(start_paused = true)]
async fn pass_resolves_the_turn_without_scoring() {
    let state = app_state(20);
    let (mut alice, mut bob, code) = lobby_of_two(&state);
    alice.intend(&state, ClientIntent::StartGame { room_code: code.clone() });
    alice.events();
    bob.events();

    // A non-holder pass is ignored outright.
    bob.intend(&state, ClientIntent::PassTask { room_code: code.clone() });
    assert!(bob.events().is_empty());

    alice.intend(&state, ClientIntent::PassTask { room_code: code.clone() });
    let result = bob
        .events()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::TurnResult { message, scores } => Some((message, scores)),
            _ => None,
        })
        .expect("pass produces a turn_result");
    assert!(result.0.contains("passed this turn"));
    assert!(result.1.iter().all(|s| s.score == 0));

    // The next turn belongs to Bob once the display delay has run.
    tokio::time::sleep(TURN_ADVANCE_DELAY + Duration::from_millis(100)).await;
    assert_eq!(new_turns(&bob.events()), vec!["Bob"]);
}
