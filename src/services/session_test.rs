use super::*;
use crate::event::{BoardStatePayload, ErrorCode};
use crate::model::ElementKind;
use crate::services::batcher::TaskKind;
use crate::state::test_helpers::{
    HoldPoint, RecordingStore, advance, assert_no_event, connect_session, drain, recv_event, seed_board, seed_user, sticky,
    stroke, test_app_state,
};
use crate::store::BoardStore;
use std::sync::Arc;

fn join(board_id: Uuid) -> ClientEvent {
    ClientEvent::JoinBoard { board_id: board_id.to_string() }
}

async fn joined(state: &AppState, session: &mut Session, board_id: Uuid) -> BoardStatePayload {
    let mut events = session.handle(state, join(board_id)).await;
    assert_eq!(events.len(), 1, "join returns exactly the hydration payload");
    match events.remove(0) {
        ServerEvent::BoardState(payload) => *payload,
        other => panic!("expected board-state, got {other:?}"),
    }
}

async fn persisted_strokes(store: &Arc<RecordingStore>, board_id: Uuid) -> usize {
    store
        .get_board(board_id)
        .await
        .unwrap()
        .unwrap()
        .canvas
        .strokes
        .len()
}

// =============================================================================
// join / leave
// =============================================================================

#[tokio::test]
async fn join_hydrates_joiner_and_announces_to_others() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, mut ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);

    let first = joined(&state, &mut a, board_id).await;
    assert_eq!(first.board.id, board_id);
    assert_eq!(first.users.len(), 1);
    assert_eq!(a.state(), SessionState::Bound(board_id));

    let second = joined(&state, &mut b, board_id).await;
    let names: Vec<&str> = second.users.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, ["ada", "bob"]);

    match recv_event(&mut ra).await {
        ServerEvent::UserJoined(member) => {
            assert_eq!(member.session_id, b.id);
            assert_eq!(member.user_id, bob.id);
            assert_eq!(member.username, "bob");
        }
        other => panic!("expected user-joined, got {other:?}"),
    }
    assert_no_event(&mut ra);
    assert_no_event(&mut rb);
}

#[tokio::test]
async fn join_unknown_board_is_an_error_without_state_change() {
    let (state, store) = test_app_state();
    let ada = seed_user(&store, "ada");
    let (mut a, _ra) = connect_session(&state, &ada);

    for raw in [Uuid::new_v4().to_string(), "b1".to_owned()] {
        let events = a
            .handle(&state, ClientEvent::JoinBoard { board_id: raw })
            .await;
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::Error { code, .. }] if code == "E_BOARD_NOT_FOUND"
        ));
    }
    assert_eq!(a.state(), SessionState::Unbound);
    assert_eq!(state.rooms.room_count().await, 0);
}

#[tokio::test]
async fn join_store_failure_reports_join_failed() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let (mut a, _ra) = connect_session(&state, &ada);

    store.set_fail_reads(true);
    let events = a.handle(&state, join(board_id)).await;

    let [ServerEvent::Error { code, message }] = events.as_slice() else {
        panic!("expected one error event, got {events:?}");
    };
    assert_eq!(code, "E_JOIN_FAILED");
    assert_eq!(message, "failed to join board");
    assert_eq!(a.state(), SessionState::Unbound);
    assert!(!state.rooms.contains(board_id).await);
}

#[tokio::test]
async fn chat_sent_while_joiner_hydrates_reaches_it_once() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut a, board_id).await;

    // Park B's join right after its history read.
    store.hold_next(HoldPoint::RecentMessages);
    let join_task = {
        let state = state.clone();
        tokio::spawn(async move {
            let events = b.handle(&state, join(board_id)).await;
            (b, events)
        })
    };
    store.reached.notified().await;

    let echo = a
        .handle(&state, ClientEvent::ChatMessage { text: "hello".into() })
        .await;
    assert_eq!(echo.len(), 1);
    store.release.notify_one();
    let (b, events) = join_task.await.unwrap();

    let [ServerEvent::BoardState(payload)] = events.as_slice() else {
        panic!("expected board-state, got {events:?}");
    };
    let in_history = payload
        .messages
        .iter()
        .filter(|m| m.text == "hello")
        .count();
    let live = drain(&mut rb)
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::ChatMessage(m) if m.text == "hello"))
        .count();
    assert_eq!(in_history + live, 1, "history={in_history} live={live}");
    assert_eq!(b.state(), SessionState::Bound(board_id));
}

#[tokio::test]
async fn hydration_failure_restores_previous_room() {
    let (state, store) = test_app_state();
    let b1 = seed_board(&store);
    let b2 = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, b1).await;
    joined(&state, &mut a, b1).await;
    drain(&mut rb);

    // The existence check passes, then every hydration read fails.
    store.hold_next(HoldPoint::GetBoard);
    let join_task = {
        let state = state.clone();
        tokio::spawn(async move {
            let events = a.handle(&state, join(b2)).await;
            (a, events)
        })
    };
    store.reached.notified().await;
    store.set_fail_reads(true);
    store.release.notify_one();
    let (a, events) = join_task.await.unwrap();
    store.set_fail_reads(false);

    assert!(matches!(events.as_slice(), [ServerEvent::Error { code, .. }] if code == "E_JOIN_FAILED"));
    assert_eq!(a.state(), SessionState::Bound(b1));
    assert_eq!(state.rooms.board_of(a.id).await, Some(b1));
    assert_eq!(state.rooms.list_members(b1).await.len(), 2);
    assert!(!state.rooms.contains(b2).await);
    assert_no_event(&mut rb);
}

#[test]
fn session_error_codes() {
    assert_eq!(SessionError::BoardNotFound("x".into()).error_code(), "E_BOARD_NOT_FOUND");
    assert_eq!(
        SessionError::JoinFailed(StoreError::Unavailable("down".into())).error_code(),
        "E_JOIN_FAILED"
    );
}

#[tokio::test]
async fn rejoining_same_board_rehydrates_without_reannouncing() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);

    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;
    let again = joined(&state, &mut a, board_id).await;

    assert_eq!(again.users.len(), 2);
    assert!(matches!(recv_event(&mut rb).await, ServerEvent::UserJoined(_)));
    assert_no_event(&mut rb);
}

#[tokio::test]
async fn joining_another_board_leaves_the_first() {
    let (state, store) = test_app_state();
    let b1 = seed_board(&store);
    let b2 = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, b1).await;
    joined(&state, &mut a, b1).await;
    drain(&mut rb);

    let payload = joined(&state, &mut a, b2).await;

    assert_eq!(payload.board.id, b2);
    assert_eq!(state.rooms.board_of(a.id).await, Some(b2));
    assert_eq!(state.rooms.list_members(b1).await.len(), 1);
    match recv_event(&mut rb).await {
        ServerEvent::UserLeft { session_id, user_id, username } => {
            assert_eq!(session_id, a.id);
            assert_eq!(user_id, ada.id);
            assert_eq!(username, "ada");
        }
        other => panic!("expected user-left, got {other:?}"),
    }
}

#[tokio::test]
async fn leave_board_announces_and_unbinds() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;
    drain(&mut rb);

    assert!(a.handle(&state, ClientEvent::LeaveBoard).await.is_empty());

    assert_eq!(a.state(), SessionState::Unbound);
    assert!(matches!(recv_event(&mut rb).await, ServerEvent::UserLeft { session_id, .. } if session_id == a.id));
    assert_eq!(state.rooms.list_members(board_id).await.len(), 1);

    // Leaving again is a no-op.
    a.handle(&state, ClientEvent::LeaveBoard).await;
    assert_no_event(&mut rb);
}

#[tokio::test]
async fn last_leave_deletes_room() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let (mut a, _ra) = connect_session(&state, &ada);
    joined(&state, &mut a, board_id).await;

    a.leave_board(&state).await;
    assert!(!state.rooms.contains(board_id).await);
}

#[tokio::test]
async fn disconnect_is_terminal() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;
    drain(&mut rb);

    a.disconnect(&state).await;

    assert_eq!(a.state(), SessionState::Disconnected);
    assert!(matches!(recv_event(&mut rb).await, ServerEvent::UserLeft { .. }));
    assert!(a.handle(&state, join(board_id)).await.is_empty());
    assert!(
        a.handle(&state, ClientEvent::ChatMessage { text: "ghost".into() })
            .await
            .is_empty()
    );
    assert_no_event(&mut rb);
    assert_eq!(state.rooms.list_members(board_id).await.len(), 1);
}

#[tokio::test]
async fn same_user_may_hold_two_sessions() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let (mut tab1, _r1) = connect_session(&state, &ada);
    let (mut tab2, mut r2) = connect_session(&state, &ada);

    joined(&state, &mut tab1, board_id).await;
    let payload = joined(&state, &mut tab2, board_id).await;
    assert_eq!(payload.users.len(), 2);
    assert!(payload.users.iter().all(|m| m.user_id == ada.id));

    tab1.disconnect(&state).await;
    assert!(matches!(recv_event(&mut r2).await, ServerEvent::UserLeft { session_id, .. } if session_id == tab1.id));
    assert!(state.rooms.contains(board_id).await);
}

#[tokio::test]
async fn board_events_before_join_are_dropped() {
    let (state, store) = test_app_state();
    let ada = seed_user(&store, "ada");
    let (mut a, _ra) = connect_session(&state, &ada);

    let events = [
        ClientEvent::CanvasStroke(stroke(0.5)),
        ClientEvent::CanvasClear,
        ClientEvent::ChatMessage { text: "hi".into() },
        ClientEvent::NotesUpdate { content: "n".into() },
        ClientEvent::BoardNameUpdate { name: "x".into() },
    ];
    for event in events {
        assert!(a.handle(&state, event).await.is_empty());
    }
    assert!(store.calls().is_empty());
    assert_eq!(a.state(), SessionState::Unbound);
}

// =============================================================================
// strokes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn stroke_is_live_immediately_and_durable_after_flush() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let carol = seed_user(&store, "carol");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, _rb) = connect_session(&state, &bob);
    let (mut c, _rc) = connect_session(&state, &carol);

    joined(&state, &mut a, board_id).await;
    assert!(
        a.handle(&state, ClientEvent::CanvasStroke(stroke(1.0)))
            .await
            .is_empty()
    );

    let for_b = joined(&state, &mut b, board_id).await;
    assert!(for_b.board.canvas.strokes.is_empty(), "flush delay has not elapsed");

    advance(5001).await;

    let for_c = joined(&state, &mut c, board_id).await;
    assert_eq!(for_c.board.canvas.strokes, vec![stroke(1.0)]);
    assert_eq!(store.canvas_writes(), 1);
}

#[tokio::test]
async fn stroke_broadcast_reaches_peers_with_actor() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, mut ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut a, board_id).await;
    joined(&state, &mut b, board_id).await;
    drain(&mut ra);

    a.handle(&state, ClientEvent::CanvasStroke(stroke(0.25)))
        .await;

    match recv_event(&mut rb).await {
        ServerEvent::CanvasStroke { actor, stroke: s } => {
            assert_eq!(actor, a.actor());
            assert_ne!(actor.session_id, actor.user_id);
            assert_eq!(s, stroke(0.25));
        }
        other => panic!("expected canvas-stroke, got {other:?}"),
    }
    assert_no_event(&mut ra);
}

#[tokio::test]
async fn stroke_out_of_range_is_clamped_and_nan_dropped() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;

    a.handle(&state, ClientEvent::CanvasStroke(stroke(3.0)))
        .await;
    let ServerEvent::CanvasStroke { stroke: s, .. } = recv_event(&mut rb).await else {
        panic!("expected canvas-stroke");
    };
    assert_eq!(s.to, crate::model::Point::new(1.0, 1.0));

    a.handle(&state, ClientEvent::CanvasStroke(stroke(f64::NAN)))
        .await;
    assert_no_event(&mut rb);
    assert_eq!(state.batcher.pending_stroke_count(board_id), 1);
}

#[tokio::test]
async fn last_leave_settles_pending_strokes() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let (mut a, _ra) = connect_session(&state, &ada);
    joined(&state, &mut a, board_id).await;

    a.handle(&state, ClientEvent::CanvasStroke(stroke(0.5)))
        .await;
    a.disconnect(&state).await;

    assert_eq!(persisted_strokes(&store, board_id).await, 1);
    assert!(!state.batcher.is_armed(board_id, TaskKind::CanvasFlush));
}

// =============================================================================
// elements / clear
// =============================================================================

#[tokio::test(start_paused = true)]
async fn element_create_persists_now_and_updates_after_flush() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;
    drain(&mut rb);

    a.handle(&state, ClientEvent::CanvasElement(sticky("n1", 10.0, "todo")))
        .await;
    assert!(matches!(
        recv_event(&mut rb).await,
        ServerEvent::CanvasElement { ref element, .. } if element.id == "n1"
    ));
    let board = store.get_board(board_id).await.unwrap().unwrap();
    assert_eq!(board.canvas.element("n1"), Some(&sticky("n1", 10.0, "todo")));

    for x in [20.0, 30.0, 40.0] {
        a.handle(
            &state,
            ClientEvent::CanvasElementUpdate(ElementPatch { id: "n1".into(), x: Some(x), ..Default::default() }),
        )
        .await;
    }
    assert_eq!(drain(&mut rb).len(), 3);

    advance(5001).await;
    let board = store.get_board(board_id).await.unwrap().unwrap();
    assert_eq!(board.canvas.elements.len(), 1);
    let el = board.canvas.element("n1").unwrap();
    assert!((el.x - 40.0).abs() < f64::EPSILON);
    assert!(matches!(el.kind, ElementKind::StickyNote { ref text, .. } if text == "todo"));
}

#[tokio::test(start_paused = true)]
async fn late_joiner_hydrates_flushed_elements_and_strokes() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let carol = seed_user(&store, "carol");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut c, _rc) = connect_session(&state, &carol);
    joined(&state, &mut a, board_id).await;

    a.handle(&state, ClientEvent::CanvasElement(sticky("n1", 10.0, "todo")))
        .await;
    a.handle(&state, ClientEvent::CanvasElement(sticky("n2", 50.0, "later")))
        .await;
    a.handle(
        &state,
        ClientEvent::CanvasElementUpdate(ElementPatch {
            id: "n1".into(),
            x: Some(40.0),
            text: Some("done".into()),
            ..Default::default()
        }),
    )
    .await;
    a.handle(&state, ClientEvent::CanvasStroke(stroke(0.1)))
        .await;
    a.handle(&state, ClientEvent::CanvasStroke(stroke(0.2)))
        .await;
    advance(5001).await;

    let persisted = store.get_board(board_id).await.unwrap().unwrap().canvas;
    let ids: Vec<&str> = persisted.elements.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["n1", "n2"]);
    assert_eq!(persisted.element("n1"), Some(&sticky("n1", 40.0, "done")));
    assert_eq!(persisted.element("n2"), Some(&sticky("n2", 50.0, "later")));
    assert_eq!(persisted.strokes, vec![stroke(0.1), stroke(0.2)]);

    let for_c = joined(&state, &mut c, board_id).await;
    assert_eq!(for_c.board.canvas, persisted);
}

#[tokio::test]
async fn malformed_elements_are_dropped() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;
    drain(&mut rb);

    a.handle(&state, ClientEvent::CanvasElement(sticky("", 0.0, "")))
        .await;
    a.handle(&state, ClientEvent::CanvasElement(sticky("x", f64::INFINITY, "")))
        .await;
    a.handle(
        &state,
        ClientEvent::CanvasElementUpdate(ElementPatch { id: "x".into(), y: Some(f64::NAN), ..Default::default() }),
    )
    .await;

    assert_no_event(&mut rb);
    assert_eq!(store.canvas_writes(), 0);
    assert!(!state.batcher.has_pending(board_id));
}

#[tokio::test]
async fn clear_broadcasts_and_resets_canvas() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;

    a.handle(&state, ClientEvent::CanvasElement(sticky("n1", 0.0, "")))
        .await;
    a.handle(&state, ClientEvent::CanvasStroke(stroke(0.5)))
        .await;
    drain(&mut rb);

    a.handle(&state, ClientEvent::CanvasClear).await;

    assert!(matches!(recv_event(&mut rb).await, ServerEvent::CanvasClear { actor } if actor.session_id == a.id));
    let board = store.get_board(board_id).await.unwrap().unwrap();
    assert!(board.canvas.is_empty());
    assert_eq!(state.batcher.pending_stroke_count(board_id), 0);
}

// =============================================================================
// chat / notes / name / cursor
// =============================================================================

#[tokio::test]
async fn chat_reaches_everyone_once_and_lands_in_history() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let carol = seed_user(&store, "carol");
    let (mut a, mut ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    let (mut c, _rc) = connect_session(&state, &carol);
    joined(&state, &mut a, board_id).await;
    joined(&state, &mut b, board_id).await;
    drain(&mut ra);

    b.handle(&state, ClientEvent::ChatMessage { text: "first".into() })
        .await;
    drain(&mut ra);

    let to_sender = a
        .handle(&state, ClientEvent::ChatMessage { text: "  hello ".into() })
        .await;
    let [ServerEvent::ChatMessage(sent)] = to_sender.as_slice() else {
        panic!("sender gets the message back, got {to_sender:?}");
    };
    assert_eq!(sent.text, "hello");
    assert_eq!(sent.author.id, ada.id);
    assert!(sent.created_at > 0);

    let ServerEvent::ChatMessage(seen_by_b) = recv_event(&mut rb).await else {
        panic!("expected chat-message");
    };
    assert_eq!(&seen_by_b, sent);
    assert_no_event(&mut rb);
    assert_no_event(&mut ra);

    let for_c = joined(&state, &mut c, board_id).await;
    let history: Vec<&str> = for_c.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(history, ["first", "hello"]);
}

#[tokio::test]
async fn blank_chat_is_dropped() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let (mut a, _ra) = connect_session(&state, &ada);
    joined(&state, &mut a, board_id).await;

    let events = a
        .handle(&state, ClientEvent::ChatMessage { text: "   ".into() })
        .await;
    assert!(events.is_empty());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn chat_persist_failure_is_swallowed() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;
    drain(&mut rb);

    store.set_fail_writes(true);
    let events = a
        .handle(&state, ClientEvent::ChatMessage { text: "lost".into() })
        .await;

    assert!(events.is_empty());
    assert_no_event(&mut rb);
    assert_eq!(a.state(), SessionState::Bound(board_id));
}

#[tokio::test(start_paused = true)]
async fn rapid_renames_broadcast_each_and_persist_last_once() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;
    drain(&mut rb);

    let mut echoed = Vec::new();
    for name in ["T", "Te", "Tes", "Test"] {
        let events = a
            .handle(&state, ClientEvent::BoardNameUpdate { name: name.into() })
            .await;
        echoed.extend(events);
        advance(100).await;
    }

    let seen: Vec<String> = drain(&mut rb)
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::BoardNameUpdate { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(seen, ["T", "Te", "Tes", "Test"]);
    assert_eq!(echoed.len(), 4, "sender sees its own rename");

    advance(401).await;
    assert_eq!(store.name_writes(), ["Test"]);
    assert_eq!(store.get_board(board_id).await.unwrap().unwrap().name, "Test");
}

#[tokio::test(start_paused = true)]
async fn notes_go_to_peers_and_persist_after_quiet_period() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let carol = seed_user(&store, "carol");
    let (mut a, _ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    let (mut c, _rc) = connect_session(&state, &carol);
    joined(&state, &mut b, board_id).await;
    joined(&state, &mut a, board_id).await;
    drain(&mut rb);

    for content in ["a", "ag", "agenda"] {
        let events = a
            .handle(&state, ClientEvent::NotesUpdate { content: content.into() })
            .await;
        assert!(events.is_empty(), "notes are not echoed to the sender");
    }
    assert_eq!(drain(&mut rb).len(), 3);

    advance(501).await;
    assert_eq!(store.note_writes(), ["agenda"]);
    assert_eq!(joined(&state, &mut c, board_id).await.notes, "agenda");
}

#[tokio::test]
async fn cursor_is_clamped_colored_and_not_persisted() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let ada = seed_user(&store, "ada");
    let bob = seed_user(&store, "bob");
    let (mut a, mut ra) = connect_session(&state, &ada);
    let (mut b, mut rb) = connect_session(&state, &bob);
    joined(&state, &mut a, board_id).await;
    joined(&state, &mut b, board_id).await;
    drain(&mut ra);

    b.handle(&state, ClientEvent::CursorMove(CursorPosition { x: 1.5, y: 0.25, color: None }))
        .await;
    match recv_event(&mut ra).await {
        ServerEvent::CursorUpdate { actor, x, y, color } => {
            assert_eq!(actor.session_id, b.id);
            assert!((x - 1.0).abs() < f64::EPSILON);
            assert!((y - 0.25).abs() < f64::EPSILON);
            assert_eq!(color, DEFAULT_CURSOR_COLOR);
        }
        other => panic!("expected cursor-update, got {other:?}"),
    }

    b.handle(&state, ClientEvent::CursorMove(CursorPosition { x: f64::NAN, y: 0.0, color: None }))
        .await;
    assert_no_event(&mut ra);
    assert_no_event(&mut rb);
    assert!(store.calls().is_empty());
}
