
use futures::future::join_all;
use game_core::{AnswerCollector, EngineError, GameEvent, RoomRepository, SessionStore, keys};
use game_server::game_manager::GameManagerSettings;
use game_server::scheduler::JobKind;
use game_types::{DEFAULT_LETTERS, ErrorKind, GameConfig, GameMode, GameState, Player, Room, Stage};
use std::time::Duration;
use test_helpers::*;

#[tokio::test]
async fn test_single_round_game_end_to_end() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice", "Bob"]).await;
    let (alice, bob) = (&players[0], &players[1]);
    let game_id = setup
        .create_room(&players, settings(&["Animal", "Food"], 1))
        .await;

    let state = setup.game_manager.start_round(&game_id).await.unwrap();
    assert_eq!(state.stage, Stage::Active);
    let letter = state.current_letter().unwrap();

    let alice_answers = [
        ("Animal", word_for(letter, "nt")),
        ("Food", word_for(letter, "pple")),
    ];
    let alice_answers: Vec<(&str, &str)> =
        alice_answers.iter().map(|(c, a)| (*c, a.as_str())).collect();
    setup
        .game_manager
        .submit_answer(&game_id, &alice.id, answer_set(&alice_answers), Some(1))
        .await
        .unwrap();
    setup
        .game_manager
        .submit_answer(&game_id, &bob.id, answer_set(&[("Animal", "xyz")]), None)
        .await
        .unwrap();

    let state = setup
        .game_manager
        .end_round(&game_id, Some(&alice.id))
        .await
        .unwrap();
    assert_eq!(state.stage, Stage::Ending);

    setup.wait_for_stage(&game_id, Stage::Review).await;
    let room = setup.game_manager.get_room(&game_id).await.unwrap();
    let round = room.state.current_round.as_ref().unwrap();
    assert_eq!(round.ended_by_player.as_deref(), Some(alice.id.as_str()));
    assert_eq!(round.score_total(&alice.id), 2);
    // X is not in the default pool, so "xyz" never matches
    assert_eq!(round.score_total(&bob.id), 0);

    let state = setup.game_manager.start_round(&game_id).await.unwrap();
    assert_eq!(state.stage, Stage::Finished);
    let totals = state.final_scores.unwrap();
    assert_eq!(totals[&alice.id], 2);
    assert_eq!(totals[&bob.id], 0);
    assert!(state.next_game_id.is_some());
    assert!(setup.game_manager.pending_jobs().is_empty());

    assert_eq!(
        setup.events.count(|e| matches!(e, GameEvent::RoundEnded { .. })),
        1
    );
    assert_eq!(
        setup.events.count(|e| matches!(e, GameEvent::OpponentProgress { .. })),
        1
    );
}

#[tokio::test]
async fn test_submission_inside_grace_window_is_scored() {
    let setup = TestGameServerSetup::with_grace(Duration::from_millis(200));
    let players = setup.create_players(&["Alice", "Bob"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 2)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    let letter = setup.letter(&game_id).await;
    setup
        .game_manager
        .end_round(&game_id, Some(&players[0].id))
        .await
        .unwrap();

    // Bob's last answer arrives after the stop but before finalize
    let late = word_for(letter, "ardvark");
    setup
        .game_manager
        .submit_answer(
            &game_id,
            &players[1].id,
            answer_set(&[("Animal", late.as_str())]),
            None,
        )
        .await
        .unwrap();

    setup.wait_for_stage(&game_id, Stage::Review).await;
    let room = setup.game_manager.get_room(&game_id).await.unwrap();
    let round = room.state.current_round.unwrap();
    assert_eq!(round.score_total(&players[1].id), 1);
    assert_eq!(round.answers[&players[1].id]["Animal"], late);

    // Answers are cleared once scored, and the window is now closed
    assert_eq!(
        setup
            .game_manager
            .retrieve_answers(&game_id, &players[1].id)
            .await
            .unwrap(),
        None
    );
    let err = setup
        .game_manager
        .submit_answer(&game_id, &players[1].id, answer_set(&[("Animal", "x")]), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalTransition);
}

#[tokio::test]
async fn test_finalize_runs_exactly_once() {
    let setup = TestGameServerSetup::with_grace(Duration::from_secs(30));
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    setup.game_manager.end_round(&game_id, None).await.unwrap();

    let pending = setup.game_manager.pending_jobs();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, JobKind::Finalize);
    assert_eq!(pending[0].round_index, 0);

    let (first, second) = tokio::join!(
        setup.game_manager.finalize_round(&game_id, 0),
        setup.game_manager.finalize_round(&game_id, 0),
    );
    assert!(first.unwrap() ^ second.unwrap());

    let version = setup.game_manager.get_room(&game_id).await.unwrap().state.version;
    assert!(!setup.game_manager.finalize_round(&game_id, 0).await.unwrap());
    let room = setup.game_manager.get_room(&game_id).await.unwrap();
    assert_eq!(room.state.stage, Stage::Review);
    assert_eq!(room.state.version, version);

    assert_eq!(
        setup.events.count(|e| matches!(e, GameEvent::RoundEnded { .. })),
        1
    );
}

#[tokio::test]
async fn test_stale_finalize_for_old_round_is_ignored() {
    let setup = TestGameServerSetup::with_grace(Duration::from_secs(30));
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    setup.game_manager.end_round(&game_id, None).await.unwrap();
    assert!(setup.game_manager.finalize_round(&game_id, 0).await.unwrap());
    setup.game_manager.start_round(&game_id).await.unwrap();

    // A finalize for round 0 must not touch round 1
    assert!(!setup.game_manager.finalize_round(&game_id, 0).await.unwrap());
    let room = setup.game_manager.get_room(&game_id).await.unwrap();
    assert_eq!(room.state.stage, Stage::Active);
    assert_eq!(room.state.current_round.unwrap().index, 1);
}

#[tokio::test]
async fn test_start_round_while_active_is_rejected() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    let before = setup.game_manager.get_room(&game_id).await.unwrap();

    let err = setup.game_manager.start_round(&game_id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::IllegalTransition {
            stage: Stage::Active,
            ..
        }
    ));

    let after = setup.game_manager.get_room(&game_id).await.unwrap();
    assert_eq!(before.state, after.state);
}

#[tokio::test]
async fn test_store_outage_reports_error_and_leaves_state_intact() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;
    let before = setup.game_manager.get_room(&game_id).await.unwrap();

    setup.store.set_offline(true);
    let err = setup.game_manager.start_round(&game_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(err.kind().is_retryable());
    assert!(setup.game_manager.pending_jobs().is_empty());
    setup.store.set_offline(false);

    let after = setup.game_manager.get_room(&game_id).await.unwrap();
    assert_eq!(before.state, after.state);

    let state = setup.game_manager.start_round(&game_id).await.unwrap();
    assert_eq!(state.stage, Stage::Active);
}

#[tokio::test]
async fn test_concurrent_submissions_are_all_kept() {
    let setup = TestGameServerSetup::with_grace(Duration::from_secs(30));
    let names: Vec<String> = (0..8).map(|i| format!("Player{}", i)).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let players = setup.create_players(&name_refs).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    let letter = setup.letter(&game_id).await;

    let answers: Vec<String> = (0..players.len())
        .map(|i| word_for(letter, &format!("nswer{}", i)))
        .collect();
    let submissions = players.iter().zip(&answers).map(|(player, answer)| {
        setup.game_manager.submit_answer(
            &game_id,
            &player.id,
            answer_set(&[("Animal", answer.as_str())]),
            Some(0),
        )
    });
    for result in join_all(submissions).await {
        result.unwrap();
    }
    assert_eq!(
        setup.events.count(|e| matches!(e, GameEvent::OpponentProgress { .. })),
        players.len()
    );

    setup.game_manager.end_round(&game_id, None).await.unwrap();
    assert!(setup.game_manager.finalize_round(&game_id, 0).await.unwrap());

    let round = setup
        .game_manager
        .get_room(&game_id)
        .await
        .unwrap()
        .state
        .current_round
        .unwrap();
    for player in &players {
        assert_eq!(round.score_total(&player.id), 1);
    }
}

#[tokio::test]
async fn test_submission_from_outsider_is_rejected() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice", "Mallory"]).await;
    let game_id = setup
        .create_room(&players[..1], settings(&["Animal"], 3))
        .await;
    setup.game_manager.start_round(&game_id).await.unwrap();

    let err = setup
        .game_manager
        .submit_answer(&game_id, &players[1].id, answer_set(&[("Animal", "a")]), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_timer_round_times_out_without_a_stopper() {
    let setup = TestGameServerSetup::with_grace(Duration::from_secs(30));
    let players = setup.create_players(&["Alice"]).await;
    let mut timed = settings(&["Animal"], 3);
    timed.mode = GameMode::Timer;
    timed.time_limit_ms = Some(60_000);
    let game_id = setup.create_room(&players, timed).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    let pending = setup.game_manager.pending_jobs();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, JobKind::RoundTimeout);

    setup.game_manager.round_timeout(&game_id, 0).await.unwrap();

    let room = setup.game_manager.get_room(&game_id).await.unwrap();
    assert_eq!(room.state.stage, Stage::Ending);
    assert_eq!(room.state.current_round.unwrap().ended_by_player, None);
    let pending = setup.game_manager.pending_jobs();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, JobKind::Finalize);

    // The round already ended, so a second timeout is illegal
    let err = setup.game_manager.round_timeout(&game_id, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalTransition);
}

#[tokio::test]
async fn test_timer_game_requires_time_limit() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice"]).await;
    let mut timed = settings(&["Animal"], 3);
    timed.mode = GameMode::Timer;

    let err = setup
        .game_manager
        .create_game(&players[0].id, Some(timed))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}

#[tokio::test]
async fn test_cancel_start() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    let state = setup.game_manager.cancel_start(&game_id).await.unwrap();
    assert_eq!(state.stage, Stage::Pre);
    assert!(state.current_round.is_none());

    // Once someone has answered the round can no longer be withdrawn
    setup.game_manager.start_round(&game_id).await.unwrap();
    setup
        .game_manager
        .submit_answer(&game_id, &players[0].id, answer_set(&[("Animal", "a")]), None)
        .await
        .unwrap();
    let err = setup.game_manager.cancel_start(&game_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    assert_eq!(setup.stage(&game_id).await, Stage::Active);
}

#[tokio::test]
async fn test_letters_run_out() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice"]).await;
    let mut short = settings(&["Animal"], 3);
    short.letters = "Q".to_string();
    let game_id = setup.create_room(&players, short).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    assert_eq!(setup.letter(&game_id).await, 'Q');
    setup.game_manager.end_round(&game_id, None).await.unwrap();
    setup.wait_for_stage(&game_id, Stage::Review).await;

    let before = setup.game_manager.get_room(&game_id).await.unwrap();
    let err = setup.game_manager.start_round(&game_id).await.unwrap_err();
    assert!(matches!(err, EngineError::ExhaustedAlphabet { .. }));
    let after = setup.game_manager.get_room(&game_id).await.unwrap();
    assert_eq!(before.state, after.state);
}

#[tokio::test]
async fn test_vote_overrides_score() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice", "Bob"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    let letter = setup.letter(&game_id).await;
    let answer = word_for(letter, "lpaca");
    setup
        .game_manager
        .submit_answer(
            &game_id,
            &players[0].id,
            answer_set(&[("Animal", answer.as_str())]),
            None,
        )
        .await
        .unwrap();
    setup.game_manager.end_round(&game_id, None).await.unwrap();
    setup.wait_for_stage(&game_id, Stage::Review).await;

    let scores = setup
        .game_manager
        .vote_answer(&game_id, &players[0].id, "Animal", false)
        .await
        .unwrap();
    assert_eq!(scores[&players[0].id]["Animal"], 0);

    let scores = setup
        .game_manager
        .vote_answer(&game_id, &players[0].id, "Animal", true)
        .await
        .unwrap();
    assert_eq!(scores[&players[0].id]["Animal"], 1);
    assert_eq!(
        setup.events.count(|e| matches!(e, GameEvent::ScoresUpdated { .. })),
        2
    );

    let err = setup
        .game_manager
        .vote_answer(&game_id, &players[0].id, "Colour", true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}

#[tokio::test]
async fn test_end_game_mid_round_discards_unscored_round() {
    let setup = TestGameServerSetup::with_grace(Duration::from_secs(30));
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    setup.game_manager.end_round(&game_id, None).await.unwrap();
    assert!(setup.game_manager.finalize_round(&game_id, 0).await.unwrap());
    setup.game_manager.start_round(&game_id).await.unwrap();
    setup
        .game_manager
        .submit_answer(&game_id, &players[0].id, answer_set(&[("Animal", "a")]), None)
        .await
        .unwrap();

    let state = setup.game_manager.end_game(&game_id).await.unwrap();
    assert_eq!(state.stage, Stage::Finished);
    assert_eq!(state.previous_rounds.len(), 1);
    assert!(state.current_round.is_none());
    assert!(setup.game_manager.pending_jobs().is_empty());
    assert_eq!(
        setup
            .game_manager
            .retrieve_answers(&game_id, &players[0].id)
            .await
            .unwrap(),
        None
    );

    let err = setup.game_manager.end_game(&game_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalTransition);
}

#[tokio::test]
async fn test_join_next_game_shares_one_successor() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice", "Bob"]).await;
    let mut custom = settings(&["Animal", "Food"], 2);
    custom.letters = "ABC".to_string();
    let game_id = setup.create_room(&players, custom).await;

    let err = setup
        .game_manager
        .join_next_game(&game_id, &players[0].id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    setup.game_manager.start_round(&game_id).await.unwrap();
    let finished = setup.game_manager.end_game(&game_id).await.unwrap();
    let next_game_id = finished.next_game_id.unwrap();

    let first = setup
        .game_manager
        .join_next_game(&game_id, &players[0].id)
        .await
        .unwrap();
    assert_eq!(first.config.id, next_game_id);
    assert_eq!(first.config.categories, vec!["Animal", "Food"]);
    assert_eq!(first.config.letters, DEFAULT_LETTERS);
    assert_eq!(first.state.stage, Stage::Pre);

    let second = setup
        .game_manager
        .join_next_game(&game_id, &players[1].id)
        .await
        .unwrap();
    assert_eq!(second.config.id, next_game_id);
    assert_eq!(second.players.len(), 2);
}

#[tokio::test]
async fn test_leaving_player_keeps_submitted_answers() {
    let setup = TestGameServerSetup::with_grace(Duration::from_secs(30));
    let players = setup.create_players(&["Alice", "Bob"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    let letter = setup.letter(&game_id).await;
    let answer = word_for(letter, "nt");
    setup
        .game_manager
        .submit_answer(
            &game_id,
            &players[1].id,
            answer_set(&[("Animal", answer.as_str())]),
            None,
        )
        .await
        .unwrap();
    setup
        .game_manager
        .leave_game(&game_id, &players[1].id)
        .await
        .unwrap();

    setup.game_manager.end_round(&game_id, None).await.unwrap();
    assert!(setup.game_manager.finalize_round(&game_id, 0).await.unwrap());

    let room = setup.game_manager.get_room(&game_id).await.unwrap();
    assert_eq!(room.players.len(), 1);
    assert_eq!(room.state.current_round.unwrap().score_total(&players[1].id), 1);

    let err = setup
        .game_manager
        .leave_game(&game_id, &players[1].id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_update_config_only_between_rounds() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    let err = setup
        .game_manager
        .update_config(&game_id, &players[0].id, settings(&["Animal", "animal "], 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    setup
        .game_manager
        .update_config(&game_id, &players[0].id, settings(&["Animal", "River"], 3))
        .await
        .unwrap();
    let room = setup.game_manager.get_room(&game_id).await.unwrap();
    assert_eq!(room.config.categories, vec!["Animal", "River"]);
    assert_eq!(room.config.last_author.as_deref(), Some(players[0].id.as_str()));

    setup.game_manager.start_round(&game_id).await.unwrap();
    let err = setup
        .game_manager
        .update_config(&game_id, &players[0].id, settings(&["Food"], 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalTransition);
}

#[tokio::test]
async fn test_identify_restores_known_player() {
    let setup = TestGameServerSetup::new();
    let created = setup.game_manager.identify(None).await.unwrap();
    let restored = setup.game_manager.identify(Some(&created.id)).await.unwrap();
    assert_eq!(created, restored);

    let fresh = setup
        .game_manager
        .identify(Some("0b7d3a5e-9c1f-4e2a-8d6b-7f0e1a2b3c4d"))
        .await
        .unwrap();
    assert_ne!(fresh.id, created.id);
}

#[tokio::test]
async fn test_flush_all_cancels_jobs_and_forgets_rooms() {
    let setup = TestGameServerSetup::with_grace(Duration::from_secs(30));
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    setup.game_manager.end_round(&game_id, None).await.unwrap();
    assert_eq!(setup.game_manager.pending_jobs().len(), 1);

    setup.game_manager.flush_all().await.unwrap();
    assert!(setup.game_manager.pending_jobs().is_empty());
    assert!(setup.game_manager.list_rooms().await.unwrap().is_empty());

    let err = setup.game_manager.get_room(&game_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_finalize_retries_after_store_outage() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    let letter = setup.letter(&game_id).await;
    let answer = word_for(letter, "nt");
    setup
        .game_manager
        .submit_answer(
            &game_id,
            &players[0].id,
            answer_set(&[("Animal", answer.as_str())]),
            None,
        )
        .await
        .unwrap();
    setup.game_manager.end_round(&game_id, None).await.unwrap();

    // The store is down for the whole grace window and a while after
    setup.store.set_offline(true);
    tokio::time::sleep(Duration::from_millis(300)).await;
    setup.store.set_offline(false);

    setup.wait_for_stage(&game_id, Stage::Review).await;
    let room = setup.game_manager.get_room(&game_id).await.unwrap();
    assert_eq!(room.state.current_round.unwrap().score_total(&players[0].id), 1);
    assert!(setup.game_manager.pending_jobs().is_empty());
    assert_eq!(
        setup.events.count(|e| matches!(e, GameEvent::RoundEnded { .. })),
        1
    );

    // The room is usable again
    let state = setup.game_manager.start_round(&game_id).await.unwrap();
    assert_eq!(state.stage, Stage::Active);
}

#[tokio::test]
async fn test_successor_is_reserved_when_game_ends() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 1)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    setup.game_manager.end_round(&game_id, None).await.unwrap();
    setup.wait_for_stage(&game_id, Stage::Review).await;
    let state = setup.game_manager.start_round(&game_id).await.unwrap();
    assert_eq!(state.stage, Stage::Finished);
    let next_game_id = state.next_game_id.unwrap();

    // The id is taken before anyone asks to play again
    let successor = setup.game_manager.get_room(&next_game_id).await.unwrap();
    assert_eq!(successor.state.stage, Stage::Pre);
    assert!(successor.players.is_empty());
    assert_eq!(successor.config.categories, vec!["Animal"]);

    let mut rooms = setup.game_manager.list_rooms().await.unwrap();
    rooms.sort();
    let mut expected = vec![game_id.clone(), next_game_id.clone()];
    expected.sort();
    assert_eq!(rooms, expected);
}

#[tokio::test]
async fn test_join_next_game_refuses_reused_successor_id() {
    let setup = TestGameServerSetup::new();
    let players = setup.create_players(&["Alice"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    let next_game_id = setup
        .game_manager
        .end_game(&game_id)
        .await
        .unwrap()
        .next_game_id
        .unwrap();

    // The successor expires and a stranger's room takes over its id
    for key in [
        keys::game_config(&next_game_id),
        keys::game_players(&next_game_id),
        keys::game_state(&next_game_id),
    ] {
        setup.store.del(&key).await.unwrap();
    }
    let mut config = GameConfig::default_for(next_game_id.clone());
    config.categories = vec!["Stranger category".to_string()];
    let foreign = Room {
        config,
        players: vec![Player::new("stranger", "Stranger", "#000075")],
        state: GameState::new(),
    };
    RoomRepository::new(setup.store.clone(), Duration::from_secs(60))
        .create_room(&foreign)
        .await
        .unwrap();

    let err = setup
        .game_manager
        .join_next_game(&game_id, &players[0].id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let untouched = setup.game_manager.get_room(&next_game_id).await.unwrap();
    assert_eq!(untouched.players.len(), 1);
}

#[tokio::test]
async fn test_start_round_discards_stale_answers() {
    let setup = TestGameServerSetup::with_grace(Duration::from_secs(30));
    let players = setup.create_players(&["Alice", "Bob"]).await;
    let game_id = setup.create_room(&players, settings(&["Animal"], 3)).await;

    setup.game_manager.start_round(&game_id).await.unwrap();
    setup.game_manager.end_round(&game_id, None).await.unwrap();
    assert!(setup.game_manager.finalize_round(&game_id, 0).await.unwrap());

    // Answers left over from a round whose cleanup never ran
    AnswerCollector::new(setup.store.clone())
        .set(&game_id, &players[1].id, &answer_set(&[("Animal", "anything")]))
        .await
        .unwrap();

    setup.game_manager.start_round(&game_id).await.unwrap();
    assert_eq!(
        setup
            .game_manager
            .retrieve_answers(&game_id, &players[1].id)
            .await
            .unwrap(),
        None
    );

    // Nobody has answered this round, so it can still be withdrawn
    let state = setup.game_manager.cancel_start(&game_id).await.unwrap();
    assert_eq!(state.stage, Stage::Pre);
}

#[tokio::test]
async fn test_cleanup_clears_answers_of_expired_rooms() {
    let setup = TestGameServerSetup::with_settings(GameManagerSettings {
        session_ttl: Duration::from_millis(200),
        ..GameManagerSettings::default()
    });

    let players = setup.create_players(&["Alice"]).await;
    let expired = setup.create_room(&players, settings(&["Animal"], 3)).await;
    setup.game_manager.start_round(&expired).await.unwrap();
    setup
        .game_manager
        .submit_answer(&expired, &players[0].id, answer_set(&[("Animal", "a")]), None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!setup.store.keys(&keys::answers_prefix(&expired)).await.unwrap().is_empty());

    let players = setup.create_players(&["Bob"]).await;
    let live = setup.create_room(&players, settings(&["Animal"], 3)).await;
    setup.game_manager.start_round(&live).await.unwrap();
    setup
        .game_manager
        .submit_answer(&live, &players[0].id, answer_set(&[("Animal", "b")]), None)
        .await
        .unwrap();

    setup.game_manager.cleanup_expired().await.unwrap();

    assert!(setup.store.keys(&keys::answers_prefix(&expired)).await.unwrap().is_empty());
    let remaining = setup.store.keys(keys::ANSWERS_PREFIX).await.unwrap();
    assert_eq!(remaining, vec![keys::answers(&live, &players[0].id)]);
}
