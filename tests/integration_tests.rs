//! Integration tests across the engine, the lobby and the network layer
//!
//! These tests drive the public APIs the way a client and the server do.

use futures_util::{SinkExt, StreamExt};
use server::channel::{outbox, OutboxReceiver};
use server::lobby::Lobby;
use server::network::{Server, ServerConfig};
use shared::protocol::{decode_frame, encode_frame};
use shared::{
    Action, ActionType, ClientMessage, Game, GameEvent, GameSpec, Outbound, Player, ServerMessage,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

fn spec(board: &str, formation: &str) -> GameSpec {
    GameSpec {
        board: board.to_string(),
        formation: formation.to_string(),
        options: String::new(),
    }
}

fn drain(rx: &mut OutboxReceiver) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

/// ENGINE SCENARIOS
mod game_logic_tests {
    use super::*;

    /// Radius-2 duel: one king each, placed by a symmetric formation
    #[test]
    fn radius_two_king_duel() {
        let mut game = Game::from_spec(0, &spec("2", "2 3 k"), 16);
        assert_eq!(game.num_players(), 2);

        let king_a = game.board().loc(-2, 2).and_then(|loc| game.piece_at(loc)).unwrap().id;
        let king_b = game.board().loc(2, -2).and_then(|loc| game.piece_at(loc)).unwrap().id;

        let moves: Vec<u8> = game.get_piece_actions(king_a).iter().map(|a| a.dir).collect();
        assert_eq!(moves, vec![2, 3, 4]);

        let mut step = Action::movement(3);
        assert_eq!(game.do_action(king_a, &mut step), Ok(true));
        let new_loc = game.board().loc(-1, 1).unwrap();
        assert_eq!(game.piece(king_a).unwrap().loc, new_loc);
        assert_eq!(step.loc, game.board().loc(-2, 2));

        // A move has been logged, so nothing else may move this turn.
        assert!(game.get_piece_actions(king_a).is_empty());
        assert_eq!(game.do_action(king_a, &mut Action::movement(3)), Ok(false));

        assert!(game.end_turn());
        assert_eq!(game.current_player(), 1);
        assert!(game.get_piece_actions(king_a).is_empty());

        assert_eq!(game.do_action(king_b, &mut Action::movement(0)), Ok(true));
        assert!(game.end_turn());

        // Back to A: all six neighbours of the relocated king are open.
        let moves: Vec<u8> = game.get_piece_actions(king_a).iter().map(|a| a.dir).collect();
        assert_eq!(moves, vec![0, 1, 2, 3, 4, 5]);
    }

    /// A client copy replaying relayed turns stays in lockstep with the server
    #[test]
    fn replayed_turns_stay_in_sync() {
        let mut host = Game::from_spec(3, &spec("3 6 n n n w", "3 3 e e e n n n e e k"), 16);
        host.join_player(Player::new("alice")).unwrap();
        host.join_player(Player::new("bob")).unwrap();
        let mut replica = Game::deserialize(&host.serialize(), 16);
        assert_eq!(replica.board(), host.board());

        for _ in 0..6 {
            let seat = host.current_player();
            let (piece, action) = host
                .pieces()
                .filter(|p| p.player_id == seat)
                .find_map(|p| host.get_piece_actions(p.id).into_iter().next().map(|a| (p.loc, a)))
                .unwrap();

            let applied = host.play_turn(seat, vec![action.from_loc(piece)]).unwrap();
            replica.play_turn(seat, applied).unwrap();

            assert_eq!(replica.board(), host.board());
            assert_eq!(replica.current_player(), host.current_player());
        }
    }

    /// Formation warnings surface as events without aborting placement
    #[test]
    fn formation_warnings_are_reported() {
        let mut game = Game::from_spec(0, &spec("1 6 w", "1 6 n q w"), 16);
        let warnings: Vec<String> = game
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                GameEvent::Warning(w) => Some(w),
                _ => None,
            })
            .collect();

        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("\"q\""));
        assert!(warnings[1].contains("\"w\""));
        assert!(warnings[2].contains("wall"));
        assert_eq!(game.pieces().count(), 0);
    }
}

/// LOBBY SCENARIOS
mod lobby_tests {
    use super::*;

    #[tokio::test]
    async fn two_player_game_starts_once_for_every_subscriber() {
        let lobby = Lobby::new(16);
        let mut receivers = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = outbox();
            ids.push(lobby.connect(tx).await);
            receivers.push(rx);
        }

        let game_id = lobby.create_game(ids[0], &spec("2", "2 3 k")).await.unwrap();
        lobby.join_game(ids[1], game_id).await.unwrap();

        let expected = [Some(0), Some(1), None];
        for (rx, seat) in receivers.iter_mut().zip(expected) {
            let pops: Vec<Option<usize>> = drain(rx)
                .into_iter()
                .filter_map(|m| match m {
                    Outbound::Message(ServerMessage::OpenGamesPop { player_id, .. }) => {
                        Some(player_id)
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(pops, vec![seat]);
        }
        assert_eq!(lobby.running_game_ids().await, vec![game_id]);

        // A third player is turned away.
        let (tx, mut rx) = outbox();
        let late = lobby.connect(tx).await;
        lobby
            .dispatch(late, ClientMessage::JoinGame { game_id })
            .await
            .unwrap();
        let errors: Vec<Outbound> = drain(&mut rx)
            .into_iter()
            .filter(|m| m.kind() == "error")
            .collect();
        assert_eq!(
            errors,
            vec![Outbound::Message(ServerMessage::Error {
                msg: "This game is already full".to_string()
            })]
        );
    }

    #[tokio::test]
    async fn many_connections_come_and_go() {
        let lobby = Lobby::new(16);
        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..50 {
            let (tx, rx) = outbox();
            ids.push(lobby.connect(tx).await);
            receivers.push(rx);
        }
        for id in ids.iter().step_by(2) {
            lobby.create_game(*id, &spec("2", "2 2 k")).await.unwrap();
        }
        assert_eq!(lobby.open_game_ids().await.len(), 25);
        assert_eq!(lobby.connection_count().await, 50);

        for id in ids {
            lobby.disconnect(id).await;
        }
        assert_eq!(lobby.connection_count().await, 0);
        assert!(lobby.open_game_ids().await.is_empty());
    }

    /// Whichever of a join and the last leave wins, seats and registry agree
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn join_racing_last_leave_stays_consistent() {
        for _ in 0..50 {
            let lobby = Arc::new(Lobby::new(16));
            let (tx, _rx_a) = outbox();
            let a = lobby.connect(tx).await;
            let (tx, _rx_b) = outbox();
            let b = lobby.connect(tx).await;
            let game_id = lobby.create_game(a, &spec("2", "2 2 k")).await.unwrap();
            let name_b = lobby.client_name(b).await.unwrap();

            let leave = tokio::spawn({
                let lobby = Arc::clone(&lobby);
                async move { lobby.leave_game(a, game_id).await }
            });
            let join = tokio::spawn({
                let lobby = Arc::clone(&lobby);
                async move { lobby.join_game(b, game_id).await }
            });
            leave.await.unwrap().unwrap();
            let joined = join.await.unwrap().is_ok();

            let registered = lobby.game(game_id).await;
            assert_eq!(registered.is_ok(), joined);
            assert_eq!(lobby.client_games(b).await.contains(&game_id), joined);
            assert_eq!(lobby.open_game_ids().await.contains(&game_id), joined);
            if let Ok(game) = registered {
                let game = game.lock().await;
                assert_eq!(game.player_count(), 1);
                assert!(game.seat_of(&name_b).is_some());
            }
        }
    }
}

/// CLIENT-SERVER INTEGRATION TESTS
mod client_server_tests {
    use super::*;

    type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_server() -> String {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::new(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        format!("ws://{}", addr)
    }

    /// WebSocket client that keeps messages it has read but not yet consumed
    struct TestClient {
        ws: WsClient,
        pending: VecDeque<Outbound>,
    }

    impl TestClient {
        async fn connect(url: &str) -> Self {
            let (ws, _) = connect_async(url).await.unwrap();
            Self {
                ws,
                pending: VecDeque::new(),
            }
        }

        async fn send(&mut self, messages: &[ClientMessage]) {
            let frame = encode_frame(messages).unwrap();
            self.ws.send(Message::Text(frame)).await.unwrap();
        }

        /// Skips ahead to the next message of `kind`
        async fn wait_for(&mut self, kind: &str) -> Outbound {
            loop {
                while let Some(message) = self.pending.pop_front() {
                    if message.kind() == kind {
                        return message;
                    }
                }

                let frame = timeout(Duration::from_secs(5), self.ws.next())
                    .await
                    .expect("timed out waiting for a frame")
                    .unwrap()
                    .unwrap();
                let text = frame.into_text().unwrap();
                for message in decode_frame::<Outbound>(&text).unwrap() {
                    self.pending.push_back(message.unwrap());
                }
            }
        }
    }

    #[tokio::test]
    async fn full_match_over_websocket() {
        let url = spawn_server().await;
        let mut alice = TestClient::connect(&url).await;
        let mut bob = TestClient::connect(&url).await;
        alice.wait_for("set_name").await;
        bob.wait_for("set_name").await;

        alice
            .send(&[
                ClientMessage::SetName {
                    name: "alice".to_string(),
                },
                ClientMessage::CreateGame {
                    game: spec("1", "1 3 k"),
                },
            ])
            .await;
        alice.wait_for("join_game_notif").await;

        match bob.wait_for("open_games_push").await {
            Outbound::Message(ServerMessage::OpenGamesPush { game }) => {
                assert_eq!(game.game_id, 0);
                assert_eq!(game.formation, "1 3 k");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            bob.wait_for("join_game_notif").await,
            Outbound::Message(ServerMessage::JoinGameNotif {
                game_id: 0,
                player_name: "alice".to_string()
            })
        );

        bob.send(&[ClientMessage::JoinGame { game_id: 0 }]).await;
        assert_eq!(
            bob.wait_for("open_games_pop").await,
            Outbound::Message(ServerMessage::OpenGamesPop {
                game_id: 0,
                player_id: Some(1)
            })
        );
        alice.wait_for("open_games_pop").await;

        // Kings start at linear indexes 2 and 6 of the radius-1 board.
        alice
            .send(&[ClientMessage::Turn {
                game_id: 0,
                actions: vec![Action::movement(3).from_loc(2)],
            }])
            .await;
        match bob.wait_for("turn").await {
            Outbound::Message(ServerMessage::Turn { actions, .. }) => {
                assert_eq!(actions.len(), 1);
                assert_eq!(actions[0].kind, ActionType::Move);
                assert_eq!(actions[0].loc, Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Moving the opponent's king is refused; the real capture ends the game.
        bob.send(&[
            ClientMessage::Turn {
                game_id: 0,
                actions: vec![Action::movement(0).from_loc(4)],
            },
            ClientMessage::Turn {
                game_id: 0,
                actions: vec![Action::movement(0).from_loc(6)],
            },
        ])
        .await;
        match bob.wait_for("error_turn").await {
            Outbound::CodedError { data, .. } => {
                assert_eq!(data["game_id"], 0);
                assert_eq!(data["index"], 0);
            }
            other => panic!("unexpected {:?}", other),
        }

        let over = Outbound::Message(ServerMessage::GameOver {
            game_id: 0,
            player_id: 1,
        });
        assert_eq!(alice.wait_for("game_over").await, over);
        assert_eq!(bob.wait_for("game_over").await, over);
    }

    #[tokio::test]
    async fn disconnect_notifies_remaining_players() {
        let url = spawn_server().await;
        let mut alice = TestClient::connect(&url).await;
        alice.wait_for("set_name").await;
        alice
            .send(&[ClientMessage::CreateGame {
                game: spec("2", "2 2 k"),
            }])
            .await;
        alice.wait_for("join_game_notif").await;

        let mut bob = TestClient::connect(&url).await;
        bob.wait_for("open_games_push").await;

        alice.ws.close(None).await.unwrap();

        bob.wait_for("leave_game_notif").await;
        assert_eq!(
            bob.wait_for("open_games_pop").await,
            Outbound::Message(ServerMessage::OpenGamesPop {
                game_id: 0,
                player_id: None
            })
        );
    }
}
